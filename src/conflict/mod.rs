//! Conflict detection and resolution
//!
//! Detection is a pure scan over an event set; resolution repeatedly applies
//! strategies to detected conflicts until the set is clean.

pub mod detector;
pub mod resolver;
pub mod rules;

pub use detector::ConflictDetector;
pub use resolver::{ConflictResolver, Resolution};
pub use rules::is_contradictory;
