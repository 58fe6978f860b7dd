//! Kinesync - Behavior synchronization engine for virtual characters
//!
//! Kinesync turns candidate hand gestures, facial expressions and head movements
//! into a conflict-free, speech-aligned, culturally adapted schedule through a
//! deterministic pipeline: speech timing → duration/intensity sizing →
//! synchronization → conflict resolution → blending → cultural adaptation.
//!
//! ## Modules
//!
//! - **Stages**: `timing`, `calculator`, `sync`, `conflict`, `blending`, `cultural`
//! - **Coordinator**: Live-plan management, real-time adaptation and observers

pub mod blending;
pub mod calculator;
pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod cultural;
pub mod error;
pub mod observer;
pub mod request;
pub mod sync;
pub mod timing;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{BehaviorTables, MotionSensitivity, SyncConfig, TypeTiming};
pub use coordinator::{synchronize_behaviors, BehaviorCoordinator};
pub use error::{Result, SyncError};
pub use observer::{PlanEvent, PlanObserver};
pub use request::{AdaptationUpdate, BehaviorRequest, CandidateBehavior};
pub use types::{BehaviorEvent, BehaviorType, Channel, PlanId, SynchronizedBehaviorPlan};

// Stage exports
pub use blending::{BlendingEngine, TransitionStep};
pub use calculator::DurationIntensityCalculator;
pub use conflict::{ConflictDetector, ConflictResolver, Resolution};
pub use cultural::{CulturalAdapter, CulturalDatabase, CulturalProfile};
pub use sync::SynchronizationEngine;
pub use timing::SpeechTimingAnalyzer;

/// Kinesync version
pub const KINESYNC_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI and FFI
pub const PRODUCER_NAME: &str = "kinesync";
