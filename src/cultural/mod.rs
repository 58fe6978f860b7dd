//! Cultural adaptation
//!
//! Region profiles decide which behaviors are allowed, what replaces the ones
//! that are not, and how intensity and frequency scale.

pub mod filter;
pub mod profile;

pub use filter::{CulturalAdapter, CulturalOutcome};
pub use profile::{
    AdaptationContext, AppropriatenessRule, CulturalDatabase, CulturalProfile, CulturalVariant,
};
