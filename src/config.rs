//! Configuration tables and tunables
//!
//! All thresholds used by the pipeline live here so that hosts can tune them.
//! Every section deserializes with defaults, so a partial JSON document is a valid
//! configuration.

use crate::error::{Result, SyncError};
use crate::types::{BehaviorType, Channel, Formality};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Speech timing analysis tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Estimated speaking rate at neutral formality
    pub words_per_second: f64,
    /// Every Nth word closes a phrase
    pub phrase_period: usize,
    /// Every Mth word carries emphasis
    pub emphasis_period: usize,
    /// Length of inserted pause markers
    pub pause_marker_ms: f64,
    /// Fractions of the total duration where pauses are inserted
    pub pause_fractions: Vec<f64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            words_per_second: 2.5,
            phrase_period: 5,
            emphasis_period: 3,
            pause_marker_ms: 150.0,
            pause_fractions: vec![0.25, 0.5, 0.75],
        }
    }
}

impl TimingConfig {
    /// Speaking-rate multiplier for a formality level
    pub fn formality_multiplier(&self, formality: Formality) -> f64 {
        match formality {
            Formality::Formal => 0.9,
            Formality::Neutral => 1.0,
            Formality::Casual => 1.1,
        }
    }
}

/// Duration/intensity calculator tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorConfig {
    pub min_scaling: f64,
    pub max_scaling: f64,
    pub high_emphasis_factor: f64,
    pub low_emphasis_factor: f64,
    pub question_factor: f64,
    pub base_weight: f64,
    pub speech_weight: f64,
    pub context_weight: f64,
    /// Speech energy assumed when no marker overlaps an event
    pub ambient_speech_energy: f64,
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            min_scaling: 0.5,
            max_scaling: 2.0,
            high_emphasis_factor: 1.2,
            low_emphasis_factor: 0.8,
            question_factor: 1.1,
            base_weight: 0.4,
            speech_weight: 0.4,
            context_weight: 0.2,
            ambient_speech_energy: 0.5,
        }
    }
}

/// Synchronization tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncTuning {
    pub type_association_weight: f64,
    pub intensity_similarity_weight: f64,
    pub proximity_weight: f64,
    /// Distance at which temporal proximity stops scoring
    pub proximity_window_ms: f64,
    /// Minimum marker score for a marker to count as relevant
    pub min_relevance: f64,
    /// Deltas beyond this are recorded as timing adjustments
    pub adjustment_threshold_ms: f64,
    pub aligned_confidence: f64,
    pub continuous_confidence: f64,
    pub fallback_confidence: f64,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            type_association_weight: 0.5,
            intensity_similarity_weight: 0.3,
            proximity_weight: 0.2,
            proximity_window_ms: 1000.0,
            min_relevance: 0.5,
            adjustment_threshold_ms: 50.0,
            aligned_confidence: 0.8,
            continuous_confidence: 0.6,
            fallback_confidence: 0.3,
        }
    }
}

/// Conflict detection and resolution tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// Same-channel overlap tolerated without conflict
    pub temporal_tolerance_ms: f64,
    pub temporal_medium_ms: f64,
    pub temporal_high_ms: f64,
    pub spatial_threshold: f64,
    pub spatial_medium: f64,
    pub spatial_high: f64,
    pub semantic_overlap_ms: f64,
    pub semantic_high_ms: f64,
    pub intensity_threshold: f64,
    pub intensity_medium: f64,
    pub intensity_high: f64,
    /// Summed intensity targeted by renormalizing blends
    pub intensity_target: f64,
    pub sample_resolution_ms: f64,
    pub override_factor: f64,
    pub stagger_ms: f64,
    pub blend_factor: f64,
    pub separation_factor: f64,
    pub merge_factor: f64,
    pub max_passes: usize,
    pub escalate_after_passes: usize,
    /// Upper bound on settle iterations after the main passes
    pub max_settle_iterations: usize,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            temporal_tolerance_ms: 100.0,
            temporal_medium_ms: 500.0,
            temporal_high_ms: 1000.0,
            spatial_threshold: 0.2,
            spatial_medium: 0.235,
            spatial_high: 0.27,
            semantic_overlap_ms: 200.0,
            semantic_high_ms: 1000.0,
            intensity_threshold: 2.5,
            intensity_medium: 3.0,
            intensity_high: 3.5,
            intensity_target: 2.0,
            sample_resolution_ms: 100.0,
            override_factor: 0.6,
            stagger_ms: 250.0,
            blend_factor: 0.7,
            separation_factor: 0.65,
            merge_factor: 0.8,
            max_passes: 8,
            escalate_after_passes: 3,
            max_settle_iterations: 32,
        }
    }
}

impl ConflictConfig {
    /// Interference coefficient between two channels
    pub fn interference(&self, a: Channel, b: Channel) -> f64 {
        use Channel::*;
        match (a, b) {
            (HandGesture, HandGesture)
            | (FacialExpression, FacialExpression)
            | (HeadMovement, HeadMovement) => 1.0,
            (HandGesture, HeadMovement) | (HeadMovement, HandGesture) => 0.3,
            (FacialExpression, HeadMovement) | (HeadMovement, FacialExpression) => 0.25,
            (HandGesture, FacialExpression) | (FacialExpression, HandGesture) => 0.15,
        }
    }
}

/// Blending tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendingConfig {
    /// Fraction of an event's duration used for blend-in/out
    pub blend_fraction: f64,
    pub min_blend_ms: f64,
    pub max_blend_ms: f64,
    /// Gap below which consecutive events cross-fade
    pub adjacency_ms: f64,
    /// Minimum weight kept by the primary contributor
    pub primary_min_weight: f64,
    /// Length of one transition interpolation step
    pub transition_step_ms: f64,
}

impl Default for BlendingConfig {
    fn default() -> Self {
        Self {
            blend_fraction: 0.2,
            min_blend_ms: 30.0,
            max_blend_ms: 500.0,
            adjacency_ms: 150.0,
            primary_min_weight: 0.6,
            transition_step_ms: 100.0,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub timing: TimingConfig,
    pub calculator: CalculatorConfig,
    pub sync: SyncTuning,
    pub conflict: ConflictConfig,
    pub blending: BlendingConfig,
}

impl SyncConfig {
    /// Check the tunables for values that would break pipeline invariants
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SyncError::InvalidConfig(msg.to_string()));

        if self.timing.words_per_second <= 0.0 {
            return invalid("timing.words_per_second must be positive");
        }
        if self.timing.phrase_period == 0 || self.timing.emphasis_period == 0 {
            return invalid("timing periods must be at least 1");
        }
        let scaling = &self.calculator;
        if scaling.min_scaling.is_nan()
            || scaling.max_scaling.is_nan()
            || scaling.min_scaling <= 0.0
            || scaling.min_scaling > scaling.max_scaling
        {
            return invalid("calculator scaling bounds are inverted or non-positive");
        }
        if self.conflict.sample_resolution_ms <= 0.0 {
            return invalid("conflict.sample_resolution_ms must be positive");
        }
        if self.conflict.temporal_tolerance_ms < 0.0 {
            return invalid("conflict.temporal_tolerance_ms must not be negative");
        }
        if self.conflict.intensity_target <= 0.0
            || self.conflict.intensity_target > self.conflict.intensity_threshold
        {
            return invalid("conflict.intensity_target must be in (0, intensity_threshold]");
        }
        for (name, factor) in [
            ("override_factor", self.conflict.override_factor),
            ("blend_factor", self.conflict.blend_factor),
            ("separation_factor", self.conflict.separation_factor),
            ("merge_factor", self.conflict.merge_factor),
        ] {
            if !(0.0..1.0).contains(&factor) || factor == 0.0 {
                return Err(SyncError::InvalidConfig(format!(
                    "conflict.{name} must be in (0, 1)"
                )));
            }
        }
        if self.conflict.max_passes == 0 {
            return invalid("conflict.max_passes must be at least 1");
        }
        let blending = &self.blending;
        if blending.blend_fraction.is_nan() || blending.blend_fraction <= 0.0 {
            return invalid("blending.blend_fraction must be positive");
        }
        if blending.min_blend_ms.is_nan()
            || blending.max_blend_ms.is_nan()
            || blending.min_blend_ms < 0.0
            || blending.min_blend_ms > blending.max_blend_ms
        {
            return invalid("blending.min_blend_ms must be in [0, max_blend_ms]");
        }
        if blending.adjacency_ms.is_nan() || blending.adjacency_ms < 0.0 {
            return invalid("blending.adjacency_ms must not be negative");
        }
        if !(0.5..1.0).contains(&self.blending.primary_min_weight) {
            return invalid("blending.primary_min_weight must be in [0.5, 1)");
        }
        if self.blending.transition_step_ms <= 0.0 {
            return invalid("blending.transition_step_ms must be positive");
        }
        Ok(())
    }

    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Timing and intensity row for one behavior type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeTiming {
    pub base_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub base_intensity: f64,
}

impl TypeTiming {
    const fn new(base: f64, min: f64, max: f64, intensity: f64) -> Self {
        Self {
            base_duration_ms: base,
            min_duration_ms: min,
            max_duration_ms: max,
            base_intensity: intensity,
        }
    }

    /// Clamp a duration into the type's window
    pub fn clamp_duration(&self, duration_ms: f64) -> f64 {
        duration_ms.clamp(self.min_duration_ms, self.max_duration_ms)
    }

    /// Built-in row for a behavior type
    pub fn builtin(behavior: BehaviorType) -> Self {
        use BehaviorType::*;
        match behavior {
            Pointing => Self::new(800.0, 400.0, 1500.0, 0.7),
            Descriptive => Self::new(1200.0, 600.0, 2500.0, 0.6),
            Emphatic => Self::new(600.0, 300.0, 1200.0, 0.8),
            Beat => Self::new(300.0, 150.0, 600.0, 0.5),
            OpenPalm => Self::new(900.0, 450.0, 1800.0, 0.5),
            Celebratory => Self::new(1000.0, 500.0, 2000.0, 0.8),
            Questioning => Self::new(900.0, 450.0, 1800.0, 0.6),
            Counting => Self::new(1000.0, 500.0, 2200.0, 0.6),
            Wave => Self::new(1200.0, 600.0, 2400.0, 0.7),
            ThumbsUp => Self::new(800.0, 400.0, 1500.0, 0.7),
            Rest => Self::new(1000.0, 300.0, 4000.0, 0.2),
            Smile => Self::new(1500.0, 500.0, 4000.0, 0.6),
            Concern => Self::new(1500.0, 500.0, 4000.0, 0.6),
            Surprise => Self::new(700.0, 300.0, 1500.0, 0.8),
            Focus => Self::new(1500.0, 500.0, 4000.0, 0.5),
            Neutral => Self::new(1200.0, 300.0, 5000.0, 0.3),
            Frown => Self::new(1200.0, 400.0, 3000.0, 0.6),
            EyebrowRaise => Self::new(400.0, 200.0, 800.0, 0.6),
            Thinking => Self::new(1500.0, 600.0, 4000.0, 0.5),
            Nod => Self::new(500.0, 250.0, 1000.0, 0.6),
            Shake => Self::new(700.0, 350.0, 1400.0, 0.6),
            Tilt => Self::new(800.0, 400.0, 1600.0, 0.4),
            Turn => Self::new(900.0, 450.0, 1800.0, 0.4),
            MicroMovement => Self::new(600.0, 200.0, 2000.0, 0.2),
        }
    }
}

/// Per-type base duration/intensity tables supplied by the host.
///
/// Types without an override use the built-in row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorTables {
    #[serde(default)]
    overrides: BTreeMap<BehaviorType, TypeTiming>,
}

impl BehaviorTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the row for one type
    pub fn with_override(mut self, behavior: BehaviorType, timing: TypeTiming) -> Result<Self> {
        Self::check_row(behavior, &timing)?;
        self.overrides.insert(behavior, timing);
        Ok(self)
    }

    /// Timing row for a behavior type
    pub fn timing(&self, behavior: BehaviorType) -> TypeTiming {
        self.overrides
            .get(&behavior)
            .copied()
            .unwrap_or_else(|| TypeTiming::builtin(behavior))
    }

    fn check_row(behavior: BehaviorType, timing: &TypeTiming) -> Result<()> {
        if timing.min_duration_ms <= 0.0
            || timing.min_duration_ms > timing.max_duration_ms
            || !(timing.min_duration_ms..=timing.max_duration_ms)
                .contains(&timing.base_duration_ms)
        {
            return Err(SyncError::InvalidConfig(format!(
                "duration window for {behavior} must satisfy 0 < min <= base <= max"
            )));
        }
        if !(0.0..=1.0).contains(&timing.base_intensity) {
            return Err(SyncError::InvalidConfig(format!(
                "base intensity for {behavior} must be in [0, 1]"
            )));
        }
        Ok(())
    }

    /// Load tables from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let tables: BehaviorTables = serde_json::from_str(json)?;
        for (behavior, timing) in &tables.overrides {
            Self::check_row(*behavior, timing)?;
        }
        Ok(tables)
    }

    /// Serialize tables to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Motion sensitivity preference of the viewer (accessibility)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionSensitivity {
    #[default]
    Full,
    Reduced,
    Minimal,
}

impl MotionSensitivity {
    /// Intensity multiplier for a behavior under this preference
    pub fn intensity_factor(&self, behavior: BehaviorType) -> f64 {
        let head = behavior.channel() == Channel::HeadMovement;
        match (self, head) {
            (MotionSensitivity::Full, _) => 1.0,
            (MotionSensitivity::Reduced, false) => 0.7,
            (MotionSensitivity::Reduced, true) => 0.35,
            (MotionSensitivity::Minimal, _) => 0.4,
        }
    }

    /// Whether a behavior is rendered at all under this preference
    pub fn allows(&self, behavior: BehaviorType) -> bool {
        match self {
            MotionSensitivity::Full | MotionSensitivity::Reduced => true,
            MotionSensitivity::Minimal => {
                behavior.channel() != Channel::HeadMovement
                    || matches!(behavior, BehaviorType::Nod | BehaviorType::Tilt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rows_are_consistent() {
        for behavior in BehaviorType::ALL {
            let row = TypeTiming::builtin(behavior);
            assert!(row.min_duration_ms > 0.0, "{behavior}");
            assert!(row.min_duration_ms <= row.base_duration_ms, "{behavior}");
            assert!(row.base_duration_ms <= row.max_duration_ms, "{behavior}");
            assert!((0.0..=1.0).contains(&row.base_intensity), "{behavior}");
        }
    }

    #[test]
    fn test_default_config_validates() {
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_config() {
        let config =
            SyncConfig::from_json(r#"{"conflict": {"intensity_threshold": 3.0}}"#).unwrap();
        assert_eq!(config.conflict.intensity_threshold, 3.0);
        assert_eq!(config.conflict.temporal_tolerance_ms, 100.0);
        assert_eq!(config.timing.phrase_period, 5);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SyncConfig::from_json(r#"{"conflict": {"intensity_target": 4.0}}"#);
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));

        let result = SyncConfig::from_json(r#"{"conflict": {"blend_factor": 1.5}}"#);
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_blending_bounds_rejected() {
        // min above the default max of 500
        let result = SyncConfig::from_json(r#"{"blending": {"min_blend_ms": 600}}"#);
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));

        let result = SyncConfig::from_json(r#"{"blending": {"blend_fraction": 0.0}}"#);
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));

        let result = SyncConfig::from_json(r#"{"blending": {"adjacency_ms": -10}}"#);
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));

        let mut config = SyncConfig::default();
        config.blending.max_blend_ms = f64::NAN;
        assert!(config.validate().is_err());

        let config =
            SyncConfig::from_json(r#"{"blending": {"min_blend_ms": 600, "max_blend_ms": 800}}"#)
                .unwrap();
        assert_eq!(config.blending.min_blend_ms, 600.0);
    }

    #[test]
    fn test_table_override_and_serialization() {
        let tables = BehaviorTables::new()
            .with_override(BehaviorType::Nod, TypeTiming::new(600.0, 300.0, 900.0, 0.5))
            .unwrap();
        assert_eq!(tables.timing(BehaviorType::Nod).base_duration_ms, 600.0);
        assert_eq!(tables.timing(BehaviorType::Smile), TypeTiming::builtin(BehaviorType::Smile));

        let json = tables.to_json().unwrap();
        let loaded = BehaviorTables::from_json(&json).unwrap();
        assert_eq!(loaded, tables);
    }

    #[test]
    fn test_bad_table_row_rejected() {
        let result = BehaviorTables::new()
            .with_override(BehaviorType::Nod, TypeTiming::new(100.0, 300.0, 900.0, 0.5));
        assert!(result.is_err());
    }

    #[test]
    fn test_motion_sensitivity() {
        assert_eq!(MotionSensitivity::Full.intensity_factor(BehaviorType::Nod), 1.0);
        assert!(
            MotionSensitivity::Reduced.intensity_factor(BehaviorType::Shake)
                < MotionSensitivity::Reduced.intensity_factor(BehaviorType::Smile)
        );
        assert!(!MotionSensitivity::Minimal.allows(BehaviorType::Shake));
        assert!(MotionSensitivity::Minimal.allows(BehaviorType::Nod));
        assert!(MotionSensitivity::Minimal.allows(BehaviorType::Wave));
    }
}
