//! Behavior requests
//!
//! The input contract from the content-analysis side: candidate behaviors per
//! channel with approximate timing, plus the speech they accompany.

use crate::error::{Result, SyncError};
use crate::types::{BehaviorType, Channel, MovementContext, SpeechContext};
use serde::{Deserialize, Serialize};

/// A candidate behavior with approximate timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateBehavior {
    #[serde(rename = "type")]
    pub behavior: BehaviorType,
    pub start_time: f64,
    pub end_time: f64,
    /// Requested intensity; the type's base intensity is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
}

impl CandidateBehavior {
    pub fn new(behavior: BehaviorType, start_time: f64, end_time: f64) -> Self {
        Self {
            behavior,
            start_time,
            end_time,
            intensity: None,
        }
    }

    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.intensity = Some(intensity);
        self
    }

    /// Check timing and intensity; `channel` is the list the candidate came from
    fn validate(&self, index: usize, channel: Channel) -> Result<()> {
        let invalid = |reason: String| {
            Err(SyncError::InvalidBehaviorEvent {
                index,
                channel,
                reason,
            })
        };

        if self.behavior.channel() != channel {
            return invalid(format!(
                "{} belongs to {}, not {}",
                self.behavior,
                self.behavior.channel(),
                channel
            ));
        }
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return invalid("times must be finite".to_string());
        }
        if self.start_time < 0.0 {
            return invalid(format!("start_time {} is negative", self.start_time));
        }
        if self.end_time <= self.start_time {
            return invalid(format!(
                "end_time {} must be after start_time {}",
                self.end_time, self.start_time
            ));
        }
        if let Some(intensity) = self.intensity {
            if !(0.0..=1.0).contains(&intensity) {
                return invalid(format!("intensity {intensity} is outside [0, 1]"));
            }
        }
        Ok(())
    }
}

/// Request for a synchronized plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorRequest {
    /// Utterance text
    #[serde(default)]
    pub text: String,
    /// Estimated speech duration (ms)
    pub speech_duration_ms: f64,
    #[serde(default)]
    pub speech_context: SpeechContext,
    #[serde(default)]
    pub movement_context: MovementContext,
    /// Region that must exist in the cultural database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cultural_profile: Option<String>,
    /// Plan start relative to the coordinator clock (ms)
    #[serde(default)]
    pub start_offset_ms: f64,
    #[serde(default)]
    pub hand_gestures: Vec<CandidateBehavior>,
    #[serde(default)]
    pub facial_expressions: Vec<CandidateBehavior>,
    #[serde(default)]
    pub head_movements: Vec<CandidateBehavior>,
}

impl BehaviorRequest {
    pub fn new(text: impl Into<String>, speech_duration_ms: f64) -> Self {
        Self {
            text: text.into(),
            speech_duration_ms,
            ..Default::default()
        }
    }

    /// Add a candidate to the list of its channel
    pub fn with_candidate(mut self, candidate: CandidateBehavior) -> Self {
        match candidate.behavior.channel() {
            Channel::HandGesture => self.hand_gestures.push(candidate),
            Channel::FacialExpression => self.facial_expressions.push(candidate),
            Channel::HeadMovement => self.head_movements.push(candidate),
        }
        self
    }

    pub fn with_cultural_profile(mut self, region: impl Into<String>) -> Self {
        self.cultural_profile = Some(region.into());
        self
    }

    pub fn with_speech_context(mut self, context: SpeechContext) -> Self {
        self.speech_context = context;
        self
    }

    pub fn with_movement_context(mut self, context: MovementContext) -> Self {
        self.movement_context = context;
        self
    }

    /// Candidates in channel order, tagged with the list they came from
    pub fn candidates(&self) -> impl Iterator<Item = (Channel, &CandidateBehavior)> {
        self.hand_gestures
            .iter()
            .map(|c| (Channel::HandGesture, c))
            .chain(
                self.facial_expressions
                    .iter()
                    .map(|c| (Channel::FacialExpression, c)),
            )
            .chain(self.head_movements.iter().map(|c| (Channel::HeadMovement, c)))
    }

    pub fn candidate_count(&self) -> usize {
        self.hand_gestures.len() + self.facial_expressions.len() + self.head_movements.len()
    }

    /// Validate the request before any pipeline stage runs
    pub fn validate(&self) -> Result<()> {
        if !self.speech_duration_ms.is_finite() || self.speech_duration_ms < 0.0 {
            return Err(SyncError::InvalidRequest(format!(
                "speech_duration_ms {} must be a non-negative number",
                self.speech_duration_ms
            )));
        }
        if !self.start_offset_ms.is_finite() || self.start_offset_ms < 0.0 {
            return Err(SyncError::InvalidRequest(format!(
                "start_offset_ms {} must be a non-negative number",
                self.start_offset_ms
            )));
        }
        for (channel, list) in [
            (Channel::HandGesture, &self.hand_gestures),
            (Channel::FacialExpression, &self.facial_expressions),
            (Channel::HeadMovement, &self.head_movements),
        ] {
            for (index, candidate) in list.iter().enumerate() {
                candidate.validate(index, channel)?;
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Updated content analysis for a live plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdaptationUpdate {
    /// Replacement speech context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_context: Option<SpeechContext>,
    /// Replacement movement context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement_context: Option<MovementContext>,
    /// Remaining text with its duration, measured from now
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_duration_ms: Option<f64>,
    /// Behavior types to remove from the remaining portion
    #[serde(default)]
    pub remove: Vec<BehaviorType>,
    /// New candidates, timed relative to now
    #[serde(default)]
    pub add: Vec<CandidateBehavior>,
}

impl AdaptationUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(duration) = self.remaining_duration_ms {
            if !duration.is_finite() || duration < 0.0 {
                return Err(SyncError::InvalidRequest(format!(
                    "remaining_duration_ms {duration} must be a non-negative number"
                )));
            }
        }
        for (index, candidate) in self.add.iter().enumerate() {
            candidate.validate(index, candidate.behavior.channel())?;
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
