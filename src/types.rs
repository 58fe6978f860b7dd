//! Core data types
//!
//! This module defines the types that flow through the synchronization pipeline:
//! behavior events, speech timing markers, conflicts, and the synchronized plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Animation output stream a behavior is rendered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    HandGesture,
    FacialExpression,
    HeadMovement,
}

impl Channel {
    /// All channels in rendering order
    pub const ALL: [Channel; 3] = [
        Channel::HandGesture,
        Channel::FacialExpression,
        Channel::HeadMovement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::HandGesture => "hand_gesture",
            Channel::FacialExpression => "facial_expression",
            Channel::HeadMovement => "head_movement",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the attack-sustain-release envelope used when blending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveShape {
    /// Fast attack, short sustain (emphasis strokes)
    Sharp,
    /// Balanced envelope
    Standard,
    /// Slow attack and release (micro-movements, resting states)
    Gentle,
}

/// Closed behavior vocabulary. Every variant belongs to exactly one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorType {
    // Hand gestures
    Pointing,
    Descriptive,
    Emphatic,
    Beat,
    OpenPalm,
    Celebratory,
    Questioning,
    Counting,
    Wave,
    ThumbsUp,
    Rest,

    // Facial expressions
    Smile,
    Concern,
    Surprise,
    Focus,
    Neutral,
    Frown,
    EyebrowRaise,
    Thinking,

    // Head movements
    Nod,
    Shake,
    Tilt,
    Turn,
    MicroMovement,
}

impl BehaviorType {
    /// Every behavior type, grouped by channel
    pub const ALL: [BehaviorType; 24] = [
        BehaviorType::Pointing,
        BehaviorType::Descriptive,
        BehaviorType::Emphatic,
        BehaviorType::Beat,
        BehaviorType::OpenPalm,
        BehaviorType::Celebratory,
        BehaviorType::Questioning,
        BehaviorType::Counting,
        BehaviorType::Wave,
        BehaviorType::ThumbsUp,
        BehaviorType::Rest,
        BehaviorType::Smile,
        BehaviorType::Concern,
        BehaviorType::Surprise,
        BehaviorType::Focus,
        BehaviorType::Neutral,
        BehaviorType::Frown,
        BehaviorType::EyebrowRaise,
        BehaviorType::Thinking,
        BehaviorType::Nod,
        BehaviorType::Shake,
        BehaviorType::Tilt,
        BehaviorType::Turn,
        BehaviorType::MicroMovement,
    ];

    /// Channel this behavior is rendered on
    pub fn channel(&self) -> Channel {
        use BehaviorType::*;
        match self {
            Pointing | Descriptive | Emphatic | Beat | OpenPalm | Celebratory | Questioning
            | Counting | Wave | ThumbsUp | Rest => Channel::HandGesture,
            Smile | Concern | Surprise | Focus | Neutral | Frown | EyebrowRaise | Thinking => {
                Channel::FacialExpression
            }
            Nod | Shake | Tilt | Turn | MicroMovement => Channel::HeadMovement,
        }
    }

    /// Base priority ordinal (higher wins ties during resolution)
    pub fn base_priority(&self) -> u32 {
        use BehaviorType::*;
        match self {
            Emphatic | Pointing => 8,
            Celebratory | Questioning | Concern | Surprise | Shake => 7,
            Nod | Counting | Wave | ThumbsUp => 6,
            Descriptive | Smile | Frown | EyebrowRaise => 5,
            Beat | OpenPalm | Focus | Thinking | Tilt | Turn => 4,
            Rest | Neutral | MicroMovement => 2,
        }
    }

    /// Envelope shape used for blending curves
    pub fn curve_shape(&self) -> CurveShape {
        use BehaviorType::*;
        match self {
            Emphatic | Beat | Pointing | Nod | Shake | EyebrowRaise | Surprise | Celebratory => {
                CurveShape::Sharp
            }
            MicroMovement | Rest | Neutral | Thinking | Focus => CurveShape::Gentle,
            Descriptive | OpenPalm | Questioning | Counting | Wave | ThumbsUp | Smile
            | Concern | Frown | Tilt | Turn => CurveShape::Standard,
        }
    }

    /// Whether this behavior marks emphasis and should land on stress peaks
    pub fn is_emphasis(&self) -> bool {
        use BehaviorType::*;
        matches!(
            self,
            Emphatic | Beat | Pointing | EyebrowRaise | Nod | Celebratory | Surprise
        )
    }

    /// Whether this behavior naturally closes a phrase
    pub fn closes_phrase(&self) -> bool {
        use BehaviorType::*;
        matches!(self, Nod | Tilt | OpenPalm | Rest | Neutral)
    }

    /// Fraction of the behavior's duration at which its stroke (peak) occurs
    pub fn stroke_fraction(&self) -> f64 {
        match self.curve_shape() {
            CurveShape::Sharp => 0.25,
            CurveShape::Standard => 0.4,
            CurveShape::Gentle => 0.5,
        }
    }

    /// Neutral equivalent used when merging contradictory behaviors.
    ///
    /// Returns `None` for types that are already neutral. Equivalents never appear
    /// in the contradiction table.
    pub fn neutral_equivalent(&self) -> Option<BehaviorType> {
        use BehaviorType::*;
        match self {
            Smile | Frown => Some(Neutral),
            Concern | Surprise | Thinking => Some(Focus),
            Celebratory => Some(Descriptive),
            Questioning | ThumbsUp => Some(OpenPalm),
            Nod | Shake => Some(Tilt),
            Pointing | Descriptive | Emphatic | Beat | OpenPalm | Counting | Wave | Rest
            | Focus | Neutral | EyebrowRaise | Tilt | Turn | MicroMovement => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        use BehaviorType::*;
        match self {
            Pointing => "pointing",
            Descriptive => "descriptive",
            Emphatic => "emphatic",
            Beat => "beat",
            OpenPalm => "open_palm",
            Celebratory => "celebratory",
            Questioning => "questioning",
            Counting => "counting",
            Wave => "wave",
            ThumbsUp => "thumbs_up",
            Rest => "rest",
            Smile => "smile",
            Concern => "concern",
            Surprise => "surprise",
            Focus => "focus",
            Neutral => "neutral",
            Frown => "frown",
            EyebrowRaise => "eyebrow_raise",
            Thinking => "thinking",
            Nod => "nod",
            Shake => "shake",
            Tilt => "tilt",
            Turn => "turn",
            MicroMovement => "micro_movement",
        }
    }
}

impl fmt::Display for BehaviorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of an event within a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u32);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

/// Identifier of a synchronized plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub Uuid);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PlanId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Derive the resolution priority of an event from its type and intensity
pub fn derive_priority(behavior: BehaviorType, intensity: f64) -> u32 {
    behavior.base_priority() * 100 + (intensity.clamp(0.0, 1.0) * 100.0).round() as u32
}

/// A single timed, typed, intensity-scaled instruction on one channel.
///
/// Times are milliseconds from the start of the containing utterance. Events are
/// treated as values: the builder methods return updated copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorEvent {
    /// Identifier, unique within a plan
    pub id: EventId,
    /// Output channel (always `behavior.channel()`)
    pub channel: Channel,
    /// Behavior type
    #[serde(rename = "type")]
    pub behavior: BehaviorType,
    /// Intensity (0-1)
    pub intensity: f64,
    /// Start offset in milliseconds
    pub start_time: f64,
    /// End offset in milliseconds (> start_time)
    pub end_time: f64,
    /// Derived tie-break ordinal
    pub priority: u32,
    /// Cultural substitution or variant that produced this event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cultural_variant: Option<String>,
    /// Contribution to the rendered intensity when blended (0-1)
    #[serde(default = "default_blend_weight")]
    pub blend_weight: f64,
    /// Rendering parameters (morph targets, skeletal offsets) attached by variants
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, f64>,
}

fn default_blend_weight() -> f64 {
    1.0
}

impl BehaviorEvent {
    /// Create an event; channel and priority are derived from the type
    pub fn new(
        id: EventId,
        behavior: BehaviorType,
        start_time: f64,
        end_time: f64,
        intensity: f64,
    ) -> Self {
        let intensity = intensity.clamp(0.0, 1.0);
        Self {
            id,
            channel: behavior.channel(),
            behavior,
            intensity,
            start_time,
            end_time,
            priority: derive_priority(behavior, intensity),
            cultural_variant: None,
            blend_weight: 1.0,
            parameters: BTreeMap::new(),
        }
    }

    /// Duration in milliseconds
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Whether the event is active at `t` (half-open interval)
    pub fn is_active_at(&self, t: f64) -> bool {
        self.start_time <= t && t < self.end_time
    }

    /// Overlap in milliseconds with another event
    pub fn overlap_with(&self, other: &BehaviorEvent) -> f64 {
        overlap(self.start_time, self.end_time, other.start_time, other.end_time)
    }

    /// Replace the behavior type, re-deriving channel and priority. A cultural
    /// tag and variant parameters describe the previous type and are dropped.
    pub fn with_behavior(mut self, behavior: BehaviorType) -> Self {
        if behavior != self.behavior {
            self.cultural_variant = None;
            self.parameters.clear();
        }
        self.behavior = behavior;
        self.channel = behavior.channel();
        self.priority = derive_priority(behavior, self.intensity);
        self
    }

    /// Replace the intensity (clamped). Priority is kept so that the resolution
    /// order stays stable while intensities are being scaled.
    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.intensity = intensity.clamp(0.0, 1.0);
        self
    }

    /// Scale the intensity by a factor (clamped)
    pub fn scaled(self, factor: f64) -> Self {
        let intensity = self.intensity * factor;
        self.with_intensity(intensity)
    }

    /// Replace intensity and re-derive priority from it
    pub fn with_base_intensity(mut self, intensity: f64) -> Self {
        self.intensity = intensity.clamp(0.0, 1.0);
        self.priority = derive_priority(self.behavior, self.intensity);
        self
    }

    /// Replace start and end times
    pub fn with_timing(mut self, start_time: f64, end_time: f64) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    /// Move the event by `delta_ms` keeping its duration
    pub fn shifted(self, delta_ms: f64) -> Self {
        let (start, end) = (self.start_time + delta_ms, self.end_time + delta_ms);
        self.with_timing(start, end)
    }

    /// Record the cultural substitution or variant that produced this event
    pub fn with_cultural_variant(mut self, tag: impl Into<String>) -> Self {
        self.cultural_variant = Some(tag.into());
        self
    }

    pub fn with_blend_weight(mut self, weight: f64) -> Self {
        self.blend_weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}

/// Overlap of two half-open intervals in milliseconds
pub fn overlap(start1: f64, end1: f64, start2: f64, end2: f64) -> f64 {
    (end1.min(end2) - start1.max(start2)).max(0.0)
}

/// Kind of speech timing marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerType {
    WordBoundary,
    SyllableStress,
    PhraseBoundary,
    EmphasisPeak,
    Pause,
}

impl MarkerType {
    /// Behavior types a marker of this kind is relevant to
    pub fn relevant_behaviors(&self) -> Vec<BehaviorType> {
        use BehaviorType::*;
        match self {
            MarkerType::WordBoundary => vec![Beat, Descriptive, Counting, Nod, Smile, Turn],
            MarkerType::SyllableStress => vec![Beat, Emphatic, EyebrowRaise, Nod],
            MarkerType::PhraseBoundary => {
                vec![Nod, Tilt, OpenPalm, Rest, Neutral, Questioning, Wave]
            }
            MarkerType::EmphasisPeak => vec![
                Emphatic,
                Pointing,
                EyebrowRaise,
                Nod,
                Celebratory,
                ThumbsUp,
                Surprise,
                Shake,
                Concern,
                Frown,
            ],
            MarkerType::Pause => vec![Thinking, Tilt, Rest, Neutral, Focus, MicroMovement],
        }
    }
}

/// A timing anchor derived from speech. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechTimingMarker {
    pub marker_type: MarkerType,
    pub start_time: f64,
    pub end_time: f64,
    /// Prosodic strength (0-1)
    pub intensity: f64,
    /// Behavior types this marker is a natural anchor for
    pub relevant_behaviors: Vec<BehaviorType>,
    /// Word the marker was derived from, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
}

impl SpeechTimingMarker {
    pub fn midpoint(&self) -> f64 {
        (self.start_time + self.end_time) / 2.0
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    pub fn is_relevant_to(&self, behavior: BehaviorType) -> bool {
        self.relevant_behaviors.contains(&behavior)
    }
}

/// How an event is anchored to its marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentType {
    Onset,
    Peak,
    Offset,
    Continuous,
}

/// Emphasis level of the surrounding content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmphasisLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// Content context used when sizing movements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MovementContext {
    #[serde(default)]
    pub is_question: bool,
    #[serde(default)]
    pub is_explanation: bool,
    #[serde(default)]
    pub emphasis: EmphasisLevel,
}

/// Formality of the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formality {
    Casual,
    #[default]
    Neutral,
    Formal,
}

/// Position of the utterance within the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    Greeting,
    #[default]
    Main,
    Closing,
}

/// Speech context supplied by the content-analysis collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechContext {
    #[serde(default = "default_language")]
    pub language: String,
    /// Soft cultural hint; unknown regions pass through unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cultural_background: Option<String>,
    #[serde(default)]
    pub formality: Formality,
    #[serde(default)]
    pub conversation_stage: ConversationStage,
}

impl Default for SpeechContext {
    fn default() -> Self {
        Self {
            language: default_language(),
            cultural_background: None,
            formality: Formality::default(),
            conversation_stage: ConversationStage::default(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

/// Conflict classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictClass {
    Temporal,
    Spatial,
    Semantic,
    Intensity,
}

impl ConflictClass {
    /// Tie-break order when severities are equal (lower first)
    pub fn resolution_order(&self) -> u8 {
        match self {
            ConflictClass::Semantic => 0,
            ConflictClass::Intensity => 1,
            ConflictClass::Temporal => 2,
            ConflictClass::Spatial => 3,
        }
    }
}

/// Conflict severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Conflict resolution strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    PriorityOverride,
    TemporalSequence,
    IntensityBlend,
    SpatialSeparation,
    SemanticMerge,
}

/// A detected clash between events. Computed fresh on every pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub class: ConflictClass,
    pub events: Vec<EventId>,
    pub severity: Severity,
    /// Overlap (ms), interference score, or intensity sum depending on class
    pub magnitude: f64,
    /// Sample time of an intensity overload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionStrategy>,
}

/// Kind of timing change applied during synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Start moved (signed: negative means advanced)
    Delay,
    /// Duration grew
    Extend,
    /// Duration shrank
    Compress,
}

/// Timing change recorded for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingAdjustment {
    pub event: EventId,
    pub kind: AdjustmentKind,
    pub amount_ms: f64,
}

/// Result of aligning one event to speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub event: EventId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_type: Option<MarkerType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment_type: Option<AlignmentType>,
    pub gesture_start_time: f64,
    pub gesture_end_time: f64,
    pub confidence: f64,
}

/// One keyframe of a blending curve (time relative to the event start)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time_ms: f64,
    pub weight: f64,
}

/// Blending description for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendingInfo {
    pub event: EventId,
    pub channel: Channel,
    pub blend_in_ms: f64,
    pub blend_out_ms: f64,
    pub curve: Vec<Keyframe>,
    /// Contributor weights in the event's overlap cluster (sum to 1)
    pub weights: Vec<(EventId, f64)>,
}

/// Appropriateness rating of a behavior in a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Appropriateness {
    Appropriate,
    Neutral,
    Inappropriate,
    Offensive,
}

impl Appropriateness {
    pub fn is_disallowed(&self) -> bool {
        matches!(self, Appropriateness::Inappropriate | Appropriateness::Offensive)
    }
}

/// Behavior replaced by a cultural substitute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substitution {
    pub event: EventId,
    pub original: BehaviorType,
    pub substitute: BehaviorType,
}

/// Why a behavior was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterReason {
    Restricted,
    Inappropriate,
    Offensive,
    FrequencyThinning,
    MotionSensitivity,
}

/// Behavior removed from the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredBehavior {
    pub event: EventId,
    pub behavior: BehaviorType,
    pub reason: FilterReason,
}

/// Residual cultural warning used in scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum CulturalWarning {
    /// Hard violation (-0.2)
    Violation { behavior: BehaviorType, message: String },
    /// Soft warning (-0.1)
    Soft { behavior: BehaviorType, message: String },
}

/// Why a plan differs from its request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanDiagnostics {
    #[serde(default)]
    pub timing_adjustments: Vec<TimingAdjustment>,
    #[serde(default)]
    pub alignments: Vec<Alignment>,
    #[serde(default)]
    pub resolved_conflicts: Vec<Conflict>,
    #[serde(default)]
    pub unresolved_conflicts: Vec<Conflict>,
    #[serde(default)]
    pub substitutions: Vec<Substitution>,
    #[serde(default)]
    pub filtered: Vec<FilteredBehavior>,
    #[serde(default)]
    pub cultural_warnings: Vec<CulturalWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cultural_score: Option<f64>,
}

/// Conflict-free, speech-aligned, culturally adapted behavior schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynchronizedBehaviorPlan {
    pub id: PlanId,
    /// Incremented on every real-time adaptation
    pub version: u32,
    /// Start on the coordinator timeline (ms)
    pub start_time: f64,
    /// End on the coordinator timeline (ms)
    pub end_time: f64,
    pub hand_gestures: Vec<BehaviorEvent>,
    pub facial_expressions: Vec<BehaviorEvent>,
    pub head_movements: Vec<BehaviorEvent>,
    /// Highest event priority in the plan
    pub priority: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_strategy: Option<ResolutionStrategy>,
    pub confidence: f64,
    /// Speech duration the plan was built for (ms)
    pub speech_duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cultural_region: Option<String>,
    pub speech_context: SpeechContext,
    pub movement_context: MovementContext,
    #[serde(default)]
    pub markers: Vec<SpeechTimingMarker>,
    #[serde(default)]
    pub blending: Vec<BlendingInfo>,
    #[serde(default)]
    pub diagnostics: PlanDiagnostics,
    pub created_at: DateTime<Utc>,
}

impl SynchronizedBehaviorPlan {
    /// Events on one channel
    pub fn channel(&self, channel: Channel) -> &[BehaviorEvent] {
        match channel {
            Channel::HandGesture => &self.hand_gestures,
            Channel::FacialExpression => &self.facial_expressions,
            Channel::HeadMovement => &self.head_movements,
        }
    }

    /// All events across channels, sorted by start time
    pub fn events(&self) -> Vec<BehaviorEvent> {
        let mut events: Vec<BehaviorEvent> = self
            .hand_gestures
            .iter()
            .chain(&self.facial_expressions)
            .chain(&self.head_movements)
            .cloned()
            .collect();
        sort_by_start(&mut events);
        events
    }

    /// Plan-relative offset of a coordinator timestamp
    pub fn elapsed_at(&self, now_ms: f64) -> f64 {
        now_ms - self.start_time
    }

    pub fn is_expired(&self, now_ms: f64) -> bool {
        self.end_time <= now_ms
    }

    pub fn event_count(&self) -> usize {
        self.hand_gestures.len() + self.facial_expressions.len() + self.head_movements.len()
    }

    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Sort events by start time, then id
pub fn sort_by_start(events: &mut [BehaviorEvent]) {
    events.sort_by(|a, b| {
        a.start_time
            .total_cmp(&b.start_time)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Split events into the three channel lists
pub fn split_by_channel(
    events: Vec<BehaviorEvent>,
) -> (Vec<BehaviorEvent>, Vec<BehaviorEvent>, Vec<BehaviorEvent>) {
    let mut hands = Vec::new();
    let mut faces = Vec::new();
    let mut heads = Vec::new();
    for event in events {
        match event.channel {
            Channel::HandGesture => hands.push(event),
            Channel::FacialExpression => faces.push(event),
            Channel::HeadMovement => heads.push(event),
        }
    }
    sort_by_start(&mut hands);
    sort_by_start(&mut faces);
    sort_by_start(&mut heads);
    (hands, faces, heads)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_a_channel_and_priority() {
        for behavior in BehaviorType::ALL {
            assert!(Channel::ALL.contains(&behavior.channel()));
            assert!(behavior.base_priority() > 0);
        }
    }

    #[test]
    fn test_neutral_equivalents_stay_on_channel() {
        for behavior in BehaviorType::ALL {
            if let Some(neutral) = behavior.neutral_equivalent() {
                assert_eq!(neutral.channel(), behavior.channel(), "{behavior}");
                assert!(neutral.neutral_equivalent().is_none());
            }
        }
    }

    #[test]
    fn test_overlap() {
        assert_eq!(overlap(0.0, 400.0, 300.0, 700.0), 100.0);
        assert_eq!(overlap(0.0, 100.0, 200.0, 300.0), 0.0);
        assert_eq!(overlap(0.0, 1000.0, 200.0, 300.0), 100.0);
    }

    #[test]
    fn test_builder_updates() {
        let event = BehaviorEvent::new(EventId(1), BehaviorType::Smile, 0.0, 500.0, 0.8);
        assert_eq!(event.channel, Channel::FacialExpression);
        assert_eq!(event.priority, 580);

        let merged = event.clone().with_behavior(BehaviorType::Neutral).scaled(0.5);
        assert_eq!(merged.behavior, BehaviorType::Neutral);
        assert_eq!(merged.priority, 280);
        assert!((merged.intensity - 0.4).abs() < 1e-9);

        let moved = event.shifted(250.0);
        assert_eq!(moved.start_time, 250.0);
        assert_eq!(moved.end_time, 750.0);
    }

    #[test]
    fn test_type_change_drops_cultural_tag() {
        let substituted = BehaviorEvent::new(EventId(1), BehaviorType::Celebratory, 0.0, 800.0, 0.8)
            .with_cultural_variant("western:wave")
            .with_parameter("amplitude", 1.2);

        let same = substituted.clone().with_behavior(BehaviorType::Celebratory);
        assert_eq!(same.cultural_variant.as_deref(), Some("western:wave"));
        assert_eq!(same.parameters.len(), 1);

        let merged = substituted.with_behavior(BehaviorType::Descriptive);
        assert_eq!(merged.cultural_variant, None);
        assert!(merged.parameters.is_empty());
    }

    #[test]
    fn test_behavior_type_serde_names() {
        let json = serde_json::to_string(&BehaviorType::EyebrowRaise).unwrap();
        assert_eq!(json, "\"eyebrow_raise\"");
        let parsed: BehaviorType = serde_json::from_str("\"open_palm\"").unwrap();
        assert_eq!(parsed, BehaviorType::OpenPalm);
        for behavior in BehaviorType::ALL {
            let json = serde_json::to_string(&behavior).unwrap();
            assert_eq!(json, format!("\"{}\"", behavior.as_str()));
        }
    }
}
