//! Cultural profiles and the profile database

use crate::error::{Result, SyncError};
use crate::types::{Appropriateness, BehaviorType, ConversationStage, Formality, SpeechContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Context a cultural rule is evaluated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdaptationContext {
    #[serde(default)]
    pub formality: Formality,
    #[serde(default)]
    pub stage: ConversationStage,
}

impl From<&SpeechContext> for AdaptationContext {
    fn from(context: &SpeechContext) -> Self {
        Self {
            formality: context.formality,
            stage: context.conversation_stage,
        }
    }
}

/// Appropriateness of a behavior, optionally limited to a formality and/or stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppropriatenessRule {
    pub behavior: BehaviorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formality: Option<Formality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<ConversationStage>,
    pub rating: Appropriateness,
}

impl AppropriatenessRule {
    fn matches(&self, behavior: BehaviorType, context: &AdaptationContext) -> bool {
        self.behavior == behavior
            && self.formality.map_or(true, |f| f == context.formality)
            && self.stage.map_or(true, |s| s == context.stage)
    }

    /// Number of context conditions the rule carries
    fn specificity(&self) -> usize {
        usize::from(self.formality.is_some()) + usize::from(self.stage.is_some())
    }
}

/// Region-specific rendering of a behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CulturalVariant {
    pub name: String,
    pub behavior: BehaviorType,
    /// Intensity the variant is designed for
    pub intensity: f64,
    /// Duration multiplier
    #[serde(default = "default_scale")]
    pub duration_scale: f64,
    /// Appropriateness score (0-1)
    pub appropriateness: f64,
    /// Formalities in which the variant is discouraged
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restricted_formalities: Vec<Formality>,
    /// Conversation stages in which the variant is discouraged
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restricted_stages: Vec<ConversationStage>,
    /// Morph/skeletal parameters applied to the event
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, f64>,
}

impl CulturalVariant {
    pub fn is_restricted_in(&self, context: &AdaptationContext) -> bool {
        self.restricted_formalities.contains(&context.formality)
            || self.restricted_stages.contains(&context.stage)
    }
}

fn default_scale() -> f64 {
    1.0
}

/// Region-specific behavior policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CulturalProfile {
    pub region: String,
    pub display_name: String,
    #[serde(default)]
    pub restricted_types: Vec<BehaviorType>,
    #[serde(default = "default_scale")]
    pub intensity_scale: f64,
    /// Fraction of events kept per channel (at most 1)
    #[serde(default = "default_scale")]
    pub frequency_scale: f64,
    /// Speaking-rate multiplier
    #[serde(default = "default_scale")]
    pub speech_tempo: f64,
    /// Ordered substitutes per type
    #[serde(default)]
    pub substitutes: BTreeMap<BehaviorType, Vec<BehaviorType>>,
    #[serde(default)]
    pub rules: Vec<AppropriatenessRule>,
    #[serde(default)]
    pub variants: Vec<CulturalVariant>,
}

impl CulturalProfile {
    /// Create a neutral profile that allows everything
    pub fn new(region: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            display_name: display_name.into(),
            restricted_types: Vec::new(),
            intensity_scale: 1.0,
            frequency_scale: 1.0,
            speech_tempo: 1.0,
            substitutes: BTreeMap::new(),
            rules: Vec::new(),
            variants: Vec::new(),
        }
    }

    pub fn with_scales(mut self, intensity: f64, frequency: f64, tempo: f64) -> Self {
        self.intensity_scale = intensity;
        self.frequency_scale = frequency;
        self.speech_tempo = tempo;
        self
    }

    pub fn with_restricted(mut self, behavior: BehaviorType) -> Self {
        self.restricted_types.push(behavior);
        self
    }

    pub fn with_substitutes(mut self, behavior: BehaviorType, substitutes: Vec<BehaviorType>) -> Self {
        self.substitutes.insert(behavior, substitutes);
        self
    }

    pub fn with_rule(
        mut self,
        behavior: BehaviorType,
        formality: Option<Formality>,
        stage: Option<ConversationStage>,
        rating: Appropriateness,
    ) -> Self {
        self.rules.push(AppropriatenessRule {
            behavior,
            formality,
            stage,
            rating,
        });
        self
    }

    pub fn with_variant(mut self, variant: CulturalVariant) -> Self {
        self.variants.push(variant);
        self
    }

    pub fn is_restricted(&self, behavior: BehaviorType) -> bool {
        self.restricted_types.contains(&behavior)
    }

    /// Appropriateness from the most specific matching rule (first wins ties).
    /// Behaviors without a rule are appropriate.
    pub fn appropriateness(
        &self,
        behavior: BehaviorType,
        context: &AdaptationContext,
    ) -> Appropriateness {
        let mut best: Option<&AppropriatenessRule> = None;
        for rule in self.rules.iter().filter(|r| r.matches(behavior, context)) {
            if best.map_or(true, |b| rule.specificity() > b.specificity()) {
                best = Some(rule);
            }
        }
        best.map_or(Appropriateness::Appropriate, |rule| rule.rating)
    }

    /// Whether a behavior may be rendered as-is in a context
    pub fn is_allowed(&self, behavior: BehaviorType, context: &AdaptationContext) -> bool {
        !self.is_restricted(behavior) && !self.appropriateness(behavior, context).is_disallowed()
    }

    /// First declared substitute on the same channel that is itself allowed
    pub fn substitute_for(
        &self,
        behavior: BehaviorType,
        context: &AdaptationContext,
    ) -> Option<BehaviorType> {
        self.substitutes.get(&behavior).and_then(|candidates| {
            candidates
                .iter()
                .copied()
                .find(|s| s.channel() == behavior.channel() && self.is_allowed(*s, context))
        })
    }

    pub fn variants_for(&self, behavior: BehaviorType) -> impl Iterator<Item = &CulturalVariant> {
        self.variants.iter().filter(move |v| v.behavior == behavior)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SyncError::InvalidConfig(msg));
        if !(self.intensity_scale > 0.0 && self.intensity_scale <= 2.0) {
            return invalid(format!("{}: intensity_scale must be in (0, 2]", self.region));
        }
        if !(self.frequency_scale > 0.0 && self.frequency_scale <= 1.0) {
            return invalid(format!("{}: frequency_scale must be in (0, 1]", self.region));
        }
        if !(self.speech_tempo > 0.0) {
            return invalid(format!("{}: speech_tempo must be positive", self.region));
        }
        for variant in &self.variants {
            if !(0.0..=1.0).contains(&variant.intensity)
                || !(0.0..=1.0).contains(&variant.appropriateness)
                || variant.duration_scale <= 0.0
            {
                return invalid(format!(
                    "{}: variant {} has out-of-range values",
                    self.region, variant.name
                ));
            }
        }
        Ok(())
    }
}

/// Database of cultural profiles keyed by region
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CulturalDatabase {
    profiles: BTreeMap<String, CulturalProfile>,
}

impl CulturalDatabase {
    /// Empty database (every region is unknown)
    pub fn new() -> Self {
        Self::default()
    }

    /// Database with the built-in regional profiles
    pub fn builtin() -> Self {
        let mut db = Self::new();
        for profile in builtin_profiles() {
            db.insert(profile);
        }
        db
    }

    pub fn insert(&mut self, profile: CulturalProfile) {
        self.profiles.insert(profile.region.clone(), profile);
    }

    pub fn get(&self, region: &str) -> Option<&CulturalProfile> {
        self.profiles.get(region)
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &CulturalProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Load profiles from JSON (a list of profiles)
    pub fn from_json(json: &str) -> Result<Self> {
        let profiles: Vec<CulturalProfile> = serde_json::from_str(json)?;
        let mut db = Self::new();
        for profile in profiles {
            profile.validate()?;
            db.insert(profile);
        }
        Ok(db)
    }

    /// Serialize profiles to JSON (a list of profiles)
    pub fn to_json(&self) -> Result<String> {
        let profiles: Vec<&CulturalProfile> = self.profiles.values().collect();
        Ok(serde_json::to_string_pretty(&profiles)?)
    }
}

fn variant(name: &str, behavior: BehaviorType, intensity: f64, duration_scale: f64) -> CulturalVariant {
    CulturalVariant {
        name: name.to_string(),
        behavior,
        intensity,
        duration_scale,
        appropriateness: 0.9,
        restricted_formalities: Vec::new(),
        restricted_stages: Vec::new(),
        parameters: BTreeMap::new(),
    }
}

fn builtin_profiles() -> Vec<CulturalProfile> {
    use Appropriateness::*;
    use BehaviorType::*;

    let western = CulturalProfile::new("western", "Western")
        .with_rule(Pointing, Some(Formality::Formal), None, Appropriateness::Neutral)
        .with_variant(variant("broad_smile", Smile, 0.8, 1.0))
        .with_variant(CulturalVariant {
            restricted_formalities: vec![Formality::Formal],
            ..variant("thumbs_up_casual", ThumbsUp, 0.8, 1.0)
        });

    let eastern = CulturalProfile::new("eastern", "East Asian")
        .with_scales(0.8, 0.85, 0.95)
        .with_restricted(Pointing)
        .with_substitutes(Pointing, vec![Descriptive, OpenPalm])
        .with_substitutes(Celebratory, vec![OpenPalm])
        .with_rule(Celebratory, Some(Formality::Formal), None, Inappropriate)
        .with_rule(Shake, None, Some(ConversationStage::Greeting), Inappropriate)
        .with_variant(CulturalVariant {
            parameters: BTreeMap::from([("pitch_deg".to_string(), 15.0)]),
            ..variant("bow_nod", Nod, 0.5, 1.3)
        })
        .with_variant(variant("reserved_smile", Smile, 0.5, 1.0));

    let middle_eastern = CulturalProfile::new("middle_eastern", "Middle Eastern")
        .with_scales(0.9, 0.9, 0.95)
        .with_substitutes(Pointing, vec![OpenPalm])
        .with_rule(ThumbsUp, None, None, Offensive)
        .with_rule(Pointing, None, None, Inappropriate)
        .with_variant(CulturalVariant {
            parameters: BTreeMap::from([("hand_on_heart".to_string(), 1.0)]),
            ..variant("hand_on_heart", OpenPalm, 0.5, 1.2)
        });

    let latin_american = CulturalProfile::new("latin_american", "Latin American")
        .with_scales(1.2, 1.0, 1.1)
        .with_variant(variant("expansive_descriptive", Descriptive, 0.9, 1.2))
        .with_variant(variant("warm_smile", Smile, 0.8, 1.1));

    let south_asian = CulturalProfile::new("south_asian", "South Asian")
        .with_scales(1.0, 0.95, 1.05)
        .with_substitutes(Pointing, vec![Descriptive])
        .with_rule(Pointing, Some(Formality::Formal), None, Inappropriate)
        .with_variant(CulturalVariant {
            parameters: BTreeMap::from([("roll_amplitude".to_string(), 0.4)]),
            ..variant("head_wobble", Tilt, 0.6, 1.0)
        });

    let northern_european = CulturalProfile::new("northern_european", "Northern European")
        .with_scales(0.7, 0.7, 0.9)
        .with_rule(Celebratory, Some(Formality::Formal), None, Inappropriate)
        .with_rule(Wave, Some(Formality::Formal), None, Appropriateness::Neutral)
        .with_variant(variant("subtle_smile", Smile, 0.4, 0.9));

    vec![
        western,
        eastern,
        middle_eastern,
        latin_american,
        south_asian,
        northern_european,
    ]
}
