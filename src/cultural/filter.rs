//! Cultural adaptation
//!
//! Applies a profile to an event set in four steps: filter/substitute, variant
//! selection, scaling, scoring.

use crate::config::BehaviorTables;
use crate::cultural::profile::{AdaptationContext, CulturalProfile, CulturalVariant};
use crate::types::{
    Appropriateness, BehaviorEvent, Channel, CulturalWarning, FilterReason, FilteredBehavior,
    Substitution,
};
use tracing::debug;

/// Penalty per hard violation
const HARD_VIOLATION_PENALTY: f64 = 0.2;

/// Penalty per soft warning
const SOFT_WARNING_PENALTY: f64 = 0.1;

/// Variant score discount when the variant is discouraged in the context
const RESTRICTED_VARIANT_FACTOR: f64 = 0.5;

/// Weight of the intensity match bonus in variant scoring
const INTENSITY_MATCH_WEIGHT: f64 = 0.2;

/// Result of adapting an event set to a profile
#[derive(Debug, Clone, Default)]
pub struct CulturalOutcome {
    pub events: Vec<BehaviorEvent>,
    pub substitutions: Vec<Substitution>,
    pub filtered: Vec<FilteredBehavior>,
    pub warnings: Vec<CulturalWarning>,
    /// Appropriateness score, `None` when no profile applied
    pub score: Option<f64>,
    pub region: Option<String>,
}

/// Cultural adaptation filter
#[derive(Debug, Clone, Default)]
pub struct CulturalAdapter {
    tables: BehaviorTables,
}

impl CulturalAdapter {
    pub fn new(tables: BehaviorTables) -> Self {
        Self { tables }
    }

    /// Adapt events to a profile. Without a profile events pass through.
    pub fn adapt(
        &self,
        events: Vec<BehaviorEvent>,
        profile: Option<&CulturalProfile>,
        context: &AdaptationContext,
    ) -> CulturalOutcome {
        let Some(profile) = profile else {
            return CulturalOutcome {
                events,
                ..Default::default()
            };
        };

        let original = events.len();
        let mut outcome = CulturalOutcome {
            region: Some(profile.region.clone()),
            ..Default::default()
        };

        // Step 1: restriction filter and substitution
        let mut kept = Vec::with_capacity(events.len());
        for event in events {
            if profile.is_allowed(event.behavior, context) {
                kept.push(event);
                continue;
            }

            let rating = profile.appropriateness(event.behavior, context);
            let reason = if profile.is_restricted(event.behavior) {
                FilterReason::Restricted
            } else if rating == Appropriateness::Offensive {
                FilterReason::Offensive
            } else {
                FilterReason::Inappropriate
            };

            match profile.substitute_for(event.behavior, context) {
                Some(substitute) => {
                    outcome.substitutions.push(Substitution {
                        event: event.id,
                        original: event.behavior,
                        substitute,
                    });
                    let window = self.tables.timing(substitute);
                    let start = event.start_time;
                    let duration = window.clamp_duration(event.duration());
                    let tag = format!("{}:{}", profile.region, event.behavior);
                    kept.push(
                        event
                            .with_behavior(substitute)
                            .with_timing(start, start + duration)
                            .with_cultural_variant(tag),
                    );
                }
                None => {
                    let message = format!("{} dropped for {}", event.behavior, profile.region);
                    match reason {
                        FilterReason::Offensive => outcome.warnings.push(CulturalWarning::Violation {
                            behavior: event.behavior,
                            message,
                        }),
                        FilterReason::Inappropriate => outcome.warnings.push(CulturalWarning::Soft {
                            behavior: event.behavior,
                            message,
                        }),
                        _ => {}
                    }
                    outcome.filtered.push(FilteredBehavior {
                        event: event.id,
                        behavior: event.behavior,
                        reason,
                    });
                }
            }
        }

        // Step 2: variant selection
        let mut varied = Vec::with_capacity(kept.len());
        for event in kept {
            match best_variant(profile, &event, context) {
                Some(variant) => {
                    if variant.is_restricted_in(context) {
                        outcome.warnings.push(CulturalWarning::Soft {
                            behavior: event.behavior,
                            message: format!("variant {} is discouraged in this context", variant.name),
                        });
                    }
                    varied.push(self.apply_variant(event, variant));
                }
                None => varied.push(event),
            }
        }

        // Step 3: scaling
        let scaled: Vec<BehaviorEvent> = varied
            .into_iter()
            .map(|e| {
                let intensity = e.intensity * profile.intensity_scale;
                e.with_intensity(intensity)
            })
            .collect();
        outcome.events = thin(scaled, profile.frequency_scale, &mut outcome.filtered);

        // Step 4: scoring
        outcome.score = Some(score(original, outcome.events.len(), &outcome.warnings));

        debug!(
            region = %profile.region,
            kept = outcome.events.len(),
            substituted = outcome.substitutions.len(),
            filtered = outcome.filtered.len(),
            score = outcome.score,
            "Applied cultural profile"
        );

        outcome
    }

    fn apply_variant(&self, event: BehaviorEvent, variant: &CulturalVariant) -> BehaviorEvent {
        let window = self.tables.timing(event.behavior);
        let intensity = (event.intensity + variant.intensity) / 2.0;
        let start = event.start_time;
        let duration = window.clamp_duration(event.duration() * variant.duration_scale);

        let mut adapted = event
            .with_intensity(intensity)
            .with_timing(start, start + duration)
            .with_cultural_variant(variant.name.clone());
        for (name, value) in &variant.parameters {
            adapted = adapted.with_parameter(name.clone(), *value);
        }
        adapted
    }
}

/// Highest-scoring variant for an event (first wins ties)
///
/// Formula: `appropriateness * (0.5 if restricted in context) + 0.2 * (1 - |Δintensity|)`
fn best_variant<'a>(
    profile: &'a CulturalProfile,
    event: &BehaviorEvent,
    context: &AdaptationContext,
) -> Option<&'a CulturalVariant> {
    let mut best: Option<(&CulturalVariant, f64)> = None;
    for variant in profile.variants_for(event.behavior) {
        let restriction = if variant.is_restricted_in(context) {
            RESTRICTED_VARIANT_FACTOR
        } else {
            1.0
        };
        let score = variant.appropriateness * restriction
            + INTENSITY_MATCH_WEIGHT * (1.0 - (variant.intensity - event.intensity).abs());
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((variant, score));
        }
    }
    best.map(|(variant, _)| variant)
}

/// Keep `ceil(n * scale)` events per channel, dropping lowest priority first
fn thin(
    events: Vec<BehaviorEvent>,
    frequency_scale: f64,
    filtered: &mut Vec<FilteredBehavior>,
) -> Vec<BehaviorEvent> {
    if frequency_scale >= 1.0 {
        return events;
    }

    let mut dropped = Vec::new();
    for channel in Channel::ALL {
        let mut lane: Vec<&BehaviorEvent> = events.iter().filter(|e| e.channel == channel).collect();
        let keep = (lane.len() as f64 * frequency_scale).ceil() as usize;
        if keep >= lane.len() {
            continue;
        }
        // Lowest priority first, later events before earlier ones
        lane.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.start_time.total_cmp(&a.start_time))
                .then_with(|| b.id.cmp(&a.id))
        });
        let excess = lane.len() - keep;
        dropped.extend(lane.into_iter().take(excess).map(|e| e.id));
    }

    events
        .into_iter()
        .filter(|e| {
            if dropped.contains(&e.id) {
                filtered.push(FilteredBehavior {
                    event: e.id,
                    behavior: e.behavior,
                    reason: FilterReason::FrequencyThinning,
                });
                false
            } else {
                true
            }
        })
        .collect()
}

/// Appropriateness score
///
/// Formula: `kept / original - 0.2 * hard - 0.1 * soft`, clamped to [0, 1]
fn score(original: usize, kept: usize, warnings: &[CulturalWarning]) -> f64 {
    let retention = if original == 0 {
        1.0
    } else {
        kept as f64 / original as f64
    };
    let penalty: f64 = warnings
        .iter()
        .map(|w| match w {
            CulturalWarning::Violation { .. } => HARD_VIOLATION_PENALTY,
            CulturalWarning::Soft { .. } => SOFT_WARNING_PENALTY,
        })
        .sum();
    (retention - penalty).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cultural::profile::CulturalDatabase;
    use crate::types::{BehaviorType, EventId, Formality};

    fn event(id: u32, behavior: BehaviorType, start: f64, end: f64, intensity: f64) -> BehaviorEvent {
        BehaviorEvent::new(EventId(id), behavior, start, end, intensity)
    }

    #[test]
    fn test_no_profile_passes_through() {
        let adapter = CulturalAdapter::default();
        let events = vec![event(0, BehaviorType::Pointing, 0.0, 800.0, 0.8)];
        let outcome = adapter.adapt(events.clone(), None, &AdaptationContext::default());
        assert_eq!(outcome.events, events);
        assert!(outcome.score.is_none());
        assert!(outcome.region.is_none());
    }

    #[test]
    fn test_restricted_type_is_substituted() {
        let adapter = CulturalAdapter::default();
        let db = CulturalDatabase::builtin();
        let events = vec![event(0, BehaviorType::Pointing, 0.0, 800.0, 0.8)];
        let outcome = adapter.adapt(events, db.get("eastern"), &AdaptationContext::default());

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].behavior, BehaviorType::Descriptive);
        assert_eq!(outcome.events[0].cultural_variant.as_deref(), Some("eastern:pointing"));
        // 0.8 * eastern intensity scale 0.8
        assert!((outcome.events[0].intensity - 0.64).abs() < 1e-9);
        assert_eq!(outcome.substitutions.len(), 1);
        assert_eq!(outcome.score, Some(1.0));
    }

    #[test]
    fn test_offensive_without_substitute_is_hard_violation() {
        let adapter = CulturalAdapter::default();
        let db = CulturalDatabase::builtin();
        let events = vec![
            event(0, BehaviorType::ThumbsUp, 0.0, 800.0, 0.8),
            event(1, BehaviorType::Smile, 0.0, 1500.0, 0.5),
        ];
        let outcome = adapter.adapt(events, db.get("middle_eastern"), &AdaptationContext::default());
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.filtered[0].reason, FilterReason::Offensive);
        // 1/2 retention - 0.2
        assert!((outcome.score.unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_variant_selection_applies_parameters() {
        let adapter = CulturalAdapter::default();
        let db = CulturalDatabase::builtin();
        let events = vec![event(0, BehaviorType::Nod, 0.0, 500.0, 0.7)];
        let outcome = adapter.adapt(events, db.get("eastern"), &AdaptationContext::default());
        let nod = &outcome.events[0];
        assert_eq!(nod.cultural_variant.as_deref(), Some("bow_nod"));
        assert_eq!(nod.parameters.get("pitch_deg"), Some(&15.0));
        // Duration 500 * 1.3 = 650, intensity mean(0.7, 0.5) * 0.8
        assert!((nod.duration() - 650.0).abs() < 1e-9);
        assert!((nod.intensity - 0.48).abs() < 1e-9);
    }

    #[test]
    fn test_restricted_variant_is_soft_warning() {
        let adapter = CulturalAdapter::default();
        let db = CulturalDatabase::builtin();
        let formal = AdaptationContext {
            formality: Formality::Formal,
            ..Default::default()
        };
        let events = vec![event(0, BehaviorType::ThumbsUp, 0.0, 800.0, 0.8)];
        let outcome = adapter.adapt(events, db.get("western"), &formal);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
        assert!((outcome.score.unwrap() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_frequency_thinning_drops_lowest_priority() {
        let adapter = CulturalAdapter::default();
        let db = CulturalDatabase::builtin();
        let events = vec![
            event(0, BehaviorType::Emphatic, 0.0, 600.0, 0.8),
            event(1, BehaviorType::Beat, 1000.0, 1300.0, 0.3),
            event(2, BehaviorType::Counting, 2000.0, 3000.0, 0.5),
        ];
        // northern_european keeps ceil(3 * 0.7) = 3; use a stricter profile
        let profile = db
            .get("northern_european")
            .cloned()
            .unwrap()
            .with_scales(1.0, 0.5, 1.0);
        let outcome = adapter.adapt(events, Some(&profile), &AdaptationContext::default());
        assert_eq!(outcome.events.len(), 2);
        assert!(outcome.events.iter().all(|e| e.behavior != BehaviorType::Beat));
        assert_eq!(outcome.filtered[0].reason, FilterReason::FrequencyThinning);
        assert!((outcome.score.unwrap() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_clamped() {
        let warnings: Vec<CulturalWarning> = (0..10)
            .map(|_| CulturalWarning::Violation {
                behavior: BehaviorType::ThumbsUp,
                message: String::new(),
            })
            .collect();
        assert_eq!(score(1, 1, &warnings), 0.0);
        assert_eq!(score(0, 0, &[]), 1.0);
    }
}
