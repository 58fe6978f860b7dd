//! Blending and transitions
//!
//! Computes attack-sustain-release curves and cross-fade weights for events that
//! touch on a channel, and interpolates between two whole plans.

use crate::config::BlendingConfig;
use crate::types::{
    sort_by_start, BehaviorEvent, BehaviorType, BlendingInfo, Channel, CurveShape, EventId,
    Keyframe,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One interpolation step of a plan transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionStep {
    /// 1-based step index
    pub step: usize,
    /// Offset into the transition (ms)
    pub time_ms: f64,
    /// Eased weight of the target plan (0 to 1)
    pub weight: f64,
    pub events: Vec<BehaviorEvent>,
}

/// Blending/transition engine
#[derive(Debug, Clone, Default)]
pub struct BlendingEngine {
    config: BlendingConfig,
}

impl BlendingEngine {
    pub fn new(config: BlendingConfig) -> Self {
        Self { config }
    }

    /// Compute blending information for every event.
    ///
    /// Returns the events with their `blend_weight` set and one `BlendingInfo`
    /// per event, in the order of the input.
    pub fn blend(&self, events: &[BehaviorEvent]) -> (Vec<BehaviorEvent>, Vec<BlendingInfo>) {
        let mut weights: BTreeMap<EventId, Vec<(EventId, f64)>> = BTreeMap::new();
        let mut overlaps: BTreeMap<EventId, usize> = BTreeMap::new();

        for channel in Channel::ALL {
            let mut lane: Vec<&BehaviorEvent> =
                events.iter().filter(|e| e.channel == channel).collect();
            lane.sort_by(|a, b| {
                a.start_time
                    .total_cmp(&b.start_time)
                    .then_with(|| a.id.cmp(&b.id))
            });

            for cluster in self.clusters(&lane) {
                let cluster_weights = self.cluster_weights(&cluster);
                for event in &cluster {
                    let concurrent = cluster
                        .iter()
                        .filter(|other| other.id != event.id && event.overlap_with(other) > 0.0)
                        .count();
                    overlaps.insert(event.id, concurrent);
                    weights.insert(event.id, cluster_weights.clone());
                }
            }
        }

        let mut blended = Vec::with_capacity(events.len());
        let mut infos = Vec::with_capacity(events.len());

        for event in events {
            let concurrent = overlaps.get(&event.id).copied().unwrap_or(0);
            let contributors = weights
                .remove(&event.id)
                .unwrap_or_else(|| vec![(event.id, 1.0)]);
            let own_weight = contributors
                .iter()
                .find(|(id, _)| *id == event.id)
                .map_or(1.0, |(_, w)| *w);

            let blend_ms = self.blend_duration(event.duration(), concurrent);
            infos.push(BlendingInfo {
                event: event.id,
                channel: event.channel,
                blend_in_ms: blend_ms,
                blend_out_ms: blend_ms,
                curve: asr_curve(event.behavior, event.duration(), blend_ms, blend_ms),
                weights: contributors,
            });
            blended.push(event.clone().with_blend_weight(own_weight));
        }

        debug!(events = blended.len(), "Computed blending curves");
        (blended, infos)
    }

    /// Blend-in/out duration
    ///
    /// Formula: `duration * blend_fraction / (1 + concurrent_overlaps)`, clamped to
    /// `[min_blend, max_blend]` and to half the event duration
    pub fn blend_duration(&self, duration_ms: f64, concurrent_overlaps: usize) -> f64 {
        let raw = duration_ms * self.config.blend_fraction / (1.0 + concurrent_overlaps as f64);
        raw.clamp(self.config.min_blend_ms, self.config.max_blend_ms)
            .min(duration_ms / 2.0)
            .max(0.0)
    }

    /// Group a start-sorted lane into overlapping or near-adjacent clusters
    fn clusters<'a>(&self, lane: &[&'a BehaviorEvent]) -> Vec<Vec<&'a BehaviorEvent>> {
        let mut clusters: Vec<Vec<&'a BehaviorEvent>> = Vec::new();
        let mut cluster_end = f64::NEG_INFINITY;

        for &event in lane {
            match clusters.last_mut() {
                Some(current) if event.start_time - cluster_end < self.config.adjacency_ms => {
                    current.push(event);
                    cluster_end = cluster_end.max(event.end_time);
                }
                _ => {
                    clusters.push(vec![event]);
                    cluster_end = event.end_time;
                }
            }
        }
        clusters
    }

    /// Contributor weights of a cluster: the primary (highest priority) keeps
    /// `primary_min_weight`, the others share the rest by intensity
    fn cluster_weights(&self, cluster: &[&BehaviorEvent]) -> Vec<(EventId, f64)> {
        let Some(primary) = cluster.iter().copied().max_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.start_time.total_cmp(&a.start_time))
                .then_with(|| b.id.cmp(&a.id))
        }) else {
            return Vec::new();
        };
        if cluster.len() == 1 {
            return vec![(primary.id, 1.0)];
        }

        let rest = 1.0 - self.config.primary_min_weight;
        let others: Vec<&BehaviorEvent> = cluster
            .iter()
            .copied()
            .filter(|e| e.id != primary.id)
            .collect();
        let intensity_sum: f64 = others.iter().map(|e| e.intensity).sum();

        let mut weights = vec![(primary.id, self.config.primary_min_weight)];
        for other in &others {
            let share = if intensity_sum > 0.0 {
                other.intensity / intensity_sum
            } else {
                1.0 / others.len() as f64
            };
            weights.push((other.id, rest * share));
        }
        weights
    }

    /// Interpolate from one event set to another.
    ///
    /// Produces `ceil(duration / step)` steps. Per channel, events are matched by
    /// occurrence of their type; matched pairs interpolate timing and intensity,
    /// unmatched events fade out (from) or in (to).
    pub fn transition(
        &self,
        from: &[BehaviorEvent],
        to: &[BehaviorEvent],
        duration_ms: f64,
    ) -> Vec<TransitionStep> {
        if !duration_ms.is_finite() || duration_ms <= 0.0 {
            return Vec::new();
        }
        let steps = (duration_ms / self.config.transition_step_ms).ceil() as usize;
        let (pairs, fading_out, fading_in) = match_events(from, to);

        let mut result = Vec::with_capacity(steps);
        for k in 1..=steps {
            let weight = ease_in_out_cubic(k as f64 / steps as f64);
            let mut events = Vec::with_capacity(pairs.len() + fading_out.len() + fading_in.len());

            for (a, b) in &pairs {
                let start = lerp(a.start_time, b.start_time, weight);
                let duration = lerp(a.duration(), b.duration(), weight);
                events.push(
                    (*b).clone()
                        .with_timing(start, start + duration)
                        .with_intensity(lerp(a.intensity, b.intensity, weight)),
                );
            }
            for a in &fading_out {
                if weight < 1.0 {
                    events.push((*a).clone().with_intensity(a.intensity * (1.0 - weight)));
                }
            }
            for b in &fading_in {
                events.push((*b).clone().with_intensity(b.intensity * weight));
            }

            sort_by_start(&mut events);
            result.push(TransitionStep {
                step: k,
                time_ms: (k as f64 * self.config.transition_step_ms).min(duration_ms),
                weight,
                events,
            });
        }

        debug!(
            steps = result.len(),
            matched = pairs.len(),
            fading_out = fading_out.len(),
            fading_in = fading_in.len(),
            "Computed plan transition"
        );
        result
    }
}

type Matched<'a> = (
    Vec<(&'a BehaviorEvent, &'a BehaviorEvent)>,
    Vec<&'a BehaviorEvent>,
    Vec<&'a BehaviorEvent>,
);

/// Match the k-th occurrence of each type on each channel
fn match_events<'a>(from: &'a [BehaviorEvent], to: &'a [BehaviorEvent]) -> Matched<'a> {
    let occurrences = |events: &'a [BehaviorEvent]| {
        let mut sorted: Vec<&'a BehaviorEvent> = events.iter().collect();
        sorted.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        let mut by_type: BTreeMap<(Channel, BehaviorType), Vec<&'a BehaviorEvent>> =
            BTreeMap::new();
        for event in sorted {
            by_type
                .entry((event.channel, event.behavior))
                .or_default()
                .push(event);
        }
        by_type
    };

    let mut from_by_type = occurrences(from);
    let mut to_by_type = occurrences(to);

    let mut pairs = Vec::new();
    let mut fading_out = Vec::new();
    let mut fading_in = Vec::new();

    for (key, from_events) in from_by_type.iter_mut() {
        let to_events = to_by_type.remove(key).unwrap_or_default();
        let mut to_iter = to_events.into_iter();
        for a in from_events.drain(..) {
            match to_iter.next() {
                Some(b) => pairs.push((a, b)),
                None => fading_out.push(a),
            }
        }
        fading_in.extend(to_iter);
    }
    for (_, to_events) in to_by_type {
        fading_in.extend(to_events);
    }

    (pairs, fading_out, fading_in)
}

/// Attack-sustain-release keyframes, times relative to the event start
pub fn asr_curve(
    behavior: BehaviorType,
    duration_ms: f64,
    blend_in_ms: f64,
    blend_out_ms: f64,
) -> Vec<Keyframe> {
    let key = |time_ms: f64, weight: f64| Keyframe { time_ms, weight };
    let release_start = duration_ms - blend_out_ms;

    match behavior.curve_shape() {
        // Overshoot then settle
        CurveShape::Sharp => vec![
            key(0.0, 0.0),
            key(blend_in_ms * 0.6, 1.0),
            key(blend_in_ms, 0.85),
            key(release_start, 0.85),
            key(duration_ms, 0.0),
        ],
        CurveShape::Standard => vec![
            key(0.0, 0.0),
            key(blend_in_ms, 1.0),
            key(release_start, 1.0),
            key(duration_ms, 0.0),
        ],
        CurveShape::Gentle => vec![
            key(0.0, 0.0),
            key(blend_in_ms * 0.5, 0.5),
            key(blend_in_ms, 1.0),
            key(release_start, 1.0),
            key(release_start + blend_out_ms * 0.5, 0.5),
            key(duration_ms, 0.0),
        ],
    }
}

/// Cubic ease-in-out on [0, 1]
pub fn ease_in_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: u32, behavior: BehaviorType, start: f64, end: f64, intensity: f64) -> BehaviorEvent {
        BehaviorEvent::new(EventId(id), behavior, start, end, intensity)
    }

    #[test]
    fn test_single_event_blending() {
        let engine = BlendingEngine::default();
        let events = vec![event(0, BehaviorType::Smile, 0.0, 1500.0, 0.6)];
        let (blended, infos) = engine.blend(&events);
        assert_eq!(infos.len(), 1);
        // 1500 * 0.2 = 300
        assert!((infos[0].blend_in_ms - 300.0).abs() < 1e-9);
        assert_eq!(infos[0].weights, vec![(EventId(0), 1.0)]);
        assert_eq!(blended[0].blend_weight, 1.0);
    }

    #[test]
    fn test_blend_duration_bounds() {
        let engine = BlendingEngine::default();
        assert_eq!(engine.blend_duration(10_000.0, 0), 500.0);
        assert_eq!(engine.blend_duration(100.0, 0), 30.0);
        // Half-duration cap wins over the minimum
        assert_eq!(engine.blend_duration(40.0, 0), 20.0);
        // Overlaps shorten the blend
        assert!(engine.blend_duration(1000.0, 1) < engine.blend_duration(1000.0, 0));
    }

    #[test]
    fn test_cluster_weights_sum_to_one() {
        let engine = BlendingEngine::default();
        let events = vec![
            event(0, BehaviorType::Pointing, 0.0, 800.0, 0.8),
            event(1, BehaviorType::Beat, 850.0, 1150.0, 0.3),
            event(2, BehaviorType::Descriptive, 1100.0, 2300.0, 0.1),
            event(3, BehaviorType::Wave, 5000.0, 6200.0, 0.5),
        ];
        let (blended, infos) = engine.blend(&events);

        let cluster = &infos[0].weights;
        assert_eq!(cluster.len(), 3);
        let sum: f64 = cluster.iter().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(cluster[0], (EventId(0), 0.6));
        assert!((blended[1].blend_weight - 0.3).abs() < 1e-9);
        assert!((blended[2].blend_weight - 0.1).abs() < 1e-9);

        // The wave is far away and stands alone
        assert_eq!(infos[3].weights, vec![(EventId(3), 1.0)]);
    }

    #[test]
    fn test_curve_shapes() {
        let sharp = asr_curve(BehaviorType::Emphatic, 600.0, 100.0, 100.0);
        let gentle = asr_curve(BehaviorType::MicroMovement, 600.0, 100.0, 100.0);
        assert_eq!(sharp.len(), 5);
        assert_eq!(gentle.len(), 6);
        for curve in [&sharp, &gentle] {
            assert_eq!(curve.first().unwrap().weight, 0.0);
            assert_eq!(curve.last().unwrap().weight, 0.0);
            for pair in curve.windows(2) {
                assert!(pair[0].time_ms <= pair[1].time_ms);
            }
        }
    }

    #[test]
    fn test_ease_in_out_cubic() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_eq!(ease_in_out_cubic(1.0), 1.0);
        assert!((ease_in_out_cubic(0.5) - 0.5).abs() < 1e-9);
        assert!(ease_in_out_cubic(0.25) < 0.25);
        assert!(ease_in_out_cubic(0.75) > 0.75);
    }

    #[test]
    fn test_transition_steps() {
        let engine = BlendingEngine::default();
        let from = vec![
            event(0, BehaviorType::Smile, 0.0, 1000.0, 0.2),
            event(1, BehaviorType::Nod, 0.0, 500.0, 0.8),
        ];
        let to = vec![
            event(0, BehaviorType::Smile, 0.0, 2000.0, 0.8),
            event(1, BehaviorType::Pointing, 0.0, 800.0, 0.6),
        ];
        let steps = engine.transition(&from, &to, 450.0);
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[4].time_ms, 450.0);

        let last = &steps[4];
        assert_eq!(last.weight, 1.0);
        let smile = last
            .events
            .iter()
            .find(|e| e.behavior == BehaviorType::Smile)
            .unwrap();
        assert!((smile.intensity - 0.8).abs() < 1e-9);
        assert!((smile.duration() - 2000.0).abs() < 1e-9);
        // The nod has faded out completely
        assert!(last.events.iter().all(|e| e.behavior != BehaviorType::Nod));

        let first = &steps[0];
        let nod = first
            .events
            .iter()
            .find(|e| e.behavior == BehaviorType::Nod)
            .unwrap();
        assert!(nod.intensity < 0.8);
        let pointing = first
            .events
            .iter()
            .find(|e| e.behavior == BehaviorType::Pointing)
            .unwrap();
        assert!(pointing.intensity < 0.6);
    }

    #[test]
    fn test_zero_duration_transition_is_empty() {
        let engine = BlendingEngine::default();
        assert!(engine.transition(&[], &[], 0.0).is_empty());
    }
}
