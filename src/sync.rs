//! Speech synchronization
//!
//! Aligns each sized behavior event to its most relevant speech timing marker
//! and records the timing changes that alignment introduced.

use crate::config::{BehaviorTables, SyncTuning};
use crate::types::{
    AdjustmentKind, Alignment, AlignmentType, BehaviorEvent, MarkerType, SpeechTimingMarker,
    TimingAdjustment,
};
use tracing::debug;

/// Output of one synchronization run
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub events: Vec<BehaviorEvent>,
    pub alignments: Vec<Alignment>,
    pub adjustments: Vec<TimingAdjustment>,
}

impl SyncOutcome {
    /// Mean alignment confidence, or `None` when nothing was aligned
    pub fn mean_confidence(&self) -> Option<f64> {
        if self.alignments.is_empty() {
            return None;
        }
        let sum: f64 = self.alignments.iter().map(|a| a.confidence).sum();
        Some(sum / self.alignments.len() as f64)
    }
}

/// Synchronization engine
#[derive(Debug, Clone, Default)]
pub struct SynchronizationEngine {
    tuning: SyncTuning,
}

impl SynchronizationEngine {
    pub fn new(tuning: SyncTuning) -> Self {
        Self { tuning }
    }

    /// Align every event to its best marker.
    ///
    /// Events without a relevant marker keep their timing (duration bounded by
    /// the type window) and get the fallback confidence.
    pub fn synchronize(
        &self,
        events: &[BehaviorEvent],
        markers: &[SpeechTimingMarker],
        tables: &BehaviorTables,
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome {
            events: Vec::with_capacity(events.len()),
            alignments: Vec::with_capacity(events.len()),
            adjustments: Vec::new(),
        };

        for event in events {
            let timing = tables.timing(event.behavior);
            let best = self.best_marker(event, markers);

            let (start, duration, marker_type, alignment_type, confidence) = match best {
                Some(marker) => {
                    let alignment_type = alignment_type_for(event, marker.marker_type);
                    let duration = match alignment_type {
                        AlignmentType::Continuous => timing.clamp_duration(marker.duration()),
                        _ => timing.clamp_duration(event.duration()),
                    };
                    let start = match alignment_type {
                        AlignmentType::Onset | AlignmentType::Continuous => marker.start_time,
                        AlignmentType::Peak => {
                            marker.midpoint() - event.behavior.stroke_fraction() * duration
                        }
                        AlignmentType::Offset => marker.end_time - duration,
                    };
                    let confidence = match alignment_type {
                        AlignmentType::Continuous => self.tuning.continuous_confidence,
                        _ => self.tuning.aligned_confidence,
                    };
                    (
                        start,
                        duration,
                        Some(marker.marker_type),
                        Some(alignment_type),
                        confidence,
                    )
                }
                None => (
                    event.start_time,
                    timing.clamp_duration(event.duration()),
                    None,
                    None,
                    self.tuning.fallback_confidence,
                ),
            };

            let start = start.max(0.0);
            let end = start + duration;

            self.record_adjustments(event, start, duration, &mut outcome.adjustments);

            outcome.alignments.push(Alignment {
                event: event.id,
                marker_type,
                alignment_type,
                gesture_start_time: start,
                gesture_end_time: end,
                confidence,
            });
            outcome.events.push(event.clone().with_timing(start, end));
        }

        debug!(
            events = outcome.events.len(),
            markers = markers.len(),
            adjustments = outcome.adjustments.len(),
            "Synchronized events to speech"
        );

        outcome
    }

    /// Relevance score of a marker for an event
    ///
    /// Formula: `0.5 * type_association + 0.3 * (1 - |Δintensity|) + 0.2 * proximity`
    /// where `proximity = max(0, 1 - |Δstart| / window)`
    pub fn marker_score(&self, event: &BehaviorEvent, marker: &SpeechTimingMarker) -> f64 {
        let association = if marker.is_relevant_to(event.behavior) {
            self.tuning.type_association_weight
        } else {
            0.0
        };
        let similarity = self.tuning.intensity_similarity_weight
            * (1.0 - (marker.intensity - event.intensity).abs()).max(0.0);
        let proximity = self.tuning.proximity_weight
            * (1.0 - (marker.start_time - event.start_time).abs() / self.tuning.proximity_window_ms)
                .max(0.0);
        association + similarity + proximity
    }

    /// Highest-scoring relevant marker (earliest wins ties)
    fn best_marker<'a>(
        &self,
        event: &BehaviorEvent,
        markers: &'a [SpeechTimingMarker],
    ) -> Option<&'a SpeechTimingMarker> {
        let mut best: Option<(&SpeechTimingMarker, f64)> = None;
        for marker in markers {
            let score = self.marker_score(event, marker);
            if score < self.tuning.min_relevance {
                continue;
            }
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((marker, score));
            }
        }
        best.map(|(marker, _)| marker)
    }

    fn record_adjustments(
        &self,
        event: &BehaviorEvent,
        start: f64,
        duration: f64,
        adjustments: &mut Vec<TimingAdjustment>,
    ) {
        let threshold = self.tuning.adjustment_threshold_ms;

        let shift = start - event.start_time;
        if shift.abs() > threshold {
            adjustments.push(TimingAdjustment {
                event: event.id,
                kind: AdjustmentKind::Delay,
                amount_ms: shift,
            });
        }

        let change = duration - event.duration();
        if change > threshold {
            adjustments.push(TimingAdjustment {
                event: event.id,
                kind: AdjustmentKind::Extend,
                amount_ms: change,
            });
        } else if change < -threshold {
            adjustments.push(TimingAdjustment {
                event: event.id,
                kind: AdjustmentKind::Compress,
                amount_ms: -change,
            });
        }
    }
}

/// How an event anchors to a marker of the given type
pub fn alignment_type_for(event: &BehaviorEvent, marker_type: MarkerType) -> AlignmentType {
    match marker_type {
        MarkerType::EmphasisPeak | MarkerType::SyllableStress if event.behavior.is_emphasis() => {
            AlignmentType::Peak
        }
        MarkerType::PhraseBoundary if event.behavior.closes_phrase() => AlignmentType::Offset,
        MarkerType::Pause => AlignmentType::Continuous,
        _ => AlignmentType::Onset,
    }
}
