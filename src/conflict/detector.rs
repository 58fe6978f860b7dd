//! Conflict detection
//!
//! Four independent scans (temporal, spatial, semantic, intensity overload)
//! merged into one severity-ordered list.

use crate::config::ConflictConfig;
use crate::conflict::rules::is_contradictory;
use crate::types::{BehaviorEvent, Conflict, ConflictClass, EventId, Severity};
use std::cmp::Ordering;

/// One entry of the scanned set; `fixed` entries belong to other plans
#[derive(Clone, Copy)]
struct Entry<'a> {
    event: &'a BehaviorEvent,
    fixed: bool,
}

/// Conflict plus the sort key used for ordering
struct Found {
    conflict: Conflict,
    earliest: f64,
}

/// Conflict detector
#[derive(Debug, Clone, Default)]
pub struct ConflictDetector {
    config: ConflictConfig,
}

impl ConflictDetector {
    pub fn new(config: ConflictConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConflictConfig {
        &self.config
    }

    /// Detect conflicts within an event set
    pub fn detect(&self, events: &[BehaviorEvent]) -> Vec<Conflict> {
        self.detect_against(events, &[])
    }

    /// Detect conflicts within `events` and between `events` and read-only
    /// `fixed` events (events of plans already playing).
    ///
    /// Only conflicts involving at least one of `events` are reported. Ids in
    /// `fixed` must not collide with ids in `events`.
    pub fn detect_against(&self, events: &[BehaviorEvent], fixed: &[BehaviorEvent]) -> Vec<Conflict> {
        let entries: Vec<Entry<'_>> = events
            .iter()
            .map(|event| Entry { event, fixed: false })
            .chain(fixed.iter().map(|event| Entry { event, fixed: true }))
            .collect();

        let mut found = Vec::new();
        self.scan_pairs(&entries, &mut found);
        self.scan_intensity(&entries, &mut found);

        found.sort_by(compare_found);
        found.into_iter().map(|f| f.conflict).collect()
    }

    /// Temporal, spatial and semantic scans over all pairs
    fn scan_pairs(&self, entries: &[Entry<'_>], found: &mut Vec<Found>) {
        let cfg = &self.config;

        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                if a.fixed && b.fixed {
                    continue;
                }
                let (ea, eb) = (a.event, b.event);
                let ov = ea.overlap_with(eb);
                if ov <= 0.0 {
                    continue;
                }
                let earliest = ea.start_time.min(eb.start_time);
                let ids = vec![ea.id, eb.id];

                if ea.channel == eb.channel {
                    if ov > cfg.temporal_tolerance_ms {
                        let severity = if ov > cfg.temporal_high_ms {
                            Severity::High
                        } else if ov > cfg.temporal_medium_ms {
                            Severity::Medium
                        } else {
                            Severity::Low
                        };
                        found.push(found_conflict(
                            ConflictClass::Temporal,
                            ids.clone(),
                            severity,
                            ov,
                            None,
                            earliest,
                        ));
                    }
                } else if ov > cfg.temporal_tolerance_ms {
                    let score = self.interference_score(ea, eb, ov);
                    if score > cfg.spatial_threshold {
                        let severity = if score > cfg.spatial_high {
                            Severity::High
                        } else if score > cfg.spatial_medium {
                            Severity::Medium
                        } else {
                            Severity::Low
                        };
                        found.push(found_conflict(
                            ConflictClass::Spatial,
                            ids.clone(),
                            severity,
                            score,
                            None,
                            earliest,
                        ));
                    }
                }

                if ov > cfg.semantic_overlap_ms && is_contradictory(ea.behavior, eb.behavior) {
                    let severity = if ov > cfg.semantic_high_ms {
                        Severity::High
                    } else {
                        Severity::Medium
                    };
                    found.push(found_conflict(
                        ConflictClass::Semantic,
                        ids,
                        severity,
                        ov,
                        None,
                        earliest,
                    ));
                }
            }
        }
    }

    /// Cross-channel interference score
    ///
    /// Formula: `coefficient(chA, chB) * mean_intensity * overlap / shorter_duration`
    pub fn interference_score(&self, a: &BehaviorEvent, b: &BehaviorEvent, overlap_ms: f64) -> f64 {
        let shorter = a.duration().min(b.duration());
        if shorter <= 0.0 {
            return 0.0;
        }
        let mean_intensity = (a.intensity + b.intensity) / 2.0;
        self.config.interference(a.channel, b.channel) * mean_intensity * overlap_ms / shorter
    }

    /// Intensity overload scan at fixed resolution over the span of own events
    fn scan_intensity(&self, entries: &[Entry<'_>], found: &mut Vec<Found>) {
        let cfg = &self.config;
        let own = entries.iter().filter(|e| !e.fixed).map(|e| e.event);

        let (span_start, span_end) = own.fold((f64::INFINITY, f64::NEG_INFINITY), |(s, e), ev| {
            (s.min(ev.start_time), e.max(ev.end_time))
        });
        if !(span_start.is_finite() && span_end.is_finite()) || span_end <= span_start {
            return;
        }

        // Active set, peak sum, peak time
        let mut run: Option<(Vec<usize>, f64, f64)> = None;
        let flush = |run: &mut Option<(Vec<usize>, f64, f64)>, found: &mut Vec<Found>| {
            if let Some((active, peak, at)) = run.take() {
                let ids: Vec<EventId> = active.iter().map(|&i| entries[i].event.id).collect();
                let earliest = active
                    .iter()
                    .map(|&i| entries[i].event.start_time)
                    .fold(f64::INFINITY, f64::min);
                let severity = if peak > cfg.intensity_high {
                    Severity::High
                } else if peak > cfg.intensity_medium {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                found.push(found_conflict(
                    ConflictClass::Intensity,
                    ids,
                    severity,
                    peak,
                    Some(at),
                    earliest,
                ));
            }
        };

        let mut k = 0usize;
        loop {
            let t = span_start + k as f64 * cfg.sample_resolution_ms;
            if t >= span_end {
                break;
            }
            k += 1;

            let active: Vec<usize> = entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.event.is_active_at(t))
                .map(|(i, _)| i)
                .collect();
            let sum: f64 = active.iter().map(|&i| entries[i].event.intensity).sum();
            let own_contribution: f64 = active
                .iter()
                .filter(|&&i| !entries[i].fixed)
                .map(|&i| entries[i].event.intensity)
                .sum();

            if sum <= cfg.intensity_threshold || own_contribution <= 0.0 {
                flush(&mut run, found);
                continue;
            }

            let same_set = matches!(&run, Some((current, _, _)) if *current == active);
            if same_set {
                if let Some((_, peak, at)) = run.as_mut() {
                    if sum > *peak {
                        *peak = sum;
                        *at = t;
                    }
                }
            } else {
                flush(&mut run, found);
                run = Some((active, sum, t));
            }
        }
        flush(&mut run, found);
    }
}

fn found_conflict(
    class: ConflictClass,
    events: Vec<EventId>,
    severity: Severity,
    magnitude: f64,
    at_time: Option<f64>,
    earliest: f64,
) -> Found {
    Found {
        conflict: Conflict {
            class,
            events,
            severity,
            magnitude,
            at_time,
            resolution: None,
        },
        earliest,
    }
}

/// Severity descending, then class order, then earliest participant
fn compare_found(a: &Found, b: &Found) -> Ordering {
    b.conflict
        .severity
        .cmp(&a.conflict.severity)
        .then_with(|| {
            a.conflict
                .class
                .resolution_order()
                .cmp(&b.conflict.class.resolution_order())
        })
        .then_with(|| a.earliest.total_cmp(&b.earliest))
        .then_with(|| a.conflict.events.cmp(&b.conflict.events))
}
