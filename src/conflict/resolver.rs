//! Conflict resolution
//!
//! Resolution runs in two phases:
//! 1. Strategy passes: detect, pick a strategy per conflict, apply. Every event
//!    is touched at most once per pass.
//! 2. Settle: same-channel slot placement followed by intensity-only sweeps,
//!    repeated until detection comes back empty (bounded).
//!
//! Events of plans already playing may be supplied as read-only `fixed` events.
//! They are never modified and always win against new events.
//!
//! Settling may be constrained to a set of admitted behavior types (e.g. those a
//! cultural profile allows). A semantic merge whose neutral equivalent is not
//! admitted falls back to a temporal priority override.

use crate::config::{BehaviorTables, ConflictConfig};
use crate::conflict::detector::ConflictDetector;
use crate::types::{
    BehaviorEvent, BehaviorType, Channel, Conflict, ConflictClass, EventId, ResolutionStrategy,
    Severity,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Strategy as applied, including the renormalizing blend variant
#[derive(Debug, Clone, Copy, PartialEq)]
enum Action {
    Override,
    Sequence,
    Blend { renormalize: bool },
    Separate,
    Merge,
}

impl Action {
    fn strategy(&self) -> ResolutionStrategy {
        match self {
            Action::Override => ResolutionStrategy::PriorityOverride,
            Action::Sequence => ResolutionStrategy::TemporalSequence,
            Action::Blend { .. } => ResolutionStrategy::IntensityBlend,
            Action::Separate => ResolutionStrategy::SpatialSeparation,
            Action::Merge => ResolutionStrategy::SemanticMerge,
        }
    }
}

/// Output of a resolution run
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub events: Vec<BehaviorEvent>,
    /// Conflicts handled, with the strategy applied to each
    pub resolved: Vec<Conflict>,
    /// Conflicts still detected after settling (expected empty)
    pub unresolved: Vec<Conflict>,
    pub strategy_counts: BTreeMap<ResolutionStrategy, usize>,
    pub passes: usize,
}

impl Resolution {
    /// Most used strategy (enum order breaks ties)
    pub fn dominant_strategy(&self) -> Option<ResolutionStrategy> {
        let mut best: Option<(ResolutionStrategy, usize)> = None;
        for (&strategy, &count) in &self.strategy_counts {
            if count > 0 && best.map_or(true, |(_, c)| count > c) {
                best = Some((strategy, count));
            }
        }
        best.map(|(strategy, _)| strategy)
    }

    /// Fold another run (e.g. a later settle) into this one
    pub fn absorb(&mut self, other: Resolution) {
        self.events = other.events;
        self.resolved.extend(other.resolved);
        self.unresolved = other.unresolved;
        for (strategy, count) in other.strategy_counts {
            *self.strategy_counts.entry(strategy).or_insert(0) += count;
        }
        self.passes += other.passes;
    }

    fn record(&mut self, mut conflict: Conflict, strategy: ResolutionStrategy) {
        conflict.resolution = Some(strategy);
        *self.strategy_counts.entry(strategy).or_insert(0) += 1;
        self.resolved.push(conflict);
    }
}

/// Conflict resolver
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    detector: ConflictDetector,
    tables: BehaviorTables,
}

impl ConflictResolver {
    pub fn new(config: ConflictConfig, tables: BehaviorTables) -> Self {
        Self {
            detector: ConflictDetector::new(config),
            tables,
        }
    }

    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    fn config(&self) -> &ConflictConfig {
        self.detector.config()
    }

    /// Resolve all conflicts within an event set
    pub fn resolve(&self, events: Vec<BehaviorEvent>) -> Resolution {
        self.resolve_against(events, &[])
    }

    /// Resolve conflicts within `events` and against read-only `fixed` events
    pub fn resolve_against(&self, events: Vec<BehaviorEvent>, fixed: &[BehaviorEvent]) -> Resolution {
        let fixed = isolate_fixed(fixed);
        let mut resolution = Resolution {
            events,
            ..Default::default()
        };

        for pass in 0..self.config().max_passes {
            let conflicts = self.detector.detect_against(&resolution.events, &fixed);
            if conflicts.is_empty() {
                break;
            }
            resolution.passes += 1;
            let escalated = pass >= self.config().escalate_after_passes;

            let mut touched: HashSet<EventId> = HashSet::new();
            for conflict in conflicts {
                if conflict.events.iter().any(|id| touched.contains(id)) {
                    continue;
                }
                let action = self.select(&conflict, &resolution.events, escalated);
                let applied = self.apply(action, &conflict, &mut resolution.events, &fixed, &admit_all);
                touched.extend(conflict.events.iter().copied());
                resolution.record(conflict, applied.strategy());
            }
        }

        debug!(
            passes = resolution.passes,
            resolved = resolution.resolved.len(),
            "Conflict strategy passes complete"
        );

        let settled = self.settle_isolated(std::mem::take(&mut resolution.events), &fixed, &admit_all);
        resolution.absorb(settled);
        resolution
    }

    /// Settle an event set: separate channels, then sweep intensities until
    /// detection is empty
    pub fn settle_against(&self, events: Vec<BehaviorEvent>, fixed: &[BehaviorEvent]) -> Resolution {
        self.settle_within(events, fixed, &admit_all)
    }

    /// Settle an event set without introducing behavior types `admit` rejects
    pub fn settle_within(
        &self,
        events: Vec<BehaviorEvent>,
        fixed: &[BehaviorEvent],
        admit: &dyn Fn(BehaviorType) -> bool,
    ) -> Resolution {
        let fixed = isolate_fixed(fixed);
        self.settle_isolated(events, &fixed, admit)
    }

    fn settle_isolated(
        &self,
        events: Vec<BehaviorEvent>,
        fixed: &[BehaviorEvent],
        admit: &dyn Fn(BehaviorType) -> bool,
    ) -> Resolution {
        let mut resolution = Resolution {
            events,
            ..Default::default()
        };

        for _ in 0..self.config().max_settle_iterations {
            self.separate_channels(&mut resolution.events, fixed);

            let conflicts = self.detector.detect_against(&resolution.events, fixed);
            if conflicts.is_empty() {
                break;
            }
            resolution.passes += 1;

            let mut touched: HashSet<EventId> = HashSet::new();
            for conflict in conflicts {
                if conflict.events.iter().any(|id| touched.contains(id)) {
                    continue;
                }
                let action = match conflict.class {
                    ConflictClass::Semantic => Action::Merge,
                    ConflictClass::Spatial => Action::Separate,
                    ConflictClass::Intensity => Action::Blend { renormalize: true },
                    // Separation already ran; anything left waits for the next iteration
                    ConflictClass::Temporal => continue,
                };
                let applied = self.apply(action, &conflict, &mut resolution.events, fixed, admit);
                touched.extend(conflict.events.iter().copied());
                resolution.record(conflict, applied.strategy());
            }
        }
        self.separate_channels(&mut resolution.events, fixed);

        resolution.unresolved = self.detector.detect_against(&resolution.events, fixed);
        if !resolution.unresolved.is_empty() {
            warn!(
                unresolved = resolution.unresolved.len(),
                "Conflicts remain after settling"
            );
        }
        resolution
    }

    fn select(&self, conflict: &Conflict, events: &[BehaviorEvent], escalated: bool) -> Action {
        match conflict.class {
            ConflictClass::Semantic => Action::Merge,
            ConflictClass::Spatial if escalated => Action::Separate,
            ConflictClass::Spatial => {
                let involves_hand = conflict.events.iter().any(|id| {
                    events
                        .iter()
                        .any(|e| e.id == *id && e.channel == Channel::HandGesture)
                });
                if involves_hand {
                    Action::Sequence
                } else {
                    Action::Blend { renormalize: false }
                }
            }
            ConflictClass::Intensity if escalated || conflict.severity == Severity::High => {
                Action::Blend { renormalize: true }
            }
            ConflictClass::Intensity | ConflictClass::Temporal => Action::Override,
        }
    }

    /// Apply an action and return the one actually applied
    fn apply(
        &self,
        action: Action,
        conflict: &Conflict,
        events: &mut [BehaviorEvent],
        fixed: &[BehaviorEvent],
        admit: &dyn Fn(BehaviorType) -> bool,
    ) -> Action {
        let cfg = self.config();
        let own: Vec<usize> = conflict
            .events
            .iter()
            .filter_map(|id| events.iter().position(|e| e.id == *id))
            .collect();
        if own.is_empty() {
            return action;
        }

        match action {
            Action::Override if conflict.class == ConflictClass::Temporal => {
                self.override_slot(conflict, events, fixed);
            }
            Action::Override => {
                // Lowest-priority own participant gives way
                if let Some(&loser) = own.iter().min_by(|&&a, &&b| {
                    events[a]
                        .priority
                        .cmp(&events[b].priority)
                        .then_with(|| events[b].start_time.total_cmp(&events[a].start_time))
                }) {
                    events[loser] = events[loser].clone().scaled(cfg.override_factor);
                }
            }
            Action::Sequence => {
                let mut ordered: Vec<(f64, Option<usize>)> = conflict
                    .events
                    .iter()
                    .map(|id| {
                        let own_index = events.iter().position(|e| e.id == *id);
                        let start = own_index
                            .map(|i| events[i].start_time)
                            .or_else(|| fixed.iter().find(|e| e.id == *id).map(|e| e.start_time))
                            .unwrap_or(0.0);
                        (start, own_index)
                    })
                    .collect();
                ordered.sort_by(|a, b| a.0.total_cmp(&b.0));
                for (k, (_, own_index)) in ordered.into_iter().enumerate() {
                    if let Some(i) = own_index {
                        if k > 0 {
                            events[i] = events[i].clone().shifted(k as f64 * cfg.stagger_ms);
                        }
                    }
                }
            }
            Action::Blend { renormalize } => {
                let factor = if renormalize {
                    let own_sum: f64 = own.iter().map(|&i| events[i].intensity).sum();
                    let fixed_sum: f64 = conflict
                        .events
                        .iter()
                        .filter_map(|id| fixed.iter().find(|e| e.id == *id))
                        .map(|e| e.intensity)
                        .sum();
                    if own_sum <= 0.0 {
                        return action;
                    }
                    ((cfg.intensity_target - fixed_sum) / own_sum).clamp(0.0, 1.0)
                } else {
                    cfg.blend_factor
                };
                for &i in &own {
                    events[i] = events[i].clone().scaled(factor);
                }
            }
            Action::Separate => {
                for &i in &own {
                    events[i] = events[i].clone().scaled(cfg.separation_factor);
                }
            }
            Action::Merge => {
                let mut merged = 0;
                for &i in &own {
                    let event = &events[i];
                    let target = event.behavior.neutral_equivalent().filter(|&n| admit(n));
                    if let Some(neutral) = target {
                        let window = self.tables.timing(neutral);
                        let start = event.start_time;
                        let duration = window.clamp_duration(event.duration());
                        events[i] = event
                            .clone()
                            .with_behavior(neutral)
                            .with_timing(start, start + duration)
                            .scaled(cfg.merge_factor);
                        merged += 1;
                    }
                }
                if merged == 0 {
                    debug!(events = ?conflict.events, "No admitted neutral equivalent, overriding");
                    self.override_slot(conflict, events, fixed);
                    return Action::Override;
                }
                self.sequence_merged(&own, events);
            }
        }
        action
    }

    /// Merged participants sharing a channel play one after the other when the
    /// earlier one keeps its minimum duration
    fn sequence_merged(&self, own: &[usize], events: &mut [BehaviorEvent]) {
        let &[a, b] = own else {
            return;
        };
        if events[a].channel != events[b].channel {
            return;
        }
        let (first, second) = if events[a].start_time <= events[b].start_time {
            (a, b)
        } else {
            (b, a)
        };
        let (start, cut) = (events[first].start_time, events[second].start_time);
        let min_duration = self.tables.timing(events[first].behavior).min_duration_ms;
        if events[first].end_time > cut && cut - start >= min_duration {
            events[first] = events[first].clone().with_timing(start, cut);
        }
    }

    /// Temporal priority override: the winner keeps its slot and the loser is
    /// scaled down. The loser is trimmed to end where the winner starts, or
    /// deferred past the winner when trimming would undercut its minimum duration
    fn override_slot(&self, conflict: &Conflict, events: &mut [BehaviorEvent], fixed: &[BehaviorEvent]) {
        let &[a, b] = conflict.events.as_slice() else {
            return;
        };
        let lookup = |id: EventId, events: &[BehaviorEvent]| -> Option<(BehaviorEvent, bool)> {
            events
                .iter()
                .find(|e| e.id == id)
                .map(|e| (e.clone(), false))
                .or_else(|| fixed.iter().find(|e| e.id == id).map(|e| (e.clone(), true)))
        };
        let (Some((ea, a_fixed)), Some((eb, b_fixed))) = (lookup(a, events), lookup(b, events)) else {
            return;
        };

        let (winner, loser) = if a_fixed {
            (ea, eb)
        } else if b_fixed {
            (eb, ea)
        } else if outranks(&ea, &eb) {
            (ea, eb)
        } else {
            (eb, ea)
        };

        let Some(index) = events.iter().position(|e| e.id == loser.id) else {
            return;
        };
        let min_duration = self.tables.timing(loser.behavior).min_duration_ms;
        let (start, duration) = (loser.start_time, loser.duration());

        let placed = if start < winner.start_time && winner.start_time - start >= min_duration {
            loser.with_timing(start, winner.start_time)
        } else {
            loser.with_timing(winner.end_time, winner.end_time + duration)
        };
        events[index] = placed.scaled(self.config().override_factor);
    }

    /// Place same-channel events into non-overlapping slots, highest priority
    /// first. Events only move later or get shorter.
    fn separate_channels(&self, events: &mut [BehaviorEvent], fixed: &[BehaviorEvent]) {
        let tolerance = self.config().temporal_tolerance_ms;

        for channel in Channel::ALL {
            let mut order: Vec<usize> = (0..events.len())
                .filter(|&i| events[i].channel == channel)
                .collect();
            order.sort_by(|&a, &b| rank_order(&events[a], &events[b]));

            let mut occupied: Vec<(f64, f64)> = fixed
                .iter()
                .filter(|e| e.channel == channel)
                .map(|e| (e.start_time, e.end_time))
                .collect();

            for i in order {
                let event = &events[i];
                let min_duration = self.tables.timing(event.behavior).min_duration_ms;
                let (start, end) = find_slot(
                    event.start_time,
                    event.duration(),
                    min_duration,
                    &mut occupied,
                    tolerance,
                );
                if start != event.start_time || end != event.end_time {
                    events[i] = event.clone().with_timing(start, end);
                }
                occupied.push((start, end));
            }
        }
    }
}

fn admit_all(_: BehaviorType) -> bool {
    true
}

/// Placement order: higher priority, then earlier start, then lower id
fn rank_order(a: &BehaviorEvent, b: &BehaviorEvent) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.start_time.total_cmp(&b.start_time))
        .then_with(|| a.id.cmp(&b.id))
}

/// Whether `a` wins a slot against `b`
fn outranks(a: &BehaviorEvent, b: &BehaviorEvent) -> bool {
    rank_order(a, b).is_lt()
}

/// First slot at or after `start` that overlaps no occupied interval by more
/// than `tolerance`. The event is trimmed in front of a blocking interval when
/// that keeps `min_duration`, otherwise it moves past the blocker.
fn find_slot(
    start: f64,
    duration: f64,
    min_duration: f64,
    occupied: &mut [(f64, f64)],
    tolerance: f64,
) -> (f64, f64) {
    occupied.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut s = start;
    loop {
        let e = s + duration;
        let blocker = occupied
            .iter()
            .find(|(a, b)| e.min(*b) - s.max(*a) > tolerance);
        match blocker {
            None => return (s, e),
            Some(&(a, b)) => {
                if a > s && a - s >= min_duration {
                    return (s, a);
                }
                s = b;
            }
        }
    }
}

/// Give fixed events ids that cannot collide with plan-local ids
fn isolate_fixed(fixed: &[BehaviorEvent]) -> Vec<BehaviorEvent> {
    fixed
        .iter()
        .enumerate()
        .map(|(k, e)| {
            let mut event = e.clone();
            event.id = EventId(u32::MAX - k as u32);
            event
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: u32, behavior: BehaviorType, start: f64, end: f64, intensity: f64) -> BehaviorEvent {
        BehaviorEvent::new(EventId(id), behavior, start, end, intensity)
    }

    fn find(events: &[BehaviorEvent], id: u32) -> &BehaviorEvent {
        events.iter().find(|e| e.id == EventId(id)).unwrap()
    }

    #[test]
    fn test_clean_set_is_untouched() {
        let resolver = ConflictResolver::default();
        let events = vec![
            event(0, BehaviorType::Nod, 0.0, 400.0, 0.5),
            event(1, BehaviorType::Smile, 0.0, 1500.0, 0.5),
        ];
        let resolution = resolver.resolve(events.clone());
        assert_eq!(resolution.events, events);
        assert!(resolution.resolved.is_empty());
        assert_eq!(resolution.dominant_strategy(), None);
    }

    #[test]
    fn test_temporal_loser_is_trimmed_when_long_enough() {
        let resolver = ConflictResolver::default();
        // Smile (5xx) beats focus (4xx); focus keeps 0-800 >= its 500ms minimum at 0.6x
        let events = vec![
            event(0, BehaviorType::Focus, 0.0, 1500.0, 0.5),
            event(1, BehaviorType::Smile, 800.0, 2300.0, 0.5),
        ];
        let resolution = resolver.resolve(events);
        let focus = find(&resolution.events, 0);
        assert_eq!((focus.start_time, focus.end_time), (0.0, 800.0));
        assert!((focus.intensity - 0.3).abs() < 1e-9);
        let smile = find(&resolution.events, 1);
        assert_eq!((smile.start_time, smile.end_time), (800.0, 2300.0));
        assert_eq!(
            resolution.dominant_strategy(),
            Some(ResolutionStrategy::PriorityOverride)
        );
        assert!(resolution.unresolved.is_empty());
    }

    #[test]
    fn test_temporal_loser_is_deferred_when_too_short() {
        let resolver = ConflictResolver::default();
        let events = vec![
            event(0, BehaviorType::Tilt, 300.0, 700.0, 1.0),
            event(1, BehaviorType::Nod, 350.0, 600.0, 1.0),
        ];
        let resolution = resolver.resolve(events);
        let tilt = find(&resolution.events, 0);
        assert_eq!((tilt.start_time, tilt.end_time), (600.0, 1000.0));
        assert!((tilt.intensity - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_semantic_merge() {
        let resolver = ConflictResolver::default();
        let events = vec![
            event(0, BehaviorType::Celebratory, 0.0, 1000.0, 0.5),
            event(1, BehaviorType::Concern, 0.0, 1000.0, 0.5),
        ];
        let resolution = resolver.resolve(events);
        let hand = find(&resolution.events, 0);
        let face = find(&resolution.events, 1);
        assert_eq!(hand.behavior, BehaviorType::Descriptive);
        assert_eq!(face.behavior, BehaviorType::Focus);
        assert!((hand.intensity - 0.4).abs() < 1e-9);
        assert!((face.intensity - 0.4).abs() < 1e-9);
        assert!(resolution.resolved[0].resolution == Some(ResolutionStrategy::SemanticMerge));
    }

    #[test]
    fn test_same_channel_merge_is_sequenced() {
        let resolver = ConflictResolver::default();
        let resolution = resolver.resolve(vec![
            event(0, BehaviorType::Smile, 0.0, 2000.0, 0.8),
            event(1, BehaviorType::Concern, 500.0, 2200.0, 0.8),
        ]);
        let neutral = find(&resolution.events, 0);
        let focus = find(&resolution.events, 1);
        assert_eq!(neutral.behavior, BehaviorType::Neutral);
        assert_eq!((neutral.start_time, neutral.end_time), (0.0, 500.0));
        assert_eq!((focus.start_time, focus.end_time), (500.0, 2200.0));
        assert!((neutral.intensity - 0.64).abs() < 1e-9);
        assert!((focus.intensity - 0.64).abs() < 1e-9);
    }

    #[test]
    fn test_settle_skips_merges_into_rejected_types() {
        let resolver = ConflictResolver::default();
        let events = vec![
            event(0, BehaviorType::Celebratory, 0.0, 1000.0, 0.5)
                .with_cultural_variant("custom:wave"),
            event(1, BehaviorType::Concern, 0.0, 1000.0, 0.5),
        ];
        let admit = |b: BehaviorType| b != BehaviorType::Descriptive && b != BehaviorType::Focus;
        let resolution = resolver.settle_within(events, &[], &admit);

        let hand = find(&resolution.events, 0);
        let face = find(&resolution.events, 1);
        assert_eq!(hand.behavior, BehaviorType::Celebratory);
        assert_eq!(hand.cultural_variant.as_deref(), Some("custom:wave"));
        assert_eq!(face.behavior, BehaviorType::Concern);
        // Equal priority: the lower id keeps its slot, the other is deferred
        assert_eq!((face.start_time, face.end_time), (1000.0, 2000.0));
        assert!((face.intensity - 0.3).abs() < 1e-9);
        assert_eq!(
            resolution.resolved[0].resolution,
            Some(ResolutionStrategy::PriorityOverride)
        );
        assert!(resolution.unresolved.is_empty());
    }

    #[test]
    fn test_settle_merges_into_admitted_types_only() {
        let resolver = ConflictResolver::default();
        let events = vec![
            event(0, BehaviorType::Celebratory, 0.0, 1000.0, 0.5)
                .with_cultural_variant("custom:wave"),
            event(1, BehaviorType::Concern, 0.0, 1000.0, 0.5),
        ];
        let admit = |b: BehaviorType| b != BehaviorType::Descriptive;
        let resolution = resolver.settle_within(events, &[], &admit);

        let hand = find(&resolution.events, 0);
        let face = find(&resolution.events, 1);
        assert_eq!(hand.behavior, BehaviorType::Celebratory);
        assert_eq!(hand.cultural_variant.as_deref(), Some("custom:wave"));
        assert_eq!(face.behavior, BehaviorType::Focus);
        assert!(resolution.events.iter().all(|e| admit(e.behavior)));
        assert!(resolution.unresolved.is_empty());
    }

    #[test]
    fn test_spatial_hand_conflict_is_sequenced() {
        let resolver = ConflictResolver::default();
        let events = vec![
            event(0, BehaviorType::Pointing, 0.0, 1000.0, 0.8),
            event(1, BehaviorType::Turn, 0.0, 1000.0, 0.8),
        ];
        let resolution = resolver.resolve(events);
        assert_eq!(
            resolution.resolved[0].resolution,
            Some(ResolutionStrategy::TemporalSequence)
        );
        assert!(resolution.unresolved.is_empty());
        assert!(resolver.detector().detect(&resolution.events).is_empty());
    }

    #[test]
    fn test_intensity_overload_is_settled() {
        let resolver = ConflictResolver::default();
        let events = vec![
            event(0, BehaviorType::Pointing, 0.0, 1000.0, 1.0),
            event(1, BehaviorType::Smile, 0.0, 1000.0, 1.0),
            event(2, BehaviorType::Surprise, 1000.0, 1700.0, 1.0),
            event(3, BehaviorType::Tilt, 0.0, 1000.0, 1.0),
            event(4, BehaviorType::Rest, 1000.0, 2000.0, 1.0),
        ];
        let resolution = resolver.resolve(events);
        let at_zero: f64 = resolution
            .events
            .iter()
            .filter(|e| e.is_active_at(0.0))
            .map(|e| e.intensity)
            .sum();
        assert!(at_zero <= 2.5);
        assert!(resolution.unresolved.is_empty());
    }

    #[test]
    fn test_fixed_events_are_never_modified_and_always_win() {
        let resolver = ConflictResolver::default();
        let fixed = vec![event(0, BehaviorType::Nod, 0.0, 1000.0, 0.2)];
        let own = vec![event(0, BehaviorType::Shake, 200.0, 900.0, 1.0)];
        let resolution = resolver.resolve_against(own, &fixed);
        let shake = &resolution.events[0];
        // Nod and shake contradict; the own event merges to tilt and moves out of the slot
        assert_ne!(shake.behavior, BehaviorType::Shake);
        assert!(shake.start_time >= 900.0);
        assert!(resolution.unresolved.is_empty());
    }

    #[test]
    fn test_find_slot() {
        let mut occupied = vec![(0.0, 400.0), (600.0, 1000.0)];
        // Fits in front of the second interval after moving past the first
        assert_eq!(find_slot(100.0, 350.0, 100.0, &mut occupied, 100.0), (400.0, 600.0));
        // Too long to fit the gap, too short to trim: placed after both
        assert_eq!(find_slot(100.0, 500.0, 400.0, &mut occupied, 100.0), (1000.0, 1500.0));
        // Small overlap is tolerated
        assert_eq!(find_slot(350.0, 200.0, 100.0, &mut occupied, 100.0), (350.0, 550.0));
    }

    #[test]
    fn test_settle_guarantees_channel_separation() {
        let resolver = ConflictResolver::default();
        let events: Vec<BehaviorEvent> = (0..6)
            .map(|i| event(i, BehaviorType::Beat, i as f64 * 50.0, i as f64 * 50.0 + 300.0, 0.4))
            .collect();
        let resolution = resolver.settle_against(events, &[]);
        let events = &resolution.events;
        for (i, a) in events.iter().enumerate() {
            for b in &events[i + 1..] {
                assert!(a.overlap_with(b) <= 100.0);
            }
        }
        for e in events {
            assert!(e.duration() >= 150.0);
        }
    }

    #[test]
    fn test_dominant_strategy_counts() {
        let mut resolution = Resolution::default();
        let conflict = Conflict {
            class: ConflictClass::Temporal,
            events: vec![EventId(0), EventId(1)],
            severity: Severity::Low,
            magnitude: 150.0,
            at_time: None,
            resolution: None,
        };
        resolution.record(conflict.clone(), ResolutionStrategy::SemanticMerge);
        resolution.record(conflict.clone(), ResolutionStrategy::PriorityOverride);
        resolution.record(conflict, ResolutionStrategy::PriorityOverride);
        assert_eq!(
            resolution.dominant_strategy(),
            Some(ResolutionStrategy::PriorityOverride)
        );
    }
}
