//! Behavior coordination
//!
//! This module provides the public API for kinesync. It orchestrates the full
//! pipeline from a behavior request to a synchronized plan and owns the map of
//! live plans.
//!
//! Pipeline stages:
//! 1. SpeechTimingAnalyzer - Derive speech timing markers
//! 2. DurationIntensityCalculator - Size each candidate
//! 3. SynchronizationEngine - Align candidates to markers
//! 4. ConflictResolver - Resolve conflicts, also against live plans
//! 5. BlendingEngine - Blend curves and cross-fade weights
//! 6. CulturalAdapter - Apply the cultural profile
//! 7. Finalize - Settle, apply motion sensitivity

use crate::blending::{BlendingEngine, TransitionStep};
use crate::calculator::DurationIntensityCalculator;
use crate::config::{BehaviorTables, MotionSensitivity, SyncConfig};
use crate::conflict::ConflictResolver;
use crate::cultural::{AdaptationContext, CulturalAdapter, CulturalDatabase, CulturalProfile};
use crate::error::{Result, SyncError};
use crate::observer::{PlanEvent, PlanObserver};
use crate::request::{AdaptationUpdate, BehaviorRequest};
use crate::sync::SynchronizationEngine;
use crate::timing::SpeechTimingAnalyzer;
use crate::types::{
    sort_by_start, split_by_channel, BehaviorEvent, BehaviorType, BlendingInfo, EventId,
    FilterReason, FilteredBehavior, MovementContext, PlanDiagnostics, PlanId, ResolutionStrategy,
    SpeechContext, SpeechTimingMarker, SynchronizedBehaviorPlan,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Synchronize a behavior request given as JSON and return the plan as JSON.
///
/// Stateless: uses the default configuration and built-in cultural profiles,
/// and does not check against any live plans.
///
/// # Example
/// ```ignore
/// let plan_json = synchronize_behaviors(r#"{"text": "Hello", "speech_duration_ms": 800}"#)?;
/// ```
pub fn synchronize_behaviors(request_json: &str) -> Result<String> {
    let request = BehaviorRequest::from_json(request_json)?;
    let plan = BehaviorCoordinator::default().synchronize_request(&request)?;
    plan.to_json()
}

/// Input to one run of the stages
struct StageInput<'a> {
    text: &'a str,
    speech_duration_ms: f64,
    speech_context: &'a SpeechContext,
    movement: &'a MovementContext,
    profile: Option<&'a CulturalProfile>,
    /// Candidate events with the intensity requested for them
    candidates: Vec<(BehaviorEvent, Option<f64>)>,
    /// Markers to reuse instead of analyzing `text`
    markers: Option<Vec<SpeechTimingMarker>>,
    /// Read-only events on this plan's timeline
    fixed: &'a [BehaviorEvent],
    /// Earliest allowed start
    floor_ms: f64,
}

/// Output of one run of the stages
struct StageOutput {
    events: Vec<BehaviorEvent>,
    markers: Vec<SpeechTimingMarker>,
    blending: Vec<BlendingInfo>,
    diagnostics: PlanDiagnostics,
    dominant_strategy: Option<ResolutionStrategy>,
    confidence: f64,
}

/// Stateful coordinator owning the live plans.
///
/// All stages are stateless services built from the injected configuration;
/// the coordinator clock only moves through [`BehaviorCoordinator::advance_time`].
pub struct BehaviorCoordinator {
    config: SyncConfig,
    tables: BehaviorTables,
    cultural_db: CulturalDatabase,
    sensitivity: MotionSensitivity,
    analyzer: SpeechTimingAnalyzer,
    calculator: DurationIntensityCalculator,
    synchronizer: SynchronizationEngine,
    resolver: ConflictResolver,
    blender: BlendingEngine,
    adapter: CulturalAdapter,
    live: HashMap<PlanId, Arc<SynchronizedBehaviorPlan>>,
    now_ms: f64,
    observers: Vec<Box<dyn PlanObserver>>,
}

impl Default for BehaviorCoordinator {
    fn default() -> Self {
        Self::build(
            SyncConfig::default(),
            BehaviorTables::default(),
            CulturalDatabase::builtin(),
            MotionSensitivity::default(),
        )
    }
}

impl BehaviorCoordinator {
    /// Create a coordinator from validated configuration
    pub fn new(
        config: SyncConfig,
        tables: BehaviorTables,
        cultural_db: CulturalDatabase,
        sensitivity: MotionSensitivity,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, tables, cultural_db, sensitivity))
    }

    fn build(
        config: SyncConfig,
        tables: BehaviorTables,
        cultural_db: CulturalDatabase,
        sensitivity: MotionSensitivity,
    ) -> Self {
        Self {
            analyzer: SpeechTimingAnalyzer::new(config.timing.clone()),
            calculator: DurationIntensityCalculator::new(config.calculator.clone(), tables.clone()),
            synchronizer: SynchronizationEngine::new(config.sync.clone()),
            resolver: ConflictResolver::new(config.conflict.clone(), tables.clone()),
            blender: BlendingEngine::new(config.blending.clone()),
            adapter: CulturalAdapter::new(tables.clone()),
            config,
            tables,
            cultural_db,
            sensitivity,
            live: HashMap::new(),
            now_ms: 0.0,
            observers: Vec::new(),
        }
    }

    /// Register an observer for plan lifecycle events
    pub fn with_observer(mut self, observer: Box<dyn PlanObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn subscribe(&mut self, observer: Box<dyn PlanObserver>) {
        self.observers.push(observer);
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn cultural_database(&self) -> &CulturalDatabase {
        &self.cultural_db
    }

    pub fn motion_sensitivity(&self) -> MotionSensitivity {
        self.sensitivity
    }

    pub fn set_motion_sensitivity(&mut self, sensitivity: MotionSensitivity) {
        self.sensitivity = sensitivity;
    }

    /// Current coordinator time (ms)
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    pub fn live_plan(&self, id: PlanId) -> Option<Arc<SynchronizedBehaviorPlan>> {
        self.live.get(&id).cloned()
    }

    /// Live plans ordered by start time
    pub fn live_plans(&self) -> Vec<Arc<SynchronizedBehaviorPlan>> {
        let mut plans: Vec<Arc<SynchronizedBehaviorPlan>> = self.live.values().cloned().collect();
        plans.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        plans
    }

    /// Build a plan without registering it as live
    pub fn synchronize_request(&self, request: &BehaviorRequest) -> Result<SynchronizedBehaviorPlan> {
        request.validate()?;
        let profile = self.resolve_profile(request.cultural_profile.as_deref(), &request.speech_context)?;
        let start_time = self.now_ms + request.start_offset_ms;
        self.plan_from_request(request, profile, start_time, &[])
    }

    /// Build a plan, check it against the live plans and register it
    pub fn plan(&mut self, request: &BehaviorRequest) -> Result<Arc<SynchronizedBehaviorPlan>> {
        request.validate()?;
        let profile = self.resolve_profile(request.cultural_profile.as_deref(), &request.speech_context)?;
        let start_time = self.now_ms + request.start_offset_ms;
        let fixed = self.fixed_events(start_time, None);
        let plan = Arc::new(self.plan_from_request(request, profile, start_time, &fixed)?);

        info!(
            plan = %plan.id,
            events = plan.event_count(),
            start_ms = plan.start_time,
            end_ms = plan.end_time,
            confidence = plan.confidence,
            "Registered live plan"
        );
        self.live.insert(plan.id, Arc::clone(&plan));
        self.notify(&PlanEvent::Created(Arc::clone(&plan)));
        Ok(plan)
    }

    /// Advance the coordinator clock and evict finished plans
    pub fn advance_time(&mut self, delta_ms: f64) -> Vec<PlanId> {
        if !delta_ms.is_finite() || delta_ms < 0.0 {
            warn!(delta_ms, "Ignoring invalid time advance");
            return Vec::new();
        }
        self.now_ms += delta_ms;

        let now = self.now_ms;
        let mut expired: Vec<Arc<SynchronizedBehaviorPlan>> = self
            .live
            .values()
            .filter(|plan| plan.is_expired(now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.end_time.total_cmp(&b.end_time));

        let mut evicted = Vec::with_capacity(expired.len());
        for plan in expired {
            self.live.remove(&plan.id);
            info!(plan = %plan.id, now_ms = now, "Evicted finished plan");
            self.notify(&PlanEvent::Evicted {
                id: plan.id,
                at_ms: now,
            });
            evicted.push(plan.id);
        }
        evicted
    }

    /// Remove a live plan before it finishes
    pub fn discard_plan(&mut self, id: PlanId) -> Result<Arc<SynchronizedBehaviorPlan>> {
        let plan = self.live.remove(&id).ok_or(SyncError::UnknownPlan(id))?;
        info!(plan = %id, "Discarded live plan");
        self.notify(&PlanEvent::Discarded { id });
        Ok(plan)
    }

    /// Re-run the pipeline over the remaining portion of a live plan.
    ///
    /// Events that already started are kept as they are. The adapted plan gets
    /// a new version and replaces the old one; readers holding the previous
    /// `Arc` keep an unchanged snapshot.
    pub fn adapt_live_plan(
        &mut self,
        id: PlanId,
        update: &AdaptationUpdate,
    ) -> Result<Arc<SynchronizedBehaviorPlan>> {
        update.validate()?;
        let current = self.live.get(&id).cloned().ok_or(SyncError::UnknownPlan(id))?;
        let elapsed = current.elapsed_at(self.now_ms).max(0.0);

        let speech_context = update
            .speech_context
            .clone()
            .unwrap_or_else(|| current.speech_context.clone());
        let movement = update.movement_context.unwrap_or(current.movement_context);
        let profile = match current.cultural_region.as_deref() {
            Some(region) => self.cultural_db.get(region),
            None => self.resolve_profile(None, &speech_context)?,
        };

        let (started, upcoming): (Vec<BehaviorEvent>, Vec<BehaviorEvent>) = current
            .events()
            .into_iter()
            .partition(|e| e.start_time < elapsed);

        let mut next_id = current
            .events()
            .iter()
            .map(|e| e.id.0 + 1)
            .max()
            .unwrap_or(0);
        let mut candidates: Vec<(BehaviorEvent, Option<f64>)> = upcoming
            .into_iter()
            .filter(|e| !update.remove.contains(&e.behavior))
            .map(|e| (e, None))
            .collect();
        for added in &update.add {
            let event = BehaviorEvent::new(
                EventId(next_id),
                added.behavior,
                elapsed + added.start_time,
                elapsed + added.end_time,
                added
                    .intensity
                    .unwrap_or(self.tables.timing(added.behavior).base_intensity),
            );
            next_id += 1;
            candidates.push((event, added.intensity));
        }

        let (speech_duration_ms, markers) = match &update.remaining_text {
            Some(text) => {
                let remaining = update
                    .remaining_duration_ms
                    .unwrap_or((current.speech_duration_ms - elapsed).max(0.0));
                let markers: Vec<SpeechTimingMarker> = self
                    .analyzer
                    .analyze_with_tempo(text, remaining, &speech_context, tempo(profile))
                    .into_iter()
                    .map(|mut m| {
                        m.start_time += elapsed;
                        m.end_time += elapsed;
                        m
                    })
                    .collect();
                (elapsed + remaining, markers)
            }
            None => {
                let duration = update
                    .remaining_duration_ms
                    .map_or(current.speech_duration_ms, |d| elapsed + d);
                let markers: Vec<SpeechTimingMarker> = current
                    .markers
                    .iter()
                    .filter(|m| m.start_time >= elapsed)
                    .cloned()
                    .collect();
                (duration, markers)
            }
        };

        let mut fixed = started.clone();
        fixed.extend(self.fixed_events(current.start_time, Some(id)));

        let output = self.run_stages(StageInput {
            text: "",
            speech_duration_ms,
            speech_context: &speech_context,
            movement: &movement,
            profile,
            candidates,
            markers: Some(markers),
            fixed: &fixed,
            floor_ms: elapsed,
        });

        let StageOutput {
            events: rerun,
            markers: rerun_markers,
            diagnostics,
            dominant_strategy,
            confidence,
            ..
        } = output;

        let mut events = started.clone();
        events.extend(rerun);
        sort_by_start(&mut events);
        let (blended, blending) = self.blender.blend(&events);
        // Started events stay exactly as they are playing
        let events: Vec<BehaviorEvent> = blended
            .into_iter()
            .map(|e| match started.iter().find(|s| s.id == e.id) {
                Some(original) => original.clone(),
                None => e,
            })
            .collect();

        let mut markers: Vec<SpeechTimingMarker> = current
            .markers
            .iter()
            .filter(|m| m.start_time < elapsed)
            .cloned()
            .collect();
        markers.extend(rerun_markers);

        let region = profile.map(|p| p.region.clone());
        let adapted = Arc::new(self.assemble(
            current.id,
            current.version + 1,
            current.start_time,
            speech_duration_ms,
            region,
            speech_context,
            movement,
            StageOutput {
                events,
                markers,
                blending,
                diagnostics,
                dominant_strategy,
                confidence,
            },
        ));

        info!(
            plan = %id,
            version = adapted.version,
            elapsed_ms = elapsed,
            events = adapted.event_count(),
            "Adapted live plan"
        );
        self.live.insert(id, Arc::clone(&adapted));
        self.notify(&PlanEvent::Adapted {
            plan: Arc::clone(&adapted),
            previous_version: current.version,
        });
        Ok(adapted)
    }

    /// Transition steps from one live plan to another
    pub fn transition_between(
        &self,
        from: PlanId,
        to: PlanId,
        duration_ms: f64,
    ) -> Result<Vec<TransitionStep>> {
        let from_plan = self.live.get(&from).ok_or(SyncError::UnknownPlan(from))?;
        let to_plan = self.live.get(&to).ok_or(SyncError::UnknownPlan(to))?;
        Ok(self
            .blender
            .transition(&from_plan.events(), &to_plan.events(), duration_ms))
    }

    /// Profile for a request: an explicit region must exist, a speech-context
    /// background is a soft hint
    fn resolve_profile(
        &self,
        explicit: Option<&str>,
        context: &SpeechContext,
    ) -> Result<Option<&CulturalProfile>> {
        if let Some(region) = explicit {
            return self
                .cultural_db
                .get(region)
                .map(Some)
                .ok_or_else(|| SyncError::UnknownCulturalProfile(region.to_string()));
        }
        match context.cultural_background.as_deref() {
            Some(region) => match self.cultural_db.get(region) {
                Some(profile) => Ok(Some(profile)),
                None => {
                    warn!(region, "Unknown cultural background, passing behaviors through");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Events of live plans (other than `exclude`) on the timeline of a plan
    /// starting at `start_time`
    fn fixed_events(&self, start_time: f64, exclude: Option<PlanId>) -> Vec<BehaviorEvent> {
        self.live
            .values()
            .filter(|plan| Some(plan.id) != exclude && !plan.is_expired(self.now_ms))
            .flat_map(|plan| {
                let offset = plan.start_time - start_time;
                plan.events().into_iter().map(move |e| e.shifted(offset))
            })
            .filter(|e| e.end_time > 0.0)
            .collect()
    }

    fn plan_from_request(
        &self,
        request: &BehaviorRequest,
        profile: Option<&CulturalProfile>,
        start_time: f64,
        fixed: &[BehaviorEvent],
    ) -> Result<SynchronizedBehaviorPlan> {
        let candidates: Vec<(BehaviorEvent, Option<f64>)> = request
            .candidates()
            .enumerate()
            .map(|(i, (_, candidate))| {
                let intensity = candidate
                    .intensity
                    .unwrap_or(self.tables.timing(candidate.behavior).base_intensity);
                let event = BehaviorEvent::new(
                    EventId(i as u32),
                    candidate.behavior,
                    candidate.start_time,
                    candidate.end_time,
                    intensity,
                );
                (event, candidate.intensity)
            })
            .collect();

        let output = self.run_stages(StageInput {
            text: &request.text,
            speech_duration_ms: request.speech_duration_ms,
            speech_context: &request.speech_context,
            movement: &request.movement_context,
            profile,
            candidates,
            markers: None,
            fixed,
            floor_ms: 0.0,
        });

        Ok(self.assemble(
            PlanId::new(),
            1,
            start_time,
            request.speech_duration_ms,
            profile.map(|p| p.region.clone()),
            request.speech_context.clone(),
            request.movement_context,
            output,
        ))
    }

    fn run_stages(&self, input: StageInput<'_>) -> StageOutput {
        // Stage 1: Speech timing markers
        let markers = match input.markers {
            Some(markers) => markers,
            None => self.analyzer.analyze_with_tempo(
                input.text,
                input.speech_duration_ms,
                input.speech_context,
                tempo(input.profile),
            ),
        };

        // Stage 2: Duration and intensity
        let sized: Vec<BehaviorEvent> = input
            .candidates
            .into_iter()
            .map(|(event, requested)| {
                let span = speech_span(&event, input.speech_duration_ms);
                let size = self
                    .calculator
                    .calculate(&event, requested, span, &markers, input.movement);
                let start = event.start_time;
                event
                    .with_timing(start, start + size.duration_ms)
                    .with_base_intensity(size.intensity)
            })
            .collect();

        // Stage 3: Synchronization
        let synced = self
            .synchronizer
            .synchronize(&sized, &markers, self.calculator.tables());
        let aligned: Vec<BehaviorEvent> = synced
            .events
            .iter()
            .map(|e| {
                if e.start_time < input.floor_ms {
                    e.clone().shifted(input.floor_ms - e.start_time)
                } else {
                    e.clone()
                }
            })
            .collect();

        // Stage 4: Conflict resolution
        let mut resolution = self.resolver.resolve_against(aligned, input.fixed);

        // Stage 5: Blending
        let (blended, blending) = self.blender.blend(&resolution.events);

        // Stage 6: Cultural adaptation
        let context = AdaptationContext::from(input.speech_context);
        let cultural = self.adapter.adapt(blended, input.profile, &context);

        // Stage 7: Finalize
        let adapted_layout = cultural.events.clone();
        let admit = |behavior: BehaviorType| {
            input
                .profile
                .map_or(true, |profile| profile.is_allowed(behavior, &context))
        };
        let settled = self.resolver.settle_within(cultural.events, input.fixed, &admit);
        resolution.absorb(settled);

        let mut filtered = cultural.filtered;
        let mut events = Vec::with_capacity(resolution.events.len());
        for event in std::mem::take(&mut resolution.events) {
            if !self.sensitivity.allows(event.behavior) {
                filtered.push(FilteredBehavior {
                    event: event.id,
                    behavior: event.behavior,
                    reason: FilterReason::MotionSensitivity,
                });
                continue;
            }
            let factor = self.sensitivity.intensity_factor(event.behavior);
            events.push(if factor < 1.0 { event.scaled(factor) } else { event });
        }

        let (events, blending) = if same_layout(&adapted_layout, &events) {
            let kept: Vec<BlendingInfo> = blending
                .into_iter()
                .filter(|info| events.iter().any(|e| e.id == info.event))
                .collect();
            (events, kept)
        } else {
            self.blender.blend(&events)
        };

        let confidence = synced
            .mean_confidence()
            .unwrap_or(self.config.sync.fallback_confidence)
            * cultural.score.unwrap_or(1.0);

        debug!(
            candidates = sized.len(),
            events = events.len(),
            markers = markers.len(),
            resolved = resolution.resolved.len(),
            confidence,
            "Ran synchronization stages"
        );

        StageOutput {
            dominant_strategy: resolution.dominant_strategy(),
            diagnostics: PlanDiagnostics {
                timing_adjustments: synced.adjustments,
                alignments: synced.alignments,
                resolved_conflicts: resolution.resolved,
                unresolved_conflicts: resolution.unresolved,
                substitutions: cultural.substitutions,
                filtered,
                cultural_warnings: cultural.warnings,
                cultural_score: cultural.score,
            },
            events,
            markers,
            blending,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        id: PlanId,
        version: u32,
        start_time: f64,
        speech_duration_ms: f64,
        cultural_region: Option<String>,
        speech_context: SpeechContext,
        movement_context: MovementContext,
        output: StageOutput,
    ) -> SynchronizedBehaviorPlan {
        let last_end = output
            .events
            .iter()
            .map(|e| e.end_time)
            .fold(0.0, f64::max);
        let priority = output.events.iter().map(|e| e.priority).max().unwrap_or(0);
        let (hand_gestures, facial_expressions, head_movements) = split_by_channel(output.events);

        SynchronizedBehaviorPlan {
            id,
            version,
            start_time,
            end_time: start_time + speech_duration_ms.max(last_end),
            hand_gestures,
            facial_expressions,
            head_movements,
            priority,
            dominant_strategy: output.dominant_strategy,
            confidence: output.confidence,
            speech_duration_ms,
            cultural_region,
            speech_context,
            movement_context,
            markers: output.markers,
            blending: output.blending,
            diagnostics: output.diagnostics,
            created_at: Utc::now(),
        }
    }

    fn notify(&self, event: &PlanEvent) {
        for observer in &self.observers {
            if let Err(e) = observer.on_plan_event(event) {
                warn!(
                    error = %e,
                    kind = event.kind(),
                    plan = %event.plan_id(),
                    "Plan observer failed"
                );
            }
        }
    }
}

/// Speech span an event is sized against: its requested span, bounded by the
/// remaining utterance when there is one
fn speech_span(event: &BehaviorEvent, speech_duration_ms: f64) -> f64 {
    let requested = event.duration();
    let remaining = speech_duration_ms - event.start_time;
    if remaining > 0.0 {
        requested.min(remaining)
    } else {
        requested
    }
}

fn tempo(profile: Option<&CulturalProfile>) -> f64 {
    profile.map_or(1.0, |p| p.speech_tempo)
}

/// Whether two event lists carry the same ids with the same timing
fn same_layout(a: &[BehaviorEvent], b: &[BehaviorEvent]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.id == y.id && x.start_time == y.start_time && x.end_time == y.end_time
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CandidateBehavior;
    use crate::types::Channel;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<&'static str>>,
    }

    impl PlanObserver for Arc<Recorder> {
        fn on_plan_event(&self, event: &PlanEvent) -> Result<()> {
            self.events.lock().unwrap().push(event.kind());
            Ok(())
        }
    }

    struct Failing;

    impl PlanObserver for Failing {
        fn on_plan_event(&self, _event: &PlanEvent) -> Result<()> {
            Err(SyncError::ObserverFailed("unavailable".to_string()))
        }
    }

    fn make_test_request() -> BehaviorRequest {
        BehaviorRequest::new("Let me show you how this works today", 3000.0)
            .with_candidate(CandidateBehavior::new(BehaviorType::Descriptive, 0.0, 1200.0))
            .with_candidate(CandidateBehavior::new(BehaviorType::Smile, 0.0, 1500.0))
            .with_candidate(CandidateBehavior::new(BehaviorType::Nod, 1200.0, 1700.0))
    }

    fn assert_no_channel_overlap(plan: &SynchronizedBehaviorPlan) {
        for channel in Channel::ALL {
            let events = plan.channel(channel);
            for (i, a) in events.iter().enumerate() {
                for b in &events[i + 1..] {
                    assert!(a.overlap_with(b) <= 100.0, "{} / {}", a.id, b.id);
                }
            }
        }
    }

    #[test]
    fn test_plan_is_registered() {
        let mut coordinator = BehaviorCoordinator::default();
        let plan = coordinator.plan(&make_test_request()).unwrap();

        assert_eq!(plan.version, 1);
        assert_eq!(plan.event_count(), 3);
        assert_eq!(plan.hand_gestures.len(), 1);
        assert!((0.0..=1.0).contains(&plan.confidence));
        assert!(plan.end_time >= 3000.0);
        assert!(!plan.markers.is_empty());
        assert_eq!(plan.blending.len(), 3);
        assert!(coordinator.live_plan(plan.id).is_some());
        assert_no_channel_overlap(&plan);
    }

    #[test]
    fn test_stateless_request_is_not_registered() {
        let coordinator = BehaviorCoordinator::default();
        let plan = coordinator.synchronize_request(&make_test_request()).unwrap();
        assert_eq!(plan.event_count(), 3);
        assert!(coordinator.live_plans().is_empty());
    }

    #[test]
    fn test_invalid_request_fails_before_pipeline() {
        let mut coordinator = BehaviorCoordinator::default();
        let request = make_test_request()
            .with_candidate(CandidateBehavior::new(BehaviorType::Frown, 900.0, 400.0));
        assert!(matches!(
            coordinator.plan(&request),
            Err(SyncError::InvalidBehaviorEvent { index: 1, .. })
        ));
        assert!(coordinator.live_plans().is_empty());
    }

    #[test]
    fn test_unknown_explicit_profile_is_error() {
        let mut coordinator = BehaviorCoordinator::default();
        let request = make_test_request().with_cultural_profile("atlantis");
        assert!(matches!(
            coordinator.plan(&request),
            Err(SyncError::UnknownCulturalProfile(region)) if region == "atlantis"
        ));
    }

    #[test]
    fn test_unknown_background_passes_through() {
        let coordinator = BehaviorCoordinator::default();
        let request = make_test_request().with_speech_context(SpeechContext {
            cultural_background: Some("atlantis".to_string()),
            ..SpeechContext::default()
        });
        let plan = coordinator.synchronize_request(&request).unwrap();
        assert!(plan.cultural_region.is_none());
        assert!(plan.diagnostics.cultural_score.is_none());
    }

    #[test]
    fn test_eastern_profile_substitutes_pointing() {
        let coordinator = BehaviorCoordinator::default();
        let request = BehaviorRequest::new("Look over there", 1500.0)
            .with_candidate(
                CandidateBehavior::new(BehaviorType::Pointing, 0.0, 800.0).with_intensity(0.8),
            )
            .with_cultural_profile("eastern");
        let plan = coordinator.synchronize_request(&request).unwrap();
        assert_eq!(plan.cultural_region.as_deref(), Some("eastern"));
        assert_eq!(plan.hand_gestures.len(), 1);
        assert_eq!(plan.hand_gestures[0].behavior, BehaviorType::Descriptive);
        assert_eq!(plan.diagnostics.substitutions.len(), 1);
    }

    #[test]
    fn test_settling_never_reintroduces_restricted_types() {
        let profile = CulturalProfile::new("custom", "Custom")
            .with_restricted(BehaviorType::Wave)
            .with_substitutes(BehaviorType::Wave, vec![BehaviorType::Celebratory])
            .with_restricted(BehaviorType::Descriptive);
        let mut database = CulturalDatabase::builtin();
        database.insert(profile.clone());
        let coordinator = BehaviorCoordinator::new(
            SyncConfig::default(),
            BehaviorTables::default(),
            database,
            MotionSensitivity::Full,
        )
        .unwrap();

        // Wave becomes celebratory, which contradicts concern; its neutral
        // equivalent (descriptive) is restricted too
        let request = BehaviorRequest::new("That is wonderful news for everyone", 2500.0)
            .with_candidate(CandidateBehavior::new(BehaviorType::Wave, 0.0, 1200.0))
            .with_candidate(CandidateBehavior::new(BehaviorType::Concern, 0.0, 1500.0))
            .with_cultural_profile("custom");
        let plan = coordinator.synchronize_request(&request).unwrap();

        let context = AdaptationContext::from(&request.speech_context);
        let events = plan.events();
        for e in &events {
            assert!(profile.is_allowed(e.behavior, &context), "{} in plan", e.behavior);
        }
        for sub in &plan.diagnostics.substitutions {
            if let Some(e) = events.iter().find(|e| e.id == sub.event) {
                assert_eq!(e.behavior, sub.substitute);
                assert_eq!(e.cultural_variant.as_deref(), Some("custom:wave"));
            }
        }
        for e in events.iter().filter(|e| e.cultural_variant.is_some()) {
            assert!(plan.diagnostics.substitutions.iter().any(|s| s.event == e.id));
        }
        assert!(coordinator.resolver.detector().detect(&events).is_empty());
        assert!(plan.diagnostics.unresolved_conflicts.is_empty());
    }

    #[test]
    fn test_advance_time_evicts_and_notifies() {
        let recorder = Arc::new(Recorder::default());
        let mut coordinator = BehaviorCoordinator::default()
            .with_observer(Box::new(Arc::clone(&recorder)))
            .with_observer(Box::new(Failing));

        let plan = coordinator.plan(&make_test_request()).unwrap();
        assert!(coordinator.advance_time(1000.0).is_empty());
        assert!(coordinator.advance_time(-5.0).is_empty());

        let evicted = coordinator.advance_time(plan.end_time);
        assert_eq!(evicted, vec![plan.id]);
        assert!(coordinator.live_plan(plan.id).is_none());
        assert_eq!(*recorder.events.lock().unwrap(), vec!["created", "evicted"]);
    }

    #[test]
    fn test_new_plan_avoids_live_plan() {
        let mut coordinator = BehaviorCoordinator::default();
        let first = coordinator
            .plan(
                &BehaviorRequest::new("", 0.0)
                    .with_candidate(CandidateBehavior::new(BehaviorType::Smile, 0.0, 2000.0)),
            )
            .unwrap();
        let second = coordinator
            .plan(
                &BehaviorRequest::new("", 0.0)
                    .with_candidate(CandidateBehavior::new(BehaviorType::Focus, 0.0, 1500.0)),
            )
            .unwrap();

        let smile = &first.facial_expressions[0];
        let focus = &second.facial_expressions[0];
        let focus_start = second.start_time + focus.start_time;
        let focus_end = second.start_time + focus.end_time;
        let smile_end = first.start_time + smile.end_time;
        assert!(focus_start >= smile_end - 100.0 || focus_end <= first.start_time + smile.start_time);
    }

    #[test]
    fn test_adapt_keeps_started_events() {
        let recorder = Arc::new(Recorder::default());
        let mut coordinator =
            BehaviorCoordinator::default().with_observer(Box::new(Arc::clone(&recorder)));
        let original = coordinator.plan(&make_test_request()).unwrap();

        coordinator.advance_time(100.0);
        let update = AdaptationUpdate {
            movement_context: Some(MovementContext {
                is_question: true,
                ..Default::default()
            }),
            add: vec![CandidateBehavior::new(BehaviorType::Tilt, 2000.0, 2800.0)],
            ..Default::default()
        };
        let adapted = coordinator.adapt_live_plan(original.id, &update).unwrap();

        assert_eq!(adapted.id, original.id);
        assert_eq!(adapted.version, 2);
        assert!(adapted.movement_context.is_question);
        // Old snapshot unchanged
        assert_eq!(original.version, 1);

        for event in original.events().iter().filter(|e| e.start_time < 100.0) {
            assert!(adapted.events().contains(event), "{} was changed", event.id);
        }
        assert!(adapted.events().iter().any(|e| e.behavior == BehaviorType::Tilt));
        assert_no_channel_overlap(&adapted);
        assert_eq!(*recorder.events.lock().unwrap(), vec!["created", "adapted"]);
    }

    #[test]
    fn test_adapt_unknown_plan() {
        let mut coordinator = BehaviorCoordinator::default();
        let result = coordinator.adapt_live_plan(PlanId::new(), &AdaptationUpdate::default());
        assert!(matches!(result, Err(SyncError::UnknownPlan(_))));
    }

    #[test]
    fn test_minimal_motion_drops_shake() {
        let coordinator = BehaviorCoordinator::new(
            SyncConfig::default(),
            BehaviorTables::default(),
            CulturalDatabase::builtin(),
            MotionSensitivity::Minimal,
        )
        .unwrap();
        let request = BehaviorRequest::new("No", 700.0)
            .with_candidate(CandidateBehavior::new(BehaviorType::Shake, 0.0, 700.0));
        let plan = coordinator.synchronize_request(&request).unwrap();
        assert!(plan.head_movements.is_empty());
        assert_eq!(plan.diagnostics.filtered[0].reason, FilterReason::MotionSensitivity);
    }

    #[test]
    fn test_transition_between_live_plans() {
        let mut coordinator = BehaviorCoordinator::default();
        let a = coordinator.plan(&make_test_request()).unwrap();
        let b = coordinator.plan(&make_test_request()).unwrap();
        let steps = coordinator.transition_between(a.id, b.id, 300.0).unwrap();
        assert_eq!(steps.len(), 3);
        assert!(coordinator
            .transition_between(a.id, PlanId::new(), 300.0)
            .is_err());
    }

    #[test]
    fn test_discard_plan() {
        let mut coordinator = BehaviorCoordinator::default();
        let plan = coordinator.plan(&make_test_request()).unwrap();
        assert!(coordinator.discard_plan(plan.id).is_ok());
        assert!(coordinator.discard_plan(plan.id).is_err());
    }

    #[test]
    fn test_synchronize_behaviors_json() {
        let json = r#"{
            "text": "Great news everyone!",
            "speech_duration_ms": 1600,
            "hand_gestures": [{"type": "celebratory", "start_time": 0, "end_time": 1000}],
            "facial_expressions": [{"type": "smile", "start_time": 0, "end_time": 1600}]
        }"#;
        let plan_json = synchronize_behaviors(json).unwrap();
        let plan = SynchronizedBehaviorPlan::from_json(&plan_json).unwrap();
        assert_eq!(plan.event_count(), 2);
        assert!(synchronize_behaviors("not json").is_err());
    }
}
