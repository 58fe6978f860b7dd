//! Duration and intensity calculation
//!
//! Sizes each candidate behavior against the speech it accompanies. Durations are
//! always clamped into the per-type window from [`BehaviorTables`].

use crate::config::{BehaviorTables, CalculatorConfig};
use crate::types::{BehaviorEvent, EmphasisLevel, MovementContext, SpeechTimingMarker};

/// Sized duration and intensity for one event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizedBehavior {
    pub duration_ms: f64,
    pub intensity: f64,
}

/// Duration/intensity calculator
#[derive(Debug, Clone, Default)]
pub struct DurationIntensityCalculator {
    config: CalculatorConfig,
    tables: BehaviorTables,
}

impl DurationIntensityCalculator {
    pub fn new(config: CalculatorConfig, tables: BehaviorTables) -> Self {
        Self { config, tables }
    }

    pub fn tables(&self) -> &BehaviorTables {
        &self.tables
    }

    /// Compute the bounded duration and intensity of an event.
    ///
    /// `requested_intensity` overrides the table base intensity when the request
    /// carried one. `speech_duration_ms` is the span of speech the event is tied to.
    pub fn calculate(
        &self,
        event: &BehaviorEvent,
        requested_intensity: Option<f64>,
        speech_duration_ms: f64,
        markers: &[SpeechTimingMarker],
        context: &MovementContext,
    ) -> SizedBehavior {
        let timing = self.tables.timing(event.behavior);

        let duration_ms = timing.clamp_duration(self.scaled_duration(
            timing.base_duration_ms,
            speech_duration_ms,
            context,
        ));

        let base_intensity = requested_intensity.unwrap_or(timing.base_intensity);
        let speech_intensity = speech_intensity(
            event.start_time,
            event.end_time,
            markers,
            self.config.ambient_speech_energy,
        );
        let intensity = compute_intensity(
            base_intensity,
            speech_intensity,
            contextual_intensity(context),
            &self.config,
        );

        SizedBehavior {
            duration_ms,
            intensity,
        }
    }

    /// Scaled (unclamped) duration before the per-type window is applied
    fn scaled_duration(
        &self,
        base_duration_ms: f64,
        speech_duration_ms: f64,
        context: &MovementContext,
    ) -> f64 {
        let scaling = if speech_duration_ms.is_finite() && speech_duration_ms > 0.0 {
            (speech_duration_ms / base_duration_ms)
                .clamp(self.config.min_scaling, self.config.max_scaling)
        } else {
            self.config.min_scaling
        };

        let mut duration = base_duration_ms * scaling;
        duration *= match context.emphasis {
            EmphasisLevel::High => self.config.high_emphasis_factor,
            EmphasisLevel::Low => self.config.low_emphasis_factor,
            EmphasisLevel::Medium => 1.0,
        };
        if context.is_question {
            duration *= self.config.question_factor;
        }
        duration
    }
}

/// Intensity of the strongest marker overlapping `[start, end)`, or the ambient
/// speech energy when nothing overlaps
fn speech_intensity(start: f64, end: f64, markers: &[SpeechTimingMarker], ambient: f64) -> f64 {
    markers
        .iter()
        .filter(|m| m.start_time < end && start < m.end_time)
        .map(|m| m.intensity)
        .fold(None, |acc: Option<f64>, i| Some(acc.map_or(i, |a| a.max(i))))
        .unwrap_or(ambient)
}

/// Contextual intensity from emphasis level and utterance kind
///
/// Formula: `emphasis (0.3 / 0.6 / 0.9) + 0.1 if question + 0.05 if explanation`
fn contextual_intensity(context: &MovementContext) -> f64 {
    let base: f64 = match context.emphasis {
        EmphasisLevel::Low => 0.3,
        EmphasisLevel::Medium => 0.6,
        EmphasisLevel::High => 0.9,
    };
    let question = if context.is_question { 0.1 } else { 0.0 };
    let explanation = if context.is_explanation { 0.05 } else { 0.0 };
    (base + question + explanation).clamp(0.0, 1.0)
}

/// Weighted intensity combination
///
/// Formula: `0.4 * base + 0.4 * speech + 0.2 * contextual`, clamped to [0, 1]
fn compute_intensity(base: f64, speech: f64, contextual: f64, config: &CalculatorConfig) -> f64 {
    (config.base_weight * base + config.speech_weight * speech + config.context_weight * contextual)
        .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TypeTiming;
    use crate::types::{BehaviorType, EventId, MarkerType};

    fn event(behavior: BehaviorType, start: f64, end: f64) -> BehaviorEvent {
        BehaviorEvent::new(EventId(0), behavior, start, end, 0.5)
    }

    fn marker(start: f64, end: f64, intensity: f64) -> SpeechTimingMarker {
        SpeechTimingMarker {
            marker_type: MarkerType::EmphasisPeak,
            start_time: start,
            end_time: end,
            intensity,
            relevant_behaviors: MarkerType::EmphasisPeak.relevant_behaviors(),
            word: None,
        }
    }

    #[test]
    fn test_duration_scaling_is_clamped() {
        let calc = DurationIntensityCalculator::default();
        let nod = event(BehaviorType::Nod, 0.0, 500.0);
        let ctx = MovementContext::default();

        // Speech exactly the base duration -> base duration
        let sized = calc.calculate(&nod, None, 500.0, &[], &ctx);
        assert!((sized.duration_ms - 500.0).abs() < 1e-9);

        // Very long speech scales at most 2x (1000ms, the nod maximum)
        let sized = calc.calculate(&nod, None, 10_000.0, &[], &ctx);
        assert!((sized.duration_ms - 1000.0).abs() < 1e-9);

        // Very short speech scales at least 0.5x (250ms, the nod minimum)
        let sized = calc.calculate(&nod, None, 10.0, &[], &ctx);
        assert!((sized.duration_ms - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_emphasis_and_question_modifiers() {
        let calc = DurationIntensityCalculator::default();
        let smile = event(BehaviorType::Smile, 0.0, 1500.0);

        let high = MovementContext {
            emphasis: EmphasisLevel::High,
            ..Default::default()
        };
        let sized = calc.calculate(&smile, None, 1500.0, &[], &high);
        assert!((sized.duration_ms - 1800.0).abs() < 1e-9);

        let question = MovementContext {
            is_question: true,
            ..Default::default()
        };
        let sized = calc.calculate(&smile, None, 1500.0, &[], &question);
        assert!((sized.duration_ms - 1650.0).abs() < 1e-9);

        let low = MovementContext {
            emphasis: EmphasisLevel::Low,
            ..Default::default()
        };
        let sized = calc.calculate(&smile, None, 1500.0, &[], &low);
        assert!((sized.duration_ms - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_is_never_violated() {
        let tables = BehaviorTables::new()
            .with_override(
                BehaviorType::Beat,
                TypeTiming {
                    base_duration_ms: 300.0,
                    min_duration_ms: 280.0,
                    max_duration_ms: 320.0,
                    base_intensity: 0.5,
                },
            )
            .unwrap();
        let calc = DurationIntensityCalculator::new(CalculatorConfig::default(), tables);
        let beat = event(BehaviorType::Beat, 0.0, 300.0);
        for emphasis in [EmphasisLevel::Low, EmphasisLevel::Medium, EmphasisLevel::High] {
            for speech in [1.0, 300.0, 5000.0] {
                let ctx = MovementContext {
                    is_question: true,
                    is_explanation: false,
                    emphasis,
                };
                let sized = calc.calculate(&beat, None, speech, &[], &ctx);
                assert!((280.0..=320.0).contains(&sized.duration_ms));
            }
        }
    }

    #[test]
    fn test_intensity_weights() {
        let calc = DurationIntensityCalculator::default();
        let pointing = event(BehaviorType::Pointing, 0.0, 800.0);
        let ctx = MovementContext::default(); // contextual 0.6

        // Overlapping marker at 0.9: 0.4*1.0 + 0.4*0.9 + 0.2*0.6 = 0.88
        let markers = vec![marker(100.0, 300.0, 0.9), marker(2000.0, 2100.0, 0.1)];
        let sized = calc.calculate(&pointing, Some(1.0), 800.0, &markers, &ctx);
        assert!((sized.intensity - 0.88).abs() < 1e-9);

        // No overlap: ambient 0.5 -> 0.4*1.0 + 0.4*0.5 + 0.2*0.6 = 0.72
        let sized = calc.calculate(&pointing, Some(1.0), 800.0, &[], &ctx);
        assert!((sized.intensity - 0.72).abs() < 1e-9);

        // Table base (0.7) when no intensity requested: 0.28 + 0.2 + 0.12 = 0.6
        let sized = calc.calculate(&pointing, None, 800.0, &[], &ctx);
        assert!((sized.intensity - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_contextual_intensity() {
        let ctx = MovementContext {
            is_question: true,
            is_explanation: true,
            emphasis: EmphasisLevel::High,
        };
        assert!((contextual_intensity(&ctx) - 1.0).abs() < 1e-9);
        assert!((contextual_intensity(&MovementContext::default()) - 0.6).abs() < 1e-9);
    }
}
