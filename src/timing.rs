//! Speech timing analysis
//!
//! Converts an utterance and its spoken duration into an ordered list of timing
//! markers that behaviors can be anchored to.

use crate::config::TimingConfig;
use crate::types::{MarkerType, SpeechContext, SpeechTimingMarker};
use tracing::debug;

/// Punctuation that closes a phrase
const PHRASE_PUNCTUATION: [char; 6] = [',', '.', ';', ':', '?', '!'];

/// Vowel groups at which a word is considered to carry a stressed syllable
const STRESS_VOWEL_GROUPS: usize = 3;

/// Analyzer producing speech timing markers
#[derive(Debug, Clone, Default)]
pub struct SpeechTimingAnalyzer {
    config: TimingConfig,
}

impl SpeechTimingAnalyzer {
    pub fn new(config: TimingConfig) -> Self {
        Self { config }
    }

    /// Derive markers for an utterance at the neutral cultural tempo
    pub fn analyze(
        &self,
        text: &str,
        duration_ms: f64,
        context: &SpeechContext,
    ) -> Vec<SpeechTimingMarker> {
        self.analyze_with_tempo(text, duration_ms, context, 1.0)
    }

    /// Derive markers for an utterance.
    ///
    /// `cultural_tempo` scales the estimated speaking rate (1.0 = neutral).
    /// Returns an empty list for empty text or a non-positive duration.
    pub fn analyze_with_tempo(
        &self,
        text: &str,
        duration_ms: f64,
        context: &SpeechContext,
        cultural_tempo: f64,
    ) -> Vec<SpeechTimingMarker> {
        if !duration_ms.is_finite() || duration_ms <= 0.0 {
            return Vec::new();
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let tempo = if cultural_tempo.is_finite() && cultural_tempo > 0.0 {
            cultural_tempo
        } else {
            1.0
        };
        let rate = self.config.words_per_second
            * self.config.formality_multiplier(context.formality)
            * tempo;

        // Uniform slices from the estimated rate, compressed if the words would overrun
        let mut slice = 1000.0 / rate;
        if slice * words.len() as f64 > duration_ms {
            slice = duration_ms / words.len() as f64;
        }

        let mut markers = Vec::with_capacity(words.len() * 2 + self.config.pause_fractions.len());

        for (i, word) in words.iter().enumerate() {
            let ordinal = i + 1;
            let start = i as f64 * slice;
            let end = start + slice;
            let long_word = letter_count(word) > 6;

            markers.push(marker(
                MarkerType::WordBoundary,
                start,
                end,
                if long_word { 0.5 } else { 0.4 },
                word,
            ));

            if ordinal % self.config.phrase_period == 0 || word.ends_with(PHRASE_PUNCTUATION) {
                markers.push(marker(
                    MarkerType::PhraseBoundary,
                    end - slice * 0.3,
                    end,
                    0.6,
                    word,
                ));
            }

            let explicit_emphasis = word.ends_with('!') || is_shouted(word);
            if ordinal % self.config.emphasis_period == 0 || explicit_emphasis {
                markers.push(marker(
                    MarkerType::EmphasisPeak,
                    start,
                    end,
                    if explicit_emphasis { 0.9 } else { 0.8 },
                    word,
                ));
            }

            if vowel_groups(word) >= STRESS_VOWEL_GROUPS {
                markers.push(marker(
                    MarkerType::SyllableStress,
                    start + slice * 0.2,
                    start + slice * 0.45,
                    0.7,
                    word,
                ));
            }
        }

        for fraction in &self.config.pause_fractions {
            let start = duration_ms * fraction;
            if !(0.0..duration_ms).contains(&start) {
                continue;
            }
            let end = (start + self.config.pause_marker_ms).min(duration_ms);
            let mut pause = marker(MarkerType::Pause, start, end, 0.2, "");
            pause.word = None;
            markers.push(pause);
        }

        markers.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then_with(|| a.marker_type.cmp(&b.marker_type))
        });

        debug!(
            words = words.len(),
            markers = markers.len(),
            slice_ms = slice,
            "Derived speech timing markers"
        );

        markers
    }
}

fn marker(
    marker_type: MarkerType,
    start_time: f64,
    end_time: f64,
    intensity: f64,
    word: &str,
) -> SpeechTimingMarker {
    SpeechTimingMarker {
        marker_type,
        start_time,
        end_time,
        intensity,
        relevant_behaviors: marker_type.relevant_behaviors(),
        word: Some(word.to_string()),
    }
}

fn letter_count(word: &str) -> usize {
    word.chars().filter(|c| c.is_alphabetic()).count()
}

/// Words written in capitals (at least two letters) read as shouted
fn is_shouted(word: &str) -> bool {
    letter_count(word) >= 2
        && word
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase())
}

/// Rough syllable estimate: number of vowel runs
fn vowel_groups(word: &str) -> usize {
    let mut groups = 0;
    let mut in_group = false;
    for c in word.chars().flat_map(char::to_lowercase) {
        let vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if vowel && !in_group {
            groups += 1;
        }
        in_group = vowel;
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Formality;

    fn count(markers: &[SpeechTimingMarker], marker_type: MarkerType) -> usize {
        markers.iter().filter(|m| m.marker_type == marker_type).count()
    }

    #[test]
    fn test_empty_inputs_produce_no_markers() {
        let analyzer = SpeechTimingAnalyzer::default();
        let context = SpeechContext::default();
        assert!(analyzer.analyze("", 2000.0, &context).is_empty());
        assert!(analyzer.analyze("   ", 2000.0, &context).is_empty());
        assert!(analyzer.analyze("hello world", 0.0, &context).is_empty());
        assert!(analyzer.analyze("hello world", -5.0, &context).is_empty());
    }

    #[test]
    fn test_single_word_produces_markers() {
        let analyzer = SpeechTimingAnalyzer::default();
        let markers = analyzer.analyze("hi", 50.0, &SpeechContext::default());
        assert!(!markers.is_empty());
        assert_eq!(count(&markers, MarkerType::WordBoundary), 1);
    }

    #[test]
    fn test_marker_tagging() {
        let analyzer = SpeechTimingAnalyzer::default();
        let markers = analyzer.analyze(
            "Hello there, how are you today?",
            3000.0,
            &SpeechContext::default(),
        );

        assert_eq!(count(&markers, MarkerType::WordBoundary), 6);
        // "there," and "today?" by punctuation, "you" by period
        assert_eq!(count(&markers, MarkerType::PhraseBoundary), 3);
        // "how" and "today?" by period
        assert_eq!(count(&markers, MarkerType::EmphasisPeak), 2);
        assert_eq!(count(&markers, MarkerType::Pause), 3);

        // 2.5 words/s -> 400ms slices
        let second = markers
            .iter()
            .filter(|m| m.marker_type == MarkerType::WordBoundary)
            .nth(1)
            .unwrap();
        assert!((second.start_time - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_markers_sorted() {
        let analyzer = SpeechTimingAnalyzer::default();
        let markers = analyzer.analyze(
            "We really need to understand the situation before acting",
            4000.0,
            &SpeechContext::default(),
        );
        for pair in markers.windows(2) {
            assert!(pair[0].start_time <= pair[1].start_time);
        }
        assert!(count(&markers, MarkerType::SyllableStress) >= 1);
    }

    #[test]
    fn test_words_compressed_into_duration() {
        let analyzer = SpeechTimingAnalyzer::default();
        let text = "one two three four five six seven eight nine ten";
        let markers = analyzer.analyze(text, 1000.0, &SpeechContext::default());
        let last_word = markers
            .iter()
            .filter(|m| m.marker_type == MarkerType::WordBoundary)
            .last()
            .unwrap();
        assert!((last_word.end_time - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_formality_slows_rate() {
        let analyzer = SpeechTimingAnalyzer::default();
        let formal = SpeechContext {
            formality: Formality::Formal,
            ..SpeechContext::default()
        };
        let casual = SpeechContext {
            formality: Formality::Casual,
            ..SpeechContext::default()
        };
        let text = "a b";
        let formal_markers = analyzer.analyze(text, 10_000.0, &formal);
        let casual_markers = analyzer.analyze(text, 10_000.0, &casual);
        let second_start = |markers: &[SpeechTimingMarker]| {
            markers
                .iter()
                .filter(|m| m.marker_type == MarkerType::WordBoundary)
                .nth(1)
                .unwrap()
                .start_time
        };
        assert!(second_start(&formal_markers) > second_start(&casual_markers));
    }

    #[test]
    fn test_shouted_word_is_emphasis() {
        assert!(is_shouted("STOP!"));
        assert!(!is_shouted("I"));
        assert!(!is_shouted("Stop"));
        assert_eq!(vowel_groups("situation"), 3);
        assert_eq!(vowel_groups("cat"), 1);
    }
}
