//! Utterance endpointing
//!
//! Energy based: calibrate against room noise, wait for the level to rise
//! above the threshold, then close the utterance after a pause.

use super::capture::SAMPLE_RATE;

/// Lowest energy threshold, used in a silent room
const MIN_THRESHOLD: f32 = 0.01;

/// How far above the ambient level speech has to be
const DYNAMIC_RATIO: f32 = 1.5;

/// Silence that ends an utterance (0.8 seconds)
const PAUSE_SAMPLES: usize = SAMPLE_RATE as usize * 8 / 10;

/// Voiced audio needed for an utterance to count (0.3 seconds)
const MIN_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 3 / 10;

/// Hard cap on one utterance (30 seconds)
const MAX_UTTERANCE_SAMPLES: usize = SAMPLE_RATE as usize * 30;

/// Result of feeding one chunk to the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// No speech yet
    Waiting,
    /// Inside an utterance
    Speaking,
    /// Utterance finished; call [`UtteranceDetector::take_utterance`]
    Complete,
}

#[derive(Debug)]
pub struct UtteranceDetector {
    threshold: f32,
    speaking: bool,
    buffer: Vec<f32>,
    preroll: Vec<f32>,
    silence_samples: usize,
    voiced_samples: usize,
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceDetector {
    pub fn new() -> Self {
        Self {
            threshold: MIN_THRESHOLD,
            speaking: false,
            buffer: Vec::new(),
            preroll: Vec::new(),
            silence_samples: 0,
            voiced_samples: 0,
        }
    }

    /// Set the threshold from a stretch of background noise
    pub fn calibrate(&mut self, ambient: &[f32]) {
        let energy = calculate_energy(ambient);
        self.threshold = (energy * DYNAMIC_RATIO).max(MIN_THRESHOLD);
        tracing::debug!(ambient = energy, threshold = self.threshold, "detector calibrated");
    }

    pub fn process(&mut self, chunk: &[f32]) -> Detection {
        if chunk.is_empty() {
            return if self.speaking { Detection::Speaking } else { Detection::Waiting };
        }

        let energy = calculate_energy(chunk);
        let is_speech = energy > self.threshold;

        if !self.speaking {
            if is_speech {
                self.speaking = true;
                self.buffer = std::mem::take(&mut self.preroll);
                self.buffer.extend_from_slice(chunk);
                self.silence_samples = 0;
                self.voiced_samples = chunk.len();
                tracing::trace!(energy, "speech started");
                return Detection::Speaking;
            }
            self.preroll.clear();
            self.preroll.extend_from_slice(chunk);
            return Detection::Waiting;
        }

        self.buffer.extend_from_slice(chunk);
        if is_speech {
            self.silence_samples = 0;
            self.voiced_samples += chunk.len();
        } else {
            self.silence_samples += chunk.len();
        }

        if self.buffer.len() >= MAX_UTTERANCE_SAMPLES {
            tracing::debug!(samples = self.buffer.len(), "utterance hit length cap");
            return Detection::Complete;
        }

        if self.silence_samples >= PAUSE_SAMPLES {
            if self.voiced_samples >= MIN_SPEECH_SAMPLES {
                tracing::debug!(samples = self.buffer.len(), "utterance complete");
                return Detection::Complete;
            }
            // Too short to be speech: a click or a cough
            tracing::trace!(voiced = self.voiced_samples, "discarding noise burst");
            self.reset();
            return Detection::Waiting;
        }

        Detection::Speaking
    }

    /// Take the finished utterance and go back to waiting
    pub fn take_utterance(&mut self) -> Vec<f32> {
        let utterance = std::mem::take(&mut self.buffer);
        self.reset();
        utterance
    }

    /// Forget any partial utterance; the threshold is kept
    pub fn reset(&mut self) {
        self.speaking = false;
        self.buffer.clear();
        self.preroll.clear();
        self.silence_samples = 0;
        self.voiced_samples = 0;
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 100ms chunks at 16kHz
    const CHUNK: usize = 1600;

    fn tone(amplitude: f32) -> Vec<f32> {
        (0..CHUNK)
            .map(|i| amplitude * (i as f32 * 0.2).sin())
            .collect()
    }

    fn silence() -> Vec<f32> {
        vec![0.0; CHUNK]
    }

    #[test]
    fn test_energy_calculation() {
        assert!(calculate_energy(&silence()) < 0.001);
        assert!(calculate_energy(&vec![0.5f32; 100]) > 0.4);
        assert_eq!(calculate_energy(&[]), 0.0);
    }

    #[test]
    fn test_silence_keeps_waiting() {
        let mut detector = UtteranceDetector::new();
        for _ in 0..50 {
            assert_eq!(detector.process(&silence()), Detection::Waiting);
        }
        assert!(!detector.speaking);
    }

    #[test]
    fn test_speech_then_pause_completes() {
        let mut detector = UtteranceDetector::new();
        detector.process(&silence());

        for _ in 0..5 {
            assert_eq!(detector.process(&tone(0.3)), Detection::Speaking);
        }
        // 0.7s of silence is not yet a pause
        for _ in 0..7 {
            assert_eq!(detector.process(&silence()), Detection::Speaking);
        }
        assert_eq!(detector.process(&silence()), Detection::Complete);

        let utterance = detector.take_utterance();
        // preroll + 5 voiced + 8 silent chunks
        assert_eq!(utterance.len(), CHUNK * 14);
        assert!(!detector.speaking);
    }

    #[test]
    fn test_short_burst_is_discarded() {
        let mut detector = UtteranceDetector::new();
        assert_eq!(detector.process(&tone(0.3)), Detection::Speaking);
        for _ in 0..7 {
            assert_eq!(detector.process(&silence()), Detection::Speaking);
        }
        assert_eq!(detector.process(&silence()), Detection::Waiting);
        assert!(!detector.speaking);
        assert!(detector.take_utterance().is_empty());
    }

    #[test]
    fn test_calibration_raises_threshold() {
        let mut detector = UtteranceDetector::new();
        let hum = tone(0.05);
        assert_eq!(detector.process(&hum), Detection::Speaking);

        detector.reset();
        detector.calibrate(&hum);
        assert!(detector.threshold > MIN_THRESHOLD);
        assert_eq!(detector.process(&hum), Detection::Waiting);
        assert_eq!(detector.process(&tone(0.4)), Detection::Speaking);
    }

    #[test]
    fn test_calibration_never_below_floor() {
        let mut detector = UtteranceDetector::new();
        detector.calibrate(&silence());
        assert_eq!(detector.threshold, MIN_THRESHOLD);
    }

    #[test]
    fn test_length_cap() {
        let mut detector = UtteranceDetector::new();
        let chunks = MAX_UTTERANCE_SAMPLES / CHUNK;
        for _ in 0..chunks - 1 {
            assert_eq!(detector.process(&tone(0.3)), Detection::Speaking);
        }
        assert_eq!(detector.process(&tone(0.3)), Detection::Complete);
    }
}
