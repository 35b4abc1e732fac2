//! Microphone-to-text for one conversational turn

use std::time::{Duration, Instant};

use tokio::runtime::Handle;

use super::capture::{samples_to_wav, MicCapture, SAMPLE_RATE};
use super::detector::{Detection, UtteranceDetector};
use super::stt::SpeechToText;
use crate::{Error, Result};

/// How long to sample room noise before each turn
const AMBIENT_DURATION: Duration = Duration::from_secs(1);

/// Poll interval for the capture buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Produces the text of the user's next utterance, blocking until it has one
pub trait Listen {
    fn listen(&mut self) -> Result<String>;
}

/// [`Listen`] backed by the default microphone and a cloud STT service
///
/// Owns a cpal stream, so it must be created on the thread that uses it.
pub struct MicListener {
    capture: MicCapture,
    detector: UtteranceDetector,
    stt: SpeechToText,
    runtime: Handle,
    timeout: Duration,
}

impl MicListener {
    /// # Errors
    ///
    /// Returns error if the microphone cannot be opened
    pub fn new(stt: SpeechToText, runtime: Handle, timeout: Duration) -> Result<Self> {
        let mut capture = MicCapture::open()?;
        capture.resume()?;

        Ok(Self {
            capture,
            detector: UtteranceDetector::new(),
            stt,
            runtime,
            timeout,
        })
    }

    fn record_utterance(&mut self) -> Result<Vec<f32>> {
        self.capture.discard();
        std::thread::sleep(AMBIENT_DURATION);
        self.detector.calibrate(&self.capture.drain());
        self.detector.reset();

        let deadline = Instant::now() + self.timeout;
        loop {
            std::thread::sleep(POLL_INTERVAL);
            let chunk = self.capture.drain();

            match self.detector.process(&chunk) {
                Detection::Complete => return Ok(self.detector.take_utterance()),
                Detection::Waiting if Instant::now() >= deadline => {
                    self.detector.reset();
                    return Err(Error::ListenTimeout);
                }
                Detection::Waiting | Detection::Speaking => {}
            }
        }
    }
}

impl Listen for MicListener {
    fn listen(&mut self) -> Result<String> {
        let samples = self.record_utterance()?;
        tracing::debug!(samples = samples.len(), "utterance captured");

        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
        let transcript = self.runtime.block_on(self.stt.transcribe(&wav))?;

        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(Error::Stt("speech was not recognized".to_string()));
        }
        Ok(transcript.to_string())
    }
}
