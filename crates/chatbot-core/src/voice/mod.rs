//! Voice call support
//!
//! Microphone capture with utterance endpointing, cloud STT and TTS, the
//! per-call capture worker, and the spoken-reply queue.

mod capture;
mod detector;
mod listener;
mod playback;
mod speech;
mod stt;
mod tts;
mod worker;

pub use capture::{samples_to_wav, MicCapture, SAMPLE_RATE};
pub use detector::{Detection, UtteranceDetector};
pub use listener::{Listen, MicListener};
pub use playback::{decode_mp3, AudioPlayback, DecodedAudio};
pub use speech::{CloudSpeaker, SpeechOutcome, SpeechQueue, Speaker};
pub use stt::{SpeechToText, SttProvider};
pub use tts::{TextToSpeech, TtsProvider};
pub use worker::{run_voice_loop, VoiceEvent};
