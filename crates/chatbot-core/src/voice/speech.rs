//! Spoken replies
//!
//! Replies are queued to a single playback thread instead of being played
//! on whichever thread produced them. Each job reports how it ended, and
//! [`SpeechQueue::cancel`] drops everything queued or playing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use super::playback::AudioPlayback;
use super::tts::TextToSpeech;
use crate::Result;

/// Turns text into sound, blocking until playback ends
pub trait Speaker {
    /// `interrupted` turns true when the job has been cancelled
    fn speak(&mut self, text: &str, interrupted: &dyn Fn() -> bool) -> Result<()>;
}

/// Cloud TTS into the default output device
pub struct CloudSpeaker {
    tts: TextToSpeech,
    playback: AudioPlayback,
    runtime: Handle,
}

impl CloudSpeaker {
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new(tts: TextToSpeech, runtime: Handle) -> Result<Self> {
        Ok(Self {
            tts,
            playback: AudioPlayback::new()?,
            runtime,
        })
    }
}

impl Speaker for CloudSpeaker {
    fn speak(&mut self, text: &str, interrupted: &dyn Fn() -> bool) -> Result<()> {
        let audio = self.runtime.block_on(self.tts.synthesize(text))?;
        if interrupted() {
            return Ok(());
        }
        self.playback.play_mp3(&audio, interrupted)
    }
}

/// How a queued reply ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    Spoken,
    Cancelled,
    Failed,
}

struct SpeechJob {
    text: String,
    generation: u64,
    done: oneshot::Sender<SpeechOutcome>,
}

/// Handle to the playback thread; dropping it lets the thread exit
pub struct SpeechQueue {
    tx: mpsc::UnboundedSender<SpeechJob>,
    generation: Arc<AtomicU64>,
}

impl SpeechQueue {
    /// Start the playback thread
    ///
    /// `make_speaker` runs on that thread, since audio output streams must
    /// stay where they were opened. If it fails every job resolves
    /// [`SpeechOutcome::Failed`].
    pub fn spawn<F>(make_speaker: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn Speaker>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));

        let thread_generation = Arc::clone(&generation);
        let spawned = std::thread::Builder::new()
            .name("speech-playback".to_string())
            .spawn(move || playback_loop(make_speaker, rx, &thread_generation));
        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to start playback thread");
        }

        Self { tx, generation }
    }

    /// Queue `text`; the receiver resolves when it has been handled
    pub fn enqueue(&self, text: impl Into<String>) -> oneshot::Receiver<SpeechOutcome> {
        let (done, outcome) = oneshot::channel();
        let job = SpeechJob {
            text: text.into(),
            generation: self.generation.load(Ordering::Acquire),
            done,
        };

        if let Err(mpsc::error::SendError(job)) = self.tx.send(job) {
            tracing::warn!("playback thread is gone, dropping reply");
            let _ = job.done.send(SpeechOutcome::Failed);
        }
        outcome
    }

    /// Cancel everything queued so far, including the reply being played
    pub fn cancel(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(generation, "speech cancelled");
    }
}

fn playback_loop<F>(
    make_speaker: F,
    mut rx: mpsc::UnboundedReceiver<SpeechJob>,
    generation: &AtomicU64,
) where
    F: FnOnce() -> Result<Box<dyn Speaker>>,
{
    let mut speaker = match make_speaker() {
        Ok(speaker) => Some(speaker),
        Err(e) => {
            tracing::warn!(error = %e, "spoken replies unavailable");
            None
        }
    };

    while let Some(job) = rx.blocking_recv() {
        let is_stale = || generation.load(Ordering::Acquire) != job.generation;

        let outcome = if is_stale() {
            SpeechOutcome::Cancelled
        } else if let Some(speaker) = speaker.as_mut() {
            match speaker.speak(&job.text, &is_stale) {
                Ok(()) if is_stale() => SpeechOutcome::Cancelled,
                Ok(()) => SpeechOutcome::Spoken,
                Err(e) => {
                    tracing::warn!(error = %e, "speech error");
                    SpeechOutcome::Failed
                }
            }
        } else {
            SpeechOutcome::Failed
        };

        let _ = job.done.send(outcome);
    }

    tracing::debug!("playback thread finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::mpsc as std_mpsc;
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingSpeaker {
        spoken: Arc<Mutex<Vec<String>>>,
    }

    impl Speaker for RecordingSpeaker {
        fn speak(&mut self, text: &str, _interrupted: &dyn Fn() -> bool) -> Result<()> {
            if text == "fail" {
                return Err(Error::Tts("boom".to_string()));
            }
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    /// Blocks inside `speak` until released, then reports whether it was
    /// interrupted
    struct GatedSpeaker {
        started: std_mpsc::Sender<()>,
        release: std_mpsc::Receiver<()>,
    }

    impl Speaker for GatedSpeaker {
        fn speak(&mut self, _text: &str, interrupted: &dyn Fn() -> bool) -> Result<()> {
            let _ = self.started.send(());
            let _ = self.release.recv();
            assert!(interrupted());
            Ok(())
        }
    }

    #[test]
    fn test_jobs_are_spoken_in_order() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&spoken);
        let queue = SpeechQueue::spawn(move || {
            Ok(Box::new(RecordingSpeaker { spoken: recorder }) as Box<dyn Speaker>)
        });

        let first = queue.enqueue("one");
        let second = queue.enqueue("two");
        assert_eq!(first.blocking_recv().unwrap(), SpeechOutcome::Spoken);
        assert_eq!(second.blocking_recv().unwrap(), SpeechOutcome::Spoken);
        assert_eq!(*spoken.lock().unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn test_speaker_error_reports_failed() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&spoken);
        let queue = SpeechQueue::spawn(move || {
            Ok(Box::new(RecordingSpeaker { spoken: recorder }) as Box<dyn Speaker>)
        });

        assert_eq!(queue.enqueue("fail").blocking_recv().unwrap(), SpeechOutcome::Failed);
        // The queue keeps working after a failure
        assert_eq!(queue.enqueue("ok").blocking_recv().unwrap(), SpeechOutcome::Spoken);
    }

    #[test]
    fn test_missing_speaker_fails_jobs() {
        let queue = SpeechQueue::spawn(|| Err(Error::Audio("no output device available".to_string())));
        assert_eq!(queue.enqueue("hello").blocking_recv().unwrap(), SpeechOutcome::Failed);
    }

    #[test]
    fn test_cancel_interrupts_current_and_drops_queued() {
        let (started_tx, started_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel();
        let queue = SpeechQueue::spawn(move || {
            Ok(Box::new(GatedSpeaker { started: started_tx, release: release_rx }) as Box<dyn Speaker>)
        });

        let playing = queue.enqueue("long reply");
        let queued = queue.enqueue("next reply");
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        queue.cancel();
        release_tx.send(()).unwrap();

        assert_eq!(playing.blocking_recv().unwrap(), SpeechOutcome::Cancelled);
        assert_eq!(queued.blocking_recv().unwrap(), SpeechOutcome::Cancelled);
    }

    #[test]
    fn test_jobs_after_cancel_are_spoken() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&spoken);
        let queue = SpeechQueue::spawn(move || {
            Ok(Box::new(RecordingSpeaker { spoken: recorder }) as Box<dyn Speaker>)
        });

        queue.cancel();
        assert_eq!(queue.enqueue("after").blocking_recv().unwrap(), SpeechOutcome::Spoken);
        assert_eq!(*spoken.lock().unwrap(), vec!["after"]);
    }
}
