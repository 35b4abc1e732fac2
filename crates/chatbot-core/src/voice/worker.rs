//! The per-call capture loop

use tokio::sync::oneshot;

use super::listener::Listen;
use crate::session::{CallSession, CallStatus};

/// What the capture worker reports to the UI
#[derive(Debug)]
pub enum VoiceEvent {
    Status(CallStatus),
    /// A recognised utterance; the worker waits until `turn_done` fires or
    /// is dropped before it listens again
    Transcript {
        text: String,
        turn_done: oneshot::Sender<()>,
    },
}

/// Listen, report, and wait for the reply, until the session stops
///
/// `emit` returns false once nobody is receiving, which ends the loop. The
/// session is only checked between turns: a capture already under way runs
/// to completion first.
pub fn run_voice_loop<L, F>(session: &CallSession, listener: &mut L, mut emit: F)
where
    L: Listen + ?Sized,
    F: FnMut(VoiceEvent) -> bool,
{
    tracing::debug!(session = session.id(), "voice loop started");

    while session.is_active() {
        if !emit(VoiceEvent::Status(CallStatus::Listening)) {
            break;
        }

        match listener.listen() {
            Ok(text) => {
                tracing::info!(session = session.id(), transcript = %text, "heard user");
                if !emit(VoiceEvent::Status(CallStatus::Processing)) {
                    break;
                }

                let (turn_done, finished) = oneshot::channel();
                if !emit(VoiceEvent::Transcript { text, turn_done }) {
                    break;
                }
                // Err means the UI dropped the turn, which also ends the wait
                let _ = finished.blocking_recv();

                if !emit(VoiceEvent::Status(CallStatus::Ready)) {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(session = session.id(), error = %e, "listening failed");
                if !emit(VoiceEvent::Status(CallStatus::Error(e.to_string()))) {
                    break;
                }
            }
        }
    }

    tracing::debug!(session = session.id(), "voice loop finished");
}
