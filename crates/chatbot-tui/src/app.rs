use std::collections::VecDeque;
use std::sync::Arc;

use chatbot_core::voice::{run_voice_loop, Listen, SpeechOutcome, SpeechQueue, VoiceEvent};
use chatbot_core::{CallSession, CallStatus, ChatMessage, ChatbotClient, ResponseTrimmer};
use ratatui::layout::Rect;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::tui::AppEvent;

/// Builds the microphone listener on the voice worker thread
pub type ListenerFactory = Arc<dyn Fn() -> chatbot_core::Result<Box<dyn Listen>> + Send + Sync>;

/// A message waiting for the chatbot
struct PendingQuery {
    text: String,
    /// Present for voice turns; fired once the reply has been handled
    turn_done: Option<oneshot::Sender<()>>,
}

/// A voice turn whose reply is being spoken
struct SpeakingTurn {
    outcome: oneshot::Receiver<SpeechOutcome>,
    turn_done: oneshot::Sender<()>,
}

pub struct ActiveCall {
    pub session: CallSession,
    pub status: CallStatus,
}

pub struct App {
    pub should_quit: bool,

    // Input box
    pub input: String,
    pub cursor: usize, // cursor position in chars

    // Chat history
    pub messages: Vec<ChatMessage>,
    pub loading: bool,
    pub animation_frame: u8, // 0-2 for ellipsis animation
    pub chat_scroll: u16,
    pub follow_bottom: bool,
    pub chat_height: u16,      // inner height, set during render
    pub chat_line_count: u16, // rendered lines, set during render

    // Voice call
    pub call: Option<ActiveCall>,

    // Areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub send_button: Option<Rect>,
    pub call_button: Option<Rect>,
    pub end_call_button: Option<Rect>,

    query_task: Option<JoinHandle<chatbot_core::Result<String>>>,
    in_flight_turn: Option<oneshot::Sender<()>>,
    queued: VecDeque<PendingQuery>,
    speaking: Vec<SpeakingTurn>,

    client: ChatbotClient,
    trimmer: ResponseTrimmer,
    speech: SpeechQueue,
    listener_factory: ListenerFactory,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        client: ChatbotClient,
        trimmer: ResponseTrimmer,
        speech: SpeechQueue,
        listener_factory: ListenerFactory,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            should_quit: false,

            input: String::new(),
            cursor: 0,

            messages: Vec::new(),
            loading: false,
            animation_frame: 0,
            chat_scroll: 0,
            follow_bottom: true,
            chat_height: 0,
            chat_line_count: 0,

            call: None,

            chat_area: None,
            send_button: None,
            call_button: None,
            end_call_button: None,

            query_task: None,
            in_flight_turn: None,
            queued: VecDeque::new(),
            speaking: Vec::new(),

            client,
            trimmer,
            speech,
            listener_factory,
            events,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.query_task.is_some()
    }

    pub fn is_call_active(&self) -> bool {
        self.call
            .as_ref()
            .is_some_and(|call| call.session.is_active())
    }

    /// Send whatever is in the input box
    ///
    /// Ignored while a reply is pending, leaving the text in place.
    pub fn submit_input(&mut self) {
        if self.is_busy() {
            return;
        }

        let text = self.input.trim().to_string();
        self.input.clear();
        self.cursor = 0;

        if text.is_empty() {
            return;
        }
        self.send_query(text, None);
    }

    fn send_query(&mut self, text: String, turn_done: Option<oneshot::Sender<()>>) {
        tracing::debug!(voice = turn_done.is_some(), "sending message");

        self.messages.push(ChatMessage::user(text.clone()));
        self.loading = true;
        self.follow_bottom = true;
        self.in_flight_turn = turn_done;

        let client = self.client.clone();
        self.query_task = Some(tokio::spawn(async move { client.query(&text).await }));
    }

    /// Collect the reply if the request task has finished
    pub async fn poll_query_task(&mut self) {
        let finished = self
            .query_task
            .as_ref()
            .is_some_and(JoinHandle::is_finished);
        if !finished {
            return;
        }

        if let Some(task) = self.query_task.take() {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => Err(chatbot_core::Error::Api(format!("request task failed: {e}"))),
            };
            self.finish_query(result);
        }
    }

    /// Show the reply (or the error) and start on the next queued message
    pub fn finish_query(&mut self, result: chatbot_core::Result<String>) {
        self.query_task = None;
        self.loading = false;

        let reply = match result {
            Ok(raw) => self.trimmer.trim(&raw),
            Err(e) => {
                tracing::warn!(error = %e, "chatbot query failed");
                format!("Error: {e}")
            }
        };
        self.messages.push(ChatMessage::bot(reply.clone()));
        self.follow_bottom = true;

        let turn_done = self.in_flight_turn.take();
        if self.is_call_active() {
            let outcome = self.speech.enqueue(reply);
            if let Some(turn_done) = turn_done {
                self.speaking.push(SpeakingTurn { outcome, turn_done });
            }
        }
        // Otherwise turn_done is dropped here, which releases the worker

        if let Some(next) = self.queued.pop_front() {
            self.send_query(next.text, next.turn_done);
        }
    }

    /// Release voice turns whose reply has finished playing
    pub fn poll_speech(&mut self) {
        let mut still_speaking = Vec::with_capacity(self.speaking.len());
        for mut turn in self.speaking.drain(..) {
            match turn.outcome.try_recv() {
                Err(oneshot::error::TryRecvError::Empty) => still_speaking.push(turn),
                Ok(outcome) => {
                    tracing::debug!(?outcome, "voice turn finished");
                    let _ = turn.turn_done.send(());
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    let _ = turn.turn_done.send(());
                }
            }
        }
        self.speaking = still_speaking;
    }

    pub fn start_call(&mut self) {
        if self.call.is_some() {
            return;
        }

        let session = CallSession::start();
        let worker_session = session.clone();
        let factory = Arc::clone(&self.listener_factory);
        let events = self.events.clone();

        let spawned = std::thread::Builder::new()
            .name("voice-call".to_string())
            .spawn(move || voice_worker(&worker_session, &*factory, &events));

        let status = match spawned {
            Ok(_) => CallStatus::Waiting,
            Err(e) => {
                tracing::error!(error = %e, "failed to start voice worker");
                session.stop();
                CallStatus::Error(e.to_string())
            }
        };
        self.call = Some(ActiveCall { session, status });
    }

    pub fn end_call(&mut self) {
        let Some(call) = self.call.take() else {
            return;
        };

        call.session.stop();
        self.speech.cancel();

        // Release the worker if it is waiting on a reply
        self.in_flight_turn = None;
        self.speaking.clear();
        for pending in &mut self.queued {
            pending.turn_done = None;
        }
        self.end_call_button = None;
    }

    pub fn handle_voice(&mut self, session: u64, event: VoiceEvent) {
        let Some(call) = self.call.as_mut() else {
            return;
        };
        if call.session.id() != session {
            tracing::debug!(session, "ignoring event from a finished call");
            return;
        }

        match event {
            VoiceEvent::Status(status) => call.status = status,
            VoiceEvent::Transcript { text, turn_done } => {
                if self.is_busy() {
                    self.queued.push_back(PendingQuery { text, turn_done: Some(turn_done) });
                } else {
                    self.send_query(text, Some(turn_done));
                }
            }
        }
    }

    pub fn quit(&mut self) {
        self.end_call();
        self.should_quit = true;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn max_scroll(&self) -> u16 {
        self.chat_line_count.saturating_sub(self.chat_height)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow_bottom = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(self.max_scroll());
        if self.chat_scroll >= self.max_scroll() {
            self.follow_bottom = true;
        }
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up((self.chat_height / 2).max(1));
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down((self.chat_height / 2).max(1));
    }
}

fn voice_worker(
    session: &CallSession,
    factory: &(dyn Fn() -> chatbot_core::Result<Box<dyn Listen>> + Send + Sync),
    events: &mpsc::UnboundedSender<AppEvent>,
) {
    let id = session.id();
    let emit = |event: VoiceEvent| events.send(AppEvent::Voice { session: id, event }).is_ok();

    match factory() {
        Ok(mut listener) => run_voice_loop(session, &mut *listener, emit),
        Err(e) => {
            tracing::warn!(error = %e, "voice call unavailable");
            emit(VoiceEvent::Status(CallStatus::Error(e.to_string())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbot_core::voice::Speaker;
    use chatbot_core::{ChatRole, Error};
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingSpeaker {
        spoken: Arc<Mutex<Vec<String>>>,
    }

    impl Speaker for RecordingSpeaker {
        fn speak(&mut self, text: &str, _interrupted: &dyn Fn() -> bool) -> chatbot_core::Result<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    /// Listener that never hears anything and times out slowly
    struct DeafListener;

    impl Listen for DeafListener {
        fn listen(&mut self) -> chatbot_core::Result<String> {
            std::thread::sleep(Duration::from_millis(20));
            Err(Error::ListenTimeout)
        }
    }

    struct Harness {
        app: App,
        events: mpsc::UnboundedReceiver<AppEvent>,
        spoken: Arc<Mutex<Vec<String>>>,
    }

    async fn unreachable_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/chat")
    }

    fn harness_with(endpoint: &str, factory: ListenerFactory) -> Harness {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&spoken);
        let speech = SpeechQueue::spawn(move || {
            Ok(Box::new(RecordingSpeaker { spoken: recorder }) as Box<dyn Speaker>)
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let app = App::new(
            ChatbotClient::new(endpoint, "key", "user"),
            ResponseTrimmer::default(),
            speech,
            factory,
            tx,
        );
        Harness { app, events: rx, spoken }
    }

    fn harness() -> Harness {
        harness_with(
            "http://127.0.0.1:9/chat",
            Arc::new(|| Ok(Box::new(DeafListener) as Box<dyn Listen>)),
        )
    }

    fn wait_for_speech(h: &mut Harness) {
        for _ in 0..200 {
            h.app.poll_speech();
            if h.app.speaking.is_empty() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("speech never finished");
    }

    #[tokio::test]
    async fn test_empty_input_is_ignored() {
        let mut h = harness();
        h.app.input = "   ".to_string();
        h.app.cursor = 3;

        h.app.submit_input();
        assert!(h.app.messages.is_empty());
        assert!(h.app.input.is_empty());
        assert_eq!(h.app.cursor, 0);
        assert!(!h.app.is_busy());
    }

    #[tokio::test]
    async fn test_submit_trims_and_keeps_text_while_busy() {
        let mut h = harness();
        h.app.input = "  hello  ".to_string();
        h.app.submit_input();

        assert_eq!(h.app.messages, vec![ChatMessage::user("hello")]);
        assert!(h.app.loading);
        assert!(h.app.is_busy());

        h.app.input = "second".to_string();
        h.app.submit_input();
        assert_eq!(h.app.input, "second");
        assert_eq!(h.app.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_reply_is_trimmed() {
        let mut h = harness();
        h.app.finish_query(Ok("The capital is Paris. Fallback Answer: maybe Lyon.".to_string()));

        let last = h.app.messages.last().unwrap();
        assert_eq!(last.role, ChatRole::Bot);
        assert_eq!(last.text, "The capital is Paris. Fallback Answer:");
        assert!(!h.app.loading);
    }

    #[tokio::test]
    async fn test_network_error_becomes_bot_message() {
        let endpoint = unreachable_endpoint().await;
        let mut h = harness_with(
            &endpoint,
            Arc::new(|| Ok(Box::new(DeafListener) as Box<dyn Listen>)),
        );
        h.app.input = "anyone there?".to_string();
        h.app.submit_input();

        for _ in 0..500 {
            h.app.poll_query_task().await;
            if !h.app.loading {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(!h.app.is_busy());
        let last = h.app.messages.last().unwrap();
        assert_eq!(last.role, ChatRole::Bot);
        assert!(last.text.starts_with("Error: "), "got {:?}", last.text);

        // The chat keeps working afterwards
        h.app.input = "retry".to_string();
        h.app.submit_input();
        assert!(h.app.is_busy());
    }

    #[tokio::test]
    async fn test_replies_are_spoken_only_during_a_call() {
        let mut h = harness();
        h.app.finish_query(Ok("not spoken".to_string()));

        h.app.start_call();
        h.app.finish_query(Ok("spoken".to_string()));

        let queue_drained = h.app.speech.enqueue("marker");
        let _ = tokio::time::timeout(Duration::from_secs(5), queue_drained).await;
        assert_eq!(*h.spoken.lock().unwrap(), vec!["spoken", "marker"]);

        h.app.end_call();
    }

    #[tokio::test]
    async fn test_only_one_call_at_a_time() {
        let mut h = harness();
        h.app.start_call();
        let first = h.app.call.as_ref().unwrap().session.clone();

        h.app.start_call();
        assert_eq!(h.app.call.as_ref().unwrap().session.id(), first.id());
        assert_eq!(h.app.call.as_ref().unwrap().status, CallStatus::Waiting);

        h.app.end_call();
        assert!(h.app.call.is_none());
        assert!(!first.is_active());
        assert!(!h.app.is_call_active());
    }

    #[tokio::test]
    async fn test_voice_status_updates_and_stale_events() {
        let mut h = harness();
        h.app.start_call();
        let id = h.app.call.as_ref().unwrap().session.id();

        h.app.handle_voice(id, VoiceEvent::Status(CallStatus::Listening));
        assert_eq!(h.app.call.as_ref().unwrap().status, CallStatus::Listening);

        h.app.handle_voice(id + 1000, VoiceEvent::Status(CallStatus::Processing));
        assert_eq!(h.app.call.as_ref().unwrap().status, CallStatus::Listening);

        // The deaf listener reports timeouts through the event channel
        let event = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match h.events.recv().await {
                    Some(AppEvent::Voice { session, event: VoiceEvent::Status(CallStatus::Error(e)) }) => {
                        break (session, e);
                    }
                    Some(_) => continue,
                    None => panic!("event channel closed"),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(event.0, id);
        assert!(event.1.contains("timed out"));

        h.app.end_call();
    }

    #[tokio::test]
    async fn test_missing_microphone_shows_error() {
        let mut h = harness_with(
            "http://127.0.0.1:9/chat",
            Arc::new(|| Err(Error::Audio("no input device available".to_string()))),
        );
        h.app.start_call();

        let event = tokio::time::timeout(Duration::from_secs(5), h.events.recv())
            .await
            .unwrap()
            .unwrap();
        let AppEvent::Voice { session, event } = event else {
            panic!("expected a voice event");
        };
        h.app.handle_voice(session, event);

        assert_eq!(
            h.app.call.as_ref().unwrap().status.to_string(),
            "Error: audio error: no input device available"
        );
    }

    #[tokio::test]
    async fn test_voice_turns_queue_behind_pending_reply() {
        let mut h = harness();
        h.app.start_call();
        let id = h.app.call.as_ref().unwrap().session.id();

        h.app.input = "typed".to_string();
        h.app.submit_input();

        let (turn_done, mut turn_finished) = oneshot::channel();
        h.app.handle_voice(id, VoiceEvent::Transcript { text: "spoken words".to_string(), turn_done });
        // Still only the typed message; the transcript waits
        assert_eq!(h.app.messages.len(), 1);

        h.app.finish_query(Ok("reply one".to_string()));
        assert_eq!(h.app.messages.last().unwrap(), &ChatMessage::user("spoken words"));
        assert!(h.app.is_busy());

        h.app.finish_query(Ok("reply two".to_string()));
        wait_for_speech(&mut h);
        assert!(turn_finished.try_recv().is_ok());
        assert_eq!(*h.spoken.lock().unwrap(), vec!["reply one", "reply two"]);

        h.app.end_call();
    }

    #[tokio::test]
    async fn test_end_call_releases_waiting_worker() {
        let mut h = harness();
        h.app.start_call();
        let id = h.app.call.as_ref().unwrap().session.id();

        let (turn_done, mut turn_finished) = oneshot::channel();
        h.app.handle_voice(id, VoiceEvent::Transcript { text: "hi".to_string(), turn_done });
        assert!(h.app.is_busy());

        h.app.end_call();
        assert!(matches!(
            turn_finished.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_scrolling_follows_bottom() {
        let mut h = harness();
        h.app.chat_line_count = 40;
        h.app.chat_height = 10;
        h.app.chat_scroll = 30;

        h.app.scroll_up(5);
        assert_eq!(h.app.chat_scroll, 25);
        assert!(!h.app.follow_bottom);

        h.app.scroll_down(100);
        assert_eq!(h.app.chat_scroll, 30);
        assert!(h.app.follow_bottom);
    }

    #[tokio::test]
    async fn test_quit_ends_call() {
        let mut h = harness();
        h.app.start_call();
        let session = h.app.call.as_ref().unwrap().session.clone();

        h.app.quit();
        assert!(h.app.should_quit);
        assert!(!session.is_active());
    }
}
