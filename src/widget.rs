//! Chat widget controller.
//!
//! `ChatWidget` is the single owner of the session, the guided flow, the
//! agent gate and the display queue. UI events are handled synchronously.
//! Guided-flow output is paced through the display queue; free-form chat and
//! session notices render immediately. Network calls run as futures in
//! `in_flight` and come back as [`Completion`]s tagged with the session
//! generation they were issued under.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::agent::{AGENT_FAILED, AgentBridge, AgentOutcome, RECONNECTING, STILL_CONNECTING};
use crate::backend::{AgentReply, ChatBackend};
use crate::config::WidgetConfig;
use crate::error::ChatError;
use crate::flow::{ChatConfig, FlowEngine, Product};
use crate::render::{InputState, Render, RenderSink};
use crate::schedule::{DisplayQueue, Request, Step};
use crate::session::{SessionStart, SessionState};

pub const INIT_FAILED: &str =
    "I'm having trouble initializing the chat service. Please try again later.";
pub const CONFIG_FAILED: &str = "Sorry, I'm having trouble loading our conversation options.";
pub const CONFIG_UNREADABLE: &str = "Sorry, I couldn't read the conversation options from the server.";

/// Input from the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Open,
    Close,
    /// Text typed into the input box.
    Submit(String),
    /// A choice button was pressed.
    Select { set_id: u64, index: usize },
}

/// Snapshot of the widget's flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetStatus {
    pub session_id: Option<String>,
    pub is_chat_open: bool,
    pub is_waiting_for_response: bool,
    pub is_initializing: bool,
    pub has_user_interacted: bool,
    pub is_in_guided_flow: bool,
    pub is_product_search_active: bool,
}

/// A finished network call.
#[derive(Debug)]
enum Completion {
    SessionStarted {
        generation: u64,
        result: Result<SessionStart, ChatError>,
    },
    ConfigFetched {
        generation: u64,
        result: Result<ChatConfig, ChatError>,
    },
    Replied {
        generation: u64,
        result: Result<AgentReply, ChatError>,
    },
    Submitted {
        generation: u64,
        result: Result<(), ChatError>,
    },
    Products {
        generation: u64,
        result: Result<Vec<Product>, ChatError>,
    },
}

enum Wakeup {
    Event(Option<UiEvent>),
    Done(Completion),
    Timer,
}

pub struct ChatWidget<S> {
    backend: Arc<dyn ChatBackend>,
    sink: S,
    config: WidgetConfig,
    session: SessionState,
    flow: FlowEngine,
    agent: AgentBridge,
    queue: DisplayQueue,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    is_open: bool,
    has_interacted: bool,
    /// Set by a 401/404 until the replacement session is usable; a second
    /// rejection in that window does not start another session.
    reconnecting: bool,
}

impl<S: RenderSink> ChatWidget<S> {
    pub fn new(backend: Arc<dyn ChatBackend>, sink: S, config: WidgetConfig) -> Self {
        Self {
            backend,
            sink,
            flow: FlowEngine::new(config.pacing),
            config,
            session: SessionState::new(),
            agent: AgentBridge::new(),
            queue: DisplayQueue::new(),
            in_flight: FuturesUnordered::new(),
            is_open: false,
            has_interacted: false,
            reconnecting: false,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn flow(&self) -> &FlowEngine {
        &self.flow
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn status(&self) -> WidgetStatus {
        WidgetStatus {
            session_id: self.session.id().map(|id| id.to_string()),
            is_chat_open: self.is_open,
            is_waiting_for_response: self.agent.is_waiting(),
            is_initializing: self.session.is_initializing(),
            has_user_interacted: self.has_interacted,
            is_in_guided_flow: self.flow.is_in_guided_flow(),
            is_product_search_active: self.flow.is_product_search_active(),
        }
    }

    /// Apply one UI event and play whatever is ready.
    pub fn handle(&mut self, event: UiEvent) {
        debug!(event = ?event, "UI event");
        match event {
            UiEvent::Open => {
                self.is_open = true;
                self.has_interacted = true;
                if self.session.id().is_none() {
                    self.initialize();
                }
            }
            UiEvent::Close => self.is_open = false,
            UiEvent::Submit(text) => self.submit(&text),
            UiEvent::Select { set_id, index } => {
                let steps = self.flow.select(set_id, index);
                self.queue.extend(steps);
            }
        }
        self.pump();
    }

    /// Drive the display queue and in-flight requests until nothing is left.
    pub async fn settle(&mut self) {
        loop {
            self.pump();
            if self.in_flight.is_empty() {
                match self.queue.wake_at() {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => return,
                }
                continue;
            }
            let wake = self.queue.wake_at();
            let done = tokio::select! {
                done = self.in_flight.next() => done,
                _ = pause_until(wake) => None,
            };
            if let Some(done) = done {
                self.complete(done);
            }
        }
    }

    /// Run until `events` closes, then end the session.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<UiEvent>) -> S {
        loop {
            self.pump();
            let wake = self.queue.wake_at();
            let busy = !self.in_flight.is_empty();
            let wakeup = tokio::select! {
                event = events.recv() => Wakeup::Event(event),
                Some(done) = self.in_flight.next(), if busy => Wakeup::Done(done),
                _ = pause_until(wake) => Wakeup::Timer,
            };
            match wakeup {
                Wakeup::Event(Some(event)) => self.handle(event),
                Wakeup::Event(None) => break,
                Wakeup::Done(done) => self.complete(done),
                Wakeup::Timer => {}
            }
        }
        self.shutdown().await;
        self.sink
    }

    /// End the backend session (best effort) and drop pending work.
    pub async fn shutdown(&mut self) {
        self.in_flight.clear();
        if let Some(id) = self.session.id().cloned() {
            match self.backend.end_session(&id).await {
                Ok(()) => info!(session_id = %id, "Chat session closed"),
                Err(e) => warn!(session_id = %id, error = %e, "Failed to end chat session"),
            }
        }
        self.session.invalidate();
        self.agent.abandon();
    }

    // ── Input ───────────────────────────────────────────────────────

    fn submit(&mut self, raw: &str) {
        let text = raw.trim();
        if text.is_empty() {
            return;
        }
        if self.agent.is_waiting() {
            debug!("Ignoring input while a reply is pending");
            return;
        }
        if self.flow.is_product_search_active() {
            let steps = self.flow.search(text);
            self.queue.extend(steps);
        } else if self.flow.is_in_guided_flow() {
            let steps = self.flow.answer_text(text);
            self.queue.extend(steps);
        } else {
            self.send_to_agent(text);
        }
    }

    /// Free-form chat does not wait behind paced flow output.
    fn send_to_agent(&mut self, text: &str) {
        self.render_now(Render::user(text));
        self.render_now(Render::typing(true));
        if self.session.id().is_none() {
            debug!("Free-form message before a session exists; dropping it");
            self.render_now(Render::typing(false));
            self.render_now(Render::bot(STILL_CONNECTING));
            self.initialize();
            return;
        }
        self.agent.begin(self.session.generation());
        self.spawn(Request::SendMessage(text.to_string()));
    }

    fn initialize(&mut self) {
        if !self.session.begin_init() {
            debug!("Session initialization already pending");
            return;
        }
        info!(backend = self.backend.name(), "Initializing chat session");
        self.render_now(Render::Loading { on: true });
        self.spawn(Request::StartSession);
    }

    /// Drop a session the service rejected and start a new one.
    fn reconnect(&mut self) {
        warn!("Chat session expired; reconnecting");
        self.session.invalidate();
        self.backend.invalidate_credentials();
        self.reconnecting = true;
        self.render_now(Render::bot(RECONNECTING));
        self.initialize();
    }

    // ── Queue and requests ──────────────────────────────────────────

    /// Render ahead of anything still paused in the queue.
    fn render_now(&mut self, update: Render) {
        self.pump();
        self.sink.render(&update);
    }

    /// Play every step that is ready now.
    fn pump(&mut self) {
        let now = Instant::now();
        while let Some(step) = self.queue.pop_ready(now) {
            match step {
                Step::Render(update) => self.sink.render(&update),
                Step::Pause(_) => {}
                Step::Then(continuation) => {
                    let steps = self.flow.resume(continuation);
                    self.queue.prepend(steps);
                }
                Step::Request(request) => self.spawn(request),
            }
        }
    }

    fn spawn(&mut self, request: Request) {
        let backend = Arc::clone(&self.backend);
        let generation = self.session.generation();
        let session = self.session.id().cloned();

        if matches!(request, Request::FetchConfig) {
            self.sink.render(&Render::typing(true));
        }

        let future = match request {
            Request::StartSession => async move {
                Completion::SessionStarted {
                    generation,
                    result: backend.start_session().await,
                }
            }
            .boxed(),
            Request::FetchConfig => async move {
                let result = match session {
                    Some(id) => backend.fetch_config(&id).await,
                    None => Err(ChatError::NoSession),
                };
                Completion::ConfigFetched { generation, result }
            }
            .boxed(),
            Request::SendMessage(text) => async move {
                let result = match session {
                    Some(id) => backend.send_message(&id, &text).await,
                    None => Err(ChatError::NoSession),
                };
                Completion::Replied { generation, result }
            }
            .boxed(),
            Request::Submit(submission) => async move {
                let result = match session {
                    Some(id) => backend.submit(&id, &submission).await,
                    None => Err(ChatError::NoSession),
                };
                Completion::Submitted { generation, result }
            }
            .boxed(),
            Request::SearchProducts(query) => async move {
                let result = match session {
                    Some(id) => backend.search_products(&id, &query).await,
                    None => Err(ChatError::NoSession),
                };
                Completion::Products { generation, result }
            }
            .boxed(),
        };
        self.in_flight.push(future);
    }

    // ── Completions ─────────────────────────────────────────────────

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::SessionStarted { generation, result } => {
                if !self.session.is_current(generation) {
                    debug!(generation, "Discarding session from a superseded generation");
                    return;
                }
                self.session_started(result);
            }
            Completion::ConfigFetched { generation, result } => {
                self.queue.extend([Render::typing(false).into()]);
                if !self.session.is_current(generation) {
                    debug!(generation, "Discarding config from a superseded generation");
                    return;
                }
                self.config_fetched(result);
            }
            Completion::Replied { generation, result } => {
                self.render_now(Render::typing(false));
                if !self.session.is_current(generation) {
                    debug!(generation, "Discarding reply from a superseded generation");
                    self.agent.abandon();
                    return;
                }
                self.replied(result);
            }
            Completion::Submitted { generation, result } => {
                let result = self.current_or_superseded(generation, result);
                if let Err(e) = &result {
                    self.expire_if_rejected(e);
                }
                let steps = self.flow.on_submitted(result);
                self.queue.extend(steps);
            }
            Completion::Products { generation, result } => {
                let result = self.current_or_superseded(generation, result);
                if let Err(e) = &result {
                    self.expire_if_rejected(e);
                }
                let steps = self.flow.on_products(result);
                self.queue.extend(steps);
            }
        }
        self.pump();
    }

    fn session_started(&mut self, result: Result<SessionStart, ChatError>) {
        self.render_now(Render::Loading { on: false });
        match result {
            Ok(start) => {
                info!(session_id = %start.session_id, "Chat session ready");
                self.session.establish(start.session_id);
                let needs_config = self.flow.config().is_none();
                if !needs_config {
                    self.reconnecting = false;
                }
                let greeting = start
                    .greeting
                    .or_else(|| self.config.welcome_message.clone());
                if let Some(greeting) = greeting {
                    self.queue.extend([
                        Render::typing(true).into(),
                        Step::Pause(self.config.pacing.greeting),
                        Render::typing(false).into(),
                        Render::bot(greeting).into(),
                    ]);
                }
                if needs_config {
                    self.queue.extend([Step::Request(Request::FetchConfig)]);
                }
            }
            Err(e) => {
                warn!(error = %e, "Chat session initialization failed");
                self.session.fail();
                self.reconnecting = false;
                self.queue.extend([
                    Render::bot(INIT_FAILED).into(),
                    Render::input(InputState::Enabled).into(),
                ]);
            }
        }
    }

    fn config_fetched(&mut self, result: Result<ChatConfig, ChatError>) {
        match result {
            Ok(config) => {
                self.reconnecting = false;
                let steps = self.flow.load(config);
                self.queue.extend(steps);
            }
            Err(e) => {
                warn!(error = %e, "Failed to load chat configuration");
                if self.expire_if_rejected(&e) {
                    return;
                }
                let message = if e.is_payload() {
                    CONFIG_UNREADABLE
                } else {
                    CONFIG_FAILED
                };
                self.queue.extend([
                    Render::bot(message).into(),
                    Render::input(InputState::Enabled).into(),
                ]);
            }
        }
    }

    fn replied(&mut self, result: Result<AgentReply, ChatError>) {
        match self.agent.finish(result) {
            AgentOutcome::Reply(text) => {
                self.reconnecting = false;
                self.render_now(Render::bot(text));
            }
            AgentOutcome::Reconnect => self.reconnect(),
            AgentOutcome::Failed => self.render_now(Render::bot(AGENT_FAILED)),
        }
    }

    /// Results the flow is waiting on must still reach it after the session
    /// was replaced, so the flow can reset.
    fn current_or_superseded<T>(
        &self,
        generation: u64,
        result: Result<T, ChatError>,
    ) -> Result<T, ChatError> {
        if self.session.is_current(generation) {
            result
        } else {
            debug!(generation, "Result from a superseded generation");
            Err(ChatError::Superseded)
        }
    }

    /// Reconnect after a 401/404. Returns true when a new session is on its
    /// way. A rejection of the replacement session only drops it; the next
    /// open or free-form message starts another.
    fn expire_if_rejected(&mut self, error: &ChatError) -> bool {
        if !error.is_session_expired() {
            return false;
        }
        if self.reconnecting {
            warn!(error = %error, "Replacement chat session rejected; giving up");
            self.session.invalidate();
            self.backend.invalidate_credentials();
            self.reconnecting = false;
            return false;
        }
        self.reconnect();
        true
    }
}

async fn pause_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
