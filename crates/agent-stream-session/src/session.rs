//! Per-session protocol state machine.
//!
//! One spawned task owns everything mutable about a session: the transport
//! stream, the frame decoder, the task context, the question gate, and the
//! retry state. Commands arrive over a channel, so all per-session mutation
//! is single-threaded and no locking is needed. Decoded events are pushed to
//! the session's [`EventBus`] in exact decode order; connection state is
//! published through a watch channel.

use std::sync::Arc;

use agent_stream_core::{
    AnswerRequest, AnswerValue, ByteStream, ConnectionState, EventBus, EventPayload, SessionMsg,
    Sleeper, StatusSnapshot, StreamEvent, StreamTransport, TaskContext, TaskId, TokioSleeper,
    TransportError,
};
use futures::{StreamExt, stream::BoxStream};
use tokio::sync::{mpsc, oneshot, watch};

use crate::frame::FrameDecoder;
use crate::retry::{RetryPolicy, RetryState};
use crate::suspension::{SuspensionError, SuspensionGate};

/// Session error surfaced through the handle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A question is pending; answer it before submitting new input")]
    QuestionPending,
    #[error("A turn is already streaming")]
    TurnActive,
    #[error(transparent)]
    Suspension(#[from] SuspensionError),
    #[error("No session identifier known; cannot submit an answer")]
    NoSessionId,
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Session task has shut down")]
    Closed,
}

/// Configuration for a task session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Reconnection backoff policy.
    pub retry: RetryPolicy,
    /// Timer used for backoff sleeps; swap in a manual one for tests.
    pub sleeper: Arc<dyn Sleeper>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

enum Command {
    Answer {
        question_id: String,
        answer: AnswerValue,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Submit {
        prompt: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Reconnect,
    Stop,
}

/// Handle to a running task session.
///
/// Cheap to clone; the session task shuts down once every handle is dropped.
#[derive(Clone)]
pub struct SessionHandle {
    id: TaskId,
    cmd_tx: mpsc::UnboundedSender<Command>,
    bus: Arc<EventBus>,
    status_rx: watch::Receiver<StatusSnapshot>,
}

impl SessionHandle {
    /// Client-side task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// The session's message bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// All session messages: retained history first, then live updates.
    #[must_use]
    pub fn messages(&self) -> BoxStream<'static, SessionMsg> {
        self.bus.history_plus_stream()
    }

    /// Decoded stream events only, ending when the session finishes.
    #[must_use]
    pub fn events(&self) -> BoxStream<'static, StreamEvent> {
        self.bus.event_stream()
    }

    /// Watch receiver for the observable connection indicator.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_rx.clone()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status_rx.borrow().state
    }

    /// Answer the pending question through the side channel.
    ///
    /// Valid in any connection state while a question is pending; if the
    /// stream has since disconnected, the reconnect path re-establishes it.
    ///
    /// # Errors
    /// Returns an error if no matching question is pending, the answer shape
    /// is invalid, or delivery fails (the question then stays pending).
    pub async fn answer(
        &self,
        question_id: impl Into<String>,
        answer: AnswerValue,
    ) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(Command::Answer {
                question_id: question_id.into(),
                answer,
                reply,
            })
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }

    /// Submit a follow-up prompt continuing the same conversation.
    ///
    /// # Errors
    /// Rejected with [`SessionError::QuestionPending`] while a question is
    /// outstanding, or [`SessionError::TurnActive`] while a turn is still
    /// streaming.
    pub async fn submit(&self, prompt: impl Into<String>) -> Result<(), SessionError> {
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(Command::Submit {
                prompt: prompt.into(),
                reply,
            })
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }

    /// Manually re-enter the reconnection path with a fresh retry budget.
    /// Only meaningful after automatic retries have been exhausted.
    pub fn reconnect(&self) {
        let _ = self.cmd_tx.send(Command::Reconnect);
    }

    /// Stop the session: abort the transport read, cancel any pending retry,
    /// discard context and pending question. Never triggers reconnection.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Stop);
    }
}

/// Spawns task sessions.
pub struct TaskSession;

impl TaskSession {
    /// Start a session for `context`, opening the first stream immediately.
    #[must_use]
    pub fn spawn(
        transport: Arc<dyn StreamTransport>,
        context: TaskContext,
        config: SessionConfig,
    ) -> SessionHandle {
        let bus = Arc::new(EventBus::new());
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let id = TaskId::new_v4();

        let worker = SessionWorker {
            transport,
            bus: Arc::clone(&bus),
            status_tx,
            cmd_rx,
            gate: SuspensionGate::new(),
            policy: config.retry,
            retry: RetryState::new(),
            sleeper: config.sleeper,
            template: context.clone(),
            context: Some(context),
            last_session_id: None,
        };
        tokio::spawn(worker.run());

        SessionHandle {
            id,
            cmd_tx,
            bus,
            status_rx,
        }
    }
}

enum LoopStep {
    Open { reconnect: bool },
    Park { failed: bool },
    Exit,
}

enum ReadOutcome {
    Completed,
    CleanEof,
    Failed,
    Stopped,
}

enum CmdOutcome {
    Continue,
    Stopped,
}

struct SessionWorker {
    transport: Arc<dyn StreamTransport>,
    bus: Arc<EventBus>,
    status_tx: watch::Sender<StatusSnapshot>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    gate: SuspensionGate,
    policy: RetryPolicy,
    retry: RetryState,
    sleeper: Arc<dyn Sleeper>,
    /// Original submission, kept as the template for follow-up turns.
    template: TaskContext,
    /// Context of the active task attempt.
    context: Option<TaskContext>,
    /// Survives context clearing so follow-ups can continue the conversation.
    last_session_id: Option<String>,
}

impl SessionWorker {
    async fn run(mut self) {
        let mut step = LoopStep::Open { reconnect: false };
        loop {
            step = match step {
                LoopStep::Open { reconnect } => self.connect_and_stream(reconnect).await,
                LoopStep::Park { failed } => self.park(failed).await,
                LoopStep::Exit => break,
            };
        }
    }

    /// One physical connection: open, then read until it ends.
    async fn connect_and_stream(&mut self, reconnect: bool) -> LoopStep {
        let Some(request) = self.context.as_ref().map(|c| c.to_request(reconnect)) else {
            return LoopStep::Park { failed: false };
        };
        self.publish(StatusSnapshot::of(ConnectionState::Connecting));

        let transport = Arc::clone(&self.transport);
        let open = async move { transport.open(&request).await };
        tokio::pin!(open);

        let stream = loop {
            tokio::select! {
                result = &mut open => match result {
                    Ok(stream) => break stream,
                    Err(error) => {
                        tracing::warn!(%error, "failed to open stream");
                        return self.backoff().await;
                    }
                },
                cmd = self.cmd_rx.recv() => {
                    if matches!(self.handle_busy_command(cmd).await, CmdOutcome::Stopped) {
                        return LoopStep::Exit;
                    }
                }
            }
        };

        self.publish(StatusSnapshot::of(ConnectionState::Connected));
        self.retry.reset();

        match self.read_stream(stream).await {
            ReadOutcome::Completed | ReadOutcome::CleanEof => {
                self.finish_turn();
                LoopStep::Park { failed: false }
            }
            ReadOutcome::Failed => self.backoff().await,
            ReadOutcome::Stopped => LoopStep::Exit,
        }
    }

    /// Read one physical stream to its end, dispatching decoded events.
    async fn read_stream(&mut self, mut stream: ByteStream) -> ReadOutcome {
        let mut decoder = FrameDecoder::new();
        loop {
            tokio::select! {
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for event in decoder.feed(&bytes) {
                            if let Some(outcome) = self.dispatch(event) {
                                return outcome;
                            }
                        }
                    }
                    Some(Err(error)) => {
                        tracing::warn!(%error, "stream failed");
                        return ReadOutcome::Failed;
                    }
                    None => {
                        tracing::debug!("stream ended");
                        return ReadOutcome::CleanEof;
                    }
                },
                cmd = self.cmd_rx.recv() => {
                    if matches!(self.handle_busy_command(cmd).await, CmdOutcome::Stopped) {
                        return ReadOutcome::Stopped;
                    }
                }
            }
        }
    }

    /// Route one decoded event. Returns the outcome that ends the stream.
    fn dispatch(&mut self, event: StreamEvent) -> Option<ReadOutcome> {
        if let Some(session_id) = event.session_id.as_deref() {
            if let Some(context) = &mut self.context {
                context.record_session_id(session_id);
            }
            if !session_id.is_empty() {
                self.last_session_id = Some(session_id.to_string());
            }
        }

        match &event.payload {
            EventPayload::AskUserQuestion { question } => {
                match self.gate.suspend(question.clone()) {
                    Ok(()) => self.bus.push_event(event),
                    Err(error) => {
                        tracing::warn!(%error, "duplicate question rejected");
                        self.bus.push_violation(error.to_string());
                    }
                }
                None
            }
            EventPayload::Complete { .. } => {
                self.bus.push_event(event);
                Some(ReadOutcome::Completed)
            }
            // Server-reported task errors pass through unchanged.
            _ => {
                self.bus.push_event(event);
                None
            }
        }
    }

    /// Reconnection controller: schedule the next retry or give up.
    async fn backoff(&mut self) -> LoopStep {
        let Some(info) = self.retry.next(&self.policy) else {
            let attempts = self.policy.max_attempts;
            tracing::error!(attempts, "retry budget exhausted");
            self.publish(StatusSnapshot::of(ConnectionState::Disconnected));
            self.bus
                .push_fatal(format!("Connection lost; retried {attempts} times and failed"));
            return LoopStep::Park { failed: true };
        };

        tracing::debug!(
            attempt = info.attempt,
            delay_ms = info.delay.as_millis() as u64,
            "reconnecting after delay"
        );
        self.publish(StatusSnapshot::reconnecting(info));

        // The pinned sleep is the one scheduled retry for this session;
        // returning from here without completing it cancels the retry.
        let sleeper = Arc::clone(&self.sleeper);
        let delay = info.delay;
        let sleep = async move { sleeper.sleep(delay).await };
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return LoopStep::Open { reconnect: true },
                cmd = self.cmd_rx.recv() => {
                    if matches!(self.handle_busy_command(cmd).await, CmdOutcome::Stopped) {
                        return LoopStep::Exit;
                    }
                }
            }
        }
    }

    /// Wait for commands while no stream is open.
    async fn park(&mut self, failed: bool) -> LoopStep {
        loop {
            let Some(cmd) = self.cmd_rx.recv().await else {
                self.shutdown();
                return LoopStep::Exit;
            };
            match cmd {
                Command::Stop => {
                    self.shutdown();
                    return LoopStep::Exit;
                }
                Command::Reconnect => {
                    if failed {
                        self.retry.reset();
                        return LoopStep::Open { reconnect: true };
                    }
                    tracing::debug!("manual reconnect ignored; session is idle");
                }
                Command::Answer {
                    question_id,
                    answer,
                    reply,
                } => {
                    let _ = reply.send(self.do_answer(question_id, answer).await);
                }
                Command::Submit { prompt, reply } => {
                    if self.gate.is_suspended() {
                        let _ = reply.send(Err(SessionError::QuestionPending));
                    } else {
                        self.context = Some(self.follow_up_context(prompt));
                        let _ = reply.send(Ok(()));
                        return LoopStep::Open { reconnect: false };
                    }
                }
            }
        }
    }

    /// Handle a command while a stream, open attempt, or retry is in flight.
    async fn handle_busy_command(&mut self, cmd: Option<Command>) -> CmdOutcome {
        match cmd {
            None | Some(Command::Stop) => {
                self.shutdown();
                CmdOutcome::Stopped
            }
            Some(Command::Reconnect) => {
                tracing::debug!("manual reconnect ignored; session is active");
                CmdOutcome::Continue
            }
            Some(Command::Answer {
                question_id,
                answer,
                reply,
            }) => {
                let _ = reply.send(self.do_answer(question_id, answer).await);
                CmdOutcome::Continue
            }
            Some(Command::Submit { reply, .. }) => {
                let result = if self.gate.is_suspended() {
                    Err(SessionError::QuestionPending)
                } else {
                    Err(SessionError::TurnActive)
                };
                let _ = reply.send(result);
                CmdOutcome::Continue
            }
        }
    }

    /// Validate and deliver an answer; the gate reopens only on success.
    async fn do_answer(
        &mut self,
        question_id: String,
        answer: AnswerValue,
    ) -> Result<(), SessionError> {
        self.gate.validate(&question_id, &answer)?;

        let session_id = self
            .context
            .as_ref()
            .and_then(|c| c.session_id())
            .map(ToString::to_string)
            .or_else(|| self.last_session_id.clone())
            .ok_or(SessionError::NoSessionId)?;

        let request = AnswerRequest {
            session_id,
            question_id,
            answer,
        };
        self.transport.answer(&request).await?;
        self.gate.resolve();
        Ok(())
    }

    /// Clean end of a turn: clear the context, keep the conversation id.
    fn finish_turn(&mut self) {
        if let Some(context) = self.context.take() {
            if let Some(session_id) = context.session_id() {
                self.last_session_id = Some(session_id.to_string());
            }
        }
        self.publish(StatusSnapshot::of(ConnectionState::Disconnected));
    }

    /// User stop or handle drop: discard everything, close the bus.
    fn shutdown(&mut self) {
        tracing::debug!("session stopped");
        self.gate.clear();
        self.context = None;
        self.publish(StatusSnapshot::of(ConnectionState::Disconnected));
        self.bus.push_finished();
    }

    /// Follow-up turn: template parameters, new prompt, same conversation.
    fn follow_up_context(&self, prompt: String) -> TaskContext {
        let resume = self
            .context
            .as_ref()
            .and_then(|c| c.session_id())
            .map(ToString::to_string)
            .or_else(|| self.last_session_id.clone());

        let mut context = TaskContext::new(prompt).continuing(resume);
        context.working_dir = self.template.working_dir.clone();
        context.allowed_tools = self.template.allowed_tools.clone();
        context.permission_mode = self.template.permission_mode;
        context
    }

    fn publish(&self, snapshot: StatusSnapshot) {
        self.status_tx.send_replace(snapshot);
    }
}
