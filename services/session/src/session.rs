//! The session runtime.
//!
//! A single event loop owns all mutable session state: the phase machine,
//! the pacing queue, the decision engine and the conversation. Socket
//! events, affect samples, user intents and timer expiries are serialized
//! through one `tokio::select!`, so no two of them ever race on the queue.

use crate::config::Config;
use crate::connection::{ConnectionConfig, ConnectionEvent, ConnectionManager};
use crate::protocol::{ClientMessage, ServerMessage};
use anyhow::Result;
use chrono::Utc;
use kairos_core::adaptation::{AdaptationDecision, AdaptationOutcome, DecisionEngine, VariantStore};
use kairos_core::affect::AffectSample;
use kairos_core::chunk::{ChunkKind, ContentChunk};
use kairos_core::conversation::Conversation;
use kairos_core::pacing::PacingQueue;
use kairos_core::session::{Session, SessionPhase};
use kairos_core::storage::SummaryStore;
use kairos_core::summary::SessionSummary;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Sleep, sleep};
use tracing::{Instrument, debug, error, info, info_span, warn};

/// What the presentation layer can ask of the session.
#[derive(Debug, Clone)]
pub enum UserIntent {
    Ask(String),
    Pause,
    Resume,
    Finish,
    Exit,
}

/// Live stream consumed by the presentation layer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PhaseChanged(SessionPhase),
    ChunkDisplayed(ContentChunk),
    AffectUpdated(AffectSample),
    AdaptationApplied(AdaptationDecision),
    /// Transient banner; `fatal` routes the learner out of the session.
    ErrorBanner { message: String, fatal: bool },
    Completed(SessionSummary),
}

/// Lesson parameters sent with `start_lesson`.
#[derive(Debug, Clone)]
pub struct LessonRequest {
    pub topic: String,
    pub user_alias: String,
    pub difficulty: String,
    pub style: String,
    pub age: Option<u32>,
    pub language: String,
}

/// External collaborators the runtime calls through trait objects.
#[derive(Clone)]
pub struct SessionDeps {
    pub variants: Arc<dyn VariantStore>,
    pub store: Arc<dyn SummaryStore>,
}

/// Cloneable side of the runtime: intents in, events out.
pub struct SessionHandle {
    intent_tx: mpsc::Sender<UserIntent>,
    affect_tx: mpsc::Sender<AffectSample>,
    event_rx: mpsc::Receiver<SessionEvent>,
}

impl SessionHandle {
    pub async fn submit(&self, intent: UserIntent) -> Result<()> {
        self.intent_tx
            .send(intent)
            .await
            .map_err(|_| anyhow::anyhow!("session is no longer running"))
    }

    /// Sender for affect producers. Producers should `try_send` and drop on
    /// a full channel rather than block.
    pub fn affect_sender(&self) -> mpsc::Sender<AffectSample> {
        self.affect_tx.clone()
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }
}

/// Owns one lesson session from connect to teardown.
pub struct SessionRuntime {
    session: Session,
    queue: PacingQueue,
    engine: DecisionEngine,
    conversation: Conversation,
    request: LessonRequest,
    deps: SessionDeps,
    conn_cfg: ConnectionConfig,
    answer_grace: Duration,
    answer_timeout: Duration,

    intent_rx: mpsc::Receiver<UserIntent>,
    affect_rx: mpsc::Receiver<AffectSample>,
    event_tx: mpsc::Sender<SessionEvent>,

    lesson_started: bool,
    chunks_delivered: u64,
    topics_seen: Vec<String>,
    current_topic: Option<String>,

    display_timer: Option<Pin<Box<Sleep>>>,
    grace_timer: Option<Pin<Box<Sleep>>>,
    answer_timer: Option<Pin<Box<Sleep>>>,
}

impl SessionRuntime {
    /// Wires the channels; the caller drives [`SessionRuntime::run`].
    pub fn new(config: &Config, request: LessonRequest, deps: SessionDeps) -> (Self, SessionHandle) {
        let (intent_tx, intent_rx) = mpsc::channel(16);
        let (affect_tx, affect_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(64);

        let runtime = Self {
            session: Session::new(),
            queue: PacingQueue::new(),
            engine: DecisionEngine::new(deps.variants.clone(), config.confidence_threshold),
            conversation: Conversation::new(),
            request,
            deps,
            conn_cfg: ConnectionConfig {
                endpoint: config.endpoint.clone(),
                max_reconnect_attempts: config.max_reconnect_attempts,
                reconnect_delay: config.reconnect_delay,
            },
            answer_grace: config.answer_grace,
            answer_timeout: config.answer_timeout,
            intent_rx,
            affect_rx,
            event_tx,
            lesson_started: false,
            chunks_delivered: 0,
            topics_seen: Vec::new(),
            current_topic: None,
            display_timer: None,
            grace_timer: None,
            answer_timer: None,
        };
        let handle = SessionHandle {
            intent_tx,
            affect_tx,
            event_rx,
        };
        (runtime, handle)
    }

    /// Runs the session to completion. Teardown always happens, even when
    /// the loop exits with an error.
    pub async fn run(mut self) -> Result<()> {
        let span = info_span!("session", session_id = %self.session.id, topic = %self.request.topic);
        async move {
            self.transition(SessionPhase::Connecting).await?;
            let (conn, mut conn_rx) = ConnectionManager::connect(self.conn_cfg.clone());

            let result = self.drive(&conn, &mut conn_rx).await;
            if let Err(e) = &result {
                error!(error = ?e, "session loop terminated with error");
                if !self.session.phase().is_terminal() {
                    let _ = self.session.transition(SessionPhase::Failed);
                }
            }
            self.teardown(&conn).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &mut self,
        conn: &ConnectionManager,
        conn_rx: &mut mpsc::Receiver<ConnectionEvent>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                Some(intent) = self.intent_rx.recv() => {
                    self.handle_intent(intent, conn).await?;
                }
                Some(event) = conn_rx.recv() => {
                    self.handle_connection_event(event, conn).await?;
                }
                Some(sample) = self.affect_rx.recv() => {
                    self.handle_sample(sample).await?;
                }
                _ = wait(&mut self.display_timer), if self.display_timer.is_some() => {
                    self.display_timer = None;
                    self.on_display_expired().await;
                }
                _ = wait(&mut self.grace_timer), if self.grace_timer.is_some() => {
                    self.grace_timer = None;
                    self.on_grace_elapsed().await?;
                }
                _ = wait(&mut self.answer_timer), if self.answer_timer.is_some() => {
                    self.answer_timer = None;
                    self.on_answer_timeout().await?;
                }
                else => break,
            }
            if self.session.phase().is_terminal() {
                break;
            }
        }
        Ok(())
    }

    /// Unconditional teardown: timers die first so nothing fires into a
    /// torn-down session, the completion notice goes out before the
    /// disconnect, and storage failures never mask the outcome.
    async fn teardown(&mut self, conn: &ConnectionManager) {
        self.display_timer = None;
        self.grace_timer = None;
        self.answer_timer = None;
        self.affect_rx.close();
        self.intent_rx.close();

        if self.session.phase() == SessionPhase::Completed {
            let summary = self.compute_summary();
            if let Err(e) = conn
                .send(ClientMessage::SessionComplete {
                    summary: summary.clone(),
                })
                .await
            {
                warn!(error = %e, "could not deliver completion notice");
            }
            if let Err(e) = self.deps.store.save_summary(&summary).await {
                warn!(error = %e, "failed to persist session summary");
            }
            let _ = self.event_tx.send(SessionEvent::Completed(summary)).await;
        }

        conn.disconnect().await;
        info!(phase = %self.session.phase(), "session torn down");
    }

    async fn handle_intent(&mut self, intent: UserIntent, conn: &ConnectionManager) -> Result<()> {
        match intent {
            UserIntent::Ask(text) => self.handle_ask(text, conn).await?,
            UserIntent::Pause => {
                if self.session.phase() == SessionPhase::Delivering {
                    self.transition(SessionPhase::Paused).await?;
                    self.queue.pause();
                    self.display_timer = None;
                } else {
                    debug!(phase = %self.session.phase(), "pause ignored");
                }
            }
            UserIntent::Resume => {
                if self.session.phase() == SessionPhase::Paused {
                    self.transition(SessionPhase::Delivering).await?;
                    if let Some((_, delay)) = self.queue.resume() {
                        self.arm_display(delay);
                    }
                } else {
                    debug!(phase = %self.session.phase(), "resume ignored");
                }
            }
            UserIntent::Finish => {
                info!("learner finished the lesson");
                self.transition(SessionPhase::Completed).await?;
            }
            UserIntent::Exit => {
                info!("learner left the session");
                self.transition(SessionPhase::Completed).await?;
            }
        }
        Ok(())
    }

    async fn handle_ask(&mut self, text: String, conn: &ConnectionManager) -> Result<()> {
        let phase = self.session.phase();
        if !matches!(phase, SessionPhase::Delivering | SessionPhase::Paused) {
            warn!(%phase, "question rejected: lesson not underway");
            self.banner("You can ask a question once the lesson is underway.", false)
                .await;
            return Ok(());
        }

        let turn = match self.conversation.begin_question(&text) {
            Ok(turn) => turn,
            Err(e) => {
                warn!(error = %e, "question rejected");
                self.banner(&e.to_string(), false).await;
                return Ok(());
            }
        };

        if phase == SessionPhase::Delivering {
            self.queue.pause();
            self.display_timer = None;
        }
        self.transition(SessionPhase::AwaitingAnswer).await?;

        let msg = ClientMessage::UserQuestion {
            question: turn.text.clone(),
            topic: self.current_topic.clone(),
            history: self.conversation.recent(6),
        };
        if let Err(e) = conn.send(msg).await {
            // Dropped, not queued: outbound messages are not replayed (v1).
            warn!(error = %e, "question could not be sent");
        }

        let chunk = ContentChunk::new(ChunkKind::UserQuestion, turn.text);
        self.emit_chunk(chunk).await;
        self.answer_timer = Some(Box::pin(sleep(self.answer_timeout)));
        Ok(())
    }

    async fn handle_connection_event(
        &mut self,
        event: ConnectionEvent,
        conn: &ConnectionManager,
    ) -> Result<()> {
        match event {
            ConnectionEvent::StatusChanged(true) => {
                if !self.lesson_started {
                    self.lesson_started = true;
                    let msg = ClientMessage::StartLesson {
                        topic: self.request.topic.clone(),
                        user_alias: self.request.user_alias.clone(),
                        difficulty: self.request.difficulty.clone(),
                        style: self.request.style.clone(),
                        age: self.request.age,
                        language: self.request.language.clone(),
                    };
                    if let Err(e) = conn.send(msg).await {
                        warn!(error = %e, "failed to send start_lesson");
                    }
                }
            }
            ConnectionEvent::StatusChanged(false) => {
                self.banner("Connection lost. Reconnecting...", false).await;
            }
            ConnectionEvent::Fatal(err) => {
                error!(error = %err, "connection is gone for good");
                self.banner(&err.to_string(), true).await;
                if !self.session.phase().is_terminal() {
                    self.transition(SessionPhase::Failed).await?;
                }
            }
            ConnectionEvent::Message(msg) => self.handle_server_message(msg).await?,
        }
        Ok(())
    }

    async fn handle_server_message(&mut self, msg: ServerMessage) -> Result<()> {
        match msg {
            ServerMessage::LessonContent { content, topic } => {
                if let Some(topic) = topic {
                    self.note_topic(topic).await;
                }
                if self.session.phase() == SessionPhase::Connecting {
                    self.transition(SessionPhase::Delivering).await?;
                }
                self.queue.enqueue(content);
                self.advance_queue().await;
            }
            ServerMessage::TutorAnswer { text } => {
                if self.session.phase() != SessionPhase::AwaitingAnswer {
                    warn!("tutor answer arrived with no question outstanding; dropped");
                    return Ok(());
                }
                self.answer_timer = None;
                self.conversation.record_answer(&text);
                // Direct response: shown immediately, bypassing pacing.
                let chunk = ContentChunk::new(ChunkKind::TutorAnswer, text);
                self.emit_chunk(chunk).await;
                self.grace_timer = Some(Box::pin(sleep(self.answer_grace)));
            }
            ServerMessage::EmotionResult { state, confidence }
            | ServerMessage::EmotionDetected { state, confidence } => {
                self.handle_sample(AffectSample::new(state, confidence))
                    .await?;
            }
            ServerMessage::LessonSummary { message } => {
                info!(?message, "backend signalled lesson end");
                self.transition(SessionPhase::Completed).await?;
            }
            ServerMessage::Error { message } => {
                error!(%message, "backend error");
                self.banner(&message, false).await;
            }
        }
        Ok(())
    }

    async fn handle_sample(&mut self, sample: AffectSample) -> Result<()> {
        let _ = self
            .event_tx
            .send(SessionEvent::AffectUpdated(sample))
            .await;

        let target = self.queue.displaying().cloned();
        match self.engine.on_sample(sample, target.as_ref()).await {
            Some(AdaptationOutcome::Substitute { decision, variant }) => {
                info!(
                    strategy = %decision.strategy,
                    target = %decision.target_chunk,
                    "interrupting delivery to adapt content"
                );
                let was_delivering = self.session.phase() == SessionPhase::Delivering;
                if was_delivering {
                    self.transition(SessionPhase::Paused).await?;
                    self.queue.pause();
                    self.display_timer = None;
                }
                if let Some((chunk, _)) = self.queue.replace_displaying(variant) {
                    let _ = self
                        .event_tx
                        .send(SessionEvent::ChunkDisplayed(chunk))
                        .await;
                }
                let _ = self
                    .event_tx
                    .send(SessionEvent::AdaptationApplied(decision))
                    .await;
                if was_delivering {
                    self.transition(SessionPhase::Delivering).await?;
                    if let Some((_, delay)) = self.queue.resume() {
                        self.arm_display(delay);
                    }
                }
            }
            Some(AdaptationOutcome::Unchanged { decision }) => {
                info!(
                    strategy = %decision.strategy,
                    target = %decision.target_chunk,
                    "adaptation attempted but no variant is registered"
                );
            }
            None => {}
        }
        Ok(())
    }

    async fn on_display_expired(&mut self) {
        if let Some((chunk, delay)) = self.queue.on_display_expired() {
            self.chunks_delivered += 1;
            let _ = self
                .event_tx
                .send(SessionEvent::ChunkDisplayed(chunk))
                .await;
            self.arm_display(delay);
        }
    }

    async fn on_grace_elapsed(&mut self) -> Result<()> {
        if self.session.phase() == SessionPhase::AwaitingAnswer {
            self.transition(SessionPhase::Delivering).await?;
            if let Some((_, delay)) = self.queue.resume() {
                self.arm_display(delay);
            }
        }
        Ok(())
    }

    async fn on_answer_timeout(&mut self) -> Result<()> {
        if self.session.phase() != SessionPhase::AwaitingAnswer {
            return Ok(());
        }
        warn!("tutor answer never arrived; resuming delivery");
        self.conversation.abandon_question();
        self.banner("The tutor did not answer in time. The lesson continues.", false)
            .await;
        self.transition(SessionPhase::Delivering).await?;
        if let Some((_, delay)) = self.queue.resume() {
            self.arm_display(delay);
        }
        Ok(())
    }

    async fn advance_queue(&mut self) {
        if let Some((chunk, delay)) = self.queue.advance_if_idle() {
            self.chunks_delivered += 1;
            let _ = self
                .event_tx
                .send(SessionEvent::ChunkDisplayed(chunk))
                .await;
            self.arm_display(delay);
        }
    }

    fn arm_display(&mut self, delay: Duration) {
        self.display_timer = Some(Box::pin(sleep(delay)));
    }

    async fn emit_chunk(&mut self, chunk: ContentChunk) {
        self.chunks_delivered += 1;
        let _ = self
            .event_tx
            .send(SessionEvent::ChunkDisplayed(chunk))
            .await;
    }

    async fn note_topic(&mut self, topic: String) {
        if self.current_topic.as_deref() == Some(topic.as_str()) {
            return;
        }
        if let Err(e) = self.deps.store.save_progress(self.session.id, &topic).await {
            warn!(error = %e, "failed to persist lesson progress");
        }
        info!(%topic, "entering topic");
        self.topics_seen.push(topic.clone());
        self.current_topic = Some(topic);
    }

    async fn transition(&mut self, next: SessionPhase) -> Result<()> {
        let prev = self.session.transition(next)?;
        info!(from = %prev, to = %next, "session phase changed");
        let _ = self
            .event_tx
            .send(SessionEvent::PhaseChanged(next))
            .await;
        Ok(())
    }

    async fn banner(&self, message: &str, fatal: bool) {
        let _ = self
            .event_tx
            .send(SessionEvent::ErrorBanner {
                message: message.to_string(),
                fatal,
            })
            .await;
    }

    fn compute_summary(&self) -> SessionSummary {
        SessionSummary::compute(
            &self.session,
            Utc::now(),
            self.chunks_delivered,
            self.topics_seen.clone(),
            &self.engine,
            self.conversation.question_count(),
        )
    }
}

/// Resolves when the armed timer fires; pends forever on an empty slot.
async fn wait(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
