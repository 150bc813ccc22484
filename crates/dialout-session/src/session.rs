//! The agent session: one speech pipeline bound to one call's room.

use crate::error::SessionError;
use crate::pipeline::{ChatMessage, PipelineServices};
use crate::room_io::{playout_duration, RoomAudioClient};
use crate::speech::SpeechHandle;
use dialout_types::AgentIntent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Capacity of the session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the recognized-intent channel.
const INTENT_CHANNEL_CAPACITY: usize = 16;

fn default_turn_silence() -> Duration {
    Duration::from_millis(700)
}

/// Configuration for one agent session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// System instructions seeding the agent's chat context.
    pub instructions: String,
    /// Silence span that ends the callee's turn.
    pub turn_silence: Duration,
}

impl SessionConfig {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            turn_silence: default_turn_silence(),
        }
    }
}

/// Input options for the session's room subscription.
#[derive(Debug, Clone, Copy)]
pub struct InputOptions {
    /// Subscribe to audio tracks only; a phone call has no video.
    pub audio_only: bool,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self { audio_only: true }
    }
}

/// Observable session activity, consumed by the worker for the call
/// record journal.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A callee turn was transcribed.
    TurnHeard { text: String },
    /// The agent started speaking a line.
    AgentSpoke { text: String },
}

struct SessionInner {
    services: PipelineServices,
    room: Arc<RoomAudioClient>,
    turn_silence: Duration,
    history: Mutex<Vec<ChatMessage>>,
    current: Mutex<Option<SpeechHandle>>,
    participant: OnceLock<String>,
    closed: AtomicBool,
    intent_tx: mpsc::Sender<AgentIntent>,
    event_tx: broadcast::Sender<SessionEvent>,
    loop_task: StdMutex<Option<JoinHandle<()>>>,
}

/// The running conversational session.
///
/// Created once per call, shared by the orchestrator and the action
/// dispatcher, torn down exactly once on call end.
pub struct AgentSession;

impl AgentSession {
    /// Starts the session: subscribes to room audio and spawns the
    /// pipeline loop.
    ///
    /// The inbound subscription is created before this function
    /// returns, so every frame pushed from this point onward is
    /// captured even if the pipeline loop has not been scheduled yet —
    /// session start may race the dial without losing the callee's
    /// opening speech.
    ///
    /// Returns the session handle and the stream of intents the agent
    /// recognizes mid-dialogue.
    pub async fn start(
        config: SessionConfig,
        services: PipelineServices,
        room: Arc<RoomAudioClient>,
        options: InputOptions,
    ) -> Result<(SessionHandle, mpsc::Receiver<AgentIntent>), SessionError> {
        if !room.is_connected() {
            return Err(SessionError::Room(
                "cannot start a session on a disconnected room".to_string(),
            ));
        }

        let (intent_tx, intent_rx) = mpsc::channel(INTENT_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        // Subscribe before spawning: frames arriving from here on are
        // buffered for the loop.
        let audio_rx = room.subscribe_inbound();

        tracing::info!(
            room = %room.room_name(),
            audio_only = options.audio_only,
            "starting agent session"
        );

        let inner = Arc::new(SessionInner {
            services,
            room,
            turn_silence: config.turn_silence,
            history: Mutex::new(vec![ChatMessage::system(config.instructions)]),
            current: Mutex::new(None),
            participant: OnceLock::new(),
            closed: AtomicBool::new(false),
            intent_tx,
            event_tx,
            loop_task: StdMutex::new(None),
        });

        let task = tokio::spawn(run_loop(inner.clone(), audio_rx));
        *inner.loop_task.lock().expect("loop task lock poisoned") = Some(task);

        Ok((SessionHandle { inner }, intent_rx))
    }
}

/// Cloneable handle to the running session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    /// Binds the session to the callee participant. May be called at
    /// most once.
    pub fn set_participant(&self, identity: impl Into<String>) -> Result<(), SessionError> {
        let identity = identity.into();
        match self.inner.participant.set(identity) {
            Ok(()) => {
                tracing::info!(
                    identity = self
                        .inner
                        .participant
                        .get()
                        .map(String::as_str)
                        .unwrap_or(""),
                    "agent bound to callee participant"
                );
                Ok(())
            }
            Err(_) => Err(SessionError::AlreadyBound(
                self.inner.participant.get().cloned().unwrap_or_default(),
            )),
        }
    }

    /// The bound callee identity, if binding happened.
    pub fn participant(&self) -> Option<String> {
        self.inner.participant.get().cloned()
    }

    /// The bound callee identity, failing fast when a callee-bound
    /// action runs before binding.
    pub fn require_participant(&self) -> Result<String, SessionError> {
        self.inner
            .participant
            .get()
            .cloned()
            .ok_or(SessionError::NotBound)
    }

    /// The utterance currently playing, if any.
    pub async fn current_utterance(&self) -> Option<SpeechHandle> {
        self.inner.current.lock().await.clone()
    }

    /// Speaks a fixed line into the room.
    pub async fn say(&self, text: &str) -> Result<SpeechHandle, SessionError> {
        self.inner.say(text).await
    }

    /// Injects a scripted line outside the turn-taking loop: the model
    /// composes a reply to `instructions` and the session speaks it.
    /// The returned handle completes when the utterance finishes
    /// playing.
    pub async fn generate_reply(&self, instructions: &str) -> Result<SpeechHandle, SessionError> {
        if self.inner.is_closed() {
            return Err(SessionError::Closed);
        }
        {
            let mut history = self.inner.history.lock().await;
            history.push(ChatMessage::system(instructions));
        }
        let snapshot = self.inner.history.lock().await.clone();
        let reply = self.inner.services.llm.respond(&snapshot).await?;
        if !reply.intents.is_empty() {
            tracing::warn!(
                count = reply.intents.len(),
                "scripted reply raised intents; dropping"
            );
        }
        let text = reply
            .say
            .ok_or_else(|| SessionError::Llm("model produced no reply text".to_string()))?;
        self.inner.say(&text).await
    }

    /// Subscribes to session activity events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Tears the session down: stops the pipeline loop and disconnects
    /// the agent's audio. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self
            .inner
            .loop_task
            .lock()
            .expect("loop task lock poisoned")
            .take()
        {
            task.abort();
        }
        self.inner.room.disconnect();
        tracing::info!(room = %self.inner.room.room_name(), "agent session closed");
    }
}

impl SessionInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn say(&self, text: &str) -> Result<SpeechHandle, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let pcm = self.services.tts.synthesize(text).await?;
        self.room.publish_audio(&pcm)?;

        let (handle, done_tx) = SpeechHandle::new(text.to_string());
        *self.current.lock().await = Some(handle.clone());
        self.history.lock().await.push(ChatMessage::assistant(text));
        let _ = self.event_tx.send(SessionEvent::AgentSpoke {
            text: text.to_string(),
        });

        let duration = playout_duration(pcm.len());
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = done_tx.send(true);
        });
        Ok(handle)
    }

    /// One completed callee turn: transcribe, respond, speak, surface
    /// intents.
    async fn handle_turn(&self, audio: Vec<u8>) {
        let text = match self.services.stt.transcribe(&audio).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed; dropping turn");
                return;
            }
        };
        if text.is_empty() {
            return;
        }
        tracing::debug!(text = %text, "callee turn transcribed");
        let _ = self
            .event_tx
            .send(SessionEvent::TurnHeard { text: text.clone() });
        self.history.lock().await.push(ChatMessage::user(text));

        let snapshot = self.history.lock().await.clone();
        let reply = match self.services.llm.respond(&snapshot).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "language model failed; dropping turn");
                return;
            }
        };

        let spoken = match &reply.say {
            Some(line) => match self.say(line).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to speak reply");
                    None
                }
            },
            None => None,
        };

        for intent in reply.intents {
            tracing::info!(action = intent.name(), "agent raised intent");
            if self.intent_tx.send(intent).await.is_err() {
                return;
            }
        }

        if let Some(handle) = spoken {
            handle.wait_for_playout().await;
        }
    }
}

/// The pipeline loop: gates inbound audio through VAD, detects end of
/// turn by silence, and hands completed turns to the model.
async fn run_loop(inner: Arc<SessionInner>, mut audio_rx: broadcast::Receiver<Vec<u8>>) {
    let mut buffer: Vec<u8> = Vec::new();
    let mut last_speech: Option<Instant> = None;

    loop {
        if inner.is_closed() {
            return;
        }
        match tokio::time::timeout(inner.turn_silence, audio_rx.recv()).await {
            Ok(Ok(frame)) => {
                if inner.services.vad.is_speech(&frame) {
                    buffer.extend_from_slice(&frame);
                    last_speech = Some(Instant::now());
                } else if let Some(at) = last_speech {
                    // Comfort noise keeps frames flowing; the turn still
                    // ends once the silence span elapses.
                    if at.elapsed() >= inner.turn_silence {
                        let turn = std::mem::take(&mut buffer);
                        last_speech = None;
                        inner.handle_turn(turn).await;
                    }
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                tracing::warn!(skipped, "audio pipeline lagged; frames dropped");
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => return,
            Err(_) => {
                if last_speech.is_some() && !buffer.is_empty() {
                    let turn = std::mem::take(&mut buffer);
                    last_speech = None;
                    inner.handle_turn(turn).await;
                }
            }
        }
    }
}
