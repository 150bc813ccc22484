//! The call orchestrator: dial → answer wait → binding → conversation.
//!
//! One `place_call` drives one outbound call to exactly one terminal
//! outcome. The conversational session is started concurrently with the
//! dial so the agent hears the callee's opening speech; the answer wait
//! is bounded and races the dial against the status monitor; the
//! post-answer binding sequence is fatal on any error, because a
//! half-established call cannot be safely resumed.

use crate::actions::{ActionOutcome, CallActions};
use crate::config::Config;
use crate::job;
use crate::monitor::{self, CallMonitor};
use dialout_records::{CallEventPayload, CallRecorder, DbPool};
use dialout_session::{
    AgentSession, InputOptions, PipelineServices, RoomAudioClient, SessionConfig, SessionEvent,
    SessionHandle,
};
use dialout_telephony::{DialRequest, DialingApi, SipParticipant, TelephonyError};
use dialout_types::{AgentIntent, CallOutcome, CallStatus, DialInfo};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Errors that prevent a call from even being attempted. Everything
/// after the dial is issued resolves to a [`CallOutcome`] instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The media room could not be created.
    #[error("telephony error: {0}")]
    Telephony(#[from] TelephonyError),
}

/// One outbound call attempt: the room, the immutable dial input, and
/// the handles bound to it over its lifetime.
pub struct CallSession {
    pub call_id: String,
    pub room_name: String,
    pub dial_info: DialInfo,
    pub started_at: chrono::DateTime<chrono::Utc>,
    callee_identity: OnceLock<String>,
    session: OnceLock<SessionHandle>,
    finished: AtomicBool,
}

impl CallSession {
    fn new(call_id: String, room_name: String, dial_info: DialInfo) -> Self {
        Self {
            call_id,
            room_name,
            dial_info,
            started_at: chrono::Utc::now(),
            callee_identity: OnceLock::new(),
            session: OnceLock::new(),
            finished: AtomicBool::new(false),
        }
    }

    /// The callee's participant identity, once assigned at dial time.
    pub fn callee_identity(&self) -> Option<&str> {
        self.callee_identity.get().map(String::as_str)
    }

    /// The conversational session handle, once bound.
    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.get()
    }

    fn set_callee_identity(&self, identity: &str) {
        // Set at most once, never reassigned.
        let _ = self.callee_identity.set(identity.to_string());
    }

    fn bind_session(&self, session: SessionHandle) {
        let _ = self.session.set(session);
    }

    /// Marks the call finished. Returns true for the first caller only:
    /// teardown runs exactly once no matter how many paths race to it.
    fn try_finish(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }
}

/// Worker phase surfaced on the local status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub phase: String,
    pub outcome: Option<CallOutcome>,
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self {
            phase: "idle".to_string(),
            outcome: None,
        }
    }
}

/// How the answer-wait phase resolved.
enum AnswerWait {
    Answered(Box<SipParticipant>),
    DialError(TelephonyError),
    StatusEnded(CallStatus),
    TimedOut,
}

/// Called with each call's room audio client as soon as it connects;
/// this is where the media transport attaches its frame bridge.
type RoomHook = Arc<dyn Fn(Arc<RoomAudioClient>) + Send + Sync>;

/// Sequences one outbound call per worker process.
pub struct CallOrchestrator {
    telephony: Arc<dyn DialingApi>,
    pipeline: PipelineServices,
    pool: DbPool,
    config: Config,
    snapshot_tx: watch::Sender<JobSnapshot>,
    room_hook: Option<RoomHook>,
}

impl CallOrchestrator {
    pub fn new(
        telephony: Arc<dyn DialingApi>,
        pipeline: PipelineServices,
        pool: DbPool,
        config: Config,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(JobSnapshot::default());
        Self {
            telephony,
            pipeline,
            pool,
            config,
            snapshot_tx,
            room_hook: None,
        }
    }

    /// Registers the media-transport hook invoked with each call's room
    /// audio client the moment it connects.
    pub fn on_room_connected(
        mut self,
        hook: impl Fn(Arc<RoomAudioClient>) + Send + Sync + 'static,
    ) -> Self {
        self.room_hook = Some(Arc::new(hook));
        self
    }

    /// Subscribes to worker phase updates (for the status endpoint).
    pub fn snapshot_receiver(&self) -> watch::Receiver<JobSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn set_phase(&self, phase: &str) {
        self.snapshot_tx.send_modify(|s| {
            s.phase = phase.to_string();
        });
    }

    /// Places one outbound call and drives it to its terminal outcome.
    ///
    /// Returns `Err` only when the call could not be attempted at all
    /// (room creation failed). A failed dial, timeout, hangup, or
    /// half-established call all resolve to a recorded outcome.
    pub async fn place_call(&self, dial_info: DialInfo) -> Result<CallOutcome, OrchestratorError> {
        let call_id = format!("call-{}", uuid::Uuid::new_v4());
        let room_name = call_id.clone();
        let recorder = CallRecorder::new(self.pool.clone(), &call_id);
        let callee_identity = self.config.livekit.callee_identity.clone();

        tracing::info!(
            call_id = %call_id,
            phone_number = %dial_info.phone_number,
            room = %room_name,
            "dialing"
        );
        self.set_phase("dialing");

        self.telephony.create_room(&room_name).await?;
        let call = CallSession::new(call_id, room_name.clone(), dial_info.clone());
        recorder
            .record(CallEventPayload::DialStarted {
                phone_number: dial_info.phone_number.clone(),
                room_name: room_name.clone(),
            })
            .await;

        // Step 1: start the room-bound session concurrently with the
        // dial. The agent must be ready to hear the callee the instant
        // the call connects, so this never waits for the dial.
        let room_io = Arc::new(RoomAudioClient::connect(
            &room_name,
            &self.config.agent.identity,
        ));
        if let Some(hook) = &self.room_hook {
            hook(room_io.clone());
        }
        let session_config = SessionConfig {
            instructions: job::agent_instructions(&self.config.agent.instructions, &dial_info),
            turn_silence: self.config.agent.turn_silence(),
        };
        let services = self.pipeline.clone();
        let session_room = room_io.clone();
        let session_task = tokio::spawn(async move {
            AgentSession::start(
                session_config,
                services,
                session_room,
                InputOptions::default(),
            )
            .await
        });

        // Arm the status monitor for the answer-wait phase.
        let status_monitor = CallMonitor::spawn(
            self.telephony.clone(),
            recorder.clone(),
            room_name.clone(),
            callee_identity.clone(),
            self.config.call.status_poll_interval(),
        );
        let mut status_rx = status_monitor.subscribe();

        // Step 2: dial with wait_until_answered, bounded by the answer
        // budget. A hangup or protocol failure observed by the monitor
        // aborts the wait immediately.
        let mut dial_request = DialRequest::new(
            &room_name,
            &dial_info.phone_number,
            &callee_identity,
        );
        dial_request.participant_name = dial_info.customer_name.clone();

        let answer = tokio::select! {
            res = tokio::time::timeout(
                self.config.call.answer_timeout(),
                self.telephony.dial(&dial_request),
            ) => match res {
                Ok(Ok(participant)) => AnswerWait::Answered(Box::new(participant)),
                Ok(Err(e)) => AnswerWait::DialError(e),
                Err(_) => AnswerWait::TimedOut,
            },
            status = monitor::wait_answer_phase_end(&mut status_rx) => {
                AnswerWait::StatusEnded(status)
            }
        };
        status_monitor.stop();

        match answer {
            AnswerWait::Answered(participant) => {
                tracing::info!(
                    sip_call_id = %participant.sip_call_id,
                    "callee answered"
                );
            }
            AnswerWait::StatusEnded(CallStatus::Active) => {
                tracing::info!("callee answered (observed by status monitor)");
            }
            AnswerWait::StatusEnded(CallStatus::Hangup) => {
                tracing::info!("callee hung up before answering, exiting job");
                let session = abort_session_start(session_task).await;
                return Ok(self
                    .conclude(&call, &recorder, session.as_ref(), CallOutcome::CalleeHangup)
                    .await);
            }
            AnswerWait::StatusEnded(_) => {
                tracing::error!("dial attempt failed at the protocol layer");
                let session = abort_session_start(session_task).await;
                return Ok(self
                    .conclude(&call, &recorder, session.as_ref(), CallOutcome::DialFailed)
                    .await);
            }
            AnswerWait::DialError(e) => {
                if let TelephonyError::Dial {
                    sip_status_code,
                    sip_status,
                    message,
                } = &e
                {
                    tracing::error!(
                        sip_status_code = ?sip_status_code,
                        sip_status = ?sip_status,
                        message = %message,
                        "dial rejected"
                    );
                    recorder
                        .record(CallEventPayload::DialFailed {
                            sip_status_code: *sip_status_code,
                            sip_status: sip_status.clone(),
                            message: message.clone(),
                        })
                        .await;
                } else {
                    tracing::error!(error = %e, "dial failed");
                    recorder
                        .record(CallEventPayload::DialFailed {
                            sip_status_code: None,
                            sip_status: None,
                            message: e.to_string(),
                        })
                        .await;
                }
                let session = abort_session_start(session_task).await;
                return Ok(self
                    .conclude(&call, &recorder, session.as_ref(), CallOutcome::DialFailed)
                    .await);
            }
            AnswerWait::TimedOut => {
                tracing::info!("session timed out waiting for an answer, exiting job");
                let session = abort_session_start(session_task).await;
                return Ok(self
                    .conclude(&call, &recorder, session.as_ref(), CallOutcome::AnswerTimeout)
                    .await);
            }
        }

        // Step 3: post-answer binding. Any failure here is fatal to the
        // job — a half-established call is torn down, not resumed.
        self.set_phase("binding");

        let (session, intents) = match session_task.await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "session failed to start");
                return Ok(self
                    .conclude(&call, &recorder, None, CallOutcome::SetupFailed)
                    .await);
            }
            Err(e) => {
                tracing::error!(error = %e, "session start task failed");
                return Ok(self
                    .conclude(&call, &recorder, None, CallOutcome::SetupFailed)
                    .await);
            }
        };
        call.bind_session(session.clone());

        if let Err(e) = self
            .telephony
            .wait_for_participant(
                &room_name,
                &callee_identity,
                self.config.call.status_poll_interval(),
                self.config.call.join_wait(),
            )
            .await
        {
            tracing::error!(error = %e, "callee participant never became visible");
            return Ok(self
                .conclude(&call, &recorder, Some(&session), CallOutcome::SetupFailed)
                .await);
        }
        recorder
            .record(CallEventPayload::ParticipantJoined {
                identity: callee_identity.clone(),
            })
            .await;

        if let Err(e) = session.set_participant(&callee_identity) {
            tracing::error!(error = %e, "failed to bind agent to callee");
            return Ok(self
                .conclude(&call, &recorder, Some(&session), CallOutcome::SetupFailed)
                .await);
        }
        call.set_callee_identity(&callee_identity);

        // Step 4: the conversation. Only the action dispatcher ends it.
        tracing::info!("user has picked up; conversation live");
        self.set_phase("in_call");

        let actions = CallActions::new(
            self.telephony.clone(),
            session.clone(),
            recorder.clone(),
            call.dial_info.clone(),
            room_name.clone(),
            self.config.agent.identity.clone(),
            self.config.livekit.transfer_identity.clone(),
            self.config.agent.transfer_instructions.clone(),
            self.config.agent.apology_instructions.clone(),
            self.config.call.join_wait(),
            self.config.call.status_poll_interval(),
        );

        let outcome = self.drive(&session, intents, &actions, &recorder).await;
        Ok(self
            .conclude(&call, &recorder, Some(&session), outcome)
            .await)
    }

    /// Drives the live conversation: journals session activity and
    /// dispatches intents until one action ends the call or the call
    /// duration bound is hit.
    async fn drive(
        &self,
        session: &SessionHandle,
        mut intents: mpsc::Receiver<AgentIntent>,
        actions: &CallActions,
        recorder: &CallRecorder,
    ) -> CallOutcome {
        let mut events = session.subscribe_events();
        let mut events_open = true;
        let deadline = tokio::time::sleep(self.config.call.max_duration());
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                // Journal session activity ahead of intent dispatch so a
                // terminal action cannot outrun the turns that led to it.
                biased;

                event = events.recv(), if events_open => match event {
                    Ok(event) => self.record_session_event(recorder, event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "session event stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        events_open = false;
                    }
                },
                maybe_intent = intents.recv() => match maybe_intent {
                    Some(intent) => match actions.dispatch(intent).await {
                        Ok(ActionOutcome::Continue) => {}
                        Ok(ActionOutcome::Terminal(outcome)) => break outcome,
                        Err(e) => {
                            tracing::error!(error = %e, "action dispatch broke the session contract");
                            break CallOutcome::SetupFailed;
                        }
                    },
                    None => {
                        tracing::warn!("intent stream ended; closing call");
                        break CallOutcome::Completed;
                    }
                },
                () = &mut deadline => {
                    tracing::warn!("maximum call duration reached; ending call");
                    break CallOutcome::Completed;
                }
            }
        };

        // Flush activity that was broadcast before the call ended, so
        // the journal holds every turn up to the terminal action.
        while let Ok(event) = events.try_recv() {
            self.record_session_event(recorder, event).await;
        }
        outcome
    }

    async fn record_session_event(&self, recorder: &CallRecorder, event: SessionEvent) {
        match event {
            SessionEvent::TurnHeard { text } => {
                recorder
                    .record(CallEventPayload::TurnTranscribed { text })
                    .await;
            }
            SessionEvent::AgentSpoke { text } => {
                recorder
                    .record(CallEventPayload::UtteranceSpoken { text })
                    .await;
            }
        }
    }

    /// Tears the call down exactly once: close the session, release the
    /// room (kept alive only when the call was ceded to a transfer
    /// target), and record the final outcome.
    async fn conclude(
        &self,
        call: &CallSession,
        recorder: &CallRecorder,
        session: Option<&SessionHandle>,
        outcome: CallOutcome,
    ) -> CallOutcome {
        if !call.try_finish() {
            return outcome;
        }
        if let Some(session) = session {
            session.close();
        }
        if outcome != CallOutcome::Transferred {
            if let Err(e) = self.telephony.delete_room(&call.room_name).await {
                tracing::warn!(error = %e, room = %call.room_name, "failed to delete room during teardown");
            }
        }
        recorder
            .record(CallEventPayload::CallEnded { outcome })
            .await;
        self.snapshot_tx.send_modify(|s| {
            s.phase = "finished".to_string();
            s.outcome = Some(outcome);
        });
        let duration_ms = (chrono::Utc::now() - call.started_at).num_milliseconds();
        tracing::info!(
            call_id = %call.call_id,
            outcome = %outcome,
            duration_ms,
            "call concluded"
        );
        outcome
    }
}

/// Stops a session-start task that lost the answer race. If the session
/// had already started, its handle is returned so teardown can close
/// it.
async fn abort_session_start(
    task: JoinHandle<Result<(SessionHandle, mpsc::Receiver<AgentIntent>), dialout_session::SessionError>>,
) -> Option<SessionHandle> {
    task.abort();
    match task.await {
        Ok(Ok((session, _intents))) => Some(session),
        _ => None,
    }
}
