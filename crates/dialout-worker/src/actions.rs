//! The intent action dispatcher.
//!
//! Executes the closed set of agent intents against the live call. Each
//! action is a defined transition: it may speak, it may touch the
//! telephony layer, and it may end the call by returning a terminal
//! outcome — but no action flips the call status directly, and no raw
//! transport error escapes to the conversational layer.

use dialout_records::{CallEventPayload, CallRecorder};
use dialout_session::{SessionError, SessionHandle};
use dialout_telephony::{DialRequest, DialingApi};
use dialout_types::{AgentIntent, CallOutcome, DialInfo};
use std::sync::Arc;
use std::time::Duration;

/// What a dispatched action decided about the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The conversation continues.
    Continue,
    /// The call is over; the orchestrator tears the session down with
    /// this outcome.
    Terminal(CallOutcome),
}

/// The action dispatcher for one live call.
///
/// Created only after the session is bound to the callee participant;
/// callee-bound actions fail fast if that invariant is broken.
pub struct CallActions {
    telephony: Arc<dyn DialingApi>,
    session: SessionHandle,
    recorder: CallRecorder,
    dial_info: DialInfo,
    room_name: String,
    agent_identity: String,
    transfer_identity: String,
    transfer_instructions: String,
    apology_instructions: String,
    join_wait: Duration,
    poll_interval: Duration,
}

impl CallActions {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        telephony: Arc<dyn DialingApi>,
        session: SessionHandle,
        recorder: CallRecorder,
        dial_info: DialInfo,
        room_name: String,
        agent_identity: String,
        transfer_identity: String,
        transfer_instructions: String,
        apology_instructions: String,
        join_wait: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            telephony,
            session,
            recorder,
            dial_info,
            room_name,
            agent_identity,
            transfer_identity,
            transfer_instructions,
            apology_instructions,
            join_wait,
            poll_interval,
        }
    }

    /// Dispatches one intent. Precondition violations come back as a
    /// spoken failure result, never as an escalated error; a
    /// `SessionError` here means the session contract itself was broken
    /// (e.g. an action before participant binding) and is fatal to the
    /// job.
    pub async fn dispatch(&self, intent: AgentIntent) -> Result<ActionOutcome, SessionError> {
        if self.session.is_closed() {
            tracing::warn!(action = intent.name(), "intent after session close; ignoring");
            return Ok(ActionOutcome::Continue);
        }

        self.recorder
            .record(CallEventPayload::ActionInvoked {
                action: intent.name().to_string(),
                detail: action_detail(&intent),
            })
            .await;

        match intent {
            AgentIntent::EndCall => self.end_call().await,
            AgentIntent::TransferCall => self.transfer_call().await,
            AgentIntent::LookUpAvailability { date } => self.look_up_availability(&date).await,
            AgentIntent::ConfirmAppointment { date, time } => {
                self.confirm_appointment(&date, &time).await
            }
            AgentIntent::DetectedAnsweringMachine => {
                tracing::info!("voicemail detected, hanging up");
                Ok(ActionOutcome::Terminal(CallOutcome::Voicemail))
            }
        }
    }

    /// Ends the call gracefully: the in-flight utterance finishes
    /// playing before the orchestrator deletes the room, so the agent's
    /// goodbye is never cut off.
    async fn end_call(&self) -> Result<ActionOutcome, SessionError> {
        if let Some(utterance) = self.session.current_utterance().await {
            utterance.wait_for_playout().await;
        }
        Ok(ActionOutcome::Terminal(CallOutcome::Completed))
    }

    /// Hands the callee off to a human agent.
    ///
    /// Ordering: the notice must finish playing before dialing, because
    /// the transfer dial can take seconds and the callee must not sit
    /// in silence; the agent only leaves after the transfer target has
    /// joined, so the callee is never alone in the room.
    async fn transfer_call(&self) -> Result<ActionOutcome, SessionError> {
        let Some(target) = self.dial_info.transfer_to.clone() else {
            tracing::warn!("transfer requested but no transfer target is configured");
            let _ = self.session.say("I'm sorry, I cannot transfer this call.").await;
            return Ok(ActionOutcome::Continue);
        };

        // Callee-bound action: binding must have happened.
        self.session.require_participant()?;

        match self.session.generate_reply(&self.transfer_instructions).await {
            Ok(notice) => notice.wait_for_playout().await,
            Err(e) => {
                tracing::warn!(error = %e, "failed to speak transfer notice");
                return self.recover_failed_transfer().await;
            }
        }

        if let Err(e) = self.transfer_leg(&target).await {
            tracing::error!(error = %e, "transfer failed");
            self.recorder
                .record(CallEventPayload::ActionInvoked {
                    action: "transfer_recovery".to_string(),
                    detail: e.to_string(),
                })
                .await;
            return self.recover_failed_transfer().await;
        }

        tracing::info!(room = %self.room_name, "call ceded to transfer target");
        Ok(ActionOutcome::Terminal(CallOutcome::Transferred))
    }

    /// The three-stage transfer protocol: dial, join-wait, step out.
    async fn transfer_leg(&self, target: &str) -> Result<(), dialout_telephony::TelephonyError> {
        let mut request = DialRequest::new(&self.room_name, target, &self.transfer_identity);
        request.participant_name = Some("Human agent".to_string());
        self.telephony.dial(&request).await?;

        self.telephony
            .wait_for_participant(
                &self.room_name,
                &self.transfer_identity,
                self.poll_interval,
                self.join_wait,
            )
            .await?;
        self.recorder
            .record(CallEventPayload::ParticipantJoined {
                identity: self.transfer_identity.clone(),
            })
            .await;

        self.telephony
            .remove_participant(&self.room_name, &self.agent_identity)
            .await?;
        Ok(())
    }

    /// The single recovery path for a failed transfer: one apology,
    /// then one hangup — the callee is never left connected to a
    /// half-failed transfer.
    async fn recover_failed_transfer(&self) -> Result<ActionOutcome, SessionError> {
        match self.session.generate_reply(&self.apology_instructions).await {
            Ok(apology) => apology.wait_for_playout().await,
            Err(e) => tracing::warn!(error = %e, "failed to speak transfer apology"),
        }
        Ok(ActionOutcome::Terminal(CallOutcome::TransferFailed))
    }

    /// Simulated availability lookup: deterministic slots for a date.
    async fn look_up_availability(&self, date: &str) -> Result<ActionOutcome, SessionError> {
        let slots = available_slots(date);
        let line = format!("On {date} we have {} available.", join_slots(&slots));
        if let Err(e) = self.session.say(&line).await {
            tracing::warn!(error = %e, "failed to speak availability");
        }
        Ok(ActionOutcome::Continue)
    }

    /// Records the confirmation and acknowledges it. No state beyond
    /// the journal entry and the spoken acknowledgment.
    async fn confirm_appointment(&self, date: &str, time: &str) -> Result<ActionOutcome, SessionError> {
        tracing::info!(date, time, "appointment confirmed");
        let line = format!("You're confirmed for {date} at {time}. See you then!");
        if let Err(e) = self.session.say(&line).await {
            tracing::warn!(error = %e, "failed to speak confirmation");
        }
        Ok(ActionOutcome::Continue)
    }
}

/// Candidate appointment slots for a date. Deterministic so repeated
/// lookups within a call agree with each other.
pub fn available_slots(date: &str) -> Vec<&'static str> {
    const SLOTS: [&str; 4] = ["10:00am", "11:30am", "1:30pm", "3:00pm"];
    // Rotate by date so different days offer different (stable) times.
    let offset = date.len() % SLOTS.len();
    let mut slots: Vec<&'static str> = Vec::with_capacity(3);
    for i in 0..3 {
        slots.push(SLOTS[(offset + i) % SLOTS.len()]);
    }
    slots
}

fn join_slots(slots: &[&str]) -> String {
    match slots {
        [] => "no times".to_string(),
        [only] => (*only).to_string(),
        [head @ .., last] => format!("{} and {last}", head.join(", ")),
    }
}

fn action_detail(intent: &AgentIntent) -> String {
    match intent {
        AgentIntent::LookUpAvailability { date } => format!("date={date}"),
        AgentIntent::ConfirmAppointment { date, time } => format!("date={date} time={time}"),
        _ => String::new(),
    }
}
