//! Event payload and record types for the call journal.

use dialout_types::{CallOutcome, CallStatus};
use serde::{Deserialize, Serialize};

/// Structured event payloads for each event type.
///
/// Payloads are serialised to JSON and stored in the `payload_json`
/// column of the `call_event_log` table. Each variant corresponds to an
/// `event_type` string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallEventPayload {
    /// An outbound dial was issued.
    DialStarted {
        phone_number: String,
        room_name: String,
    },
    /// The dial attempt was rejected by the gateway.
    DialFailed {
        sip_status_code: Option<u16>,
        sip_status: Option<String>,
        message: String,
    },
    /// The callee's reported status changed.
    StatusChanged { from: CallStatus, to: CallStatus },
    /// A participant became visible in the room.
    ParticipantJoined { identity: String },
    /// The agent invoked an action.
    ActionInvoked { action: String, detail: String },
    /// The agent spoke a line (one conversational turn).
    UtteranceSpoken { text: String },
    /// A callee turn was transcribed (one conversational turn).
    TurnTranscribed { text: String },
    /// The call ended. Exactly one per call.
    CallEnded { outcome: CallOutcome },
}

impl CallEventPayload {
    /// Returns the `event_type` string stored alongside the payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::DialStarted { .. } => "DIAL_STARTED",
            Self::DialFailed { .. } => "DIAL_FAILED",
            Self::StatusChanged { .. } => "STATUS_CHANGED",
            Self::ParticipantJoined { .. } => "PARTICIPANT_JOINED",
            Self::ActionInvoked { .. } => "ACTION_INVOKED",
            Self::UtteranceSpoken { .. } => "UTTERANCE_SPOKEN",
            Self::TurnTranscribed { .. } => "TURN_TRANSCRIBED",
            Self::CallEnded { .. } => "CALL_ENDED",
        }
    }

    /// True for events that count as conversational turns.
    pub fn is_conversational_turn(&self) -> bool {
        matches!(
            self,
            Self::UtteranceSpoken { .. } | Self::TurnTranscribed { .. }
        )
    }
}

/// One row of the call journal as read back from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    pub id: i64,
    pub call_id: String,
    pub seq: i64,
    pub event_type: String,
    pub payload_json: String,
    pub occurred_at: String,
}

impl CallEvent {
    /// Deserialises the stored payload.
    pub fn payload(&self) -> Result<CallEventPayload, serde_json::Error> {
        serde_json::from_str(&self.payload_json)
    }
}
