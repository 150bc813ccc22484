//! The closed set of intents the conversational agent may raise.

use serde::{Deserialize, Serialize};

/// An action requested by the conversational agent mid-dialogue.
///
/// This is a closed, tagged set: the language-model layer recognizes an
/// intent in the dialogue and surfaces one of these variants with its
/// typed arguments; the worker's dispatcher executes the corresponding
/// effect on the call. There is no open-ended, name-based invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentIntent {
    /// The callee wants to end the call.
    EndCall,
    /// The callee asked for a human agent.
    TransferCall,
    /// The callee asked what times are available on a given date.
    LookUpAvailability { date: String },
    /// The callee confirmed an appointment.
    ConfirmAppointment { date: String, time: String },
    /// The agent recognized a voicemail greeting in the transcribed
    /// audio.
    DetectedAnsweringMachine,
}

impl AgentIntent {
    /// Returns the canonical action name, used for logging and the call
    /// record journal.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EndCall => "end_call",
            Self::TransferCall => "transfer_call",
            Self::LookUpAvailability { .. } => "look_up_availability",
            Self::ConfirmAppointment { .. } => "confirm_appointment",
            Self::DetectedAnsweringMachine => "detected_answering_machine",
        }
    }
}
