//! Call lifecycle status, job outcome, and dial input types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::SIP_CALL_STATUS_ATTRIBUTE;

/// Lifecycle status of the dialed callee, derived from the participant
/// attribute snapshot reported by the SIP bridge.
///
/// The status advances monotonically toward a terminal value, except that
/// `Automation` and `Active` may each be observed multiple times before
/// the call settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Dial issued, callee participant not yet reporting a status.
    Pending,
    /// The callee's phone is ringing.
    Ringing,
    /// An automated phone tree is being navigated (DTMF extension
    /// dialing). Informational only — not a failure.
    Automation,
    /// A human or voicemail system has answered.
    Active,
    /// The callee disconnected.
    Hangup,
    /// The dial attempt errored at the protocol layer.
    Failed,
}

impl CallStatus {
    /// Classifies a participant attribute snapshot.
    ///
    /// Pure function over the latest snapshot. Unknown or absent values
    /// classify as `Pending`, so a bridge reporting a status label this
    /// worker does not know keeps the call in the waiting phase instead
    /// of being mistaken for a failure.
    pub fn classify(attributes: &HashMap<String, String>) -> CallStatus {
        Self::from_attribute(attributes.get(SIP_CALL_STATUS_ATTRIBUTE).map(String::as_str))
    }

    /// Classifies the raw `sip.callStatus` attribute value.
    pub fn from_attribute(value: Option<&str>) -> CallStatus {
        match value {
            Some("ringing") => Self::Ringing,
            Some("automation") => Self::Automation,
            Some("active") => Self::Active,
            Some("hangup") => Self::Hangup,
            // "dialing" is reported before the first ring.
            Some("dialing") | Some("") | None => Self::Pending,
            Some(_) => Self::Pending,
        }
    }

    /// True once the call is over: the callee hung up or the dial failed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Hangup | Self::Failed)
    }

    /// True when the callee (human or voicemail) has picked up.
    pub fn is_answered(self) -> bool {
        matches!(self, Self::Active)
    }

    /// True for any status that ends the wait-for-answer phase.
    pub fn ends_answer_wait(self) -> bool {
        self.is_answered() || self.is_terminal()
    }

    /// Returns the canonical string label for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ringing => "ringing",
            Self::Automation => "automation",
            Self::Active => "active",
            Self::Hangup => "hangup",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallStatus {
    type Err = ParseCallStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "ringing" => Ok(Self::Ringing),
            "automation" => Ok(Self::Automation),
            "active" => Ok(Self::Active),
            "hangup" => Ok(Self::Hangup),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseCallStatusError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown call status label.
#[derive(Debug, Clone)]
pub struct ParseCallStatusError(pub String);

impl std::fmt::Display for ParseCallStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown call status: {}", self.0)
    }
}

impl std::error::Error for ParseCallStatusError {}

/// Final outcome of a call job. Exactly one outcome is recorded per job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// Conversation finished and the agent hung up normally.
    Completed,
    /// The agent recognized a voicemail greeting and hung up.
    Voicemail,
    /// The callee was handed off to a human agent.
    Transferred,
    /// A transfer was attempted and failed; the agent apologized and
    /// hung up.
    TransferFailed,
    /// The callee hung up before or during the conversation.
    CalleeHangup,
    /// The dial attempt was rejected by the telephony layer.
    DialFailed,
    /// No answer within the configured wait budget.
    AnswerTimeout,
    /// The call answered but the post-answer binding sequence failed.
    SetupFailed,
}

impl CallOutcome {
    /// Returns the canonical string label for this outcome.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Voicemail => "voicemail",
            Self::Transferred => "transferred",
            Self::TransferFailed => "transfer_failed",
            Self::CalleeHangup => "callee_hangup",
            Self::DialFailed => "dial_failed",
            Self::AnswerTimeout => "answer_timeout",
            Self::SetupFailed => "setup_failed",
        }
    }
}

impl std::fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable input for one outbound call attempt.
///
/// Parsed from the job metadata payload before dialing begins and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialInfo {
    /// The phone number to dial.
    pub phone_number: String,

    /// Phone number of the human agent to transfer to, if configured
    /// for this job.
    #[serde(default)]
    pub transfer_to: Option<String>,

    /// Customer name used to seed the agent's instructions.
    #[serde(default)]
    pub customer_name: Option<String>,

    /// Appointment time used to seed the agent's instructions.
    #[serde(default)]
    pub appointment_time: Option<String>,
}

impl DialInfo {
    /// Creates a `DialInfo` for a plain call with no transfer target.
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            transfer_to: None,
            customer_name: None,
            appointment_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(value: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(SIP_CALL_STATUS_ATTRIBUTE.to_string(), value.to_string());
        map
    }

    #[test]
    fn classify_known_statuses() {
        assert_eq!(CallStatus::classify(&attrs("ringing")), CallStatus::Ringing);
        assert_eq!(
            CallStatus::classify(&attrs("automation")),
            CallStatus::Automation
        );
        assert_eq!(CallStatus::classify(&attrs("active")), CallStatus::Active);
        assert_eq!(CallStatus::classify(&attrs("hangup")), CallStatus::Hangup);
    }

    #[test]
    fn classify_missing_or_unknown_is_pending() {
        assert_eq!(CallStatus::classify(&HashMap::new()), CallStatus::Pending);
        assert_eq!(CallStatus::classify(&attrs("")), CallStatus::Pending);
        assert_eq!(CallStatus::classify(&attrs("dialing")), CallStatus::Pending);
        assert_eq!(
            CallStatus::classify(&attrs("some-future-state")),
            CallStatus::Pending
        );
    }

    #[test]
    fn terminal_and_answer_wait_predicates() {
        assert!(CallStatus::Hangup.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(!CallStatus::Active.is_terminal());
        assert!(CallStatus::Active.is_answered());

        for status in [CallStatus::Active, CallStatus::Hangup, CallStatus::Failed] {
            assert!(status.ends_answer_wait(), "{status} should end the wait");
        }
        for status in [
            CallStatus::Pending,
            CallStatus::Ringing,
            CallStatus::Automation,
        ] {
            assert!(!status.ends_answer_wait(), "{status} should keep waiting");
        }
    }

    #[test]
    fn status_labels_round_trip() {
        for status in [
            CallStatus::Pending,
            CallStatus::Ringing,
            CallStatus::Automation,
            CallStatus::Active,
            CallStatus::Hangup,
            CallStatus::Failed,
        ] {
            let parsed: CallStatus = status.as_str().parse().expect("label should parse");
            assert_eq!(parsed, status);
        }
        assert!("answered".parse::<CallStatus>().is_err());
    }

    #[test]
    fn dial_info_deserializes_with_optional_fields() {
        let info: DialInfo =
            serde_json::from_str(r#"{"phone_number": "+15105550100"}"#).expect("should parse");
        assert_eq!(info.phone_number, "+15105550100");
        assert!(info.transfer_to.is_none());

        let info: DialInfo = serde_json::from_str(
            r#"{"phone_number": "+15105550100", "transfer_to": "+15105550199",
                "customer_name": "Jayden", "appointment_time": "next Tuesday at 3pm"}"#,
        )
        .expect("should parse");
        assert_eq!(info.transfer_to.as_deref(), Some("+15105550199"));
        assert_eq!(info.customer_name.as_deref(), Some("Jayden"));
    }
}
