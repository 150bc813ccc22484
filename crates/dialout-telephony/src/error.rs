//! Error types for the telephony layer.

use thiserror::Error;

/// Errors that can occur when talking to the SIP gateway and room
/// service.
#[derive(Debug, Error)]
pub enum TelephonyError {
    /// The dial attempt was rejected by the SIP gateway. Carries the SIP
    /// status reported by the far end (e.g. `486 USER_BUSY`), when the
    /// gateway included one.
    #[error("dial rejected: {message} (sip_status_code={sip_status_code:?}, sip_status={sip_status:?})")]
    Dial {
        /// Numeric SIP status code, when reported.
        sip_status_code: Option<u16>,
        /// SIP status name, when reported.
        sip_status: Option<String>,
        /// The gateway's error message.
        message: String,
    },

    /// A room service operation failed.
    #[error("room service error: {0}")]
    RoomService(String),

    /// Access token minting failed.
    #[error("access token error: {0}")]
    Token(#[from] livekit_api::access_token::AccessTokenError),

    /// The HTTP transport failed before the gateway produced a response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Invalid telephony configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A participant did not appear in the room within the wait budget.
    #[error("participant '{identity}' did not join room '{room}' within {waited_ms}ms")]
    JoinTimeout {
        room: String,
        identity: String,
        waited_ms: u64,
    },
}

impl TelephonyError {
    /// True when this error is a structured dial rejection rather than a
    /// transport or configuration failure.
    pub fn is_dial_rejection(&self) -> bool {
        matches!(self, Self::Dial { .. })
    }
}
