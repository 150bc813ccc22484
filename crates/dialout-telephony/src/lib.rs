//! Telephony layer for the dialout worker.
//!
//! Wraps the LiveKit server API: room lifecycle and participant
//! management go through the `livekit-api` room client, and outbound SIP
//! legs are placed through the Twirp SIP service endpoint. The rest of
//! the workspace consumes this crate through the [`DialingApi`] trait so
//! the orchestrator and its tests never touch the wire client directly.
//!
//! Dial failures are structured: the SIP gateway reports a SIP status
//! code and status name with each rejected attempt, and both survive
//! into [`TelephonyError::Dial`] for logging and the call record.

mod api;
mod config;
mod error;
mod rooms;
mod sip;

pub use api::{DialingApi, LiveKitTelephony};
pub use config::LiveKitConfig;
pub use error::TelephonyError;
pub use rooms::RoomService;
pub use sip::{DialRequest, SipDialer, SipParticipant};
