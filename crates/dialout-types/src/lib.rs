//! Shared types and constants for the dialout worker.
//!
//! This crate provides the call domain types used across all dialout
//! crates: the callee's lifecycle status as reported by the SIP bridge,
//! the final outcome of a call job, the immutable dial input, and the
//! closed set of intents the conversational agent may raise mid-call.
//!
//! No crate in the workspace depends on anything *except* `dialout-types`
//! for cross-cutting type definitions. This keeps the dependency graph
//! clean and prevents circular dependencies.

mod call;
mod intent;

pub use call::{CallOutcome, CallStatus, DialInfo, ParseCallStatusError};
pub use intent::AgentIntent;

/// Participant attribute key under which the SIP bridge reports the
/// callee's call status.
pub const SIP_CALL_STATUS_ATTRIBUTE: &str = "sip.callStatus";

/// Default participant identity assigned to the dialed callee.
pub const DEFAULT_CALLEE_IDENTITY: &str = "phone_user";

/// Default participant identity assigned to a transfer leg.
pub const DEFAULT_TRANSFER_IDENTITY: &str = "transfer_user";
