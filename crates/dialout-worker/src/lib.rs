//! The dialout worker: one process, one outbound call.
//!
//! The worker loads its configuration and a job payload, creates a
//! media room, races the agent session start against the SIP dial, and
//! drives the call to exactly one terminal outcome — conversation
//! completed, voicemail detected, transfer executed, callee hangup,
//! dial failure, or timeout. Every lifecycle step lands in the call
//! record journal.

pub mod actions;
pub mod config;
pub mod http;
pub mod job;
pub mod monitor;
pub mod orchestrator;
