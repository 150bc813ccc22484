//! Job payload parsing and agent instruction seeding.
//!
//! Each worker instance receives one job: a JSON metadata payload
//! naming the phone number to dial and optional caller context. A
//! missing or malformed phone number is a fatal job-start error — the
//! worker refuses to dial rather than guessing.

use dialout_types::DialInfo;
use thiserror::Error;

/// Errors that make a job unrunnable.
#[derive(Debug, Error)]
pub enum JobError {
    /// The payload was not valid JSON.
    #[error("malformed job payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload parsed but cannot be dialed.
    #[error("invalid job payload: {0}")]
    Invalid(String),

    /// The payload file could not be read.
    #[error("failed to read job payload: {0}")]
    Unreadable(#[from] std::io::Error),
}

/// Parses and validates a job metadata payload.
pub fn parse_job(payload: &str) -> Result<DialInfo, JobError> {
    let info: DialInfo = serde_json::from_str(payload)?;
    validate(&info)?;
    Ok(info)
}

/// Reads a job payload from a file.
pub fn load_job(path: &str) -> Result<DialInfo, JobError> {
    let contents = std::fs::read_to_string(path)?;
    parse_job(&contents)
}

fn validate(info: &DialInfo) -> Result<(), JobError> {
    if info.phone_number.trim().is_empty() {
        return Err(JobError::Invalid("phone_number is required".to_string()));
    }
    if let Some(transfer_to) = &info.transfer_to {
        if transfer_to.trim().is_empty() {
            return Err(JobError::Invalid(
                "transfer_to must be non-empty when present".to_string(),
            ));
        }
    }
    Ok(())
}

/// Seeds the agent's system instructions with the job's caller context.
pub fn agent_instructions(base: &str, info: &DialInfo) -> String {
    let mut instructions = base.to_string();
    if let Some(name) = &info.customer_name {
        instructions.push_str(&format!(" The customer's name is {name}."));
    }
    if let Some(time) = &info.appointment_time {
        instructions.push_str(&format!(" The appointment is {time}."));
    }
    instructions
}
