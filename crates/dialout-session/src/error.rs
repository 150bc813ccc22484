//! Error types for the conversational session layer.

use thiserror::Error;

/// Errors that can occur inside the agent session and its pipeline
/// services.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Speech-to-text failed.
    #[error("stt error: {0}")]
    Stt(String),

    /// Speech synthesis failed.
    #[error("tts error: {0}")]
    Tts(String),

    /// The language model request failed.
    #[error("llm error: {0}")]
    Llm(String),

    /// Publishing or receiving room audio failed.
    #[error("room audio error: {0}")]
    Room(String),

    /// A callee-bound operation ran before `set_participant`.
    #[error("no participant bound to the session")]
    NotBound,

    /// `set_participant` was called a second time.
    #[error("participant already bound to '{0}'")]
    AlreadyBound(String),

    /// The session is closed; no further operations are accepted.
    #[error("session is closed")]
    Closed,

    /// Invalid pipeline configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}
