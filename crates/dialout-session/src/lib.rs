//! Conversational session layer for the dialout worker.
//!
//! Owns the agent's speech pipeline for one call: inbound room audio is
//! gated by voice-activity detection, transcribed, answered by the
//! language model, and synthesized back into the room. The session also
//! surfaces the closed set of [`dialout_types::AgentIntent`] values the
//! model recognizes, which the worker's dispatcher turns into call
//! actions.
//!
//! The pipeline services (STT, TTS, LLM, VAD) are external collaborators
//! behind narrow traits. The shipped implementations run whisper.cpp and
//! piper as subprocesses and speak to an OpenAI-style chat completion
//! endpoint; tests substitute in-memory fakes.

mod error;
mod llm;
mod pipeline;
mod room_io;
mod session;
mod speech;
mod stt;
mod tts;

pub use error::SessionError;
pub use llm::OpenAiChatModel;
pub use pipeline::{
    AgentReply, ChatMessage, EnergyVad, LanguageModel, PipelineServices, SpeechToText,
    TextToSpeech, VoiceActivityDetector,
};
pub use room_io::{playout_duration, RoomAudioClient};
pub use session::{AgentSession, InputOptions, SessionConfig, SessionEvent, SessionHandle};
pub use speech::SpeechHandle;
pub use stt::WhisperCppStt;
pub use tts::PiperTts;
