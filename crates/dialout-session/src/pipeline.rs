//! Trait seams for the speech pipeline services.

use crate::error::SessionError;
use async_trait::async_trait;
use dialout_types::AgentIntent;
use std::sync::Arc;

/// One message in the agent's chat history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// What the language model produced for one turn: an optional line to
/// speak and any intents it recognized in the dialogue.
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    pub say: Option<String>,
    pub intents: Vec<AgentIntent>,
}

/// Transcribes one utterance of callee audio (s16le PCM).
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, SessionError>;
}

/// Synthesizes one line of agent speech to s16le PCM.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SessionError>;
}

/// Produces the agent's next turn from the chat history.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn respond(&self, history: &[ChatMessage]) -> Result<AgentReply, SessionError>;
}

/// Decides whether an audio frame contains speech.
pub trait VoiceActivityDetector: Send + Sync {
    fn is_speech(&self, frame: &[u8]) -> bool;
}

/// The full set of pipeline services bound to one session.
#[derive(Clone)]
pub struct PipelineServices {
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub llm: Arc<dyn LanguageModel>,
    pub vad: Arc<dyn VoiceActivityDetector>,
}

/// Energy-threshold voice-activity detection over s16le frames.
///
/// A deliberately small stand-in for a model-based detector: frames
/// whose mean absolute amplitude clears the threshold count as speech.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    /// Loads the detector. Named for parity with model-backed detectors
    /// that are prewarmed once per worker before any job runs.
    pub fn load(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::load(0.015)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn is_speech(&self, frame: &[u8]) -> bool {
        if frame.len() < 2 {
            return false;
        }
        let mut total = 0.0f32;
        let mut samples = 0usize;
        for chunk in frame.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            total += (sample as f32 / i16::MAX as f32).abs();
            samples += 1;
        }
        samples > 0 && total / samples as f32 >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(sample: i16, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len * 2);
        for _ in 0..len {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out
    }

    #[test]
    fn energy_vad_separates_speech_from_silence() {
        let vad = EnergyVad::default();
        assert!(vad.is_speech(&frame_of(8_000, 160)));
        assert!(!vad.is_speech(&frame_of(60, 160)));
        assert!(!vad.is_speech(&[]));
    }
}
