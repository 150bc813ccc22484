//! Speech synthesis over a piper subprocess.

use crate::error::SessionError;
use crate::pipeline::TextToSpeech;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum text input size for one synthesis request (64 KiB).
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for one synthesis run.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Synthesizes agent speech by piping text through a piper binary,
/// producing raw s16le PCM.
#[derive(Debug, Clone)]
pub struct PiperTts {
    binary_path: PathBuf,
    model_path: PathBuf,
    speed: f32,
}

impl PiperTts {
    pub fn new(
        binary_path: impl AsRef<Path>,
        model_path: impl AsRef<Path>,
        speed: f32,
    ) -> Result<Self, SessionError> {
        if !(0.1..=10.0).contains(&speed) {
            return Err(SessionError::Config(
                "speech speed must be between 0.1 and 10.0".to_string(),
            ));
        }
        Ok(Self {
            binary_path: binary_path.as_ref().to_path_buf(),
            model_path: model_path.as_ref().to_path_buf(),
            speed,
        })
    }
}

#[async_trait]
impl TextToSpeech for PiperTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SessionError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(SessionError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }
        if !self.model_path.exists() {
            return Err(SessionError::Tts(format!(
                "model file not found: {:?}",
                self.model_path
            )));
        }

        let mut command = Command::new(&self.binary_path);
        command
            .arg("--model")
            .arg(&self.model_path)
            .arg("--output_raw")
            // Length scale is the inverse of speed: 2.0x speech needs a
            // 0.5 length scale.
            .arg("--length_scale")
            .arg((1.0 / self.speed).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| SessionError::Tts(format!("failed to spawn TTS binary: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Tts("failed to open stdin".to_string()))?;
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| SessionError::Tts(format!("failed to write to stdin: {e}")))?;
        drop(stdin);

        let output = tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                SessionError::Tts(format!(
                    "TTS process timed out after {} seconds",
                    TTS_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| SessionError::Tts(format!("failed to read output: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SessionError::Tts(format!("TTS binary failed: {stderr}")));
        }

        if output.stdout.is_empty() {
            return Err(SessionError::Tts("TTS produced no audio".to_string()));
        }
        Ok(output.stdout)
    }
}
