//! Speech-to-text over a whisper.cpp subprocess.

use crate::error::SessionError;
use crate::pipeline::SpeechToText;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum audio input size for one transcription (10 MiB). A phone
/// turn is a few seconds of 16kHz PCM; anything larger is a pipeline
/// bug upstream.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Timeout for one transcription run.
const STT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transcribes callee turns by piping PCM audio through a whisper.cpp
/// binary.
#[derive(Debug, Clone)]
pub struct WhisperCppStt {
    model_path: PathBuf,
    binary_path: PathBuf,
}

impl WhisperCppStt {
    pub fn new(model_path: impl Into<PathBuf>, binary_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
        }
    }
}

#[async_trait]
impl SpeechToText for WhisperCppStt {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, SessionError> {
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(SessionError::Stt(format!(
                "audio exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let mut command = Command::new(&self.binary_path);
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg("-") // read audio from stdin
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| SessionError::Stt(format!("failed to spawn STT binary: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::Stt("failed to open stdin".to_string()))?;
        stdin
            .write_all(audio)
            .await
            .map_err(|e| SessionError::Stt(format!("failed to write to stdin: {e}")))?;
        drop(stdin); // close stdin to signal EOF

        let output = tokio::time::timeout(STT_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                SessionError::Stt(format!(
                    "STT process timed out after {} seconds",
                    STT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| SessionError::Stt(format!("failed to read output: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SessionError::Stt(format!("STT binary failed: {stderr}")));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
