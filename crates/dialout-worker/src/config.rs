//! Worker configuration loading from file and environment variables.

use dialout_telephony::LiveKitConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// LiveKit server and SIP gateway settings.
    #[serde(default)]
    pub livekit: LiveKitConfig,

    /// Call pacing and wait budgets.
    #[serde(default)]
    pub call: CallConfig,

    /// Agent identity and scripting.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Speech pipeline services.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Call record journal settings.
    #[serde(default)]
    pub records: RecordsConfig,

    /// Local health/status endpoint.
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Call pacing and wait budgets.
#[derive(Debug, Clone, Deserialize)]
pub struct CallConfig {
    /// Answer-wait budget in seconds.
    #[serde(default = "default_answer_timeout_secs")]
    pub answer_timeout_secs: u64,

    /// Callee status poll cadence in milliseconds.
    #[serde(default = "default_status_poll_interval_ms")]
    pub status_poll_interval_ms: u64,

    /// How long to wait for a participant to appear in the room, in
    /// seconds.
    #[serde(default = "default_join_wait_secs")]
    pub join_wait_secs: u64,

    /// Upper bound on the conversation after answer, in seconds.
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,
}

impl CallConfig {
    pub fn answer_timeout(&self) -> Duration {
        Duration::from_secs(self.answer_timeout_secs)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    pub fn join_wait(&self) -> Duration {
        Duration::from_secs(self.join_wait_secs)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

/// Agent identity and scripting.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Worker/agent name recorded on job start.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// The agent's own participant identity in the room.
    #[serde(default = "default_agent_identity")]
    pub identity: String,

    /// Base system instructions for the conversational agent. Job
    /// context (customer name, appointment time) is appended per call.
    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// Scripted instruction for the transfer notice.
    #[serde(default = "default_transfer_instructions")]
    pub transfer_instructions: String,

    /// Scripted instruction for the transfer-failure apology.
    #[serde(default = "default_apology_instructions")]
    pub apology_instructions: String,

    /// Silence span that ends the callee's turn, in milliseconds.
    #[serde(default = "default_turn_silence_ms")]
    pub turn_silence_ms: u64,
}

impl AgentConfig {
    pub fn turn_silence(&self) -> Duration {
        Duration::from_millis(self.turn_silence_ms)
    }
}

/// Speech pipeline services.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Path to the whisper.cpp binary.
    #[serde(default = "default_stt_binary")]
    pub stt_binary: String,

    /// Path to the STT model file.
    #[serde(default)]
    pub stt_model: String,

    /// Path to the piper binary.
    #[serde(default = "default_tts_binary")]
    pub tts_binary: String,

    /// Path to the TTS voice model.
    #[serde(default)]
    pub tts_model: String,

    /// Speech speed multiplier.
    #[serde(default = "default_tts_speed")]
    pub tts_speed: f32,

    /// OpenAI-compatible chat completion base URL.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    /// API key for the chat completion endpoint.
    #[serde(default)]
    pub llm_api_key: String,

    /// Model name for chat completions.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Voice-activity energy threshold (0.0 - 1.0).
    #[serde(default = "default_vad_threshold")]
    pub vad_threshold: f32,
}

/// Call record journal settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordsConfig {
    /// Path to the SQLite journal file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Local health/status endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "dialout_worker=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_answer_timeout_secs() -> u64 {
    15
}

fn default_status_poll_interval_ms() -> u64 {
    100
}

fn default_join_wait_secs() -> u64 {
    10
}

fn default_max_duration_secs() -> u64 {
    600
}

fn default_agent_name() -> String {
    "outbound-caller".to_string()
}

fn default_agent_identity() -> String {
    "dialout-agent".to_string()
}

fn default_instructions() -> String {
    "You are a scheduling assistant for a dental practice. Your interface with the user \
     will be voice. You will be on a call with a patient who has an upcoming appointment. \
     Your goal is to confirm the appointment details."
        .to_string()
}

fn default_transfer_instructions() -> String {
    "Tell the user politely that you are transferring them to a human agent now. \
     Keep it to one short sentence."
        .to_string()
}

fn default_apology_instructions() -> String {
    "Apologize briefly: the transfer could not be completed, and you will end the call."
        .to_string()
}

fn default_turn_silence_ms() -> u64 {
    700
}

fn default_stt_binary() -> String {
    "whisper-cpp".to_string()
}

fn default_tts_binary() -> String {
    "piper".to_string()
}

fn default_tts_speed() -> f32 {
    1.0
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_vad_threshold() -> f32 {
    0.015
}

fn default_db_path() -> String {
    "dialout.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    4
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8808
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            answer_timeout_secs: default_answer_timeout_secs(),
            status_poll_interval_ms: default_status_poll_interval_ms(),
            join_wait_secs: default_join_wait_secs(),
            max_duration_secs: default_max_duration_secs(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            identity: default_agent_identity(),
            instructions: default_instructions(),
            transfer_instructions: default_transfer_instructions(),
            apology_instructions: default_apology_instructions(),
            turn_silence_ms: default_turn_silence_ms(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stt_binary: default_stt_binary(),
            stt_model: String::new(),
            tts_binary: default_tts_binary(),
            tts_model: String::new(),
            tts_speed: default_tts_speed(),
            llm_base_url: default_llm_base_url(),
            llm_api_key: String::new(),
            llm_model: default_llm_model(),
            vad_threshold: default_vad_threshold(),
        }
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `DIALOUT_LIVEKIT_URL` overrides `livekit.url`
/// - `DIALOUT_LIVEKIT_API_KEY` overrides `livekit.api_key`
/// - `DIALOUT_LIVEKIT_API_SECRET` overrides `livekit.api_secret`
/// - `DIALOUT_SIP_TRUNK_ID` overrides `livekit.sip_trunk_id`
/// - `DIALOUT_LLM_API_KEY` overrides `pipeline.llm_api_key`
/// - `DIALOUT_DB_PATH` overrides `records.db_path`
/// - `DIALOUT_HTTP_PORT` overrides `http.port`
/// - `DIALOUT_LOG_LEVEL` overrides `logging.level`
/// - `DIALOUT_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or
/// parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(url) = std::env::var("DIALOUT_LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Ok(key) = std::env::var("DIALOUT_LIVEKIT_API_KEY") {
        config.livekit.api_key = key;
    }
    if let Ok(secret) = std::env::var("DIALOUT_LIVEKIT_API_SECRET") {
        config.livekit.api_secret = secret;
    }
    if let Ok(trunk) = std::env::var("DIALOUT_SIP_TRUNK_ID") {
        config.livekit.sip_trunk_id = trunk;
    }
    if let Ok(key) = std::env::var("DIALOUT_LLM_API_KEY") {
        config.pipeline.llm_api_key = key;
    }
    if let Ok(db_path) = std::env::var("DIALOUT_DB_PATH") {
        config.records.db_path = db_path;
    }
    if let Ok(port) = std::env::var("DIALOUT_HTTP_PORT") {
        if let Ok(parsed) = port.parse() {
            config.http.port = parsed;
        }
    }
    if let Ok(level) = std::env::var("DIALOUT_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("DIALOUT_LOG_JSON") {
        config.logging.json = json == "true";
    }

    Ok(config)
}
