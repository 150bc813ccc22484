//! Dialout worker binary — one process, one outbound call job.
//!
//! Loads configuration and a job payload, starts structured logging and
//! the call record journal, exposes a local health/status endpoint, and
//! runs the call orchestrator to its terminal outcome.

use dialout_session::{EnergyVad, OpenAiChatModel, PipelineServices, PiperTts, WhisperCppStt};
use dialout_telephony::LiveKitTelephony;
use dialout_worker::orchestrator::CallOrchestrator;
use dialout_worker::{config, http, job};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("DIALOUT_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

/// Resolves the job payload: second CLI argument (a file path),
/// `DIALOUT_JOB_PATH`, or `DIALOUT_JOB_JSON` (inline JSON).
fn resolve_job() -> Result<dialout_types::DialInfo, job::JobError> {
    if let Some(path) = std::env::args().nth(2) {
        return job::load_job(&path);
    }
    if let Ok(path) = std::env::var("DIALOUT_JOB_PATH") {
        return job::load_job(&path);
    }
    if let Ok(payload) = std::env::var("DIALOUT_JOB_JSON") {
        return job::parse_job(&payload);
    }
    Err(job::JobError::Invalid(
        "no job payload: pass a path, DIALOUT_JOB_PATH, or DIALOUT_JOB_JSON".to_string(),
    ))
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration — the worker cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        agent = %config.agent.name,
        "resolved startup configuration"
    );

    // Parse the job payload. A job that cannot be dialed is a fatal
    // start error; the worker refuses to proceed.
    let dial_info = match resolve_job() {
        Ok(info) => info,
        Err(e) => {
            tracing::error!(error = %e, "job payload rejected");
            std::process::exit(1);
        }
    };

    // Open the call record journal
    let pool = dialout_records::create_pool(
        &config.records.db_path,
        dialout_records::DbRuntimeSettings {
            busy_timeout_ms: config.records.busy_timeout_ms,
            pool_max_size: config.records.pool_max_size,
        },
    )
    .expect("failed to create journal pool — check records.db_path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get journal connection for migrations");
        let applied =
            dialout_records::run_migrations(&conn).expect("failed to run journal migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied journal migrations");
        }
    }

    // Prewarm the pipeline before the job runs: the VAD is loaded once
    // per worker, never per call.
    let vad = EnergyVad::load(config.pipeline.vad_threshold);
    let pipeline = PipelineServices {
        stt: Arc::new(WhisperCppStt::new(
            &config.pipeline.stt_model,
            &config.pipeline.stt_binary,
        )),
        tts: Arc::new(
            PiperTts::new(
                &config.pipeline.tts_binary,
                &config.pipeline.tts_model,
                config.pipeline.tts_speed,
            )
            .expect("invalid TTS configuration"),
        ),
        llm: Arc::new(OpenAiChatModel::new(
            &config.pipeline.llm_base_url,
            &config.pipeline.llm_api_key,
            &config.pipeline.llm_model,
        )),
        vad: Arc::new(vad),
    };

    let telephony = Arc::new(LiveKitTelephony::new(config.livekit.clone()));
    let orchestrator = CallOrchestrator::new(telephony, pipeline, pool, config.clone());

    // Status endpoint for process supervisors, alive for the call's
    // duration.
    let addr = SocketAddr::new(config.http.host, config.http.port);
    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind status endpoint — is another worker using this port?");
    tracing::info!(%addr, "status endpoint listening");
    let snapshot_rx = orchestrator.snapshot_receiver();
    let http_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, http::app(snapshot_rx)).await {
            tracing::error!(error = %e, "status endpoint failed");
        }
    });

    // One call per worker instance; retries are a dispatcher concern.
    match orchestrator.place_call(dial_info).await {
        Ok(outcome) => {
            tracing::info!(outcome = %outcome, "job finished");
        }
        Err(e) => {
            tracing::error!(error = %e, "job could not be attempted");
            http_task.abort();
            std::process::exit(1);
        }
    }

    http_task.abort();
}
