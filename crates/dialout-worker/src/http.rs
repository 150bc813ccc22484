//! Local health/status endpoint served while the call is in flight.
//!
//! A deployment runs one worker process per call; the orchestrator's
//! phase is exposed on loopback so process supervisors can tell a
//! dialing worker from a wedged one.

use crate::orchestrator::JobSnapshot;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

/// Health check handler.
///
/// Returns `200 OK` with worker status and version.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Current job phase and outcome, if the call has concluded.
async fn status(State(snapshot_rx): State<watch::Receiver<JobSnapshot>>) -> Json<JobSnapshot> {
    Json(snapshot_rx.borrow().clone())
}

/// Builds the worker's local router.
pub fn app(snapshot_rx: watch::Receiver<JobSnapshot>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(snapshot_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use dialout_types::CallOutcome;
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        serde_json::from_slice(&body).expect("body should be json")
    }

    #[tokio::test]
    async fn health_check_returns_ok() {
        let (_tx, rx) = watch::channel(JobSnapshot::default());
        let app = app(rx);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("handler should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_reflects_orchestrator_phase() {
        let (tx, rx) = watch::channel(JobSnapshot::default());
        let app = app(rx);

        tx.send_modify(|s| {
            s.phase = "in_call".to_string();
        });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("handler should respond");
        let json = body_json(response).await;
        assert_eq!(json["phase"], "in_call");
        assert_eq!(json["outcome"], Value::Null);

        tx.send_modify(|s| {
            s.phase = "finished".to_string();
            s.outcome = Some(CallOutcome::Completed);
        });
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("handler should respond");
        let json = body_json(response).await;
        assert_eq!(json["outcome"], "completed");
    }
}
