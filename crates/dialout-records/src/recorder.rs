//! Async journal writer used from the worker's call tasks.

use crate::event::CallEventPayload;
use crate::pool::DbPool;
use crate::store;

/// Records one call's events from async context.
///
/// Writes go through `spawn_blocking` so SQLite never blocks the call
/// task. A failed journal write is logged and swallowed: the journal
/// must never take down a live call.
#[derive(Clone)]
pub struct CallRecorder {
    pool: DbPool,
    call_id: String,
}

impl CallRecorder {
    pub fn new(pool: DbPool, call_id: impl Into<String>) -> Self {
        Self {
            pool,
            call_id: call_id.into(),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Appends one event to this call's journal.
    pub async fn record(&self, payload: CallEventPayload) {
        let pool = self.pool.clone();
        let call_id = self.call_id.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            store::record_event(&conn, &call_id, &payload)
        })
        .await;

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::error!(call_id = %self.call_id, error = %e, "failed to record call event");
            }
            Err(e) => {
                tracing::error!(call_id = %self.call_id, error = %e, "call event write task failed");
            }
        }
    }
}
