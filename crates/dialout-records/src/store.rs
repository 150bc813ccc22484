//! Persistence operations for the call journal.

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::event::{CallEvent, CallEventPayload};

/// Errors that can occur during journal operations.
#[derive(Debug, Error)]
pub enum RecordsError {
    /// A database operation failed.
    #[error("records database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("records serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The connection pool could not produce a connection.
    #[error("records pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

/// Writes a single event to the call journal.
///
/// A monotonically increasing sequence number is assigned within the
/// same INSERT, so two writers racing on the same call cannot produce
/// duplicate sequence numbers.
pub fn record_event(
    conn: &Connection,
    call_id: &str,
    payload: &CallEventPayload,
) -> Result<CallEvent, RecordsError> {
    let payload_json = serde_json::to_string(payload)?;

    let row = conn.query_row(
        "INSERT INTO call_event_log (call_id, seq, event_type, payload_json, occurred_at)
         VALUES (
            ?1,
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM call_event_log WHERE call_id = ?1),
            ?2,
            ?3,
            datetime('now')
         )
         RETURNING id, seq, occurred_at",
        params![call_id, payload.event_type(), payload_json],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    )?;

    let (id, seq, occurred_at) = row;

    Ok(CallEvent {
        id,
        call_id: call_id.to_string(),
        seq,
        event_type: payload.event_type().to_string(),
        payload_json,
        occurred_at,
    })
}

/// Reads a call's journal in sequence order.
pub fn query_events(conn: &Connection, call_id: &str) -> Result<Vec<CallEvent>, RecordsError> {
    let mut stmt = conn.prepare(
        "SELECT id, call_id, seq, event_type, payload_json, occurred_at
         FROM call_event_log
         WHERE call_id = ?1
         ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map([call_id], |row| {
        Ok(CallEvent {
            id: row.get(0)?,
            call_id: row.get(1)?,
            seq: row.get(2)?,
            event_type: row.get(3)?,
            payload_json: row.get(4)?,
            occurred_at: row.get(5)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Counts the conversational turns recorded for a call: lines the agent
/// spoke plus callee turns transcribed.
pub fn conversational_turns(conn: &Connection, call_id: &str) -> Result<i64, RecordsError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM call_event_log
         WHERE call_id = ?1 AND event_type IN ('UTTERANCE_SPOKEN', 'TURN_TRANSCRIBED')",
        [call_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
