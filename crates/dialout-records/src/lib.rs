//! Call record journal for the dialout worker.
//!
//! An append-only per-call event log: every dial attempt, status
//! transition, agent action, and spoken/heard line is recorded, and
//! exactly one end-of-call event closes each journal. Operators audit a
//! call after the fact from this log alone — including verifying that a
//! timed-out job recorded *no* conversational turns.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: one worker process per call means a
//!   single writer; no external database process required.
//! - **`r2d2` connection pool**: bounded connection reuse without manual
//!   lifetime management.
//! - **Embedded migrations**: SQL ships inside the binary via
//!   `include_str!`, so the schema cannot drift from the code.

mod event;
mod migrations;
mod pool;
mod recorder;
mod store;

pub use event::{CallEvent, CallEventPayload};
pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
pub use recorder::CallRecorder;
pub use store::{conversational_turns, query_events, record_event, RecordsError};
