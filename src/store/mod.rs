//! Persistence layer: libSQL-backed storage for profiles, chat turns and the
//! durable work queue.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    ChatTurn, Database, FailOutcome, QueueEntry, QueueStats, QueueStatus, TurnRole,
};
