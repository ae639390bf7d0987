//! Query and resource-usage history.
//!
//! [`HistoryStore`] is the append-only, size-bounded log shared by the
//! orchestrator (one [`HistoryEntry`] per spoken response), the
//! [`StatsSampler`] (one [`StatsSample`] per interval) and the monitoring
//! surface (reads, analytics, clear).

pub mod entry;
pub mod sampler;
pub mod store;

use thiserror::Error;

pub use entry::{HandlerKind, HistoryEntry, Record, RecordKind, StatsSample, TokenUsage};
pub use sampler::{ProcProbe, ResourceProbe, StatsSampler};
pub use store::{HistoryStore, QueryAggregate, Retention};

/// Errors from the history log's persistence path.
///
/// Never propagated to appenders: the writer thread logs them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history serialisation error: {0}")]
    Serde(#[from] serde_json::Error),
}
