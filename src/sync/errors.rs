use serde::Serialize;
use thiserror::Error;

/// Failure of a single diary API call.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("diary request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("diary api returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("diary api rejected the call: {0}")]
    Rejected(String),
    #[error("no diary entry for {food_id} on {date}")]
    NotFound { date: String, food_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOp {
    Create,
    Remove,
}

impl std::fmt::Display for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteOp::Create => write!(f, "create"),
            WriteOp::Remove => write!(f, "remove"),
        }
    }
}

/// A write the diary did not accept after any fallback. Not retried.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{op} of {food_id} failed: {source}")]
    Write {
        op: WriteOp,
        food_id: String,
        #[source]
        source: StoreError,
    },
    #[error("reading the diary failed: {0}")]
    Read(#[source] StoreError),
}
