use serde::Serialize;

use crate::diary::totals::DayTotals;
use crate::sync::SyncOutcome;

/// Whether the row's last computed grams are known to be in the remote diary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed { message: String },
}

impl SyncStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, SyncStatus::Failed { .. })
    }
}

/// Observable per-row state. Validating and Computing happen synchronously
/// inside an edit call, so only these two are ever visible from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RowPhase {
    Idle { sync_failed: bool },
    Persisting,
}

/// Sent right after an edit, before persistence completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowUpdate {
    pub food_id: String,
    pub seq: u64,
    pub grams: f64,
    pub scale: f64,
    pub totals: DayTotals,
    pub sync: SyncStatus,
}

/// Result of the latest persistence call for a row. Stale results are never sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub food_id: String,
    pub seq: u64,
    pub grams: f64,
    pub outcome: Option<SyncOutcome>,
    pub status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DayEvent {
    Totals(RowUpdate),
    Sync(SyncReport),
}
