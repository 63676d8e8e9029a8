use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use time::Date;
use tokio::sync::Notify;

use super::dto::SyncStatus;

const GRAMS_EPSILON: f64 = 1e-9;

pub(crate) fn same_grams(a: f64, b: f64) -> bool {
    (a - b).abs() < GRAMS_EPSILON
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub date: Date,
    pub food_id: String,
}

/// What the remote is known to hold for a row.
#[derive(Debug, Default)]
pub(crate) struct RemoteState {
    /// Grams of the last call that succeeded; `None` when unknown or after a failure.
    pub last_synced: Option<f64>,
}

/// Serializes persistence for one row.
///
/// Every edit takes the next sequence number when it is issued. Tasks take
/// `remote` in turn; a task whose sequence is no longer the latest either
/// skips its call (superseded before dispatch) or drops its response
/// (superseded in flight).
#[derive(Debug)]
pub(crate) struct RowQueue {
    pub key: RowKey,
    latest: AtomicU64,
    pending: AtomicUsize,
    pub remote: tokio::sync::Mutex<RemoteState>,
    status: Mutex<SyncStatus>,
}

impl RowQueue {
    /// A row with nothing issued yet has nothing to write, so it starts synced.
    pub fn new(key: RowKey, last_synced: Option<f64>) -> Self {
        Self {
            key,
            latest: AtomicU64::new(0),
            pending: AtomicUsize::new(0),
            remote: tokio::sync::Mutex::new(RemoteState { last_synced }),
            status: Mutex::new(SyncStatus::Synced),
        }
    }

    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn is_superseded(&self, seq: u64) -> bool {
        seq < self.latest()
    }

    pub fn status(&self) -> SyncStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_status(&self, status: SyncStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Marks one save for this row as outstanding until the guard drops.
    pub fn begin(self: &Arc<Self>) -> RowPending {
        self.pending.fetch_add(1, Ordering::SeqCst);
        RowPending {
            queue: self.clone(),
        }
    }

    fn finish(&self) {
        let _ = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

#[derive(Debug)]
pub(crate) struct RowPending {
    queue: Arc<RowQueue>,
}

impl Drop for RowPending {
    fn drop(&mut self) {
        self.queue.finish();
    }
}

/// Counts outstanding saves across the whole pipeline.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            counter: self.clone(),
        }
    }

    /// Resolves once no save is outstanding.
    pub async fn settled(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.get() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Decrements the in-flight counter when dropped, including on task panic.
#[derive(Debug)]
pub(crate) struct InFlightGuard {
    counter: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let prev = self
            .counter
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if prev == Ok(1) {
            self.counter.idle.notify_waiters();
        }
    }
}
