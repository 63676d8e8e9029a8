use std::sync::Arc;

use serde::Serialize;
use time::Date;
use tracing::{debug, instrument, warn};

use super::dto::{DiaryDay, DiaryKey, DiaryQuantity};
use super::errors::{SyncError, WriteOp};
use super::store::DiaryStore;

/// Which call made the remote line match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Updated,
    Created,
    Removed,
    /// Nothing was sent; the remote already holds these grams.
    Unchanged,
}

/// Makes the remote diary line for (date, food) match locally computed grams.
#[derive(Clone)]
pub struct SyncClient {
    store: Arc<dyn DiaryStore>,
}

impl SyncClient {
    pub fn new(store: Arc<dyn DiaryStore>) -> Self {
        Self { store }
    }

    /// `grams > 0`: update the existing line, or create it when the update
    /// fails. `grams <= 0`: remove the line. A failed create or remove is
    /// returned, never retried.
    #[instrument(skip(self, date), fields(date = %date))]
    pub async fn set_quantity(
        &self,
        date: Date,
        food_id: &str,
        grams: f64,
    ) -> Result<SyncOutcome, SyncError> {
        if grams.is_nan() || grams <= 0.0 {
            let key = DiaryKey {
                date,
                food_id: food_id.to_string(),
            };
            return match self.store.remove(&key).await {
                Ok(()) => {
                    debug!("diary line removed");
                    Ok(SyncOutcome::Removed)
                }
                Err(source) => {
                    warn!(error = %source, "diary remove failed");
                    Err(SyncError::Write {
                        op: WriteOp::Remove,
                        food_id: food_id.to_string(),
                        source,
                    })
                }
            };
        }

        let body = DiaryQuantity {
            date,
            food_id: food_id.to_string(),
            grams,
        };
        match self.store.qty(&body).await {
            Ok(_) => {
                debug!("diary line updated");
                return Ok(SyncOutcome::Updated);
            }
            Err(e) => {
                debug!(error = %e, "update failed; creating the line instead");
            }
        }

        match self.store.add(&body).await {
            Ok(_) => {
                debug!("diary line created");
                Ok(SyncOutcome::Created)
            }
            Err(source) => {
                warn!(error = %source, "diary create failed");
                Err(SyncError::Write {
                    op: WriteOp::Create,
                    food_id: food_id.to_string(),
                    source,
                })
            }
        }
    }

    #[instrument(skip(self, date), fields(date = %date))]
    pub async fn fetch_day(&self, date: Date) -> Result<DiaryDay, SyncError> {
        self.store.day(date).await.map_err(SyncError::Read)
    }
}
