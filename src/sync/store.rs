use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use time::Date;
use tracing::debug;

use super::dto::{DiaryAck, DiaryDay, DiaryKey, DiaryLine, DiaryQuantity};
use super::errors::StoreError;
use crate::diary::dto::iso_date;

/// The remote diary: one line per (date, food).
#[async_trait]
pub trait DiaryStore: Send + Sync {
    /// Creates the line for (date, food).
    async fn add(&self, body: &DiaryQuantity) -> Result<Option<DiaryLine>, StoreError>;
    /// Changes the grams of an existing line; fails when there is none.
    async fn qty(&self, body: &DiaryQuantity) -> Result<Option<DiaryLine>, StoreError>;
    async fn remove(&self, key: &DiaryKey) -> Result<(), StoreError>;
    async fn day(&self, date: Date) -> Result<DiaryDay, StoreError>;
}

/// Diary API over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpDiaryStore {
    client: Client,
    base_url: String,
}

impl HttpDiaryStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build diary http client")?;
        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<DiaryAck, StoreError> {
        let url = format!("{}/{}", self.base_url, path);
        let res = self.client.post(&url).json(body).send().await?;
        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        // Empty or non-JSON bodies on a 2xx count as an ack.
        let ack: DiaryAck = serde_json::from_str(&text).unwrap_or_default();
        if ack.ok == Some(false) {
            return Err(StoreError::Rejected(
                ack.error.unwrap_or_else(|| "ok=false".to_string()),
            ));
        }
        debug!(%url, status = status.as_u16(), "diary write acknowledged");
        Ok(ack)
    }
}

#[async_trait]
impl DiaryStore for HttpDiaryStore {
    async fn add(&self, body: &DiaryQuantity) -> Result<Option<DiaryLine>, StoreError> {
        Ok(self.post("add", body).await?.entry)
    }

    async fn qty(&self, body: &DiaryQuantity) -> Result<Option<DiaryLine>, StoreError> {
        Ok(self.post("qty", body).await?.entry)
    }

    async fn remove(&self, key: &DiaryKey) -> Result<(), StoreError> {
        self.post("remove", key).await.map(|_| ())
    }

    async fn day(&self, date: Date) -> Result<DiaryDay, StoreError> {
        let date_text = iso_date::format(&date)
            .map_err(|e| StoreError::Rejected(format!("unformattable date: {e}")))?;
        let res = self
            .client
            .get(&self.base_url)
            .query(&[("date", date_text.as_str())])
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }
        Ok(res.json::<DiaryDay>().await?)
    }
}

/// Process-local diary with the same contract as the HTTP API. Used when no
/// remote is configured.
#[derive(Debug, Default)]
pub struct MemoryDiaryStore {
    lines: Mutex<BTreeMap<(Date, String), DiaryLine>>,
}

impl MemoryDiaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grams(&self, date: Date, food_id: &str) -> Option<f64> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(date, food_id.to_string()))
            .map(|l| l.grams)
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn line(body: &DiaryQuantity) -> DiaryLine {
        DiaryLine {
            food_id: body.food_id.clone(),
            description: None,
            grams: body.grams,
            nutrients: serde_json::Map::new(),
        }
    }
}

#[async_trait]
impl DiaryStore for MemoryDiaryStore {
    async fn add(&self, body: &DiaryQuantity) -> Result<Option<DiaryLine>, StoreError> {
        let line = Self::line(body);
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((body.date, body.food_id.clone()), line.clone());
        Ok(Some(line))
    }

    async fn qty(&self, body: &DiaryQuantity) -> Result<Option<DiaryLine>, StoreError> {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        match lines.get_mut(&(body.date, body.food_id.clone())) {
            Some(existing) => {
                existing.grams = body.grams;
                Ok(Some(existing.clone()))
            }
            None => Err(StoreError::NotFound {
                date: body.date.to_string(),
                food_id: body.food_id.clone(),
            }),
        }
    }

    async fn remove(&self, key: &DiaryKey) -> Result<(), StoreError> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(key.date, key.food_id.clone()));
        Ok(())
    }

    async fn day(&self, date: Date) -> Result<DiaryDay, StoreError> {
        let entries = self
            .lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((d, _), _)| *d == date)
            .map(|(_, line)| line.clone())
            .collect();
        Ok(DiaryDay {
            date: Some(date),
            entries,
        })
    }
}
