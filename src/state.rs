use crate::config::AppConfig;
use crate::sync::{DiaryStore, HttpDiaryStore, MemoryDiaryStore, SyncClient};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DiaryStore>,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match &config.diary.api_url {
            Some(url) => {
                tracing::info!(%url, "using remote diary");
                Arc::new(HttpDiaryStore::new(url.as_str(), config.diary.timeout)?)
                    as Arc<dyn DiaryStore>
            }
            None => {
                tracing::info!("DIARY_API_URL not set; diary kept in memory");
                Arc::new(MemoryDiaryStore::new()) as Arc<dyn DiaryStore>
            }
        };

        Ok(Self::from_parts(config, store))
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn DiaryStore>) -> Self {
        Self { config, store }
    }

    pub fn sync_client(&self) -> SyncClient {
        SyncClient::new(self.store.clone())
    }
}
