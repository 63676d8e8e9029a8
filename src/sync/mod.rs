pub mod dto;
pub mod errors;
pub mod services;
pub mod store;

pub use errors::{StoreError, SyncError, WriteOp};
pub use services::{SyncClient, SyncOutcome};
pub use store::{DiaryStore, HttpDiaryStore, MemoryDiaryStore};
