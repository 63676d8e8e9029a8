pub mod dto;
mod queue;
pub mod services;

pub use dto::{DayEvent, RowPhase, RowUpdate, SyncReport, SyncStatus};
pub use services::{EditPipeline, PipelineError};
