pub mod config;
pub mod diary;
pub mod nutrients;
pub mod pipeline;
pub mod state;
pub mod sync;
