// In: src/stage_pipeline/orchestrator/mod.rs

pub mod core;
pub mod manager;

pub use self::core::{Link, StageChain};
pub use self::manager::{PipelineManager, RUN_SCHEMA};
