// In: src/bridge/format.rs

//! Defines the serializable run report written after a pipeline finishes.
//! This is the single source of truth for what a caller can learn about a run
//! beyond success or failure.

use std::path::PathBuf;

use serde::Serialize;

use crate::stage_pipeline::descriptor::StageSpec;
use crate::stage_pipeline::orchestrator::Link;
use crate::stage_pipeline::traits::{StageState, StageStats};
use crate::types::ExchangeType;

/// Per-stage outcome, in chain order.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub index: usize,
    pub stage_id: String,
    pub state: StageState,
    /// The type negotiated with this stage's producer; `None` for the reader.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_exchange: Option<ExchangeType>,
    pub stats: StageStats,
}

/// The outcome of one successful run.
#[derive(Serialize, Debug, Clone)]
pub struct RunReport {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub pipeline: Vec<StageSpec>,
    pub links: Vec<Link>,
    pub stages: Vec<StageReport>,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub elapsed_ms: u128,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
