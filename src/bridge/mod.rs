// In: src/bridge/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Bridge Layer
// ====================================================================================
//
// The `bridge` is the public-facing API a front end (the `bytesub` binary, or a
// test) uses to drive a run. It hides how stages are registered, wired and
// executed behind two calls and one serializable report.
//
//   1. [run_pipeline(config)]      -> Receives the run config path
//         |
//         `-> `stage_pipeline::PipelineManager` loads, checks, wires and runs
//         |
//         `-> Returns `Result<RunReport, PipelineError>`
//
//   2. [write_report(report, path)] -> Persists the report as JSON
//
// ====================================================================================
pub mod format;
pub mod runner;

pub use format::{RunReport, StageReport};
pub use runner::{run_pipeline, write_report, SUCCESS_MARKER};
