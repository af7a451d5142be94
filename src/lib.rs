//! This file is the root of the `bytesub` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of the library (`stage_pipeline`,
//!     `kernels`, etc.) so the Rust compiler knows they exist.
//! 2.  Re-exporting the handful of types a front end needs to run a pipeline
//!     and interpret its outcome.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
//==================================================================================
// 1. Module Declarations
//==================================================================================
pub mod bridge;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod kernels;
pub mod stage_pipeline;
pub mod types;

//==================================================================================
// 2. Public Surface
//==================================================================================
pub use bridge::{run_pipeline, RunReport};
pub use error::{ErrorCategory, PipelineError};
pub use kernels::SubstitutionTable;
pub use stage_pipeline::PipelineManager;
pub use types::{Chunk, ExchangeType};
