// In: src/stage_pipeline/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Stage Pipeline
// ====================================================================================
//
// A run is a linear chain of stages that move bytes from an input file to an
// output file. Control is pull-driven: the reader is executed once and invokes
// its consumer whenever it has buffered data; every other stage pulls from its
// producer through a `Mediator` when it is invoked.
//
//   [PipelineManager]  run config -> descriptor -> registry checks
//         |
//         `-> instantiate + set_config each stage (no file is opened yet)
//         |
//         `-> [StageChain::wire]      negotiate an exchange type per edge
//         |
//         `-> open files, attach streams, [StageChain::execute]
//
//   file_reader --(Mediator)--> substitutor --(Mediator)--> ... --> file_writer
//
// ====================================================================================
pub mod buffer;
pub mod descriptor;
pub mod mediator;
pub mod orchestrator;
pub mod registry;
pub mod stages;
pub mod traits;

pub use buffer::Buffer;
pub use mediator::{Mediator, Pull};
pub use orchestrator::{PipelineManager, StageChain};
pub use registry::StageRegistry;
pub use traits::{Capabilities, Stage, StageState, StageStats};

#[cfg(test)]
mod manager_tests;
