// In: src/stage_pipeline/orchestrator/manager.rs

//! The top-level coordinator of a run.
//!
//! Construction order matters for which error a user sees first:
//! 1. the run config is read and validated,
//! 2. the chain is checked for a reader at the front and a writer at the back,
//! 3. every stage is instantiated and configured,
//! 4. neighbours are wired and exchange types negotiated,
//! 5. only then are the input and output files opened.
//!
//! So a broken stage config or an impossible chain never creates or truncates
//! the output file.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::bridge::format::RunReport;
use crate::config::{ConfigSchema, FieldKind, FieldSpec};
use crate::error::{PipelineError, StreamSide};
use crate::stage_pipeline::descriptor::{self, StageSpec};
use crate::stage_pipeline::orchestrator::core::StageChain;
use crate::stage_pipeline::registry::StageRegistry;

pub const RUN_SCHEMA: ConfigSchema = ConfigSchema {
    component: "run",
    fields: &[
        FieldSpec::required("input_file", FieldKind::ExistingFile),
        FieldSpec::required("output_file", FieldKind::OutputPath),
        FieldSpec::required("pipeline", FieldKind::PipelineDescriptor),
    ],
};

#[derive(Debug, Clone)]
pub struct PipelineManager {
    input_file: PathBuf,
    output_file: PathBuf,
    stages: Vec<StageSpec>,
    registry: StageRegistry,
}

impl PipelineManager {
    /// Loads a run config with the built-in stage kinds.
    pub fn from_config_file(path: &Path) -> Result<Self, PipelineError> {
        Self::with_registry(path, StageRegistry::default())
    }

    pub fn with_registry(path: &Path, registry: StageRegistry) -> Result<Self, PipelineError> {
        let config = RUN_SCHEMA.load(path)?;
        let stages = descriptor::parse(config.require("pipeline")?)?;

        log::info!(
            "Loaded run config {} with {} stages",
            path.display(),
            stages.len()
        );

        Ok(Self {
            input_file: config.get_path("input_file")?,
            output_file: config.get_path("output_file")?,
            stages,
            registry,
        })
    }

    //==============================================================================
    // 1. Chain Construction
    //==============================================================================

    /// Checks roles, configures every stage and wires the chain. Touches no
    /// file other than the stage configs and the tables they name.
    pub fn build_chain(&self) -> Result<StageChain, PipelineError> {
        self.check_roles()?;

        let mut stages = Vec::with_capacity(self.stages.len());
        for (index, spec) in self.stages.iter().enumerate() {
            let mut stage = self.registry.instantiate(&spec.stage_id)?;
            stage.set_config(&spec.config_path).map_err(|err| {
                log::error!(
                    "Stage #{} '{}' rejected config {}",
                    index,
                    spec.stage_id,
                    spec.config_path.display()
                );
                err
            })?;
            stages.push(stage);
        }

        let mut chain = StageChain::new(stages);
        chain.wire()?;
        Ok(chain)
    }

    fn check_roles(&self) -> Result<(), PipelineError> {
        let (first, last) = match (self.stages.first(), self.stages.last()) {
            (Some(first), Some(last)) if self.stages.len() >= 2 => (first, last),
            _ => {
                return Err(PipelineError::FailedPipelineConstruction(format!(
                    "A pipeline needs at least a reader and a writer, got {} stage(s)",
                    self.stages.len()
                )))
            }
        };

        if !self.registry.capabilities(&first.stage_id)?.reader {
            return Err(PipelineError::FailedPipelineConstruction(format!(
                "The first stage '{}' cannot read the input file",
                first.stage_id
            )));
        }
        if !self.registry.capabilities(&last.stage_id)?.writer {
            return Err(PipelineError::FailedPipelineConstruction(format!(
                "The last stage '{}' cannot write the output file",
                last.stage_id
            )));
        }
        for spec in &self.stages[1..self.stages.len() - 1] {
            if !self.registry.capabilities(&spec.stage_id)?.transform {
                return Err(PipelineError::FailedPipelineConstruction(format!(
                    "Stage '{}' cannot sit inside the pipeline",
                    spec.stage_id
                )));
            }
        }
        Ok(())
    }

    //==============================================================================
    // 2. Running
    //==============================================================================

    /// Builds, runs and tears down the pipeline. Both files are closed on every
    /// exit path once they have been opened.
    pub fn run(&self) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let mut chain = self.build_chain()?;

        let input = open_input(&self.input_file)?;
        let output = File::create(&self.output_file).map_err(|source| PipelineError::InvalidStream {
            side: StreamSide::Output,
            path: self.output_file.clone(),
            source,
        })?;

        chain.attach_streams(Box::new(input), Box::new(output))?;
        chain.execute()?;

        let stages = chain.reports();
        let bytes_read = stages.first().map_or(0, |report| report.stats.bytes_in);
        let bytes_written = stages.last().map_or(0, |report| report.stats.bytes_out);
        let elapsed_ms = started.elapsed().as_millis();

        log::info!(
            "Pipeline finished: {} bytes read, {} bytes written in {} ms",
            bytes_read,
            bytes_written,
            elapsed_ms
        );

        Ok(RunReport {
            input_file: self.input_file.clone(),
            output_file: self.output_file.clone(),
            pipeline: self.stages.clone(),
            links: chain.links().to_vec(),
            stages,
            bytes_read,
            bytes_written,
            elapsed_ms,
        })
    }
}

/// Opens the input for reading. Anything other than a regular file (a
/// directory, most notably) is an invalid input stream.
fn open_input(path: &Path) -> Result<File, PipelineError> {
    let invalid = |source: io::Error| PipelineError::InvalidStream {
        side: StreamSide::Input,
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(invalid)?;
    let metadata = file.metadata().map_err(invalid)?;
    if !metadata.is_file() {
        return Err(invalid(io::Error::new(
            io::ErrorKind::InvalidInput,
            "input is not a regular file",
        )));
    }
    Ok(file)
}
