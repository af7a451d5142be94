// In: src/bridge/runner.rs

//! The stable entry points a front end calls: run a pipeline from its run config
//! and persist the resulting report.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::bridge::format::RunReport;
use crate::error::PipelineError;
use crate::stage_pipeline::orchestrator::PipelineManager;

/// Printed by front ends after a successful run.
pub const SUCCESS_MARKER: &str = "Done";

/// Loads `config`, builds the chain and runs it to end of stream.
pub fn run_pipeline(config: &Path) -> Result<RunReport, PipelineError> {
    log::info!("Starting pipeline from {}", config.display());
    let result = PipelineManager::from_config_file(config).and_then(|manager| manager.run());

    if let Err(err) = &result {
        log::error!("Pipeline failed ({}): {}", err.category(), err);
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            log::error!("  caused by: {}", cause);
            source = cause.source();
        }
    }
    result
}

/// Writes `report` as pretty JSON to `path`.
pub fn write_report(report: &RunReport, path: &Path) -> Result<(), PipelineError> {
    let write = || -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut out, report).map_err(io::Error::from)?;
        writeln!(out)?;
        out.flush()
    };
    write().map_err(|e| PipelineError::write_failure("report", e))?;
    log::info!("Wrote run report to {}", path.display());
    Ok(())
}
