// In: src/stage_pipeline/descriptor.rs

//! Parsing of the `pipeline` value of a run config:
//! `id1, cfg1 ; id2, cfg2 ; ... ; idN, cfgN`.
//!
//! Whitespace around every token is ignored. A single trailing `;` is tolerated,
//! any other empty record is a grammar error.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::is_identifier;
use crate::error::PipelineError;

pub const STAGE_DELIMITER: char = ';';
pub const FIELD_DELIMITER: char = ',';

/// One `stage_id, config_path` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSpec {
    pub stage_id: String,
    pub config_path: PathBuf,
}

pub fn parse(value: &str) -> Result<Vec<StageSpec>, PipelineError> {
    let trimmed = value.trim();
    let body = trimmed.strip_suffix(STAGE_DELIMITER).unwrap_or(trimmed);
    if body.trim().is_empty() {
        return Err(PipelineError::Grammar("Pipeline descriptor lists no stages".to_string()));
    }

    body.split(STAGE_DELIMITER)
        .enumerate()
        .map(|(index, record)| parse_record(index, record))
        .collect()
}

fn parse_record(index: usize, record: &str) -> Result<StageSpec, PipelineError> {
    let fields: Vec<&str> = record.split(FIELD_DELIMITER).map(str::trim).collect();
    let [stage_id, config_path] = fields.as_slice() else {
        return Err(PipelineError::Grammar(format!(
            "Pipeline record #{} '{}' must be 'stage_id{} config_path'",
            index,
            record.trim(),
            FIELD_DELIMITER
        )));
    };

    if !is_identifier(stage_id) {
        return Err(PipelineError::Grammar(format!(
            "Pipeline record #{}: '{}' is not a valid stage identifier",
            index, stage_id
        )));
    }
    if config_path.is_empty() {
        return Err(PipelineError::Grammar(format!(
            "Pipeline record #{}: stage '{}' has an empty config path",
            index, stage_id
        )));
    }

    Ok(StageSpec {
        stage_id: stage_id.to_string(),
        config_path: PathBuf::from(*config_path),
    })
}
