// In: src/config.rs

//! Key-value configuration for the pipeline and its stages.
//!
//! Every configurable component (the run itself, each stage) reads a plain text
//! file where each nonempty line is `key [spaces] delimiter [spaces] value`. The
//! raw map is produced by [`load`], then checked against a component's
//! [`ConfigSchema`] which knows the recognized field names and the kind of value
//! each one must hold.
//!
//! Failure classes are kept apart on purpose:
//! * the file cannot be opened or read -> `ConfigRead`
//! * a line does not split into key/value, a key repeats, or a key is not part of
//!   the schema -> `Grammar`
//! * a value is well formed but wrong (zero or oversized buffer size, missing
//!   file, a required field is absent) -> `Semantic`

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::stage_pipeline::descriptor;
use crate::types::ExchangeType;

//==================================================================================
// I. Raw Key-Value Loading
//==================================================================================

/// The delimiter used by every component config file.
pub const CONFIG_DELIMITER: &str = "=";

/// Raw parsed key-value pairs. A `BTreeMap` keeps diagnostics deterministic.
pub type KeyValueMap = BTreeMap<String, String>;

/// Reads `path` and parses it into a key-value map split on `delimiter`.
pub fn load(path: &Path, delimiter: &str) -> Result<KeyValueMap, PipelineError> {
    let text = fs::read_to_string(path).map_err(|source| PipelineError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_key_values(&text, delimiter, path)
}

/// Parses key-value text. `origin` is only used in error messages.
pub fn parse_key_values(
    text: &str,
    delimiter: &str,
    origin: &Path,
) -> Result<KeyValueMap, PipelineError> {
    let mut map = KeyValueMap::new();

    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split(delimiter).collect();
        if parts.len() != 2 {
            return Err(PipelineError::Grammar(format!(
                "{}:{}: expected 'key {} value', got '{}'",
                origin.display(),
                line_no + 1,
                delimiter,
                line
            )));
        }

        let key = parts[0].trim();
        let value = parts[1].trim();
        if key.is_empty() || value.is_empty() {
            return Err(PipelineError::Grammar(format!(
                "{}:{}: empty key or value in '{}'",
                origin.display(),
                line_no + 1,
                line
            )));
        }

        if map.insert(key.to_string(), value.to_string()).is_some() {
            return Err(PipelineError::Grammar(format!(
                "{}:{}: ambiguous value for the key '{}'",
                origin.display(),
                line_no + 1,
                key
            )));
        }
    }

    Ok(map)
}

//==================================================================================
// II. Field Schemas & Validators
//==================================================================================

/// Largest accepted `buffer_size`. Stages allocate their buffers up front.
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// The kind of value a recognized field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A positive byte count no larger than [`MAX_BUFFER_SIZE`].
    BufferSize,
    ExistingFile,
    Identifier,
    PipelineDescriptor,
    /// Any non-empty path; the file does not have to exist yet.
    OutputPath,
    /// A comma-separated preference list of exchange types.
    ExchangeList,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// The recognized fields of one configurable component.
#[derive(Debug, Clone, Copy)]
pub struct ConfigSchema {
    pub component: &'static str,
    pub fields: &'static [FieldSpec],
}

impl ConfigSchema {
    /// Loads `path` with the standard delimiter and validates it.
    pub fn load(&self, path: &Path) -> Result<Config, PipelineError> {
        let map = load(path, CONFIG_DELIMITER)?;
        self.validate(map)
    }

    /// Validates an already parsed map against this schema.
    pub fn validate(&self, map: KeyValueMap) -> Result<Config, PipelineError> {
        for (key, value) in &map {
            let spec = self.field(key).ok_or_else(|| {
                PipelineError::Grammar(format!(
                    "Unknown field '{}' in {} config",
                    key, self.component
                ))
            })?;
            validate_field(spec, value).map_err(|err| {
                log::warn!(
                    "Invalid {} config record: {} -> {}",
                    self.component,
                    key,
                    value
                );
                err
            })?;
        }

        for spec in self.fields.iter().filter(|spec| spec.required) {
            if !map.contains_key(spec.name) {
                return Err(PipelineError::Semantic(format!(
                    "Missing required field '{}' in {} config",
                    spec.name, self.component
                )));
            }
        }

        Ok(Config {
            component: self.component,
            values: map,
        })
    }

    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == name)
    }
}

fn validate_field(spec: &FieldSpec, value: &str) -> Result<(), PipelineError> {
    match spec.kind {
        FieldKind::BufferSize => parse_buffer_size(spec.name, value).map(|_| ()),
        FieldKind::ExistingFile => {
            if Path::new(value).exists() {
                Ok(())
            } else {
                Err(PipelineError::Semantic(format!(
                    "Field '{}' refers to a missing file '{}'",
                    spec.name, value
                )))
            }
        }
        FieldKind::Identifier => {
            if is_identifier(value) {
                Ok(())
            } else {
                Err(PipelineError::Semantic(format!(
                    "Field '{}' is not a valid identifier: '{}'",
                    spec.name, value
                )))
            }
        }
        FieldKind::PipelineDescriptor => {
            for stage in descriptor::parse(value)? {
                if !stage.config_path.exists() {
                    return Err(PipelineError::Semantic(format!(
                        "Stage '{}' refers to a missing config '{}'",
                        stage.stage_id,
                        stage.config_path.display()
                    )));
                }
            }
            Ok(())
        }
        FieldKind::OutputPath => Ok(()),
        FieldKind::ExchangeList => parse_exchange_list(value).map(|_| ()),
    }
}

fn parse_buffer_size(name: &str, value: &str) -> Result<usize, PipelineError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 && n <= MAX_BUFFER_SIZE => Ok(n),
        Ok(n) if n > MAX_BUFFER_SIZE => Err(PipelineError::Semantic(format!(
            "Field '{}' is {} bytes, the limit is {}",
            name, n, MAX_BUFFER_SIZE
        ))),
        _ => Err(PipelineError::Semantic(format!(
            "Field '{}' must be a positive integer, got '{}'",
            name, value
        ))),
    }
}

/// Stage identifiers: ASCII letters, digits, `_`, `-`, `.` and `:`; must not
/// start with a digit.
pub fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

/// Parses `byte,word`-style preference lists. Duplicates are rejected.
pub fn parse_exchange_list(value: &str) -> Result<Vec<ExchangeType>, PipelineError> {
    let mut types = Vec::new();
    for token in value.split(',') {
        let ty: ExchangeType = token.parse()?;
        if types.contains(&ty) {
            return Err(PipelineError::Semantic(format!(
                "Exchange type '{}' listed twice in '{}'",
                ty, value
            )));
        }
        types.push(ty);
    }
    Ok(types)
}

//==================================================================================
// III. Validated Config
//==================================================================================

/// A schema-validated configuration. Typed getters never re-report grammar
/// problems; they only fail when a caller asks for a field the schema made optional.
#[derive(Debug, Clone)]
pub struct Config {
    component: &'static str,
    values: KeyValueMap,
}

impl Config {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str, PipelineError> {
        self.get(name).ok_or_else(|| {
            PipelineError::Semantic(format!(
                "Missing field '{}' in {} config",
                name, self.component
            ))
        })
    }

    pub fn get_buffer_size(&self, name: &str) -> Result<usize, PipelineError> {
        parse_buffer_size(name, self.require(name)?)
    }

    pub fn get_path(&self, name: &str) -> Result<PathBuf, PipelineError> {
        self.require(name).map(PathBuf::from)
    }

    pub fn get_exchange_list(&self, name: &str) -> Result<Option<Vec<ExchangeType>>, PipelineError> {
        self.get(name).map(parse_exchange_list).transpose()
    }
}
