// In: src/stage_pipeline/registry.rs

//! Maps stage identifiers from a pipeline descriptor to their factories and
//! capabilities.
//!
//! Capabilities are declared at registration so a chain can be checked for a
//! reader at the front and a writer at the back before any stage is
//! instantiated or any file is touched.

use std::collections::BTreeMap;

use crate::error::PipelineError;
use crate::stage_pipeline::stages::{reader, substitutor, writer, FileReader, FileWriter, Substitutor};
use crate::stage_pipeline::traits::{Capabilities, Stage};

pub type StageFactory = fn() -> Box<dyn Stage>;

#[derive(Debug, Clone, Copy)]
struct StageEntry {
    capabilities: Capabilities,
    factory: StageFactory,
}

#[derive(Debug, Clone)]
pub struct StageRegistry {
    entries: BTreeMap<String, StageEntry>,
}

impl StageRegistry {
    /// A registry with no stage kinds.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// A registry with `file_reader`, `substitutor` and `file_writer`.
    pub fn with_builtin_stages() -> Self {
        let mut registry = Self::empty();
        registry.register(reader::ID, Capabilities::READER, FileReader::boxed);
        registry.register(substitutor::ID, Capabilities::TRANSFORM, Substitutor::boxed);
        registry.register(writer::ID, Capabilities::WRITER, FileWriter::boxed);
        registry
    }

    /// Registers (or replaces) a stage kind.
    pub fn register(&mut self, id: impl Into<String>, capabilities: Capabilities, factory: StageFactory) {
        self.entries.insert(
            id.into(),
            StageEntry {
                capabilities,
                factory,
            },
        );
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn capabilities(&self, id: &str) -> Result<Capabilities, PipelineError> {
        self.entry(id).map(|entry| entry.capabilities)
    }

    pub fn instantiate(&self, id: &str) -> Result<Box<dyn Stage>, PipelineError> {
        self.entry(id).map(|entry| (entry.factory)())
    }

    fn entry(&self, id: &str) -> Result<&StageEntry, PipelineError> {
        self.entries.get(id).ok_or_else(|| {
            PipelineError::FailedPipelineConstruction(format!("Unknown stage identifier '{}'", id))
        })
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtin_stages()
    }
}
