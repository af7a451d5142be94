// In: src/stage_pipeline/traits.rs

//! Defines the behavioral contract every pipeline stage implements.
//!
//! A stage is configured from one key-value artifact, wired to its neighbours
//! through a negotiated [`Mediator`], and then driven by `execute` calls. The
//! first stage runs once and pushes data downstream by invoking its consumer;
//! every later stage pulls from its producer when invoked. The producer-consumer
//! relation is expressed with indices into the chain instead of references, and
//! the "invoke my consumer" call is carried by a [`Downstream`] handle over the
//! tail of the chain.

use std::io::{Read, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::PipelineError;
use crate::stage_pipeline::mediator::Mediator;
use crate::types::ExchangeType;

/// Position of a stage in its chain.
pub type StageId = usize;

//==================================================================================
// 1. Stage Metadata
//==================================================================================

/// The roles a stage kind can take in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    /// Can sit first and pull from the input file.
    pub reader: bool,
    /// Can sit in the interior.
    pub transform: bool,
    /// Can sit last and write the output file.
    pub writer: bool,
}

impl Capabilities {
    pub const READER: Self = Self {
        reader: true,
        transform: false,
        writer: false,
    };
    pub const TRANSFORM: Self = Self {
        reader: false,
        transform: true,
        writer: false,
    };
    pub const WRITER: Self = Self {
        reader: false,
        transform: false,
        writer: true,
    };
}

/// Stage lifecycle. `Finished` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Unconfigured,
    Configured,
    Wired,
    Running,
    Finished,
    Failed,
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Finished | StageState::Failed)
    }
}

/// Bytes seen by a stage: received from its producer (or file) and emitted to
/// its consumer (or file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StageStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

//==================================================================================
// 2. The Stage Trait
//==================================================================================

pub trait Stage {
    /// The registry identifier of this stage kind.
    fn id(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    fn state(&self) -> StageState;

    /// Loads and validates this stage's own config artifact. All-or-nothing.
    fn set_config(&mut self, path: &Path) -> Result<(), PipelineError>;

    /// The types this stage can consume, in preference order. Empty for readers.
    fn input_types(&self) -> &[ExchangeType];

    /// The types this stage can emit. Empty for writers.
    fn output_types(&self) -> &[ExchangeType];

    /// Returns a pull accessor over this stage's output in `exchange`.
    fn mediator(&mut self, exchange: ExchangeType) -> Result<Mediator, PipelineError>;

    /// Negotiates with `producer` and keeps the resulting mediator.
    fn set_producer(
        &mut self,
        producer_id: StageId,
        producer: &mut dyn Stage,
    ) -> Result<ExchangeType, PipelineError>;

    fn set_consumer(&mut self, consumer_id: StageId) -> Result<(), PipelineError>;

    /// The negotiated input type, once wired to a producer.
    fn input_exchange(&self) -> Option<ExchangeType> {
        None
    }

    fn attach_input(&mut self, _input: Box<dyn Read>) -> Result<(), PipelineError> {
        Err(PipelineError::FailedPipelineConstruction(format!(
            "Stage '{}' cannot take an input stream",
            self.id()
        )))
    }

    fn attach_output(&mut self, _output: Box<dyn Write>) -> Result<(), PipelineError> {
        Err(PipelineError::FailedPipelineConstruction(format!(
            "Stage '{}' cannot take an output stream",
            self.id()
        )))
    }

    /// Performs one unit of work. `downstream` reaches this stage's consumer.
    fn execute(&mut self, downstream: Downstream<'_>) -> Result<(), PipelineError>;

    fn stats(&self) -> StageStats;
}

//==================================================================================
// 3. Downstream Invocation
//==================================================================================

/// Mutable access to the stages after the current one.
///
/// `execute` runs the immediate consumer with a handle over the remaining tail,
/// so a call cascade never holds two mutable borrows of the same stage.
pub struct Downstream<'a> {
    stages: &'a mut [Box<dyn Stage>],
}

impl<'a> Downstream<'a> {
    pub(crate) fn new(stages: &'a mut [Box<dyn Stage>]) -> Self {
        Self { stages }
    }

    /// Invokes the consumer once.
    pub fn execute(&mut self) -> Result<(), PipelineError> {
        let (consumer, rest) = self.stages.split_first_mut().ok_or_else(|| {
            PipelineError::FailedPipelineConstruction("Stage has no consumer to invoke".to_string())
        })?;
        consumer.execute(Downstream::new(rest))
    }
}

/// Moves `state` into its post-execute value.
pub(crate) fn settle_state(state: &mut StageState, result: &Result<(), PipelineError>, done: bool) {
    *state = match result {
        Err(_) => StageState::Failed,
        Ok(()) if done => StageState::Finished,
        Ok(()) => StageState::Running,
    };
}

/// Whether a stage in `state` should do work. A finished stage ignores further
/// calls; an unwired or failed one rejects them.
pub(crate) fn check_runnable(id: &str, state: StageState) -> Result<bool, PipelineError> {
    match state {
        StageState::Wired | StageState::Running => Ok(true),
        StageState::Finished => Ok(false),
        other => Err(PipelineError::FailedPipelineConstruction(format!(
            "Stage '{}' cannot execute in state {:?}",
            id, other
        ))),
    }
}
