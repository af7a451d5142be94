// In: src/stage_pipeline/orchestrator/core.rs

//! The stage chain: an ordered list of configured stages plus the links that
//! wiring establishes between neighbours.
//!
//! The chain owns every stage. Links are indices, and the execution cascade
//! runs over the chain's tail slices, so no stage holds a reference to another.

use std::io::{Read, Write};

use serde::Serialize;

use crate::bridge::format::StageReport;
use crate::error::PipelineError;
use crate::stage_pipeline::traits::{Downstream, Stage, StageId, StageState};
use crate::types::ExchangeType;

/// One producer -> consumer edge and the type negotiated on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Link {
    pub producer: StageId,
    pub consumer: StageId,
    pub exchange: ExchangeType,
}

pub struct StageChain {
    stages: Vec<Box<dyn Stage>>,
    links: Vec<Link>,
}

impl StageChain {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            stages,
            links: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn stage(&self, id: StageId) -> Option<&dyn Stage> {
        self.stages.get(id).map(|stage| &**stage)
    }

    //==============================================================================
    // 1. Wiring
    //==============================================================================

    /// Connects every stage to its successor.
    pub fn wire(&mut self) -> Result<(), PipelineError> {
        if self.stages.len() < 2 {
            return Err(PipelineError::FailedPipelineConstruction(format!(
                "A pipeline needs at least a reader and a writer, got {} stage(s)",
                self.stages.len()
            )));
        }
        for producer in 0..self.stages.len() - 1 {
            self.connect(producer, producer + 1)?;
        }
        Ok(())
    }

    /// Negotiates and records the edge `producer -> consumer`.
    ///
    /// Only adjacent stages can be linked; the cascade runs over tail slices.
    pub fn connect(&mut self, producer: StageId, consumer: StageId) -> Result<ExchangeType, PipelineError> {
        if producer >= self.stages.len() || consumer >= self.stages.len() {
            return Err(PipelineError::FailedPipelineConstruction(format!(
                "Cannot link stage #{} to stage #{}: the chain has {} stages",
                producer,
                consumer,
                self.stages.len()
            )));
        }
        if consumer != producer + 1 {
            return Err(PipelineError::FailedPipelineConstruction(format!(
                "Stage #{} can only feed its direct successor, not stage #{}",
                producer, consumer
            )));
        }

        let (head, tail) = self.stages.split_at_mut(consumer);
        let producer_stage: &mut dyn Stage = &mut *head[producer];
        let consumer_stage: &mut dyn Stage = &mut *tail[0];

        let exchange = consumer_stage.set_producer(producer, producer_stage)?;
        producer_stage.set_consumer(consumer)?;

        self.links.push(Link {
            producer,
            consumer,
            exchange,
        });
        Ok(exchange)
    }

    //==============================================================================
    // 2. Streams & Execution
    //==============================================================================

    pub fn attach_streams(
        &mut self,
        input: Box<dyn Read>,
        output: Box<dyn Write>,
    ) -> Result<(), PipelineError> {
        let (first, rest) = self.stages.split_first_mut().ok_or_else(empty_chain)?;
        let last = rest.last_mut().ok_or_else(empty_chain)?;
        first.attach_input(input)?;
        last.attach_output(output)
    }

    /// Runs the first stage once; it drives everything downstream until end of
    /// stream. The last stage must have observed end of stream afterwards.
    pub fn execute(&mut self) -> Result<(), PipelineError> {
        let (first, rest) = self.stages.split_first_mut().ok_or_else(empty_chain)?;
        first.execute(Downstream::new(rest))?;

        for (index, stage) in self.stages.iter().enumerate() {
            if stage.state() != StageState::Finished {
                return Err(PipelineError::InvalidArgument(format!(
                    "Stage #{} '{}' stopped in state {:?} before end of stream",
                    index,
                    stage.id(),
                    stage.state()
                )));
            }
        }
        Ok(())
    }

    pub fn reports(&self) -> Vec<StageReport> {
        self.stages
            .iter()
            .enumerate()
            .map(|(index, stage)| StageReport {
                index,
                stage_id: stage.id().to_string(),
                state: stage.state(),
                input_exchange: stage.input_exchange(),
                stats: stage.stats(),
            })
            .collect()
    }
}

fn empty_chain() -> PipelineError {
    PipelineError::FailedPipelineConstruction("The pipeline has no stages".to_string())
}
