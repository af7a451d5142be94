// In: src/stage_pipeline/stages/reader.rs

//! The first stage of every chain: pulls fixed-size chunks from the input stream
//! and pushes them downstream until end of stream.

use std::io::{self, Read};
use std::path::Path;

use crate::config::{ConfigSchema, FieldKind, FieldSpec};
use crate::error::PipelineError;
use crate::stage_pipeline::mediator::{self, Mediator, OutputPort, SharedPort};
use crate::stage_pipeline::traits::{
    check_runnable, settle_state, Capabilities, Downstream, Stage, StageId, StageState, StageStats,
};
use crate::types::ExchangeType;

pub const ID: &str = "file_reader";

pub const SCHEMA: ConfigSchema = ConfigSchema {
    component: ID,
    fields: &[FieldSpec::required("buffer_size", FieldKind::BufferSize)],
};

const OUTPUT_TYPES: [ExchangeType; 2] = [ExchangeType::Byte, ExchangeType::Word];

pub struct FileReader {
    state: StageState,
    buffer_size: usize,
    port: SharedPort,
    exchange: Option<ExchangeType>,
    consumer: Option<StageId>,
    input: Option<Box<dyn Read>>,
    stats: StageStats,
}

impl FileReader {
    pub fn new() -> Self {
        Self {
            state: StageState::Unconfigured,
            buffer_size: 0,
            port: OutputPort::shared(0),
            exchange: None,
            consumer: None,
            input: None,
            stats: StageStats::default(),
        }
    }

    pub fn boxed() -> Box<dyn Stage> {
        Box::new(Self::new())
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn mark_wired(&mut self) {
        if self.state == StageState::Configured && self.exchange.is_some() && self.consumer.is_some() {
            self.state = StageState::Wired;
        }
    }

    fn pump(&mut self, downstream: &mut Downstream<'_>) -> Result<(), PipelineError> {
        let input = self.input.as_mut().ok_or_else(|| {
            PipelineError::FailedPipelineConstruction(format!("Stage '{}' has no input stream", ID))
        })?;
        let mut chunk = vec![0u8; self.buffer_size];

        loop {
            let read = read_chunk(&mut **input, &mut chunk)
                .map_err(|e| PipelineError::read_failure(ID, e))?;

            if read == 0 {
                log::info!("'{}' reached end of input after {} bytes", ID, self.stats.bytes_in);
                return mediator::finish_downstream(&self.port, downstream);
            }

            self.stats.bytes_in += read as u64;
            self.port.borrow_mut().put_range(&chunk, 0, read)?;
            self.stats.bytes_out += read as u64;
            mediator::feed_downstream(&self.port, downstream)?;
        }
    }
}

impl Default for FileReader {
    fn default() -> Self {
        Self::new()
    }
}

/// One read, retried only when interrupted. Returns 0 at end of stream.
fn read_chunk(input: &mut dyn Read, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match input.read(chunk) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

impl Stage for FileReader {
    fn id(&self) -> &'static str {
        ID
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::READER
    }

    fn state(&self) -> StageState {
        self.state
    }

    fn set_config(&mut self, path: &Path) -> Result<(), PipelineError> {
        let config = SCHEMA.load(path)?;
        let buffer_size = config.get_buffer_size("buffer_size")?;

        self.buffer_size = buffer_size;
        *self.port.borrow_mut() = OutputPort::new(buffer_size);
        self.state = StageState::Configured;
        log::debug!("Configured '{}' with buffer_size={}", ID, buffer_size);
        Ok(())
    }

    fn input_types(&self) -> &[ExchangeType] {
        &[]
    }

    fn output_types(&self) -> &[ExchangeType] {
        &OUTPUT_TYPES
    }

    fn mediator(&mut self, exchange: ExchangeType) -> Result<Mediator, PipelineError> {
        if self.state != StageState::Configured {
            return Err(PipelineError::FailedPipelineConstruction(format!(
                "Stage '{}' cannot hand out a mediator in state {:?}",
                ID, self.state
            )));
        }
        if !OUTPUT_TYPES.contains(&exchange) {
            return Err(PipelineError::FailedPipelineConstruction(format!(
                "Stage '{}' does not produce '{}'",
                ID, exchange
            )));
        }
        self.exchange = Some(exchange);
        Ok(Mediator::bind(&self.port, exchange))
    }

    fn set_producer(
        &mut self,
        _producer_id: StageId,
        _producer: &mut dyn Stage,
    ) -> Result<ExchangeType, PipelineError> {
        Err(PipelineError::FailedPipelineConstruction(format!(
            "Stage '{}' reads the input file and cannot have a producer",
            ID
        )))
    }

    fn set_consumer(&mut self, consumer_id: StageId) -> Result<(), PipelineError> {
        self.consumer = Some(consumer_id);
        self.mark_wired();
        Ok(())
    }

    fn attach_input(&mut self, input: Box<dyn Read>) -> Result<(), PipelineError> {
        self.input = Some(input);
        Ok(())
    }

    fn execute(&mut self, mut downstream: Downstream<'_>) -> Result<(), PipelineError> {
        if !check_runnable(ID, self.state)? {
            return Ok(());
        }
        self.state = StageState::Running;

        let result = self.pump(&mut downstream);
        settle_state(&mut self.state, &result, true);
        result
    }

    fn stats(&self) -> StageStats {
        self.stats
    }
}
