// In: src/stage_pipeline/stages/writer.rs

//! The last stage of every chain: pulls from its producer and writes to the
//! output stream in fixed-size chunks. Whatever is short of a full chunk stays
//! buffered until end of stream, when the remainder is written and the stream
//! flushed.

use std::io::Write;
use std::path::Path;

use crate::config::{ConfigSchema, FieldKind, FieldSpec};
use crate::error::PipelineError;
use crate::stage_pipeline::buffer::Buffer;
use crate::stage_pipeline::mediator::{self, Mediator, Pull};
use crate::stage_pipeline::traits::{
    check_runnable, settle_state, Capabilities, Downstream, Stage, StageId, StageState, StageStats,
};
use crate::types::ExchangeType;

pub const ID: &str = "file_writer";

pub const SCHEMA: ConfigSchema = ConfigSchema {
    component: ID,
    fields: &[
        FieldSpec::required("buffer_size", FieldKind::BufferSize),
        FieldSpec::optional("accept", FieldKind::ExchangeList),
    ],
};

const DEFAULT_ACCEPT: [ExchangeType; 2] = [ExchangeType::Byte, ExchangeType::Word];

pub struct FileWriter {
    state: StageState,
    buffer_size: usize,
    accepted: Vec<ExchangeType>,
    pending: Buffer,
    producer: Option<(StageId, Mediator)>,
    output: Option<Box<dyn Write>>,
    stats: StageStats,
}

impl FileWriter {
    pub fn new() -> Self {
        Self {
            state: StageState::Unconfigured,
            buffer_size: 0,
            accepted: DEFAULT_ACCEPT.to_vec(),
            pending: Buffer::new(0),
            producer: None,
            output: None,
            stats: StageStats::default(),
        }
    }

    pub fn boxed() -> Box<dyn Stage> {
        Box::new(Self::new())
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Returns whether end of stream was reached.
    fn step(&mut self) -> Result<bool, PipelineError> {
        let pulled = match &self.producer {
            Some((_, mediator)) => mediator.pull(),
            None => {
                return Err(PipelineError::FailedPipelineConstruction(format!(
                    "Stage '{}' has no producer",
                    ID
                )))
            }
        };

        match pulled {
            Pull::Pending => Ok(false),
            Pull::Data(chunk) => {
                let bytes = chunk.into_bytes();
                self.stats.bytes_in += bytes.len() as u64;
                self.pending.put_all(&bytes)?;
                self.write_full_chunks()?;
                Ok(false)
            }
            Pull::End => {
                self.write_remainder()?;
                log::info!("'{}' finished after writing {} bytes", ID, self.stats.bytes_out);
                Ok(true)
            }
        }
    }

    fn write_full_chunks(&mut self) -> Result<(), PipelineError> {
        if self.pending.len() < self.buffer_size {
            return Ok(());
        }

        let chunk_size = self.buffer_size;
        let data = self.pending.take();
        let full = data.len() - data.len() % chunk_size;
        let output = self.output_stream()?;
        for chunk in data[..full].chunks(chunk_size) {
            output
                .write_all(chunk)
                .map_err(|e| PipelineError::write_failure(ID, e))?;
        }
        self.stats.bytes_out += full as u64;
        self.pending.put(&data, full, data.len() - full)
    }

    fn write_remainder(&mut self) -> Result<(), PipelineError> {
        let rest = self.pending.take();
        let output = self.output_stream()?;
        if !rest.is_empty() {
            output
                .write_all(&rest)
                .map_err(|e| PipelineError::write_failure(ID, e))?;
        }
        output.flush().map_err(|e| PipelineError::write_failure(ID, e))?;
        self.stats.bytes_out += rest.len() as u64;
        Ok(())
    }

    fn output_stream(&mut self) -> Result<&mut Box<dyn Write>, PipelineError> {
        self.output.as_mut().ok_or_else(|| {
            PipelineError::FailedPipelineConstruction(format!("Stage '{}' has no output stream", ID))
        })
    }
}

impl Default for FileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for FileWriter {
    fn id(&self) -> &'static str {
        ID
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::WRITER
    }

    fn state(&self) -> StageState {
        self.state
    }

    fn set_config(&mut self, path: &Path) -> Result<(), PipelineError> {
        let config = SCHEMA.load(path)?;
        let buffer_size = config.get_buffer_size("buffer_size")?;
        let accepted = config
            .get_exchange_list("accept")?
            .unwrap_or_else(|| DEFAULT_ACCEPT.to_vec());

        self.buffer_size = buffer_size;
        self.accepted = accepted;
        self.pending = Buffer::new(buffer_size);
        self.state = StageState::Configured;
        log::debug!("Configured '{}' with buffer_size={}", ID, buffer_size);
        Ok(())
    }

    fn input_types(&self) -> &[ExchangeType] {
        &self.accepted
    }

    fn output_types(&self) -> &[ExchangeType] {
        &[]
    }

    fn mediator(&mut self, _exchange: ExchangeType) -> Result<Mediator, PipelineError> {
        Err(PipelineError::FailedPipelineConstruction(format!(
            "Stage '{}' writes the output file and has no consumer side",
            ID
        )))
    }

    fn set_producer(
        &mut self,
        producer_id: StageId,
        producer: &mut dyn Stage,
    ) -> Result<ExchangeType, PipelineError> {
        if self.state != StageState::Configured {
            return Err(PipelineError::FailedPipelineConstruction(format!(
                "Stage '{}' must be configured before wiring",
                ID
            )));
        }
        let mediator = mediator::negotiate_with(ID, &self.accepted, producer)?;
        let exchange = mediator.exchange_type();
        self.producer = Some((producer_id, mediator));
        self.state = StageState::Wired;
        Ok(exchange)
    }

    fn set_consumer(&mut self, _consumer_id: StageId) -> Result<(), PipelineError> {
        Err(PipelineError::FailedPipelineConstruction(format!(
            "Stage '{}' cannot have a consumer",
            ID
        )))
    }

    fn input_exchange(&self) -> Option<ExchangeType> {
        self.producer.as_ref().map(|(_, mediator)| mediator.exchange_type())
    }

    fn attach_output(&mut self, output: Box<dyn Write>) -> Result<(), PipelineError> {
        self.output = Some(output);
        Ok(())
    }

    fn execute(&mut self, _downstream: Downstream<'_>) -> Result<(), PipelineError> {
        if !check_runnable(ID, self.state)? {
            return Ok(());
        }
        self.state = StageState::Running;

        let result = self.step();
        let done = matches!(result, Ok(true));
        let result = result.map(|_| ());
        settle_state(&mut self.state, &result, done);
        result
    }

    fn stats(&self) -> StageStats {
        self.stats
    }
}
