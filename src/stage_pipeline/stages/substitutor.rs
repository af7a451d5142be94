// In: src/stage_pipeline/stages/substitutor.rs

//! The interior stage: pulls from its producer, maps every byte through the
//! configured [`SubstitutionTable`] and offers the result to its consumer.

use std::path::Path;

use crate::config::{ConfigSchema, FieldKind, FieldSpec};
use crate::error::PipelineError;
use crate::kernels::SubstitutionTable;
use crate::stage_pipeline::mediator::{self, Mediator, OutputPort, Pull, SharedPort};
use crate::stage_pipeline::traits::{
    check_runnable, settle_state, Capabilities, Downstream, Stage, StageId, StageState, StageStats,
};
use crate::types::ExchangeType;

pub const ID: &str = "substitutor";

pub const SCHEMA: ConfigSchema = ConfigSchema {
    component: ID,
    fields: &[
        FieldSpec::required("table_file", FieldKind::ExistingFile),
        FieldSpec::optional("accept", FieldKind::ExchangeList),
    ],
};

const DEFAULT_ACCEPT: [ExchangeType; 2] = [ExchangeType::Byte, ExchangeType::Word];
const OUTPUT_TYPES: [ExchangeType; 2] = [ExchangeType::Byte, ExchangeType::Word];

/// Initial output buffer size; the buffer grows to whatever a pull delivers.
const INITIAL_CAPACITY: usize = 16;

pub struct Substitutor {
    state: StageState,
    table: SubstitutionTable,
    accepted: Vec<ExchangeType>,
    producer: Option<(StageId, Mediator)>,
    consumer: Option<StageId>,
    port: SharedPort,
    exchange: Option<ExchangeType>,
    stats: StageStats,
}

impl Substitutor {
    pub fn new() -> Self {
        Self {
            state: StageState::Unconfigured,
            table: SubstitutionTable::identity(),
            accepted: DEFAULT_ACCEPT.to_vec(),
            producer: None,
            consumer: None,
            port: OutputPort::shared(INITIAL_CAPACITY),
            exchange: None,
            stats: StageStats::default(),
        }
    }

    pub fn boxed() -> Box<dyn Stage> {
        Box::new(Self::new())
    }

    pub fn table(&self) -> &SubstitutionTable {
        &self.table
    }

    fn mark_wired(&mut self) {
        if self.state == StageState::Configured
            && self.producer.is_some()
            && self.exchange.is_some()
            && self.consumer.is_some()
        {
            self.state = StageState::Wired;
        }
    }

    /// Returns whether end of stream has been forwarded.
    fn step(&mut self, downstream: &mut Downstream<'_>) -> Result<bool, PipelineError> {
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
                let mut bytes = chunk.into_bytes();
                self.stats.bytes_in += bytes.len() as u64;
                self.table.substitute_in_place(&mut bytes);
                self.port.borrow_mut().put(&bytes)?;
                self.stats.bytes_out += bytes.len() as u64;
                mediator::feed_downstream(&self.port, downstream)?;
                Ok(false)
            }
            Pull::End => {
                log::debug!("'{}' saw end of stream after {} bytes", ID, self.stats.bytes_in);
                mediator::finish_downstream(&self.port, downstream)?;
                Ok(true)
            }
        }
    }
}

impl Default for Substitutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for Substitutor {
    fn id(&self) -> &'static str {
        ID
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::TRANSFORM
    }

    fn state(&self) -> StageState {
        self.state
    }

    fn set_config(&mut self, path: &Path) -> Result<(), PipelineError> {
        let config = SCHEMA.load(path)?;
        let table = SubstitutionTable::from_file(&config.get_path("table_file")?)?;
        let accepted = config
            .get_exchange_list("accept")?
            .unwrap_or_else(|| DEFAULT_ACCEPT.to_vec());

        self.table = table;
        self.accepted = accepted;
        self.state = StageState::Configured;
        Ok(())
    }

    fn input_types(&self) -> &[ExchangeType] {
        &self.accepted
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
        self.exchange = Some(exchange);
        let mediator = Mediator::bind(&self.port, exchange);
        self.mark_wired();
        Ok(mediator)
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
        self.mark_wired();
        Ok(exchange)
    }

    fn set_consumer(&mut self, consumer_id: StageId) -> Result<(), PipelineError> {
        self.consumer = Some(consumer_id);
        self.mark_wired();
        Ok(())
    }

    fn input_exchange(&self) -> Option<ExchangeType> {
        self.producer.as_ref().map(|(_, mediator)| mediator.exchange_type())
    }

    fn execute(&mut self, mut downstream: Downstream<'_>) -> Result<(), PipelineError> {
        if !check_runnable(ID, self.state)? {
            return Ok(());
        }
        self.state = StageState::Running;

        let result = self.step(&mut downstream);
        let done = matches!(result, Ok(true));
        let result = result.map(|_| ());
        settle_state(&mut self.state, &result, done);
        result
    }

    fn stats(&self) -> StageStats {
        self.stats
    }
}
