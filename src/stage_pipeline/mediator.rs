// In: src/stage_pipeline/mediator.rs

//! Type negotiation and the pull accessor between adjacent stages.
//!
//! A producing stage keeps its output in an [`OutputPort`]: its `Buffer` plus
//! the finishing flag. At wiring time the consumer asks the producer for a
//! [`Mediator`] bound to the negotiated [`ExchangeType`]; afterwards the consumer
//! only ever calls [`Mediator::pull`], which drains the port in that type.
//!
//! A pull has three outcomes:
//! * `Data` - a chunk in the negotiated type,
//! * `Pending` - the producer has nothing right now but has not finished,
//! * `End` - the producer has nothing and will never produce more.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::PipelineError;
use crate::stage_pipeline::buffer::Buffer;
use crate::stage_pipeline::traits::{Downstream, Stage};
use crate::types::{Chunk, ExchangeType};

//==================================================================================
// 1. Negotiation
//==================================================================================

/// Picks the first type in the consumer's preference order that the producer
/// also offers.
pub fn negotiate(accepted: &[ExchangeType], offered: &[ExchangeType]) -> Option<ExchangeType> {
    accepted.iter().copied().find(|ty| offered.contains(ty))
}

/// Negotiates with `producer` and returns a mediator bound to the agreed type.
pub(crate) fn negotiate_with(
    consumer_id: &str,
    accepted: &[ExchangeType],
    producer: &mut dyn Stage,
) -> Result<Mediator, PipelineError> {
    let exchange = negotiate(accepted, producer.output_types()).ok_or_else(|| {
        PipelineError::FailedPipelineConstruction(format!(
            "'{}' accepts {:?} but '{}' only offers {:?}",
            consumer_id,
            accepted,
            producer.id(),
            producer.output_types()
        ))
    })?;

    log::info!(
        "Negotiated '{}' exchange between '{}' and '{}'",
        exchange,
        producer.id(),
        consumer_id
    );
    producer.mediator(exchange)
}

//==================================================================================
// 2. The Producer Side: OutputPort
//==================================================================================

/// A producer's output buffer and finishing flag.
#[derive(Debug)]
pub struct OutputPort {
    buffer: Buffer,
    finishing: bool,
    /// The type the (single) consumer negotiated, once wired.
    exchange: Option<ExchangeType>,
}

pub type SharedPort = Rc<RefCell<OutputPort>>;

impl OutputPort {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            buffer: Buffer::new(initial_capacity),
            finishing: false,
            exchange: None,
        }
    }

    pub fn shared(initial_capacity: usize) -> SharedPort {
        Rc::new(RefCell::new(Self::new(initial_capacity)))
    }

    pub fn put(&mut self, bytes: &[u8]) -> Result<(), PipelineError> {
        self.buffer.put_all(bytes)
    }

    pub fn put_range(&mut self, bytes: &[u8], offset: usize, length: usize) -> Result<(), PipelineError> {
        self.buffer.put(bytes, offset, length)
    }

    pub fn set_finishing(&mut self) {
        self.finishing = true;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether the next pull in the negotiated type would return `Data`.
    ///
    /// A word consumer cannot take a lone byte until the producer finishes,
    /// at which point it receives it as the chunk tail.
    pub fn ready(&self) -> bool {
        let unit = if self.finishing {
            1
        } else {
            self.exchange.map_or(1, |ty| ty.unit_len())
        };
        self.buffer.len() >= unit
    }

    fn bind(&mut self, exchange: ExchangeType) {
        self.exchange = Some(exchange);
    }

    fn drain(&mut self, exchange: ExchangeType) -> Pull {
        if self.buffer.is_empty() {
            return if self.finishing { Pull::End } else { Pull::Pending };
        }

        match exchange {
            ExchangeType::Byte => Pull::Data(Chunk::Bytes(self.buffer.take())),
            ExchangeType::Word if self.finishing => {
                let words = self.buffer.take_words();
                let tail = self.buffer.take_tail();
                Pull::Data(Chunk::Words { words, tail })
            }
            ExchangeType::Word if self.buffer.len() >= 2 => Pull::Data(Chunk::Words {
                words: self.buffer.take_words(),
                tail: None,
            }),
            ExchangeType::Word => Pull::Pending,
        }
    }
}

//==================================================================================
// 3. The Consumer Side: Mediator
//==================================================================================

/// The result of one pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pull {
    Data(Chunk),
    Pending,
    End,
}

/// A consumer's handle on its producer's output, fixed to one exchange type.
#[derive(Debug, Clone)]
pub struct Mediator {
    port: SharedPort,
    exchange: ExchangeType,
}

impl Mediator {
    /// Binds a new mediator to `port`. Producers call this from `Stage::mediator`.
    pub fn bind(port: &SharedPort, exchange: ExchangeType) -> Self {
        port.borrow_mut().bind(exchange);
        Self {
            port: Rc::clone(port),
            exchange,
        }
    }

    pub fn exchange_type(&self) -> ExchangeType {
        self.exchange
    }

    /// Drains the producer's next available chunk.
    pub fn pull(&self) -> Pull {
        self.port.borrow_mut().drain(self.exchange)
    }
}

//==================================================================================
// 4. Producer Helpers
//==================================================================================

/// Invokes the consumer until the port holds nothing it can drain.
///
/// A consumer that leaves a ready port untouched would loop forever, so that is
/// reported as a contract violation.
pub(crate) fn feed_downstream(
    port: &SharedPort,
    downstream: &mut Downstream<'_>,
) -> Result<(), PipelineError> {
    loop {
        let before = {
            let port = port.borrow();
            if !port.ready() {
                return Ok(());
            }
            port.len()
        };

        downstream.execute()?;

        if port.borrow().len() >= before {
            return Err(PipelineError::InvalidArgument(format!(
                "Consumer did not drain a ready buffer of {} bytes",
                before
            )));
        }
    }
}

/// Marks the port finishing, flushes what is left and issues the one final
/// downstream call that observes `End`.
pub(crate) fn finish_downstream(
    port: &SharedPort,
    downstream: &mut Downstream<'_>,
) -> Result<(), PipelineError> {
    port.borrow_mut().set_finishing();
    feed_downstream(port, downstream)?;
    downstream.execute()
}
