//! This module defines the core, strongly-typed data representations exchanged
//! between pipeline stages.
//!
//! It currently includes the `ExchangeType` enum, which names the representations
//! a stage can produce or accept, and `Chunk`, the unit of data a mediator hands
//! from a producer to its consumer.

pub mod exchange_type;

// Re-export the main type(s) for easier access.
pub use exchange_type::{Chunk, ExchangeType};
