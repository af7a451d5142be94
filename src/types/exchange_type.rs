//! This module defines the canonical, type-safe representation of the data
//! exchanged across a producer/consumer edge.

use crate::error::PipelineError;
use crate::kernels::word_cast;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The representation a stage can produce or accept.
///
/// Ordering inside a stage's advertised list is a preference order: the first
/// entry of the consumer's list that the producer also advertises wins.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeType {
    /// Raw bytes.
    Byte,
    /// Big-endian 16-bit words.
    Word,
}

impl ExchangeType {
    /// The smallest number of buffered bytes a drain of this type can hand out
    /// while the producer is still running.
    pub fn unit_len(&self) -> usize {
        match self {
            ExchangeType::Byte => 1,
            ExchangeType::Word => 2,
        }
    }
}

/// Provides the canonical string representation used in config files and reports.
impl fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeType::Byte => write!(f, "byte"),
            ExchangeType::Word => write!(f, "word"),
        }
    }
}

impl FromStr for ExchangeType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "byte" => Ok(ExchangeType::Byte),
            "word" | "short" => Ok(ExchangeType::Word),
            other => Err(PipelineError::Semantic(format!(
                "Unknown exchange type '{}', expected 'byte' or 'word'",
                other
            ))),
        }
    }
}

/// One drained unit of producer output, in the negotiated representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Bytes(Vec<u8>),
    /// Whole words, plus the trailing odd byte when the producer has finished
    /// and an odd number of bytes remained.
    Words { words: Vec<u16>, tail: Option<u8> },
}

impl Chunk {
    /// Number of bytes this chunk represents.
    pub fn byte_len(&self) -> usize {
        match self {
            Chunk::Bytes(bytes) => bytes.len(),
            Chunk::Words { words, tail } => words.len() * 2 + usize::from(tail.is_some()),
        }
    }

    /// Normalizes the chunk to its byte representation.
    ///
    /// Byte chunks are moved out without copying.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Chunk::Bytes(bytes) => bytes,
            Chunk::Words { words, tail } => {
                let mut bytes = word_cast::words_to_bytes(&words);
                if let Some(last) = tail {
                    bytes.push(last);
                }
                bytes
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_type_parsing() {
        assert_eq!("byte".parse::<ExchangeType>().unwrap(), ExchangeType::Byte);
        assert_eq!(" WORD ".parse::<ExchangeType>().unwrap(), ExchangeType::Word);
        assert!(matches!(
            "nibble".parse::<ExchangeType>(),
            Err(PipelineError::Semantic(_))
        ));
    }

    #[test]
    fn test_words_chunk_normalizes_big_endian_with_tail() {
        let chunk = Chunk::Words {
            words: vec![0x0102, 0xA0B0],
            tail: Some(0x7F),
        };
        assert_eq!(chunk.byte_len(), 5);
        assert_eq!(chunk.into_bytes(), vec![0x01, 0x02, 0xA0, 0xB0, 0x7F]);
    }
}
