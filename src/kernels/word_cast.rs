//! This module contains the pure, stateless kernel for reinterpreting a byte
//! stream as big-endian 16-bit words and back.
//!
//! It is the conversion behind the `Word` exchange type. The byte order is fixed
//! (network order) so a word stream means the same thing on every host. The slice
//! reinterpretation relies on `bytemuck` for safety.

use crate::error::PipelineError;

/// Reinterprets an even-length byte slice as big-endian words.
pub fn bytes_to_words(bytes: &[u8]) -> Result<Vec<u16>, PipelineError> {
    if bytes.len() % 2 != 0 {
        return Err(PipelineError::InvalidArgument(format!(
            "Word view requires an even number of bytes, got {}",
            bytes.len()
        )));
    }

    let pairs: &[[u8; 2]] = bytemuck::try_cast_slice(bytes).map_err(|e| {
        PipelineError::InvalidArgument(format!("Failed to view bytes as word pairs: {}", e))
    })?;

    Ok(pairs.iter().map(|pair| u16::from_be_bytes(*pair)).collect())
}

/// Serializes words back to their big-endian byte representation.
pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    let pairs: Vec<[u8; 2]> = words.iter().map(|w| w.to_be_bytes()).collect();
    bytemuck::cast_slice::<[u8; 2], u8>(&pairs).to_vec()
}
