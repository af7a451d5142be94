// In: src/stage_pipeline/buffer.rs

//! The growable byte accumulator every producing stage owns.
//!
//! A `Buffer` tracks a logical fill (`top`) inside a physical backing store. The
//! backing store only ever grows, by doubling with a floor of the requested size,
//! so a steady-state pipeline stops allocating after its first few chunks.
//!
//! Drains hand out independent copies sized exactly to what was drained; nothing
//! returned by a drain aliases storage that a later `put` writes into.

use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct Buffer {
    data: Vec<u8>,
    top: usize,
}

impl Buffer {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            data: vec![0; initial_capacity],
            top: 0,
        }
    }

    /// Appends `source[offset..offset + length]` after the current fill.
    ///
    /// Callers drain before refilling, so in practice the fill is empty or holds
    /// one carried byte from a word drain.
    pub fn put(&mut self, source: &[u8], offset: usize, length: usize) -> Result<(), PipelineError> {
        let end = offset.checked_add(length).filter(|&end| end <= source.len()).ok_or_else(|| {
            PipelineError::InvalidArgument(format!(
                "Buffer put range {}..{}+{} is outside a source of {} bytes",
                offset,
                offset,
                length,
                source.len()
            ))
        })?;

        let needed = self.top + length;
        if needed > self.data.len() {
            self.grow(needed);
        }

        self.data[self.top..needed].copy_from_slice(&source[offset..end]);
        self.top = needed;
        Ok(())
    }

    /// Appends a whole slice.
    pub fn put_all(&mut self, source: &[u8]) -> Result<(), PipelineError> {
        self.put(source, 0, source.len())
    }

    /// Drains a copy of exactly the current fill.
    pub fn take(&mut self) -> Vec<u8> {
        let copy = self.data[..self.top].to_vec();
        self.top = 0;
        copy
    }

    /// Drains all complete big-endian word pairs.
    ///
    /// An odd trailing byte is carried to the front of the buffer so the next
    /// fill completes its pair; it is not dropped.
    pub fn take_words(&mut self) -> Vec<u16> {
        let pair_bytes = self.top - self.top % 2;
        let words: Vec<u16> = self.data[..pair_bytes]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();

        if self.top % 2 == 1 {
            self.data[0] = self.data[self.top - 1];
            self.top = 1;
        } else {
            self.top = 0;
        }
        words
    }

    /// Drains a lone carried byte, if that is all the buffer holds.
    pub fn take_tail(&mut self) -> Option<u8> {
        if self.top == 1 {
            self.top = 0;
            Some(self.data[0])
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    pub fn len(&self) -> usize {
        self.top
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    fn grow(&mut self, required: usize) {
        let new_capacity = required.max(2 * self.data.len());
        log::debug!(
            "Buffer grows from {} to {} bytes",
            self.data.len(),
            new_capacity
        );
        self.data.resize(new_capacity, 0);
    }
}
