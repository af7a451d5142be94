//! This module contains the byte substitution kernel and the table it applies.
//!
//! A table is read from text where each nonempty line is `0xHH => 0xHH`. After
//! parsing, the mapping must be a permutation of its own key set: every value is
//! also a key (closure) and no two keys share a value (injectivity). Together these
//! guarantee that the role-swapped table is valid too, so substituting with a
//! table and then with its inverse restores the input exactly.
//!
//! Construction is all-or-nothing: either a fully valid table is returned or an
//! error, never a partially usable table. Bytes absent from the table map to
//! themselves.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use bitvec::prelude::*;

use crate::config;
use crate::error::PipelineError;

/// The delimiter between the two byte tokens of a table line.
pub const TABLE_DELIMITER: &str = "=>";

/// An immutable byte -> byte mapping with identity default.
#[derive(Clone, PartialEq, Eq)]
pub struct SubstitutionTable {
    /// Dense lookup, identity for bytes without an entry.
    lookup: [u8; 256],
    /// The explicit entries, kept for inversion and rendering.
    entries: BTreeMap<u8, u8>,
}

//==================================================================================
// 1. Construction
//==================================================================================

impl SubstitutionTable {
    /// Reads and validates a table file.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let raw = config::load(path, TABLE_DELIMITER)?;
        let table = Self::from_string_pairs(raw.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
        log::info!(
            "Loaded substitution table from {} ({} entries)",
            path.display(),
            table.len()
        );
        Ok(table)
    }

    /// Parses table text.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let raw = config::parse_key_values(text, TABLE_DELIMITER, Path::new("<table>"))?;
        Self::from_string_pairs(raw.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Builds a table from explicit pairs. A repeated key is a grammar error, a
    /// broken closure or injectivity is a semantic error.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = (u8, u8)>,
    {
        let mut entries = BTreeMap::new();
        for (key, value) in pairs {
            if entries.insert(key, value).is_some() {
                return Err(PipelineError::Grammar(format!(
                    "Duplicate substitution key {:#04x}",
                    key
                )));
            }
        }

        validate_entries(&entries)?;
        Ok(Self::from_valid_entries(entries))
    }

    fn from_valid_entries(entries: BTreeMap<u8, u8>) -> Self {
        let mut lookup = [0u8; 256];
        for (slot, byte) in lookup.iter_mut().zip(0..=u8::MAX) {
            *slot = byte;
        }
        for (&key, &value) in &entries {
            lookup[key as usize] = value;
        }
        Self { lookup, entries }
    }

    fn from_string_pairs<'a, I>(pairs: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut parsed = Vec::new();
        for (key, value) in pairs {
            parsed.push((parse_byte_token(key)?, parse_byte_token(value)?));
        }
        Self::from_pairs(parsed)
    }

    /// The identity table.
    pub fn identity() -> Self {
        Self::from_valid_entries(BTreeMap::new())
    }
}

/// Parses a single `0xHH` token.
fn parse_byte_token(token: &str) -> Result<u8, PipelineError> {
    let digits = token
        .strip_prefix("0x")
        .filter(|d| d.len() == 2 && d.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| {
            PipelineError::Grammar(format!("Malformed byte token '{}', expected 0xHH", token))
        })?;
    u8::from_str_radix(digits, 16)
        .map_err(|e| PipelineError::Grammar(format!("Malformed byte token '{}': {}", token, e)))
}

/// Checks closure and injectivity with two 256-slot presence sets.
fn validate_entries(entries: &BTreeMap<u8, u8>) -> Result<(), PipelineError> {
    let mut keys = bitarr![u64, Lsb0; 0; 256];
    for &key in entries.keys() {
        keys.set(key as usize, true);
    }

    let mut seen_values = bitarr![u64, Lsb0; 0; 256];
    for (&key, &value) in entries {
        if !keys[value as usize] {
            return Err(PipelineError::Semantic(format!(
                "Substitution {:#04x} => {:#04x}: value is not itself a key",
                key, value
            )));
        }
        if seen_values[value as usize] {
            return Err(PipelineError::Semantic(format!(
                "Substitution {:#04x} => {:#04x}: value is already the target of another key",
                key, value
            )));
        }
        seen_values.set(value as usize, true);
    }
    Ok(())
}

//==================================================================================
// 2. Substitution
//==================================================================================

impl SubstitutionTable {
    #[inline]
    pub fn substitute_byte(&self, byte: u8) -> u8 {
        self.lookup[byte as usize]
    }

    pub fn substitute_in_place(&self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte = self.lookup[*byte as usize];
        }
    }

    /// Substitutes `input` into an equal-length `output`.
    pub fn substitute_into(&self, input: &[u8], output: &mut [u8]) -> Result<(), PipelineError> {
        if input.len() != output.len() {
            return Err(PipelineError::InvalidArgument(format!(
                "Substitution output length {} does not match input length {}",
                output.len(),
                input.len()
            )));
        }
        for (out, &byte) in output.iter_mut().zip(input) {
            *out = self.lookup[byte as usize];
        }
        Ok(())
    }

    /// The role-swapped table: every `k => v` becomes `v => k`.
    pub fn inverted(&self) -> Self {
        Self::from_valid_entries(self.entries.iter().map(|(&k, &v)| (v, k)).collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.entries.iter().map(|(&k, &v)| (k, v))
    }
}

/// Renders the canonical table text, one `0xHH=>0xHH` line per entry in key order.
impl fmt::Display for SubstitutionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in self.entries() {
            writeln!(f, "{:#04x}{}{:#04x}", key, TABLE_DELIMITER, value)?;
        }
        Ok(())
    }
}

impl fmt::Debug for SubstitutionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries().map(|(k, v)| (format!("{:#04x}", k), format!("{:#04x}", v))))
            .finish()
    }
}
