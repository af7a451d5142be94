//! Pure, stateless byte kernels used by the pipeline stages.
//!
//! Kernels know nothing about stages, buffers or files. They take slices in and
//! hand slices or vectors back, and are panic-free.

pub mod substitution;
pub mod word_cast;

pub use substitution::SubstitutionTable;
