// In: src/stage_pipeline/stages/mod.rs

//! The built-in stage kinds.

pub mod reader;
pub mod substitutor;
pub mod writer;

pub use reader::FileReader;
pub use substitutor::Substitutor;
pub use writer::FileWriter;
