pub mod error;
pub mod file;

pub use file::csv::{destination::CsvBlockWriter, source::CsvSampleReader};
