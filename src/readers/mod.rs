pub mod source_reader;
pub mod store_reader;

pub use source_reader::{count_data_lines, SourceChunk, SourceChunks, SourceReader};
pub use store_reader::{numeric_values, string_values, StoreReader};
