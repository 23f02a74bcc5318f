pub mod batch_builder;
pub mod converter;
pub mod validator;

pub use batch_builder::{BatchBuilder, ChunkBatches};
pub use converter::{ConversionInfo, ConversionSummary, StreamingConverter};
pub use validator::{
    CrossValidator, MissingDataAnalysis, RangeFinding, Representations, RowCountCheck,
    SchemaCheck, ValidationReport,
};
