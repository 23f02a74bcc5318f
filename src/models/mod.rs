pub mod cast;
pub mod partition;
pub mod schema_policy;

pub use cast::{CastOutcome, MissingReason, NULL_TOKENS};
pub use partition::{ManifestEntry, PartitionKey, StoreManifest};
pub use schema_policy::{ColumnSpec, ResolvedColumn, ResolvedSchema, SchemaPolicy, SemanticType};
