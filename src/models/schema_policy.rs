use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Derived partition column appended to every stored batch.
pub const PARTITION_COLUMN: &str = "year";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    /// Low-cardinality strings, dictionary encoded.
    Category,
    Float32,
    Float64,
    Timestamp,
    /// Free text for source columns the policy does not name.
    Text,
}

impl SemanticType {
    pub fn arrow_type(&self) -> DataType {
        match self {
            SemanticType::Category => {
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
            }
            SemanticType::Float32 => DataType::Float32,
            SemanticType::Float64 => DataType::Float64,
            SemanticType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            SemanticType::Text => DataType::Utf8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub source_name: String,
    pub column_name: String,
    pub semantic_type: SemanticType,
}

/// Declarative mapping from source field name to stored column and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPolicy {
    columns: Vec<ColumnSpec>,
    timestamp_source: String,
}

impl SchemaPolicy {
    pub fn new(timestamp_source: &str, entries: &[(&str, SemanticType)]) -> Self {
        let mut columns: Vec<ColumnSpec> = entries
            .iter()
            .map(|(name, semantic_type)| ColumnSpec {
                source_name: name.to_string(),
                column_name: sanitize_column_name(name),
                semantic_type: *semantic_type,
            })
            .collect();

        if !columns.iter().any(|c| c.source_name == timestamp_source) {
            columns.insert(
                0,
                ColumnSpec {
                    source_name: timestamp_source.to_string(),
                    column_name: sanitize_column_name(timestamp_source),
                    semantic_type: SemanticType::Timestamp,
                },
            );
        }

        Self {
            columns,
            timestamp_source: timestamp_source.to_string(),
        }
    }

    /// Policy for the hourly air quality monitoring export.
    pub fn air_quality() -> Self {
        use SemanticType::*;

        Self::new(
            "date",
            &[
                ("date", Timestamp),
                ("sitename", Category),
                ("county", Category),
                ("aqi", Float32),
                ("pollutant", Category),
                ("status", Category),
                ("so2", Float32),
                ("co", Float32),
                ("o3", Float32),
                ("o3_8hr", Float32),
                ("pm10", Float32),
                ("pm2.5", Float32),
                ("no2", Float32),
                ("nox", Float32),
                ("no", Float32),
                ("windspeed", Float32),
                ("winddirec", Float32),
                ("unit", Category),
                ("co_8hr", Float32),
                ("pm2.5_avg", Float32),
                ("pm10_avg", Float32),
                ("so2_avg", Float32),
                ("longitude", Float64),
                ("latitude", Float64),
                ("siteid", Float32),
            ],
        )
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn lookup(&self, source_name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.source_name == source_name)
    }

    pub fn timestamp_source(&self) -> &str {
        &self.timestamp_source
    }

    /// Stored name of the timestamp column.
    pub fn timestamp_column(&self) -> String {
        sanitize_column_name(&self.timestamp_source)
    }

    /// Stored column names the policy expects to find in the columnar store.
    pub fn expected_columns(&self) -> BTreeSet<String> {
        self.columns.iter().map(|c| c.column_name.clone()).collect()
    }

    /// Columns the pipeline derives itself rather than reading from the source.
    pub fn derived_columns(&self) -> BTreeSet<String> {
        [PARTITION_COLUMN.to_string()].into_iter().collect()
    }

    /// Bind a concrete source header to the policy.
    ///
    /// Any header resolves: unknown names become text columns and clashing names
    /// are suffixed with their position.
    pub fn resolve(&self, header: &StringRecord) -> ResolvedSchema {
        let mut columns = Vec::with_capacity(header.len());
        let mut taken: HashSet<String> = HashSet::new();
        taken.insert(PARTITION_COLUMN.to_string());

        for (source_index, raw_name) in header.iter().enumerate() {
            let source_name = raw_name.trim();
            let (mut name, semantic_type) = match self.lookup(source_name) {
                Some(spec) => (spec.column_name.clone(), spec.semantic_type),
                None => {
                    debug!(column = source_name, "column not in schema policy, kept as text");
                    (sanitize_column_name(source_name), SemanticType::Text)
                }
            };

            if name.is_empty() {
                name = format!("column_{}", source_index);
            }
            if taken.contains(&name) {
                let renamed = format!("{}_{}", name, source_index);
                warn!(column = %name, renamed = %renamed, "duplicate column name in source header");
                name = renamed;
            }
            taken.insert(name.clone());

            columns.push(ResolvedColumn {
                source_index,
                name,
                semantic_type,
            });
        }

        let timestamp_index = header
            .iter()
            .position(|h| h.trim() == self.timestamp_source)
            .and_then(|source_index| columns.iter().position(|c| c.source_index == source_index));

        if timestamp_index.is_none() {
            warn!(
                column = %self.timestamp_source,
                "timestamp column missing from source header; every row lands in the unknown partition"
            );
        }

        let mut fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(&c.name, c.semantic_type.arrow_type(), true))
            .collect();
        fields.push(Field::new(PARTITION_COLUMN, DataType::Int32, true));

        ResolvedSchema {
            columns,
            timestamp_index,
            arrow_schema: Arc::new(Schema::new(fields)),
        }
    }
}

impl Default for SchemaPolicy {
    fn default() -> Self {
        Self::air_quality()
    }
}

/// A source column bound to its stored name and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub source_index: usize,
    pub name: String,
    pub semantic_type: SemanticType,
}

#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub columns: Vec<ResolvedColumn>,
    /// Position in `columns` of the timestamp column, if the source has one.
    pub timestamp_index: Option<usize>,
    arrow_schema: SchemaRef,
}

impl ResolvedSchema {
    pub fn arrow_schema(&self) -> SchemaRef {
        self.arrow_schema.clone()
    }
}

/// Replace every character outside `[A-Za-z0-9_]` with `_` so names are SQL safe.
pub fn sanitize_column_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_column_name() {
        assert_eq!(sanitize_column_name("pm2.5"), "pm2_5");
        assert_eq!(sanitize_column_name("pm2.5_avg"), "pm2_5_avg");
        assert_eq!(sanitize_column_name(" aqi "), "aqi");
    }

    #[test]
    fn test_air_quality_policy() {
        let policy = SchemaPolicy::air_quality();
        assert_eq!(policy.columns().len(), 25);
        assert_eq!(policy.timestamp_column(), "date");
        assert_eq!(
            policy.lookup("pm2.5").map(|c| c.column_name.as_str()),
            Some("pm2_5")
        );
        assert_eq!(
            policy.lookup("sitename").map(|c| c.semantic_type),
            Some(SemanticType::Category)
        );
        assert!(policy.expected_columns().contains("latitude"));
        assert!(!policy.expected_columns().contains(PARTITION_COLUMN));
    }

    #[test]
    fn test_resolve_header() {
        let policy = SchemaPolicy::air_quality();
        let header = StringRecord::from(vec!["date", "sitename", "aqi", "pm2.5", "remark"]);
        let resolved = policy.resolve(&header);

        assert_eq!(resolved.timestamp_index, Some(0));
        let names: Vec<&str> = resolved.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["date", "sitename", "aqi", "pm2_5", "remark"]);
        assert_eq!(resolved.columns[4].semantic_type, SemanticType::Text);

        let schema = resolved.arrow_schema();
        assert_eq!(schema.fields().len(), 6);
        assert_eq!(schema.field(5).name(), PARTITION_COLUMN);
        assert_eq!(
            schema.field(0).data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, None)
        );
    }

    #[test]
    fn test_resolve_without_timestamp() {
        let policy = SchemaPolicy::air_quality();
        let header = StringRecord::from(vec!["sitename", "aqi"]);
        let resolved = policy.resolve(&header);
        assert_eq!(resolved.timestamp_index, None);
    }

    #[test]
    fn test_resolve_renames_collisions() {
        let policy = SchemaPolicy::air_quality();
        let header = StringRecord::from(vec!["date", "pm2.5", "pm2_5", "year"]);
        let resolved = policy.resolve(&header);
        let names: Vec<&str> = resolved.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["date", "pm2_5", "pm2_5_2", "year_3"]);
    }
}
