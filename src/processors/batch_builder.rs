use crate::error::Result;
use crate::models::cast::{cast_f32, cast_f64, cast_text, parse_timestamp, CastOutcome};
use crate::models::{PartitionKey, ResolvedColumn, ResolvedSchema, SemanticType};
use arrow::array::{
    ArrayRef, Float32Builder, Float64Builder, Int32Builder, StringBuilder,
    StringDictionaryBuilder, TimestampMicrosecondBuilder,
};
use arrow::datatypes::{Int32Type, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use csv::StringRecord;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Typed batches for one source chunk, split by partition.
#[derive(Debug)]
pub struct ChunkBatches {
    pub partitions: BTreeMap<PartitionKey, RecordBatch>,
    /// Cells per column that were present but could not be cast.
    pub coerced: BTreeMap<String, u64>,
}

impl ChunkBatches {
    pub fn total_rows(&self) -> usize {
        self.partitions.values().map(|b| b.num_rows()).sum()
    }

    pub fn coerced_cells(&self) -> u64 {
        self.coerced.values().sum()
    }
}

/// Casts raw rows to the resolved schema and groups them by partition key.
pub struct BatchBuilder {
    schema: ResolvedSchema,
    arrow_schema: SchemaRef,
}

impl BatchBuilder {
    pub fn new(schema: ResolvedSchema) -> Self {
        let arrow_schema = schema.arrow_schema();
        Self {
            schema,
            arrow_schema,
        }
    }

    pub fn arrow_schema(&self) -> SchemaRef {
        self.arrow_schema.clone()
    }

    pub fn build(&self, records: &[StringRecord]) -> Result<ChunkBatches> {
        let mut coerced: BTreeMap<String, u64> = BTreeMap::new();

        let timestamps: Vec<CastOutcome<NaiveDateTime>> = match self.schema.timestamp_index {
            Some(position) => {
                let column = &self.schema.columns[position];
                let parsed: Vec<_> = records
                    .iter()
                    .map(|r| parse_timestamp(r.get(column.source_index)))
                    .collect();
                let bad = parsed.iter().filter(|t| t.is_coerced()).count() as u64;
                if bad > 0 {
                    *coerced.entry(column.name.clone()).or_insert(0) += bad;
                }
                parsed
            }
            None => Vec::new(),
        };

        let mut rows_by_partition: BTreeMap<PartitionKey, Vec<usize>> = BTreeMap::new();
        for row in 0..records.len() {
            let ts = timestamps.get(row).and_then(|t| match t {
                CastOutcome::Value(v) => Some(v),
                CastOutcome::Missing(_) => None,
            });
            rows_by_partition
                .entry(PartitionKey::from_timestamp(ts))
                .or_default()
                .push(row);
        }

        let mut partitions = BTreeMap::new();
        for (key, rows) in rows_by_partition {
            let batch = self.build_partition(records, &rows, &timestamps, key, &mut coerced)?;
            partitions.insert(key, batch);
        }

        Ok(ChunkBatches {
            partitions,
            coerced,
        })
    }

    fn build_partition(
        &self,
        records: &[StringRecord],
        rows: &[usize],
        timestamps: &[CastOutcome<NaiveDateTime>],
        key: PartitionKey,
        coerced: &mut BTreeMap<String, u64>,
    ) -> Result<RecordBatch> {
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.schema.columns.len() + 1);

        for (position, column) in self.schema.columns.iter().enumerate() {
            let array = if Some(position) == self.schema.timestamp_index {
                let mut builder = TimestampMicrosecondBuilder::with_capacity(rows.len());
                for &row in rows {
                    builder.append_option(
                        timestamps[row]
                            .as_ref()
                            .into_option()
                            .map(|ts| ts.and_utc().timestamp_micros()),
                    );
                }
                Arc::new(builder.finish()) as ArrayRef
            } else {
                let (array, bad) = build_column(records, rows, column)?;
                if bad > 0 {
                    *coerced.entry(column.name.clone()).or_insert(0) += bad;
                }
                array
            };
            arrays.push(array);
        }

        let mut years = Int32Builder::with_capacity(rows.len());
        for _ in rows {
            years.append_option(key.year());
        }
        arrays.push(Arc::new(years.finish()));

        Ok(RecordBatch::try_new(self.arrow_schema.clone(), arrays)?)
    }
}

/// Build one column, returning the array and the number of coerced cells.
fn build_column(
    records: &[StringRecord],
    rows: &[usize],
    column: &ResolvedColumn,
) -> Result<(ArrayRef, u64)> {
    let mut bad = 0u64;
    let cells = rows.iter().map(|&row| records[row].get(column.source_index));

    let array: ArrayRef = match column.semantic_type {
        SemanticType::Float32 => {
            let mut builder = Float32Builder::with_capacity(rows.len());
            for raw in cells {
                let outcome = cast_f32(raw);
                bad += outcome.is_coerced() as u64;
                builder.append_option(outcome.into_option());
            }
            Arc::new(builder.finish())
        }
        SemanticType::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for raw in cells {
                let outcome = cast_f64(raw);
                bad += outcome.is_coerced() as u64;
                builder.append_option(outcome.into_option());
            }
            Arc::new(builder.finish())
        }
        SemanticType::Timestamp => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(rows.len());
            for raw in cells {
                let outcome = parse_timestamp(raw);
                bad += outcome.is_coerced() as u64;
                builder.append_option(outcome.into_option().map(|ts| ts.and_utc().timestamp_micros()));
            }
            Arc::new(builder.finish())
        }
        SemanticType::Category => {
            let mut builder = StringDictionaryBuilder::<Int32Type>::new();
            for raw in cells {
                let outcome = cast_text(raw);
                bad += outcome.is_coerced() as u64;
                match outcome {
                    CastOutcome::Value(value) => {
                        builder.append(value)?;
                    }
                    CastOutcome::Missing(_) => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        SemanticType::Text => {
            let mut builder = StringBuilder::with_capacity(rows.len(), rows.len() * 8);
            for raw in cells {
                let outcome = cast_text(raw);
                bad += outcome.is_coerced() as u64;
                builder.append_option(outcome.into_option());
            }
            Arc::new(builder.finish())
        }
    };

    Ok((array, bad))
}
