use crate::error::{ProcessingError, Result};
use crate::models::{PartitionKey, StoreManifest};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float64Type};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;

const SCAN_BATCH_SIZE: usize = 8192;

/// Manifest-driven reads over the partitioned Parquet store.
pub struct StoreReader<'a> {
    manifest: &'a StoreManifest,
    batch_size: usize,
}

impl<'a> StoreReader<'a> {
    pub fn new(manifest: &'a StoreManifest) -> Self {
        Self {
            manifest,
            batch_size: SCAN_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Total rows across all files, from Parquet footers only.
    pub fn row_count(&self) -> Result<u64> {
        Ok(self.partition_row_counts()?.values().sum())
    }

    pub fn partition_row_counts(&self) -> Result<BTreeMap<PartitionKey, u64>> {
        let mut counts = BTreeMap::new();
        for entry in self.manifest.entries() {
            let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&entry.path)?)?;
            let rows = builder.metadata().file_metadata().num_rows().max(0) as u64;
            *counts.entry(entry.partition).or_insert(0) += rows;
        }
        Ok(counts)
    }

    /// Union of the column names found in every file's schema.
    pub fn column_names(&self) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for entry in self.manifest.entries() {
            let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&entry.path)?)?;
            names.extend(builder.schema().fields().iter().map(|f| f.name().clone()));
        }
        Ok(names)
    }

    /// Stream batches of the named columns (all columns when `columns` is `None`).
    ///
    /// Files lacking some of the requested columns yield batches with the columns
    /// they do have; callers look columns up by name.
    pub fn scan<F>(&self, columns: Option<&[&str]>, mut visit: F) -> Result<()>
    where
        F: FnMut(PartitionKey, &RecordBatch) -> Result<()>,
    {
        for entry in self.manifest.entries() {
            let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&entry.path)?)?;

            let mask = match columns {
                Some(names) => {
                    let schema = builder.schema().clone();
                    let indices: Vec<usize> = names
                        .iter()
                        .filter_map(|name| schema.index_of(name).ok())
                        .collect();
                    if indices.is_empty() {
                        continue;
                    }
                    ProjectionMask::roots(builder.parquet_schema(), indices)
                }
                None => ProjectionMask::all(),
            };

            let reader = builder
                .with_projection(mask)
                .with_batch_size(self.batch_size)
                .build()?;

            for batch in reader {
                visit(entry.partition, &batch?)?;
            }
        }
        Ok(())
    }

    /// Materialise up to `limit` rows, reading files in manifest order.
    pub fn read_head(&self, limit: usize) -> Result<Vec<RecordBatch>> {
        let mut batches = Vec::new();
        let mut remaining = limit;

        for entry in self.manifest.entries() {
            if remaining == 0 {
                break;
            }
            let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&entry.path)?)?
                .with_batch_size(self.batch_size.min(remaining).max(1))
                .build()?;

            for batch in reader {
                let batch = batch?;
                if batch.num_rows() >= remaining {
                    batches.push(batch.slice(0, remaining));
                    remaining = 0;
                    break;
                }
                remaining -= batch.num_rows();
                batches.push(batch);
            }
        }

        Ok(batches)
    }
}

/// View any numeric column as `Option<f64>` values.
pub fn numeric_values(array: &ArrayRef) -> Result<Vec<Option<f64>>> {
    if !array.data_type().is_numeric() {
        return Err(ProcessingError::InvalidFormat(format!(
            "expected a numeric column, found {}",
            array.data_type()
        )));
    }
    let as_f64 = arrow::compute::cast(array, &DataType::Float64)?;
    Ok(as_f64.as_primitive::<Float64Type>().iter().collect())
}

/// View any string or dictionary-of-string column as owned strings.
pub fn string_values(array: &ArrayRef) -> Result<Vec<Option<String>>> {
    let as_utf8 = arrow::compute::cast(array, &DataType::Utf8)?;
    Ok(as_utf8
        .as_string::<i32>()
        .iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ManifestEntry;
    use arrow::array::{Float32Array, Int32Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use parquet::arrow::ArrowWriter;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_file(path: &Path, aqi: Vec<Option<f32>>, site: Vec<&str>) {
        let schema = Arc::new(Schema::new(vec![
            Field::new("aqi", DataType::Float32, true),
            Field::new("sitename", DataType::Utf8, true),
            Field::new("year", DataType::Int32, true),
        ]));
        let rows = aqi.len();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Float32Array::from(aqi)),
                Arc::new(StringArray::from(site)),
                Arc::new(Int32Array::from(vec![Some(2024); rows])),
            ],
        )
        .unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    fn sample_manifest(temp: &TempDir) -> StoreManifest {
        let a = temp.path().join("2024/part-000000.parquet");
        let b = temp.path().join("2024/part-000001.parquet");
        write_file(&a, vec![Some(10.0), None, Some(30.0)], vec!["A", "B", "C"]);
        write_file(&b, vec![Some(40.0), Some(50.0)], vec!["D", "E"]);
        StoreManifest::from_entries(
            temp.path(),
            vec![
                ManifestEntry {
                    partition: PartitionKey::Year(2024),
                    path: a,
                },
                ManifestEntry {
                    partition: PartitionKey::Year(2024),
                    path: b,
                },
            ],
        )
    }

    #[test]
    fn test_row_counts_and_columns() -> Result<()> {
        let temp = TempDir::new()?;
        let manifest = sample_manifest(&temp);
        let reader = StoreReader::new(&manifest);

        assert_eq!(reader.row_count()?, 5);
        assert_eq!(
            reader.partition_row_counts()?.get(&PartitionKey::Year(2024)),
            Some(&5)
        );
        let columns: Vec<String> = reader.column_names()?.into_iter().collect();
        assert_eq!(columns, vec!["aqi", "sitename", "year"]);
        Ok(())
    }

    #[test]
    fn test_projected_scan() -> Result<()> {
        let temp = TempDir::new()?;
        let manifest = sample_manifest(&temp);

        let mut values = Vec::new();
        StoreReader::new(&manifest).scan(Some(&["aqi", "not_there"]), |_, batch| {
            assert_eq!(batch.num_columns(), 1);
            let column = batch.column_by_name("aqi").unwrap();
            values.extend(numeric_values(column)?);
            Ok(())
        })?;

        assert_eq!(
            values,
            vec![Some(10.0), None, Some(30.0), Some(40.0), Some(50.0)]
        );
        Ok(())
    }

    #[test]
    fn test_read_head_respects_limit() -> Result<()> {
        let temp = TempDir::new()?;
        let manifest = sample_manifest(&temp);

        let batches = StoreReader::new(&manifest).read_head(4)?;
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 4);

        let all = StoreReader::new(&manifest).read_head(100)?;
        assert_eq!(all.iter().map(|b| b.num_rows()).sum::<usize>(), 5);
        Ok(())
    }

    #[test]
    fn test_string_values_from_column() -> Result<()> {
        let array: ArrayRef = Arc::new(StringArray::from(vec![Some("A"), None]));
        assert_eq!(string_values(&array)?, vec![Some("A".to_string()), None]);
        assert!(numeric_values(&array).is_err());
        Ok(())
    }
}
