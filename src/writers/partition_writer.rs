use crate::error::{ProcessingError, Result};
use crate::models::PartitionKey;
use crate::utils::constants::DEFAULT_ROW_GROUP_SIZE;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// One Parquet file written for a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionFile {
    pub partition: PartitionKey,
    pub path: PathBuf,
    pub rows: u64,
    pub bytes: u64,
}

/// Writes typed batches as Parquet files laid out `<root>/<partition>/part-NNNNNN.parquet`.
pub struct PartitionWriter {
    compression: Compression,
    row_group_size: usize,
}

impl PartitionWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = match compression.to_lowercase().as_str() {
            "snappy" => Compression::SNAPPY,
            "gzip" => Compression::GZIP(GzipLevel::default()),
            "lz4" => Compression::LZ4,
            "zstd" => Compression::ZSTD(ZstdLevel::default()),
            "none" => Compression::UNCOMPRESSED,
            _ => {
                return Err(ProcessingError::Config(format!(
                    "Unsupported compression: {}",
                    compression
                )))
            }
        };
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size.max(1);
        self
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// File name for a chunk; stable across runs so a re-run overwrites rather than appends.
    pub fn partition_file_path(root: &Path, partition: PartitionKey, chunk_index: usize) -> PathBuf {
        root.join(partition.dir_name())
            .join(format!("part-{:06}.parquet", chunk_index))
    }

    /// Write one chunk's batch for a partition.
    pub fn write_partition_batch(
        &self,
        root: &Path,
        partition: PartitionKey,
        chunk_index: usize,
        batch: &RecordBatch,
    ) -> Result<PartitionFile> {
        let path = Self::partition_file_path(root, partition, chunk_index);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        self.write_batches(&path, std::slice::from_ref(batch))?;

        Ok(PartitionFile {
            partition,
            rows: batch.num_rows() as u64,
            bytes: fs::metadata(&path)?.len(),
            path,
        })
    }

    /// Write batches sharing one schema to a single file.
    pub fn write_batches(&self, path: &Path, batches: &[RecordBatch]) -> Result<()> {
        let Some(first) = batches.first() else {
            return Ok(());
        };

        let file = File::create(path)?;
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(file, first.schema(), Some(props))?;
        for batch in batches {
            writer.write(batch)?;
        }
        writer.close()?;

        Ok(())
    }

    /// Get file statistics
    pub fn get_file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let row_groups = metadata.num_row_groups();
        let row_group_sizes = (0..row_groups)
            .map(|i| metadata.row_group(i).num_rows())
            .collect();

        Ok(ParquetFileInfo {
            total_rows: metadata.file_metadata().num_rows(),
            row_groups: row_groups as i32,
            row_group_sizes,
            file_size: fs::metadata(path)?.len(),
            compression: self.compression,
        })
    }
}

impl Default for PartitionWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: i32,
    pub row_group_sizes: Vec<i64>,
    pub file_size: u64,
    pub compression: Compression,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Parquet File Summary:\n\
            - Total rows: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} MB\n\
            - Compression: {:?}\n\
            - Avg rows per group: {:.0}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1_048_576.0,
            self.compression,
            self.total_rows as f64 / self.row_groups.max(1) as f64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float32Array, Int32Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn sample_batch(rows: usize) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("aqi", DataType::Float32, true),
            Field::new("year", DataType::Int32, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float32Array::from((0..rows).map(|i| i as f32).collect::<Vec<_>>())),
                Arc::new(Int32Array::from(vec![Some(2024); rows])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_partition_file_layout() {
        let path = PartitionWriter::partition_file_path(Path::new("/store"), PartitionKey::Year(2024), 3);
        assert_eq!(path, PathBuf::from("/store/2024/part-000003.parquet"));

        let path = PartitionWriter::partition_file_path(Path::new("/store"), PartitionKey::Unknown, 12);
        assert_eq!(path, PathBuf::from("/store/unknown/part-000012.parquet"));
    }

    #[test]
    fn test_write_partition_batch() -> Result<()> {
        let temp = TempDir::new()?;
        let writer = PartitionWriter::new().with_row_group_size(4);

        let written = writer.write_partition_batch(temp.path(), PartitionKey::Year(2024), 0, &sample_batch(10))?;
        assert_eq!(written.rows, 10);
        assert!(written.bytes > 0);
        assert!(written.path.exists());

        let info = writer.get_file_info(&written.path)?;
        assert_eq!(info.total_rows, 10);
        assert_eq!(info.row_groups, 3);
        assert_eq!(info.row_group_sizes, vec![4, 4, 2]);
        assert!(info.summary().contains("Total rows: 10"));
        Ok(())
    }

    #[test]
    fn test_rewrite_replaces_file() -> Result<()> {
        let temp = TempDir::new()?;
        let writer = PartitionWriter::new();

        writer.write_partition_batch(temp.path(), PartitionKey::Unknown, 0, &sample_batch(5))?;
        let second = writer.write_partition_batch(temp.path(), PartitionKey::Unknown, 0, &sample_batch(2))?;

        assert_eq!(writer.get_file_info(&second.path)?.total_rows, 2);
        Ok(())
    }

    #[test]
    fn test_different_compressions() -> Result<()> {
        let temp = TempDir::new()?;
        for (i, compression) in ["snappy", "gzip", "lz4", "zstd", "none"].iter().enumerate() {
            let writer = PartitionWriter::new().with_compression(compression)?;
            let written = writer.write_partition_batch(temp.path(), PartitionKey::Year(2020), i, &sample_batch(3))?;
            assert_eq!(written.rows, 3);
        }
        assert!(PartitionWriter::new().with_compression("rar").is_err());
        Ok(())
    }
}
