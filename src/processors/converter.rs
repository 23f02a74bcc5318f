use crate::error::{ProcessingError, Result};
use crate::models::{PartitionKey, SchemaPolicy};
use crate::processors::batch_builder::BatchBuilder;
use crate::readers::SourceReader;
use crate::utils::constants::{DEFAULT_CHUNK_SIZE, STAGING_PREFIX};
use crate::utils::progress::ProgressReporter;
use crate::writers::PartitionWriter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Static facts about a conversion before it runs.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionInfo {
    pub source_path: PathBuf,
    pub output_dir: PathBuf,
    pub chunk_size: usize,
    pub source_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionSummary {
    pub total_rows: u64,
    /// Sorted keys; `unknown` lists last.
    pub partitions: Vec<PartitionKey>,
    pub rows_per_partition: BTreeMap<PartitionKey, u64>,
    pub chunks_read: usize,
    pub files_written: usize,
    pub coerced_cells: u64,
    pub coerced_by_column: BTreeMap<String, u64>,
    pub output_bytes: u64,
    pub elapsed_seconds: f64,
}

impl ConversionSummary {
    pub fn summary(&self) -> String {
        let partitions: Vec<String> = self
            .rows_per_partition
            .iter()
            .map(|(key, rows)| format!("{}={}", key, rows))
            .collect();

        format!(
            "Conversion Summary:\n\
            - Rows processed: {}\n\
            - Partitions: {} ({})\n\
            - Files written: {}\n\
            - Coerced cells: {}\n\
            - Output size: {:.2} MB\n\
            - Elapsed: {:.2}s",
            self.total_rows,
            self.partitions.len(),
            partitions.join(", "),
            self.files_written,
            self.coerced_cells,
            self.output_bytes as f64 / 1_048_576.0,
            self.elapsed_seconds
        )
    }
}

/// Streams a delimited source into a year-partitioned Parquet store.
pub struct StreamingConverter {
    source_path: PathBuf,
    output_dir: PathBuf,
    chunk_size: usize,
    policy: SchemaPolicy,
    writer: PartitionWriter,
}

impl StreamingConverter {
    pub fn new(source_path: &Path, output_dir: &Path, chunk_size: usize) -> Result<Self> {
        if !source_path.is_file() {
            return Err(ProcessingError::SourceNotFound(source_path.to_path_buf()));
        }
        if chunk_size == 0 {
            return Err(ProcessingError::Config(
                "chunk size must be at least 1".to_string(),
            ));
        }
        fs::create_dir_all(output_dir)?;

        Ok(Self {
            source_path: source_path.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            chunk_size,
            policy: SchemaPolicy::default(),
            writer: PartitionWriter::new(),
        })
    }

    pub fn with_default_chunk_size(source_path: &Path, output_dir: &Path) -> Result<Self> {
        Self::new(source_path, output_dir, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_policy(mut self, policy: SchemaPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_writer(mut self, writer: PartitionWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn policy(&self) -> &SchemaPolicy {
        &self.policy
    }

    pub fn conversion_info(&self) -> Result<ConversionInfo> {
        Ok(ConversionInfo {
            source_path: self.source_path.clone(),
            output_dir: self.output_dir.clone(),
            chunk_size: self.chunk_size,
            source_bytes: fs::metadata(&self.source_path)?.len(),
        })
    }

    /// Convert the whole source.
    ///
    /// Files are staged in a scratch directory under the output directory and only
    /// moved into place once every chunk has been written. Any error leaves the
    /// previous store untouched.
    pub fn convert(&self, progress: Option<&ProgressReporter>) -> Result<ConversionSummary> {
        let start = Instant::now();
        info!(
            source = %self.source_path.display(),
            output = %self.output_dir.display(),
            chunk_size = self.chunk_size,
            "starting conversion"
        );

        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.output_dir)?;

        let mut chunks = SourceReader::new(self.chunk_size).open(&self.source_path)?;
        let schema = self.policy.resolve(chunks.header());
        let builder = BatchBuilder::new(schema);

        let mut rows_per_partition: BTreeMap<PartitionKey, u64> = BTreeMap::new();
        let mut coerced_by_column: BTreeMap<String, u64> = BTreeMap::new();
        let mut files_written = 0usize;
        let mut output_bytes = 0u64;
        let mut chunks_read = 0usize;
        let mut total_rows = 0u64;

        for chunk in &mut chunks {
            let chunk = chunk?;
            let batches = builder.build(&chunk.records)?;

            for (key, batch) in &batches.partitions {
                let file = self
                    .writer
                    .write_partition_batch(staging.path(), *key, chunk.index, batch)?;
                *rows_per_partition.entry(*key).or_insert(0) += file.rows;
                output_bytes += file.bytes;
                files_written += 1;
            }

            if !batches.coerced.is_empty() {
                debug!(
                    chunk = chunk.index,
                    first_row = chunk.first_row,
                    coerced = ?batches.coerced,
                    "cells coerced to missing"
                );
            }
            for (column, count) in batches.coerced {
                *coerced_by_column.entry(column).or_insert(0) += count;
            }

            chunks_read += 1;
            total_rows += chunk.len() as u64;
            if let Some(p) = progress {
                p.record_chunk(chunk.index, total_rows);
            }
        }

        self.publish(staging.path(), &rows_per_partition)?;

        let summary = ConversionSummary {
            total_rows,
            partitions: rows_per_partition.keys().copied().collect(),
            rows_per_partition,
            chunks_read,
            files_written,
            coerced_cells: coerced_by_column.values().sum(),
            coerced_by_column,
            output_bytes,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        };

        info!(
            rows = summary.total_rows,
            partitions = summary.partitions.len(),
            files = summary.files_written,
            coerced_cells = summary.coerced_cells,
            bytes = summary.output_bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "conversion finished"
        );

        if let Some(p) = progress {
            p.finish_with_message(&format!("Converted {} rows", summary.total_rows));
        }

        Ok(summary)
    }

    /// Replace the previous store's partitions with the staged ones.
    fn publish(&self, staging: &Path, staged: &BTreeMap<PartitionKey, u64>) -> Result<()> {
        for entry in fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let is_partition = entry
                .file_name()
                .to_str()
                .and_then(PartitionKey::parse_dir_name)
                .is_some();
            if is_partition {
                debug!(path = %entry.path().display(), "removing previous partition");
                fs::remove_dir_all(entry.path())?;
            }
        }

        for key in staged.keys() {
            fs::rename(
                staging.join(key.dir_name()),
                self.output_dir.join(key.dir_name()),
            )?;
        }

        Ok(())
    }
}
