//! Layered pipeline configuration: defaults, optional TOML file, `AIRQ_` environment
//! variables, then command-line overrides.

use crate::error::{ProcessingError, Result};
use crate::processors::validator::Representations;
use crate::utils::constants::{
    COMPRESSIONS, DEFAULT_CHUNK_SIZE, DEFAULT_DATABASE_FILE, DEFAULT_MISSING_THRESHOLD_PERCENT,
    DEFAULT_ROW_GROUP_SIZE, DEFAULT_SAMPLE_ROWS,
};
use chrono::NaiveDate;
use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    pub source_path: PathBuf,
    pub output_dir: PathBuf,

    #[validate(range(min = 1))]
    pub chunk_size: usize,

    #[validate(custom(function = "validate_compression"))]
    pub compression: String,

    #[validate(range(min = 1))]
    pub row_group_size: usize,

    #[validate(length(min = 1))]
    pub database_file: String,

    pub skip_validation: bool,
    pub skip_benchmark: bool,

    #[validate(nested)]
    pub benchmark: BenchmarkSettings,

    #[validate(nested)]
    pub validation: ValidationSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_query_window"))]
pub struct BenchmarkSettings {
    #[validate(range(min = 1))]
    pub sample_rows: usize,
    pub query_start: NaiveDate,
    pub query_end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ValidationSettings {
    #[validate(range(min = 0.0, max = 100.0))]
    pub missing_threshold_percent: f64,
}

/// Values supplied on the command line; `None` leaves the layered value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub chunk_size: Option<usize>,
    pub compression: Option<String>,
    pub sample_rows: Option<usize>,
    pub skip_validation: bool,
    pub skip_benchmark: bool,
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
            query_start: NaiveDate::from_ymd_opt(2024, 8, 1).unwrap_or_default(),
            query_end: NaiveDate::from_ymd_opt(2024, 8, 31).unwrap_or_default(),
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            missing_threshold_percent: DEFAULT_MISSING_THRESHOLD_PERCENT,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("air_quality.csv"),
            output_dir: PathBuf::from("data/processed"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression: "snappy".to_string(),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            skip_validation: false,
            skip_benchmark: false,
            benchmark: BenchmarkSettings::default(),
            validation: ValidationSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Merge defaults, an optional config file and `AIRQ_*` environment variables.
    ///
    /// Nested keys use a double underscore, e.g. `AIRQ_BENCHMARK__SAMPLE_ROWS`.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("source_path", defaults.source_path.to_string_lossy().to_string())?
            .set_default("output_dir", defaults.output_dir.to_string_lossy().to_string())?
            .set_default("chunk_size", defaults.chunk_size as i64)?
            .set_default("compression", defaults.compression.clone())?
            .set_default("row_group_size", defaults.row_group_size as i64)?
            .set_default("database_file", defaults.database_file.clone())?
            .set_default("skip_validation", defaults.skip_validation)?
            .set_default("skip_benchmark", defaults.skip_benchmark)?
            .set_default("benchmark.sample_rows", defaults.benchmark.sample_rows as i64)?
            .set_default("benchmark.query_start", defaults.benchmark.query_start.to_string())?
            .set_default("benchmark.query_end", defaults.benchmark.query_end.to_string())?
            .set_default(
                "validation.missing_threshold_percent",
                defaults.validation.missing_threshold_percent,
            )?;

        if let Some(path) = config_file {
            if !path.exists() {
                return Err(ProcessingError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(ConfigFile::from(path).required(true));
        }

        let merged = builder
            .add_source(
                Environment::with_prefix("AIRQ")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(merged.try_deserialize::<PipelineConfig>()?)
    }

    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(source) = overrides.source_path {
            self.source_path = source;
        }
        if let Some(output) = overrides.output_dir {
            self.output_dir = output;
        }
        if let Some(chunk_size) = overrides.chunk_size {
            self.chunk_size = chunk_size;
        }
        if let Some(compression) = overrides.compression {
            self.compression = compression;
        }
        if let Some(sample_rows) = overrides.sample_rows {
            self.benchmark.sample_rows = sample_rows;
        }
        self.skip_validation |= overrides.skip_validation;
        self.skip_benchmark |= overrides.skip_benchmark;
        self
    }

    /// Validate and return the configuration, or the first set of field errors.
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    pub fn database_path(&self) -> PathBuf {
        self.output_dir.join(&self.database_file)
    }

    pub fn representations(&self) -> Representations {
        Representations {
            source: self.source_path.clone(),
            store_root: self.output_dir.clone(),
            database: self.database_path(),
        }
    }
}

fn validate_compression(compression: &str) -> std::result::Result<(), ValidationError> {
    if COMPRESSIONS.contains(&compression.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new("unsupported_compression"))
    }
}

fn validate_query_window(settings: &BenchmarkSettings) -> std::result::Result<(), ValidationError> {
    if settings.query_start <= settings.query_end {
        Ok(())
    } else {
        Err(ValidationError::new("query_start_after_query_end"))
    }
}
