use crate::config::ConfigOverrides;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "airq")]
#[command(about = "Air quality CSV to partitioned Parquet and DuckDB, with cross-format validation")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, conflicts_with = "verbose", help = "Only log warnings and errors")]
    pub quiet: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,
}

/// Locations shared by every subcommand; unset values fall back to the configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct PathArgs {
    #[arg(short, long, help = "Source CSV file")]
    pub source: Option<PathBuf>,

    #[arg(short, long, help = "Output directory for the Parquet store and database")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert, load, validate and benchmark in one run
    Run {
        #[command(flatten)]
        paths: PathArgs,

        #[arg(long, help = "Rows per chunk")]
        chunk_size: Option<usize>,

        #[arg(short, long, help = "snappy, gzip, lz4, zstd or none")]
        compression: Option<String>,

        #[arg(long, help = "Rows sampled by the load benchmark")]
        sample_rows: Option<usize>,

        #[arg(long, help = "Skip the validation stage")]
        skip_validation: bool,

        #[arg(long, help = "Skip the benchmark stage")]
        skip_benchmark: bool,
    },

    /// Convert the source CSV into the year-partitioned Parquet store
    Convert {
        #[command(flatten)]
        paths: PathArgs,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(short, long)]
        compression: Option<String>,
    },

    /// Load the Parquet store into the DuckDB database
    Load {
        #[command(flatten)]
        paths: PathArgs,
    },

    /// Compare row counts, schema and value ranges across representations
    Validate {
        #[command(flatten)]
        paths: PathArgs,
    },

    /// Measure size, load and query performance across representations
    Benchmark {
        #[command(flatten)]
        paths: PathArgs,

        #[arg(long)]
        sample_rows: Option<usize>,
    },

    /// Show the store manifest and a summary of the loaded database
    Inspect {
        #[command(flatten)]
        paths: PathArgs,

        #[arg(long, help = "Restrict the region summary to one county")]
        county: Option<String>,
    },
}

impl PathArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            source_path: self.source.clone(),
            output_dir: self.output_dir.clone(),
            ..ConfigOverrides::default()
        }
    }
}
