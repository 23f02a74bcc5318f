use crate::analyzers::PerformanceBenchmark;
use crate::cli::args::{Cli, Commands};
use crate::config::{ConfigOverrides, PipelineConfig};
use crate::database::{AirQualityDatabase, StoreLoader};
use crate::error::Result;
use crate::models::StoreManifest;
use crate::pipeline::Pipeline;
use crate::processors::{CrossValidator, StreamingConverter};
use crate::readers::StoreReader;
use crate::utils::progress::ProgressReporter;
use crate::writers::PartitionWriter;
use std::process::ExitCode;

pub fn run(cli: Cli) -> Result<ExitCode> {
    let show_progress = !cli.quiet;
    let config_file = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            paths,
            chunk_size,
            compression,
            sample_rows,
            skip_validation,
            skip_benchmark,
        } => {
            let config = resolve_config(
                config_file,
                ConfigOverrides {
                    chunk_size,
                    compression,
                    sample_rows,
                    skip_validation,
                    skip_benchmark,
                    ..paths.overrides()
                },
            )?;

            println!("Source: {}", config.source_path.display());
            println!("Output directory: {}", config.output_dir.display());

            let run = Pipeline::new(config).with_progress(show_progress).run();
            println!("\n{}", run.summary());

            Ok(if run.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Convert {
            paths,
            chunk_size,
            compression,
        } => {
            let config = resolve_config(
                config_file,
                ConfigOverrides {
                    chunk_size,
                    compression,
                    ..paths.overrides()
                },
            )?;

            let writer = PartitionWriter::new()
                .with_compression(&config.compression)?
                .with_row_group_size(config.row_group_size);
            let converter =
                StreamingConverter::new(&config.source_path, &config.output_dir, config.chunk_size)?
                    .with_writer(writer);

            let info = converter.conversion_info()?;
            println!(
                "Converting {} ({:.2} MB) in chunks of {} rows",
                info.source_path.display(),
                info.source_bytes as f64 / 1_048_576.0,
                info.chunk_size
            );

            let progress = ProgressReporter::new_spinner("Converting...", !show_progress);
            let summary = converter.convert(Some(&progress))?;
            println!("\n{}", summary.summary());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Load { paths } => {
            let config = resolve_config(config_file, paths.overrides())?;
            let summary = StoreLoader::new(&config.output_dir, &config.database_path()).load()?;
            println!("{}", summary.summary());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate { paths } => {
            let config = resolve_config(config_file, paths.overrides())?;
            let validator = CrossValidator::new(config.representations())
                .with_missing_threshold(config.validation.missing_threshold_percent);

            let report = validator.validate()?;
            println!("{}", validator.generate_summary(&report));

            Ok(if report.validation_passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Benchmark { paths, sample_rows } => {
            let config = resolve_config(
                config_file,
                ConfigOverrides {
                    sample_rows,
                    ..paths.overrides()
                },
            )?;
            let benchmark = PerformanceBenchmark::new(config.representations())
                .with_sample_rows(config.benchmark.sample_rows)
                .with_query_window(config.benchmark.query_start, config.benchmark.query_end);

            let report = benchmark.run();
            println!("{}", benchmark.generate_report(&report));
            Ok(ExitCode::SUCCESS)
        }

        Commands::Inspect { paths, county } => {
            let config = resolve_config(config_file, paths.overrides())?;
            inspect(&config, county.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_config(
    config_file: Option<&std::path::Path>,
    overrides: ConfigOverrides,
) -> Result<PipelineConfig> {
    PipelineConfig::load(config_file)?
        .apply_overrides(overrides)
        .validated()
}

fn inspect(config: &PipelineConfig, county: Option<&str>) -> Result<()> {
    let manifest = StoreManifest::discover(&config.output_dir)?;
    println!("Store: {}", manifest.root().display());
    if manifest.is_empty() {
        println!("  no partitions found");
    } else {
        let counts = StoreReader::new(&manifest).partition_row_counts()?;
        for (partition, rows) in &counts {
            println!(
                "  {:<8} {:>12} rows in {} files",
                partition,
                rows,
                manifest.files_for(*partition).len()
            );
        }
        println!("  total size: {:.2} MB", manifest.total_bytes()? as f64 / 1_048_576.0);
    }

    let database_path = config.database_path();
    if !database_path.is_file() {
        println!("\nDatabase not found: {}", database_path.display());
        return Ok(());
    }

    let db = AirQualityDatabase::open_read_only(&database_path)?;
    println!("\nDatabase: {}", database_path.display());
    println!("  rows: {}", db.row_count()?);
    if let Some((first, last)) = db.date_range()? {
        println!("  date range: {} to {}", first, last);
    }

    println!("\nRegion Summary:");
    for region in db.region_summary(county)? {
        println!(
            "  {:<20} {:>10} measurements, mean aqi {}",
            region.county.as_deref().unwrap_or("(none)"),
            region.total_measurements,
            region
                .avg_aqi
                .map(|v| format!("{:.1}", v))
                .unwrap_or_else(|| "n/a".to_string())
        );
    }

    Ok(())
}
