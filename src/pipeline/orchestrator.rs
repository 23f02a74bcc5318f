use crate::analyzers::PerformanceBenchmark;
use crate::config::PipelineConfig;
use crate::database::StoreLoader;
use crate::error::{ProcessingError, Result};
use crate::pipeline::context::{PipelineContext, PipelineRun, Stage, StageFailure};
use crate::processors::{CrossValidator, StreamingConverter};
use crate::utils::constants::{BENCHMARK_REPORT_FILE, VALIDATION_REPORT_FILE};
use crate::writers::PartitionWriter;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

/// Converting -> Loading -> Validating -> Benchmarking -> Done, or Failed.
pub struct Pipeline {
    config: PipelineConfig,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run every enabled stage. Fatal errors end the run in `Failed`; they are
    /// reported in the returned run rather than as an `Err`.
    pub fn run(self) -> PipelineRun {
        let start = Instant::now();
        let mut ctx = PipelineContext::new(self.config, self.show_progress);
        let mut stages = Vec::new();

        let outcome = run_stages(&mut ctx, &mut stages);

        let failure = match outcome {
            Ok(()) => {
                stages.push(Stage::Done);
                info!(elapsed_ms = start.elapsed().as_millis() as u64, "pipeline finished");
                None
            }
            Err((stage, e)) => {
                error!(stage = %stage, class = ?e.class(), error = %e, "pipeline failed");
                stages.push(Stage::Failed);
                Some(StageFailure {
                    stage,
                    class: e.class(),
                    message: e.to_string(),
                })
            }
        };

        PipelineRun {
            stages,
            conversion: ctx.conversion,
            load: ctx.load,
            validation: ctx.validation,
            benchmark: ctx.benchmark,
            failure,
            warnings: ctx.warnings,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        }
    }
}

type StageResult = std::result::Result<(), (Stage, ProcessingError)>;

fn run_stages(ctx: &mut PipelineContext, stages: &mut Vec<Stage>) -> StageResult {
    run_stage(Stage::Converting, stages, || convert(ctx))?;
    run_stage(Stage::Loading, stages, || load(ctx))?;

    if ctx.config.skip_validation {
        info!(stage = %Stage::Validating, "stage skipped");
    } else {
        run_stage(Stage::Validating, stages, || validate(ctx))?;
    }

    if ctx.config.skip_benchmark {
        info!(stage = %Stage::Benchmarking, "stage skipped");
    } else {
        run_stage(Stage::Benchmarking, stages, || benchmark(ctx))?;
    }

    Ok(())
}

fn run_stage(
    stage: Stage,
    stages: &mut Vec<Stage>,
    body: impl FnOnce() -> Result<()>,
) -> StageResult {
    stages.push(stage);
    let start = Instant::now();
    info!(stage = %stage, "stage started");

    match body() {
        Ok(()) => {
            info!(
                stage = %stage,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "stage succeeded"
            );
            Ok(())
        }
        Err(e) => {
            error!(
                stage = %stage,
                elapsed_ms = start.elapsed().as_millis() as u64,
                error = %e,
                "stage failed"
            );
            Err((stage, e))
        }
    }
}

fn convert(ctx: &mut PipelineContext) -> Result<()> {
    let config = &ctx.config;
    let writer = PartitionWriter::new()
        .with_compression(&config.compression)?
        .with_row_group_size(config.row_group_size);
    let converter = StreamingConverter::new(&config.source_path, &config.output_dir, config.chunk_size)?
        .with_writer(writer);

    let summary = converter.convert(Some(&ctx.progress))?;
    if summary.coerced_cells > 0 {
        ctx.warnings.push(format!(
            "{} cells could not be parsed and were stored as missing",
            summary.coerced_cells
        ));
    }
    ctx.conversion = Some(summary);
    Ok(())
}

fn load(ctx: &mut PipelineContext) -> Result<()> {
    let summary = StoreLoader::new(&ctx.config.output_dir, &ctx.config.database_path()).load()?;
    for view in &summary.views_failed {
        ctx.warnings.push(format!("view {} could not be created", view));
    }
    ctx.load = Some(summary);
    Ok(())
}

/// Advisory apart from the row-count check, which fails the stage once the report is saved.
fn validate(ctx: &mut PipelineContext) -> Result<()> {
    let validator = CrossValidator::new(ctx.representations.clone())
        .with_missing_threshold(ctx.config.validation.missing_threshold_percent);

    let report = match validator.validate() {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "validation could not run");
            ctx.warnings.push(format!("validation could not run: {}", e));
            return Ok(());
        }
    };

    write_report(&ctx.config.output_dir.join(VALIDATION_REPORT_FILE), &report, &mut ctx.warnings);
    ctx.warnings.extend(report.warnings.iter().cloned());
    let verdict = CrossValidator::ensure_row_counts(&report);
    ctx.validation = Some(report);
    verdict
}

fn benchmark(ctx: &mut PipelineContext) -> Result<()> {
    let settings = &ctx.config.benchmark;
    let benchmark = PerformanceBenchmark::new(ctx.representations.clone())
        .with_sample_rows(settings.sample_rows)
        .with_query_window(settings.query_start, settings.query_end);

    let report = benchmark.run();
    info!("\n{}", benchmark.generate_report(&report));
    write_report(&ctx.config.output_dir.join(BENCHMARK_REPORT_FILE), &report, &mut ctx.warnings);
    ctx.benchmark = Some(report);
    Ok(())
}

/// Save a report as JSON; failures are recorded as warnings.
fn write_report<T: Serialize>(path: &Path, report: &T, warnings: &mut Vec<String>) {
    let written = File::create(path)
        .map_err(ProcessingError::from)
        .and_then(|file| Ok(serde_json::to_writer_pretty(BufWriter::new(file), report)?));

    match written {
        Ok(()) => info!(path = %path.display(), "report written"),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not write report");
            warnings.push(format!("could not write {}: {}", path.display(), e));
        }
    }
}
