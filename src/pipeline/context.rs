use crate::analyzers::BenchmarkReport;
use crate::config::PipelineConfig;
use crate::database::LoadSummary;
use crate::error::ErrorClass;
use crate::processors::{ConversionSummary, Representations, ValidationReport};
use crate::utils::progress::ProgressReporter;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Converting,
    Loading,
    Validating,
    Benchmarking,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Converting => "converting",
            Stage::Loading => "loading",
            Stage::Validating => "validating",
            Stage::Benchmarking => "benchmarking",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub class: ErrorClass,
    pub message: String,
}

/// State handed from stage to stage for the lifetime of one run.
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub representations: Representations,
    pub progress: ProgressReporter,
    pub conversion: Option<ConversionSummary>,
    pub load: Option<LoadSummary>,
    pub validation: Option<ValidationReport>,
    pub benchmark: Option<BenchmarkReport>,
    pub warnings: Vec<String>,
}

impl PipelineContext {
    pub fn new(config: PipelineConfig, show_progress: bool) -> Self {
        let representations = config.representations();
        let progress = if show_progress {
            ProgressReporter::new_spinner("Converting...", false)
        } else {
            ProgressReporter::silent()
        };
        Self {
            config,
            representations,
            progress,
            conversion: None,
            load: None,
            validation: None,
            benchmark: None,
            warnings: Vec::new(),
        }
    }
}

/// Outcome of a pipeline run: the stages visited and whatever each produced.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub stages: Vec<Stage>,
    pub conversion: Option<ConversionSummary>,
    pub load: Option<LoadSummary>,
    /// `None` when validation was skipped or never reached.
    pub validation: Option<ValidationReport>,
    pub benchmark: Option<BenchmarkReport>,
    pub failure: Option<StageFailure>,
    pub warnings: Vec<String>,
    pub elapsed_seconds: f64,
}

impl PipelineRun {
    pub fn final_stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Failed)
    }

    pub fn succeeded(&self) -> bool {
        self.final_stage() == Stage::Done
    }

    pub fn visited(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn summary(&self) -> String {
        let path: Vec<&str> = self.stages.iter().map(Stage::as_str).collect();
        let mut summary = format!(
            "Pipeline: {}\nElapsed: {:.2}s\n",
            path.join(" -> "),
            self.elapsed_seconds
        );
        if let Some(conversion) = &self.conversion {
            summary.push_str(&format!(
                "Converted {} rows into {} partitions\n",
                conversion.total_rows,
                conversion.partitions.len()
            ));
        }
        if let Some(load) = &self.load {
            summary.push_str(&format!(
                "Loaded {} rows, {} views\n",
                load.row_count,
                load.views_created.len()
            ));
        }
        if let Some(validation) = &self.validation {
            summary.push_str(&format!(
                "Validation {} ({} warnings)\n",
                if validation.validation_passed { "passed" } else { "failed" },
                validation.warnings.len()
            ));
        }
        if !self.warnings.is_empty() {
            summary.push_str(&format!("Warnings: {}\n", self.warnings.len()));
        }
        if let Some(failure) = &self.failure {
            summary.push_str(&format!(
                "Failed during {}: {}\n",
                failure.stage, failure.message
            ));
        }
        summary
    }
}
