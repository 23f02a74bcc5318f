pub mod context;
pub mod orchestrator;

pub use context::{PipelineContext, PipelineRun, Stage, StageFailure};
pub use orchestrator::Pipeline;
