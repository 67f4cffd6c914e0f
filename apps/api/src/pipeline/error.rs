//! Pipeline error taxonomy: stage errors are retried, pipeline errors are
//! terminal for the run, cancellation is recorded distinctly from failure.

use thiserror::Error;

use crate::pipeline::stage::StageKind;

/// A named stage failed one attempt. Retried by the orchestrator; after
/// exhaustion it is wrapped into a `PipelineError`.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {message}")]
pub struct StageError {
    pub stage: StageKind,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl StageError {
    pub fn new(stage: StageKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        stage: StageKind,
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self {
            stage,
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Terminal outcome of an orchestrator run that did not complete.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed after {attempts} attempts: {message}")]
    StageExhausted {
        stage: StageKind,
        attempts: u32,
        message: String,
    },

    // Message must keep the `cancelled` prefix from
    // `models::generation::CANCELLED_PREFIX` so callers can tell user
    // cancellation apart from system failure.
    #[error("cancelled: generation stopped before {stage} stage")]
    Cancelled { stage: StageKind },

    #[error("persistence failed during {stage} stage: {message}")]
    Persistence { stage: StageKind, message: String },
}

impl PipelineError {
    pub fn from_stage_error(error: StageError, attempts: u32) -> Self {
        PipelineError::StageExhausted {
            stage: error.stage,
            attempts,
            message: error.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_error_names_the_stage_and_attempts() {
        let stage_error = StageError::new(StageKind::JobAnalysis, "provider timeout");
        let pipeline_error = PipelineError::from_stage_error(stage_error, 3);
        let message = pipeline_error.to_string();
        assert!(message.contains("job analysis"));
        assert!(message.contains("3 attempts"));
        assert!(message.contains("provider timeout"));
    }

    #[test]
    fn test_cancelled_error_carries_the_recognizable_prefix() {
        let error = PipelineError::Cancelled {
            stage: StageKind::DocumentGeneration,
        };
        assert!(error
            .to_string()
            .starts_with(crate::models::generation::CANCELLED_PREFIX));
    }
}
