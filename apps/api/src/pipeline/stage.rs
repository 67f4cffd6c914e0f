//! The polymorphic stage contract. Five concrete stages implement it; the
//! orchestrator drives them in fixed order through a shared context.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::generation::GenerationStatus;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::StageError;

/// Tagged identity of a pipeline stage. Drives status mapping, metadata
/// keys, and error messages — never virtual dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    JobAnalysis,
    ProfileCompilation,
    DocumentGeneration,
    QualityValidation,
    Export,
}

impl StageKind {
    /// The record status that describes this stage while it runs.
    pub fn status(&self) -> GenerationStatus {
        match self {
            StageKind::JobAnalysis => GenerationStatus::AnalyzingJob,
            StageKind::ProfileCompilation => GenerationStatus::CompilingProfile,
            StageKind::DocumentGeneration => GenerationStatus::GeneratingDocuments,
            StageKind::QualityValidation => GenerationStatus::ValidatingQuality,
            StageKind::Export => GenerationStatus::Exporting,
        }
    }

    /// The context-metadata key this stage publishes its output under.
    pub fn metadata_key(&self) -> &'static str {
        match self {
            StageKind::JobAnalysis => "job_analysis",
            StageKind::ProfileCompilation => "profile_compilation",
            StageKind::DocumentGeneration => "document_generation",
            StageKind::QualityValidation => "quality_validation",
            StageKind::Export => "export",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::JobAnalysis => "job analysis",
            StageKind::ProfileCompilation => "profile compilation",
            StageKind::DocumentGeneration => "document generation",
            StageKind::QualityValidation => "quality validation",
            StageKind::Export => "export",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pipeline step. Implementations are stateless across runs — they hold
/// only Arc'd collaborator clients, so a single instance serves every
/// concurrent generation. All mutable run state lives in the context.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Reads prior stage outputs from the context, performs the
    /// transformation, and writes the result under this stage's metadata key.
    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), StageError>;

    /// Deterministic, non-AI output used when the external call cannot
    /// succeed after orchestrator retries are exhausted. Must mark its
    /// output with `fallback: true` so consumers can detect degradation.
    fn fallback(&self, ctx: &mut PipelineContext) -> Result<(), StageError>;
}
