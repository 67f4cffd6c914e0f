//! Quality Validation stage — computes an ATS keyword-coverage score per
//! generated document and back-fills it onto the matching result.
//!
//! Scoring is pure Rust and deterministic; no model call is made here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::generation::DocumentType;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::StageError;
use crate::pipeline::stage::{PipelineStage, StageKind};
use crate::pipeline::stages::job_analysis::{JobAnalysis, KeywordEntry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentScore {
    pub document_type: DocumentType,
    pub ats_score: u32,
}

/// Published under `quality_validation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub scores: Vec<DocumentScore>,
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Default)]
pub struct QualityValidationStage;

impl QualityValidationStage {
    pub fn new() -> Self {
        Self
    }

    fn validate(&self, ctx: &mut PipelineContext, fallback: bool) -> Result<(), StageError> {
        let analysis: JobAnalysis = ctx.require(self.kind(), StageKind::JobAnalysis)?;

        if ctx.generation.results.is_empty() {
            return Err(StageError::new(self.kind(), "no documents to validate"));
        }

        let mut scores = Vec::new();
        for result in ctx.generation.results.values_mut() {
            let score = ats_score(&result.content, &analysis.keywords);
            result.ats_score = Some(score);
            scores.push(DocumentScore {
                document_type: result.document_type,
                ats_score: score,
            });
        }

        info!(generation_id = %ctx.generation.id, documents = scores.len(), "quality validated");

        ctx.publish(self.kind(), &QualityReport { scores, fallback })
    }
}

#[async_trait]
impl PipelineStage for QualityValidationStage {
    fn kind(&self) -> StageKind {
        StageKind::QualityValidation
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        self.validate(ctx, false)
    }

    fn fallback(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        // Scoring is already deterministic; the fallback only differs by flag.
        self.validate(ctx, true)
    }
}

/// Weighted keyword coverage, 0–100: sum of `weighted_score` for keywords
/// present in the content divided by the total, rounded.
fn ats_score(content: &str, keywords: &[KeywordEntry]) -> u32 {
    let total: f32 = keywords.iter().map(|k| k.weighted_score).sum();
    if total <= 0.0 {
        return 0;
    }

    let content_lower = content.to_lowercase();
    let covered: f32 = keywords
        .iter()
        .filter(|k| content_lower.contains(&k.keyword.to_lowercase()))
        .map(|k| k.weighted_score)
        .sum();

    ((covered / total) * 100.0).round() as u32
}
