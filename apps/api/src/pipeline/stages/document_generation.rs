//! Document Generation stage — produces the requested documents from the two
//! prior outputs and attaches one `DocumentResult` per requested type.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::llm_client::CompletionClient;
use crate::models::generation::{DocumentResult, DocumentType};
use crate::models::job::JobSnapshot;
use crate::models::profile::ProfileSnapshot;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::StageError;
use crate::pipeline::prompts::{
    COVER_LETTER_PROMPT_TEMPLATE, COVER_LETTER_SYSTEM, RESUME_PROMPT_TEMPLATE, RESUME_SYSTEM,
};
use crate::pipeline::stage::{PipelineStage, StageKind};
use crate::pipeline::stages::job_analysis::JobAnalysis;
use crate::pipeline::stages::profile_compilation::ProfileCompilation;

/// Published under `document_generation`: which documents were produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentGenerationSummary {
    pub documents: Vec<DocumentType>,
    #[serde(default)]
    pub fallback: bool,
}

pub struct DocumentGenerationStage {
    llm: Arc<dyn CompletionClient>,
}

impl DocumentGenerationStage {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    fn build_prompt(
        &self,
        document_type: DocumentType,
        ctx: &PipelineContext,
        analysis_json: &str,
        compilation_json: &str,
    ) -> (String, &'static str) {
        match document_type {
            DocumentType::Resume => {
                let prompt = RESUME_PROMPT_TEMPLATE
                    .replace("{candidate_name}", &ctx.profile.profile.full_name)
                    .replace("{analysis_json}", analysis_json)
                    .replace("{compilation_json}", compilation_json);
                (prompt, RESUME_SYSTEM)
            }
            DocumentType::CoverLetter => {
                let prompt = COVER_LETTER_PROMPT_TEMPLATE
                    .replace("{candidate_name}", &ctx.profile.profile.full_name)
                    .replace("{job_title}", &ctx.job.title)
                    .replace("{company}", ctx.job.company.as_deref().unwrap_or("the company"))
                    .replace("{analysis_json}", analysis_json)
                    .replace("{compilation_json}", compilation_json);
                (prompt, COVER_LETTER_SYSTEM)
            }
        }
    }
}

#[async_trait]
impl PipelineStage for DocumentGenerationStage {
    fn kind(&self) -> StageKind {
        StageKind::DocumentGeneration
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let analysis: JobAnalysis = ctx.require(self.kind(), StageKind::JobAnalysis)?;
        let compilation: ProfileCompilation =
            ctx.require(self.kind(), StageKind::ProfileCompilation)?;

        let analysis_json = serde_json::to_string_pretty(&analysis)
            .map_err(|e| StageError::with_source(self.kind(), "failed to serialize analysis", e))?;
        let compilation_json = serde_json::to_string_pretty(&compilation).map_err(|e| {
            StageError::with_source(self.kind(), "failed to serialize compilation", e)
        })?;

        let document_types = ctx.options.document_types.clone();
        for document_type in &document_types {
            let (prompt, system) =
                self.build_prompt(*document_type, ctx, &analysis_json, &compilation_json);

            let completion = self.llm.complete(&prompt, system).await.map_err(|e| {
                let message = format!("{document_type} generation call failed: {e}");
                StageError::with_source(self.kind(), message, e)
            })?;

            let content = completion.text.trim().to_string();
            if content.is_empty() {
                return Err(StageError::new(
                    self.kind(),
                    format!("model returned empty {document_type} content"),
                ));
            }

            let mut result = DocumentResult::new(*document_type, content);
            result
                .metadata
                .insert("input_tokens".to_string(), Value::from(completion.input_tokens));
            result
                .metadata
                .insert("output_tokens".to_string(), Value::from(completion.output_tokens));

            info!(
                generation_id = %ctx.generation.id,
                document_type = %document_type,
                word_count = result.word_count,
                "document generated"
            );

            // Keyed upsert: a retried stage replaces its own earlier attempt.
            ctx.generation.results.insert(*document_type, result);
        }

        ctx.publish(
            self.kind(),
            &DocumentGenerationSummary {
                documents: document_types,
                fallback: false,
            },
        )
    }

    fn fallback(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let document_types = ctx.options.document_types.clone();
        for document_type in &document_types {
            let content = render_fallback_document(*document_type, &ctx.profile, &ctx.job);
            let mut result = DocumentResult::new(*document_type, content);
            result
                .metadata
                .insert("fallback".to_string(), Value::Bool(true));
            ctx.generation.results.insert(*document_type, result);
        }

        ctx.publish(
            self.kind(),
            &DocumentGenerationSummary {
                documents: document_types,
                fallback: true,
            },
        )
    }
}

/// Deterministic template rendering from the profile snapshot. Plain but
/// valid: name, headline, experience entries with their own highlights,
/// skill list. Never empty for a profile that passed validation.
fn render_fallback_document(
    document_type: DocumentType,
    profile: &ProfileSnapshot,
    job: &JobSnapshot,
) -> String {
    let mut out = String::new();
    match document_type {
        DocumentType::Resume => {
            out.push_str(&profile.profile.full_name);
            out.push('\n');
            if let Some(headline) = &profile.profile.headline {
                out.push_str(headline);
                out.push('\n');
            }
            if let Some(summary) = &profile.profile.summary {
                out.push('\n');
                out.push_str(summary);
                out.push('\n');
            }
            out.push_str("\nExperience\n");
            for experience in &profile.experiences {
                out.push_str(&format!("{} — {}\n", experience.title, experience.organization));
                for highlight in &experience.highlights {
                    out.push_str(&format!("- {highlight}\n"));
                }
            }
            if !profile.skills.is_empty() {
                let skills: Vec<&str> =
                    profile.skills.iter().map(|s| s.name.as_str()).collect();
                out.push_str(&format!("\nSkills: {}\n", skills.join(", ")));
            }
        }
        DocumentType::CoverLetter => {
            out.push_str(&format!(
                "Dear Hiring Team,\n\nI am writing to apply for the {} position{}.\n\n",
                job.title,
                job.company
                    .as_ref()
                    .map(|c| format!(" at {c}"))
                    .unwrap_or_default()
            ));
            if let Some(summary) = &profile.profile.summary {
                out.push_str(summary);
                out.push_str("\n\n");
            }
            for experience in profile.experiences.iter().take(2) {
                out.push_str(&format!(
                    "As {} at {}, {}\n\n",
                    experience.title,
                    experience.organization,
                    experience
                        .highlights
                        .first()
                        .map(|h| h.as_str())
                        .unwrap_or("I delivered on the team's core goals."),
                ));
            }
            out.push_str(&format!("Sincerely,\n{}\n", profile.profile.full_name));
        }
    }
    out
}
