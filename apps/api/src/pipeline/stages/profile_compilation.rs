//! Profile Compilation stage — selects and ranks profile content against the
//! job analysis. Reads `job_analysis`, publishes `profile_compilation`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::llm_client::{complete_json, CompletionClient};
use crate::models::profile::ProfileSnapshot;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::StageError;
use crate::pipeline::prompts::{PROFILE_COMPILATION_PROMPT_TEMPLATE, PROFILE_COMPILATION_SYSTEM};
use crate::pipeline::stage::{PipelineStage, StageKind};
use crate::pipeline::stages::job_analysis::JobAnalysis;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedExperience {
    pub experience_id: Uuid,
    pub relevance: f32,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedSkill {
    pub name: String,
    pub relevance: f32,
}

/// Output of profile compilation, published under `profile_compilation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileCompilation {
    pub selected_experiences: Vec<SelectedExperience>,
    pub ranked_skills: Vec<RankedSkill>,
    pub summary: String,
    #[serde(default)]
    pub fallback: bool,
}

pub struct ProfileCompilationStage {
    llm: Arc<dyn CompletionClient>,
}

impl ProfileCompilationStage {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl PipelineStage for ProfileCompilationStage {
    fn kind(&self) -> StageKind {
        StageKind::ProfileCompilation
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let analysis: JobAnalysis = ctx.require(self.kind(), StageKind::JobAnalysis)?;

        let analysis_json = serde_json::to_string_pretty(&analysis)
            .map_err(|e| StageError::with_source(self.kind(), "failed to serialize analysis", e))?;
        let profile_json = profile_material(&ctx.profile)
            .map_err(|e| StageError::with_source(self.kind(), "failed to serialize profile", e))?;

        let prompt = PROFILE_COMPILATION_PROMPT_TEMPLATE
            .replace("{analysis_json}", &analysis_json)
            .replace("{profile_json}", &profile_json);

        let compilation: ProfileCompilation =
            complete_json(self.llm.as_ref(), &prompt, PROFILE_COMPILATION_SYSTEM)
                .await
                .map_err(|e| {
                    let message = format!("compilation call failed: {e}");
                    StageError::with_source(self.kind(), message, e)
                })?;

        // Every selected experience must reference a real profile entry.
        // A hallucinated id is a retryable stage failure, not silent data.
        let invalid = compilation
            .selected_experiences
            .iter()
            .filter(|s| !ctx.profile.experiences.iter().any(|e| e.id == s.experience_id))
            .count();
        if invalid > 0 {
            return Err(StageError::new(
                self.kind(),
                format!("{invalid} selected experiences reference unknown profile entries"),
            ));
        }

        info!(
            generation_id = %ctx.generation.id,
            selected = compilation.selected_experiences.len(),
            "profile compiled"
        );

        ctx.publish(self.kind(), &compilation)
    }

    fn fallback(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let analysis: JobAnalysis = ctx.require(self.kind(), StageKind::JobAnalysis)?;
        let compilation = keyword_compilation(&ctx.profile, &analysis);
        ctx.publish(self.kind(), &compilation)
    }
}

/// The profile material handed to the model: ids, titles, highlights, tags,
/// skills. Dates and contact details are deliberately left out of the prompt.
fn profile_material(profile: &ProfileSnapshot) -> Result<String, serde_json::Error> {
    let experiences: Vec<_> = profile
        .experiences
        .iter()
        .map(|e| {
            serde_json::json!({
                "id": e.id,
                "title": e.title,
                "organization": e.organization,
                "highlights": e.highlights,
                "tags": e.tags,
            })
        })
        .collect();
    let skills: Vec<_> = profile.skills.iter().map(|s| &s.name).collect();
    serde_json::to_string_pretty(&serde_json::json!({
        "experiences": experiences,
        "skills": skills,
    }))
}

/// Deterministic keyword-based compilation used when the model is
/// unavailable. An experience scores 1.0 on a tag match against a job
/// keyword, 0.6 on a text match in title/organization/highlights; its
/// relevance is the weighted average across keywords.
fn keyword_compilation(profile: &ProfileSnapshot, analysis: &JobAnalysis) -> ProfileCompilation {
    let keywords = &analysis.keywords;
    let total_weight: f32 = keywords.iter().map(|k| k.weighted_score).sum();

    let mut selected: Vec<SelectedExperience> = profile
        .experiences
        .iter()
        .map(|experience| {
            let mut score = 0.0_f32;
            for entry in keywords {
                let keyword = entry.keyword.to_lowercase();
                let tag_match = experience
                    .tags
                    .iter()
                    .any(|t| t.to_lowercase() == keyword);
                let text_match = experience.title.to_lowercase().contains(&keyword)
                    || experience.organization.to_lowercase().contains(&keyword)
                    || experience
                        .highlights
                        .iter()
                        .any(|h| h.to_lowercase().contains(&keyword));
                let strength = if tag_match {
                    1.0
                } else if text_match {
                    0.6
                } else {
                    0.0
                };
                score += strength * entry.weighted_score;
            }
            let relevance = if total_weight > 0.0 { score / total_weight } else { 0.0 };
            SelectedExperience {
                experience_id: experience.id,
                relevance,
                highlights: experience.highlights.clone(),
            }
        })
        .filter(|s| s.relevance > 0.0)
        .collect();
    selected.sort_by(|a, b| {
        b.relevance
            .total_cmp(&a.relevance)
            .then_with(|| a.experience_id.cmp(&b.experience_id))
    });

    let mut ranked_skills: Vec<RankedSkill> = profile
        .skills
        .iter()
        .map(|skill| {
            let name_lower = skill.name.to_lowercase();
            let matched = keywords
                .iter()
                .any(|k| k.keyword.to_lowercase() == name_lower);
            RankedSkill {
                name: skill.name.clone(),
                relevance: if matched { 1.0 } else { 0.2 },
            }
        })
        .collect();
    ranked_skills.sort_by(|a, b| b.relevance.total_cmp(&a.relevance).then_with(|| a.name.cmp(&b.name)));

    ProfileCompilation {
        selected_experiences: selected,
        ranked_skills,
        summary: format!(
            "{} — selected content matched against the posting's keyword inventory.",
            profile.profile.full_name
        ),
        fallback: true,
    }
}
