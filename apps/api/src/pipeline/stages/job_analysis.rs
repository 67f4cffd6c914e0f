//! Job Analysis stage — extracts structured requirements, keywords, and tone
//! from the job text. First stage of the pipeline; everything downstream
//! reads its output.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::llm_client::{complete_json, CompletionClient};
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::StageError;
use crate::pipeline::prompts::{JOB_ANALYSIS_PROMPT_TEMPLATE, JOB_ANALYSIS_SYSTEM};
use crate::pipeline::stage::{PipelineStage, StageKind};

/// Detected tone of a job posting. Drives verb selection downstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTone {
    Aggressive,
    #[default]
    Collaborative,
    Research,
    Product,
}

/// A single requirement extracted from the job text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub text: String,
    pub is_required: bool,
}

/// A keyword from the job text, weighted by position and frequency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub keyword: String,
    pub frequency: u32,
    /// title=1.0, requirements=0.8, responsibilities=0.6, about=0.3
    pub weight: f32,
    /// frequency * weight
    pub weighted_score: f32,
}

/// Structured output of job analysis, published under `job_analysis`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAnalysis {
    pub requirements: Vec<Requirement>,
    pub keywords: Vec<KeywordEntry>,
    pub seniority: String,
    pub tone: JobTone,
    #[serde(default)]
    pub fallback: bool,
}

pub struct JobAnalysisStage {
    llm: Arc<dyn CompletionClient>,
}

impl JobAnalysisStage {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl PipelineStage for JobAnalysisStage {
    fn kind(&self) -> StageKind {
        StageKind::JobAnalysis
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let prompt = JOB_ANALYSIS_PROMPT_TEMPLATE
            .replace("{job_title}", &ctx.job.title)
            .replace("{job_text}", &ctx.job.text);

        let analysis: JobAnalysis = complete_json(self.llm.as_ref(), &prompt, JOB_ANALYSIS_SYSTEM)
            .await
            .map_err(|e| {
                let message = format!("analysis call failed: {e}");
                StageError::with_source(self.kind(), message, e)
            })?;

        info!(
            generation_id = %ctx.generation.id,
            keywords = analysis.keywords.len(),
            requirements = analysis.requirements.len(),
            "job analysis extracted"
        );

        ctx.publish(self.kind(), &analysis)
    }

    fn fallback(&self, ctx: &mut PipelineContext) -> Result<(), StageError> {
        let analysis = fallback_analysis(&ctx.job.title, &ctx.job.text);
        ctx.publish(self.kind(), &analysis)
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "you", "our", "are", "will", "have", "that", "this", "your",
    "from", "who", "what", "where", "their", "they", "them", "about", "into", "can", "all",
    "not", "has", "was", "were", "more", "than", "but", "its", "over", "such", "per", "also",
    "work", "working", "team", "role", "years", "experience",
];

/// Deterministic keyword-frequency extraction used when the model is
/// unavailable. No requirements are inferred; seniority comes from the title.
fn fallback_analysis(title: &str, text: &str) -> JobAnalysis {
    let title_lower = title.to_lowercase();
    let mut frequencies: HashMap<String, u32> = HashMap::new();

    for raw in text.split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#') {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        if word.len() < 3 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        *frequencies.entry(word).or_insert(0) += 1;
    }

    let mut keywords: Vec<KeywordEntry> = frequencies
        .into_iter()
        .map(|(keyword, frequency)| {
            let weight = if title_lower.contains(&keyword) { 1.0 } else { 0.5 };
            KeywordEntry {
                weighted_score: frequency as f32 * weight,
                keyword,
                frequency,
                weight,
            }
        })
        .collect();

    keywords.sort_by(|a, b| {
        b.weighted_score
            .total_cmp(&a.weighted_score)
            .then_with(|| a.keyword.cmp(&b.keyword))
    });
    keywords.truncate(20);

    let seniority = ["principal", "staff", "senior", "junior"]
        .iter()
        .find(|level| title_lower.contains(*level))
        .map(|level| level.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    JobAnalysis {
        requirements: vec![],
        keywords,
        seniority,
        tone: JobTone::default(),
        fallback: true,
    }
}
