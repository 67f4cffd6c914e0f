//! Shared test fixtures: deterministic snapshots, a scripted completion
//! client, and a status-recording generation store.
//!
//! The fixture profile is load-bearing for the fallback tests: the first
//! experience is tagged "rust", the second mentions kubernetes only in a
//! highlight, and the skill list contains "Rust".

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::llm_client::{Completion, CompletionClient, LlmError};
use crate::models::generation::{DocumentResult, DocumentType, GenerationRecord, GenerationStatus};
use crate::models::job::{JobRef, JobSnapshot};
use crate::models::profile::{ExperienceRow, ProfileRow, ProfileSnapshot, SkillRow};
use crate::pipeline::context::{GenerationOptions, PipelineContext};
use crate::pipeline::prompts::{
    COVER_LETTER_SYSTEM, JOB_ANALYSIS_SYSTEM, PROFILE_COMPILATION_SYSTEM, RESUME_SYSTEM,
};
use crate::store::memory::{MemoryGenerationStore, MemoryProfileStore};
use crate::store::{GenerationStore, StoreError};

pub(crate) fn make_profile_snapshot(owner: Uuid) -> ProfileSnapshot {
    let profile_id = Uuid::new_v4();
    ProfileSnapshot {
        profile: ProfileRow {
            id: profile_id,
            user_id: owner,
            full_name: "Avery Chen".to_string(),
            headline: Some("Backend Engineer".to_string()),
            summary: Some(
                "Backend engineer focused on data-intensive services.".to_string(),
            ),
            email: "avery@example.com".to_string(),
            created_at: Utc::now(),
        },
        experiences: vec![
            ExperienceRow {
                id: Uuid::new_v4(),
                profile_id,
                title: "Senior Backend Engineer".to_string(),
                organization: "Lumen Analytics".to_string(),
                start_date: None,
                end_date: None,
                highlights: vec![
                    "Built a streaming ingestion service handling 2M events per day".to_string(),
                    "Cut p99 read latency by 40% with a tiered cache".to_string(),
                ],
                tags: vec!["rust".to_string(), "streaming".to_string()],
            },
            ExperienceRow {
                id: Uuid::new_v4(),
                profile_id,
                title: "Platform Engineer".to_string(),
                organization: "Harbor Systems".to_string(),
                start_date: None,
                end_date: None,
                highlights: vec![
                    "Migrated services onto kubernetes with zero-downtime rollouts".to_string(),
                ],
                tags: vec!["ci".to_string()],
            },
        ],
        skills: vec![
            SkillRow {
                id: Uuid::new_v4(),
                profile_id,
                name: "Rust".to_string(),
                category: Some("language".to_string()),
                years: Some(5),
            },
            SkillRow {
                id: Uuid::new_v4(),
                profile_id,
                name: "PostgreSQL".to_string(),
                category: Some("database".to_string()),
                years: Some(6),
            },
        ],
    }
}

pub(crate) fn make_job_snapshot() -> JobSnapshot {
    JobSnapshot {
        job: JobRef::Posting(Uuid::new_v4()),
        title: "Senior Rust Engineer".to_string(),
        company: Some("Nimbus Data".to_string()),
        text: "We are hiring a senior Rust engineer to build Kafka-based \
               streaming pipelines on Kubernetes. Strong Rust and PostgreSQL \
               experience required."
            .to_string(),
    }
}

pub(crate) fn make_context(options: GenerationOptions) -> PipelineContext {
    let profile = make_profile_snapshot(Uuid::new_v4());
    let job = make_job_snapshot();
    let generation = GenerationRecord::new(profile.id(), job.job);
    PipelineContext::new(generation, profile, job, options)
}

/// Scripted completion client. Failure injection is counted per distinct
/// system prompt so "fail the first n attempts" applies to every stage
/// independently, matching how the orchestrator retries per stage.
pub(crate) struct FakeCompletionClient {
    failures_per_system: u32,
    attempts: Mutex<HashMap<String, u32>>,
}

impl FakeCompletionClient {
    pub(crate) fn succeeding() -> Self {
        Self::failing_first(0)
    }

    pub(crate) fn always_failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    pub(crate) fn failing_first(failures_per_system: u32) -> Self {
        Self {
            failures_per_system,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn call_count(&self, system: &str) -> u32 {
        self.attempts.lock().get(system).copied().unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> u32 {
        self.attempts.lock().values().sum()
    }

    fn canned_text(system: &str) -> String {
        if system == JOB_ANALYSIS_SYSTEM {
            serde_json::json!({
                "requirements": [
                    {"text": "5+ years building backend services in Rust", "is_required": true},
                    {"text": "Experience operating Kafka", "is_required": false}
                ],
                "keywords": [
                    {"keyword": "rust", "frequency": 4, "weight": 1.0, "weighted_score": 4.0},
                    {"keyword": "kafka", "frequency": 2, "weight": 0.8, "weighted_score": 1.6}
                ],
                "seniority": "senior",
                "tone": "collaborative"
            })
            .to_string()
        } else if system == PROFILE_COMPILATION_SYSTEM {
            serde_json::json!({
                "selected_experiences": [],
                "ranked_skills": [
                    {"name": "Rust", "relevance": 0.95},
                    {"name": "PostgreSQL", "relevance": 0.6}
                ],
                "summary": "Backend engineer with deep Rust and streaming experience."
            })
            .to_string()
        } else if system == RESUME_SYSTEM {
            "Avery Chen\nBackend Engineer\n\nSenior Backend Engineer, Lumen Analytics\n\
             - Built Rust streaming services on Kafka handling 2M events per day\n\n\
             Skills: Rust, PostgreSQL"
                .to_string()
        } else if system == COVER_LETTER_SYSTEM {
            "Dear Hiring Team,\n\nI am excited to apply for the Senior Rust \
             Engineer role at Nimbus Data. My Rust and Kafka background fits \
             the team's streaming roadmap.\n\nSincerely,\nAvery Chen"
                .to_string()
        } else {
            format!("unscripted system prompt: {system}")
        }
    }
}

#[async_trait]
impl CompletionClient for FakeCompletionClient {
    async fn complete(&self, _prompt: &str, system: &str) -> Result<Completion, LlmError> {
        let count = {
            let mut attempts = self.attempts.lock();
            let entry = attempts.entry(system.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        if count <= self.failures_per_system {
            return Err(LlmError::Unavailable("scripted provider outage".to_string()));
        }

        Ok(Completion {
            text: Self::canned_text(system),
            input_tokens: 120,
            output_tokens: 350,
        })
    }
}

/// Generation store that records every status write, so tests can assert the
/// exact order a run moved through. Delegates storage to the in-memory store.
pub(crate) struct RecordingGenerationStore {
    inner: MemoryGenerationStore,
    statuses: Mutex<Vec<GenerationStatus>>,
}

impl RecordingGenerationStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryGenerationStore::new(Arc::new(MemoryProfileStore::new())),
            statuses: Mutex::new(Vec::new()),
        }
    }

    pub(crate) async fn seed(&self, record: &GenerationRecord) {
        self.inner.create(record).await.unwrap();
    }

    pub(crate) async fn get_record(&self, id: Uuid) -> GenerationRecord {
        self.inner.get(id).await.unwrap()
    }

    pub(crate) fn status_log(&self) -> Vec<GenerationStatus> {
        self.statuses.lock().clone()
    }
}

#[async_trait]
impl GenerationStore for RecordingGenerationStore {
    async fn create(&self, record: &GenerationRecord) -> Result<(), StoreError> {
        self.inner.create(record).await
    }

    async fn get(&self, id: Uuid) -> Result<GenerationRecord, StoreError> {
        self.inner.get(id).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<GenerationRecord>, StoreError> {
        self.inner.list_for_user(user_id).await
    }

    async fn update_status(&self, id: Uuid, status: GenerationStatus) -> Result<(), StoreError> {
        self.statuses.lock().push(status);
        self.inner.update_status(id, status).await
    }

    async fn update_progress(
        &self,
        id: Uuid,
        metadata: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.inner.update_progress(id, metadata).await
    }

    async fn complete(
        &self,
        id: Uuid,
        results: &BTreeMap<DocumentType, DocumentResult>,
        duration: Duration,
    ) -> Result<(), StoreError> {
        self.statuses.lock().push(GenerationStatus::Completed);
        self.inner.complete(id, results, duration).await
    }

    async fn fail(&self, id: Uuid, error_message: &str) -> Result<(), StoreError> {
        self.statuses.lock().push(GenerationStatus::Failed);
        self.inner.fail(id, error_message).await
    }
}
