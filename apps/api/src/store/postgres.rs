//! Postgres-backed store implementations.
//!
//! Terminal-state writes are guarded in SQL (`status NOT IN (...)`) so a late
//! fail can never overwrite a completed record even if two writers raced.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::generation::{DocumentResult, DocumentType, GenerationRecord, GenerationStatus};
use crate::models::job::{JobDescriptionRow, JobPostingRow, JobRef, JobSnapshot};
use crate::models::profile::{ExperienceRow, ProfileRow, ProfileSnapshot, SkillRow};
use crate::store::{GenerationStore, JobStore, ProfileStore, StoreError};

pub struct PostgresProfileStore {
    pool: PgPool,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn get(&self, profile_id: Uuid) -> Result<ProfileSnapshot, StoreError> {
        let profile = sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE id = $1")
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("profile {profile_id}")))?;

        let experiences = sqlx::query_as::<_, ExperienceRow>(
            "SELECT * FROM experiences WHERE profile_id = $1 ORDER BY start_date DESC NULLS LAST",
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;

        let skills =
            sqlx::query_as::<_, SkillRow>("SELECT * FROM skills WHERE profile_id = $1 ORDER BY name")
                .bind(profile_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(ProfileSnapshot {
            profile,
            experiences,
            skills,
        })
    }
}

pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn get(&self, job: &JobRef) -> Result<JobSnapshot, StoreError> {
        match job {
            JobRef::Posting(id) => {
                let row =
                    sqlx::query_as::<_, JobPostingRow>("SELECT * FROM job_postings WHERE id = $1")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await?
                        .ok_or_else(|| StoreError::NotFound(format!("job posting {id}")))?;
                Ok(JobSnapshot {
                    job: *job,
                    title: row.title,
                    company: row.company,
                    text: row.body,
                })
            }
            JobRef::Description(id) => {
                let row = sqlx::query_as::<_, JobDescriptionRow>(
                    "SELECT * FROM job_descriptions WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("job description {id}")))?;
                Ok(JobSnapshot {
                    job: *job,
                    title: row.title,
                    company: None,
                    text: row.body,
                })
            }
        }
    }
}

#[derive(Debug, FromRow)]
struct GenerationRow {
    id: Uuid,
    profile_id: Uuid,
    job_posting_id: Option<Uuid>,
    job_description_id: Option<Uuid>,
    status: String,
    results: Value,
    error_message: Option<String>,
    pipeline_metadata: Value,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl GenerationRow {
    fn into_record(self) -> Result<GenerationRecord, StoreError> {
        let job = JobRef::from_ids(self.job_posting_id, self.job_description_id).ok_or_else(
            || StoreError::Invalid(format!("generation {} has invalid job reference", self.id)),
        )?;
        let status = GenerationStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Invalid(format!("generation {} has status '{}'", self.id, self.status))
        })?;
        let results: BTreeMap<DocumentType, DocumentResult> =
            serde_json::from_value(self.results)?;
        let pipeline_metadata: Map<String, Value> = serde_json::from_value(self.pipeline_metadata)?;

        Ok(GenerationRecord {
            id: self.id,
            profile_id: self.profile_id,
            job,
            status,
            results,
            error_message: self.error_message,
            pipeline_metadata,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

pub struct PostgresGenerationStore {
    pool: PgPool,
}

impl PostgresGenerationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GenerationStore for PostgresGenerationStore {
    async fn create(&self, record: &GenerationRecord) -> Result<(), StoreError> {
        let (posting_id, description_id) = match record.job {
            JobRef::Posting(id) => (Some(id), None),
            JobRef::Description(id) => (None, Some(id)),
        };
        let results = serde_json::to_value(&record.results)?;
        let metadata = Value::Object(record.pipeline_metadata.clone());

        sqlx::query(
            r#"
            INSERT INTO generations
                (id, profile_id, job_posting_id, job_description_id, status,
                 results, error_message, pipeline_metadata, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id)
        .bind(record.profile_id)
        .bind(posting_id)
        .bind(description_id)
        .bind(record.status.as_str())
        .bind(results)
        .bind(&record.error_message)
        .bind(metadata)
        .bind(record.created_at)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<GenerationRecord, StoreError> {
        let row = sqlx::query_as::<_, GenerationRow>("SELECT * FROM generations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("generation {id}")))?;
        row.into_record()
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<GenerationRecord>, StoreError> {
        let rows = sqlx::query_as::<_, GenerationRow>(
            r#"
            SELECT g.* FROM generations g
            JOIN profiles p ON p.id = g.profile_id
            WHERE p.user_id = $1
            ORDER BY g.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(GenerationRow::into_record).collect()
    }

    async fn update_status(&self, id: Uuid, status: GenerationStatus) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE generations SET status = $2
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_progress(
        &self,
        id: Uuid,
        metadata: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let patch = Value::Object(metadata.clone());
        sqlx::query(
            "UPDATE generations SET pipeline_metadata = pipeline_metadata || $2 WHERE id = $1",
        )
        .bind(id)
        .bind(patch)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        results: &BTreeMap<DocumentType, DocumentResult>,
        duration: Duration,
    ) -> Result<(), StoreError> {
        let results = serde_json::to_value(results)?;
        sqlx::query(
            r#"
            UPDATE generations
            SET status = 'completed',
                results = $2,
                completed_at = now(),
                pipeline_metadata = pipeline_metadata
                    || jsonb_build_object('duration_ms', $3::bigint)
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id)
        .bind(results)
        .bind(duration.as_millis() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error_message: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE generations
            SET status = 'failed', error_message = $2, completed_at = now()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
