//! Narrow persistence interfaces consumed by the pipeline.
//!
//! The orchestrator and coordinator only ever see these traits. The Postgres
//! implementations back the running service; the in-memory implementations
//! back tests and local development without a database.

pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::models::generation::{DocumentResult, DocumentType, GenerationRecord, GenerationStatus};
use crate::models::job::{JobRef, JobSnapshot};
use crate::models::profile::ProfileSnapshot;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid stored value: {0}")]
    Invalid(String),
}

/// Read-only lookup of candidate profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, profile_id: Uuid) -> Result<ProfileSnapshot, StoreError>;
}

/// Read-only lookup of job postings and user-authored job descriptions.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, job: &JobRef) -> Result<JobSnapshot, StoreError>;
}

/// Persistence for generation records. All operations are atomic with
/// respect to a single generation id; the orchestrator is the only writer
/// for a given id while its run is in flight.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    async fn create(&self, record: &GenerationRecord) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<GenerationRecord, StoreError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<GenerationRecord>, StoreError>;

    async fn update_status(&self, id: Uuid, status: GenerationStatus) -> Result<(), StoreError>;

    /// Merges stage progress into the record's pipeline metadata. Keys are
    /// written once per stage and never deleted mid-run.
    async fn update_progress(
        &self,
        id: Uuid,
        metadata: &Map<String, Value>,
    ) -> Result<(), StoreError>;

    async fn complete(
        &self,
        id: Uuid,
        results: &BTreeMap<DocumentType, DocumentResult>,
        duration: Duration,
    ) -> Result<(), StoreError>;

    async fn fail(&self, id: Uuid, error_message: &str) -> Result<(), StoreError>;
}
