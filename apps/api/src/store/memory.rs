//! In-memory store implementations. Used by the test suite and by local
//! development without Postgres. Locks are synchronous and scoped to single
//! map operations; nothing is held across an await point.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::generation::{DocumentResult, DocumentType, GenerationRecord, GenerationStatus};
use crate::models::job::{JobRef, JobSnapshot};
use crate::models::profile::ProfileSnapshot;
use crate::store::{GenerationStore, JobStore, ProfileStore, StoreError};

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<Uuid, ProfileSnapshot>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: ProfileSnapshot) {
        self.profiles.write().insert(snapshot.id(), snapshot);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, profile_id: Uuid) -> Result<ProfileSnapshot, StoreError> {
        self.profiles
            .read()
            .get(&profile_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("profile {profile_id}")))
    }
}

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, JobSnapshot>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: JobSnapshot) {
        self.jobs.write().insert(snapshot.job.id(), snapshot);
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, job: &JobRef) -> Result<JobSnapshot, StoreError> {
        self.jobs
            .read()
            .get(&job.id())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job.id())))
    }
}

/// In-memory generation store. Resolves `list_for_user` through the profile
/// store, mirroring the join the Postgres implementation performs.
pub struct MemoryGenerationStore {
    records: RwLock<HashMap<Uuid, GenerationRecord>>,
    profiles: Arc<MemoryProfileStore>,
}

impl MemoryGenerationStore {
    pub fn new(profiles: Arc<MemoryProfileStore>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            profiles,
        }
    }
}

#[async_trait]
impl GenerationStore for MemoryGenerationStore {
    async fn create(&self, record: &GenerationRecord) -> Result<(), StoreError> {
        self.records.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<GenerationRecord, StoreError> {
        self.records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("generation {id}")))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<GenerationRecord>, StoreError> {
        let owned_profiles: Vec<Uuid> = {
            let profiles = self.profiles.profiles.read();
            profiles
                .values()
                .filter(|p| p.owner() == user_id)
                .map(|p| p.id())
                .collect()
        };

        let mut records: Vec<GenerationRecord> = self
            .records
            .read()
            .values()
            .filter(|r| owned_profiles.contains(&r.profile_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn update_status(&self, id: Uuid, status: GenerationStatus) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("generation {id}")))?;
        record.transition(status);
        Ok(())
    }

    async fn update_progress(
        &self,
        id: Uuid,
        metadata: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("generation {id}")))?;
        for (key, value) in metadata {
            record
                .pipeline_metadata
                .insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        results: &BTreeMap<DocumentType, DocumentResult>,
        duration: Duration,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("generation {id}")))?;
        if record.mark_completed() {
            record.results = results.clone();
            record.pipeline_metadata.insert(
                "duration_ms".to_string(),
                Value::from(duration.as_millis() as u64),
            );
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, error_message: &str) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("generation {id}")))?;
        record.mark_failed(error_message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{make_job_snapshot, make_profile_snapshot};

    fn stores() -> (Arc<MemoryProfileStore>, MemoryGenerationStore) {
        let profiles = Arc::new(MemoryProfileStore::new());
        let generations = MemoryGenerationStore::new(Arc::clone(&profiles));
        (profiles, generations)
    }

    #[tokio::test]
    async fn test_get_missing_generation_is_not_found() {
        let (_, generations) = stores();
        let err = generations.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_complete_sets_results_and_is_idempotent() {
        let (_, generations) = stores();
        let record = GenerationRecord::new(Uuid::new_v4(), JobRef::Posting(Uuid::new_v4()));
        let id = record.id;
        generations.create(&record).await.unwrap();

        let mut results = BTreeMap::new();
        results.insert(
            DocumentType::Resume,
            DocumentResult::new(DocumentType::Resume, "content".to_string()),
        );
        generations
            .complete(id, &results, Duration::from_millis(250))
            .await
            .unwrap();

        let stored = generations.get(id).await.unwrap();
        assert_eq!(stored.status, GenerationStatus::Completed);
        assert_eq!(stored.results.len(), 1);
        assert!(stored.completed_at.is_some());

        // A late fail after completion must not rewrite the terminal state.
        generations.fail(id, "too late").await.unwrap();
        let stored = generations.get(id).await.unwrap();
        assert_eq!(stored.status, GenerationStatus::Completed);
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_update_progress_merges_without_deleting() {
        let (_, generations) = stores();
        let record = GenerationRecord::new(Uuid::new_v4(), JobRef::Posting(Uuid::new_v4()));
        let id = record.id;
        generations.create(&record).await.unwrap();

        let mut first = Map::new();
        first.insert("job_analysis".to_string(), Value::from("done"));
        generations.update_progress(id, &first).await.unwrap();

        let mut second = Map::new();
        second.insert("profile_compilation".to_string(), Value::from("done"));
        generations.update_progress(id, &second).await.unwrap();

        let stored = generations.get(id).await.unwrap();
        assert!(stored.pipeline_metadata.contains_key("job_analysis"));
        assert!(stored.pipeline_metadata.contains_key("profile_compilation"));
    }

    #[tokio::test]
    async fn test_list_for_user_resolves_ownership_through_profiles() {
        let (profiles, generations) = stores();
        let owner = Uuid::new_v4();
        let profile = make_profile_snapshot(owner);
        let profile_id = profile.id();
        profiles.insert(profile);

        let job = make_job_snapshot();
        let record = GenerationRecord::new(profile_id, job.job);
        generations.create(&record).await.unwrap();

        let other = GenerationRecord::new(Uuid::new_v4(), JobRef::Posting(Uuid::new_v4()));
        generations.create(&other).await.unwrap();

        let listed = generations.list_for_user(owner).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, record.id);
    }
}
