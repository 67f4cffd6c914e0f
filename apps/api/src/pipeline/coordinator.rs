//! Generation Coordinator — the public entry point for starting and managing
//! generation runs.
//!
//! One spawned task per run; an injected in-flight registry maps generation
//! id to a cancellation handle for the task. The registry entry is removed by
//! a drop guard, so cleanup happens no matter how the run ends.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::models::generation::{DocumentResult, DocumentType, GenerationRecord};
use crate::models::job::JobRef;
use crate::pipeline::context::{GenerationOptions, PipelineContext};
use crate::pipeline::orchestrator::Orchestrator;
use crate::store::{GenerationStore, JobStore, ProfileStore, StoreError};

/// Handle to one in-flight run. Held by the registry for the lifetime of the
/// spawned task.
pub struct RunHandle {
    cancel: CancellationToken,
}

/// Shared in-flight registry, injected so the HTTP layer and tests observe
/// the same view of running generations.
pub type InFlightRegistry = Arc<Mutex<HashMap<Uuid, RunHandle>>>;

pub fn new_registry() -> InFlightRegistry {
    Arc::new(Mutex::new(HashMap::new()))
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden")]
    Forbidden,

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CoordinatorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => CoordinatorError::NotFound(what),
            other => CoordinatorError::Store(other),
        }
    }
}

/// Removes the registry entry when the run's task finishes, including on
/// panic or task abort.
struct RegistryGuard {
    registry: InFlightRegistry,
    id: Uuid,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}

pub struct GenerationCoordinator {
    profiles: Arc<dyn ProfileStore>,
    jobs: Arc<dyn JobStore>,
    store: Arc<dyn GenerationStore>,
    orchestrator: Arc<Orchestrator>,
    registry: InFlightRegistry,
    /// Caps how many runs execute simultaneously. Runs above the cap are
    /// accepted and queue on the semaphore; their status stays PENDING until
    /// a permit frees up.
    admission: Arc<Semaphore>,
}

impl GenerationCoordinator {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        jobs: Arc<dyn JobStore>,
        store: Arc<dyn GenerationStore>,
        orchestrator: Arc<Orchestrator>,
        registry: InFlightRegistry,
        max_concurrent: usize,
    ) -> Self {
        Self {
            profiles,
            jobs,
            store,
            orchestrator,
            registry,
            admission: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Validates the request, persists a PENDING record, registers the run
    /// and spawns it. Returns the record immediately; the pipeline proceeds
    /// in the background.
    pub async fn start(
        &self,
        user_id: Uuid,
        profile_id: Uuid,
        job: JobRef,
        options: GenerationOptions,
    ) -> Result<GenerationRecord, CoordinatorError> {
        if options.document_types.is_empty() {
            return Err(CoordinatorError::Invalid(
                "at least one document type is required".to_string(),
            ));
        }

        let profile = self.profiles.get(profile_id).await?;
        if profile.owner() != user_id {
            return Err(CoordinatorError::Forbidden);
        }
        let job_snapshot = self.jobs.get(&job).await?;

        let record = GenerationRecord::new(profile_id, job);
        self.store.create(&record).await?;

        let cancel = CancellationToken::new();
        self.registry.lock().insert(
            record.id,
            RunHandle {
                cancel: cancel.clone(),
            },
        );
        let guard = RegistryGuard {
            registry: Arc::clone(&self.registry),
            id: record.id,
        };

        info!(generation_id = %record.id, profile_id = %profile_id, "generation accepted");

        let ctx = PipelineContext::new(record.clone(), profile, job_snapshot, options);
        let orchestrator = Arc::clone(&self.orchestrator);
        let admission = Arc::clone(&self.admission);
        tokio::spawn(async move {
            let _guard = guard;
            // Don't make a cancelled run wait in the admission queue: skip
            // straight to the orchestrator, whose first boundary check fails
            // it without executing any stage. The semaphore is never closed,
            // so acquisition only fails if the runtime is tearing down.
            let _permit = tokio::select! {
                permit = admission.acquire_owned() => permit.ok(),
                () = cancel.cancelled() => None,
            };
            orchestrator.run(ctx, cancel).await;
        });

        Ok(record)
    }

    /// Current record for a generation the user owns. Foreign generations are
    /// reported as not found rather than forbidden.
    pub async fn status(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<GenerationRecord, CoordinatorError> {
        let record = self.store.get(id).await?;
        let profile = self.profiles.get(record.profile_id).await?;
        if profile.owner() != user_id {
            return Err(CoordinatorError::NotFound(format!("generation {id}")));
        }
        Ok(record)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<GenerationRecord>, CoordinatorError> {
        Ok(self.store.list_for_user(user_id).await?)
    }

    /// Requests cancellation of an in-flight run. Returns whether a run was
    /// actually signalled: unknown, foreign, terminal, and already-finished
    /// generations all answer `false` without error.
    pub async fn cancel(&self, user_id: Uuid, id: Uuid) -> Result<bool, CoordinatorError> {
        let record = match self.store.get(id).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let profile = self.profiles.get(record.profile_id).await?;
        if profile.owner() != user_id {
            return Ok(false);
        }
        if record.status.is_terminal() {
            return Ok(false);
        }

        // Removing the handle here is fine: the run's own guard removal
        // becomes a no-op, and repeat cancels answer false.
        match self.registry.lock().remove(&id) {
            Some(handle) => {
                handle.cancel.cancel();
                info!(generation_id = %id, "cancellation requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Starts a fresh run against the same profile and job as an existing
    /// generation. The source record is left untouched.
    pub async fn regenerate(
        &self,
        user_id: Uuid,
        id: Uuid,
        options: GenerationOptions,
    ) -> Result<GenerationRecord, CoordinatorError> {
        let original = self.status(user_id, id).await?;
        self.start(user_id, original.profile_id, original.job, options)
            .await
    }

    /// The generated content for one document of a completed generation.
    pub async fn content(
        &self,
        user_id: Uuid,
        id: Uuid,
        document_type: DocumentType,
    ) -> Result<DocumentResult, CoordinatorError> {
        let record = self.status(user_id, id).await?;
        record.results.get(&document_type).cloned().ok_or_else(|| {
            CoordinatorError::NotFound(format!("{document_type} for generation {id}"))
        })
    }

    pub fn in_flight_count(&self) -> usize {
        self.registry.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::export::{Exporter, MemoryExporter};
    use crate::llm_client::{Completion, CompletionClient, LlmError};
    use crate::models::generation::GenerationStatus;
    use crate::pipeline::orchestrator::RetryPolicy;
    use crate::pipeline::testing::{make_job_snapshot, make_profile_snapshot, FakeCompletionClient};
    use crate::store::memory::{MemoryGenerationStore, MemoryJobStore, MemoryProfileStore};

    /// Delegates to the scripted fake but parks each call on a semaphore
    /// permit the test releases, so a run can be held mid-stage.
    struct GatedClient {
        delegate: FakeCompletionClient,
        gate: Semaphore,
    }

    impl GatedClient {
        fn closed() -> Self {
            Self {
                delegate: FakeCompletionClient::succeeding(),
                gate: Semaphore::new(0),
            }
        }

        fn release(&self, calls: usize) {
            self.gate.add_permits(calls);
        }
    }

    #[async_trait]
    impl CompletionClient for GatedClient {
        async fn complete(&self, prompt: &str, system: &str) -> Result<Completion, LlmError> {
            let _permit = self.gate.acquire().await.ok();
            self.delegate.complete(prompt, system).await
        }
    }

    /// Tracks the highest number of simultaneously executing completion
    /// calls, to observe the admission cap.
    struct ConcurrencyProbe {
        delegate: FakeCompletionClient,
        active: AtomicU32,
        max_active: AtomicU32,
    }

    impl ConcurrencyProbe {
        fn new() -> Self {
            Self {
                delegate: FakeCompletionClient::succeeding(),
                active: AtomicU32::new(0),
                max_active: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ConcurrencyProbe {
        async fn complete(&self, prompt: &str, system: &str) -> Result<Completion, LlmError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let result = self.delegate.complete(prompt, system).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    struct Fixture {
        coordinator: GenerationCoordinator,
        store: Arc<MemoryGenerationStore>,
        owner: Uuid,
        profile_id: Uuid,
        job: JobRef,
    }

    fn fixture_with(llm: Arc<dyn CompletionClient>, max_concurrent: usize) -> Fixture {
        let profiles = Arc::new(MemoryProfileStore::new());
        let jobs = Arc::new(MemoryJobStore::new());
        let store = Arc::new(MemoryGenerationStore::new(Arc::clone(&profiles)));

        let owner = Uuid::new_v4();
        let profile = make_profile_snapshot(owner);
        let profile_id = profile.id();
        profiles.insert(profile);

        let job_snapshot = make_job_snapshot();
        let job = job_snapshot.job;
        jobs.insert(job_snapshot);

        let orchestrator = Arc::new(Orchestrator::new(
            llm,
            Arc::new(MemoryExporter::new()) as Arc<dyn Exporter>,
            Arc::clone(&store) as Arc<dyn GenerationStore>,
            RetryPolicy::default(),
        ));
        let coordinator = GenerationCoordinator::new(
            profiles,
            jobs,
            Arc::clone(&store) as Arc<dyn GenerationStore>,
            orchestrator,
            new_registry(),
            max_concurrent,
        );

        Fixture {
            coordinator,
            store,
            owner,
            profile_id,
            job,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(FakeCompletionClient::succeeding()), 8)
    }

    async fn wait_terminal(store: &MemoryGenerationStore, id: Uuid) -> GenerationRecord {
        for _ in 0..500 {
            let record = store.get(id).await.unwrap();
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("generation {id} never reached a terminal state");
    }

    async fn wait_registry_empty(coordinator: &GenerationCoordinator) {
        for _ in 0..500 {
            if coordinator.in_flight_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("registry never drained");
    }

    #[tokio::test]
    async fn test_start_runs_to_completion_and_cleans_registry() {
        let f = fixture();
        let record = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::both())
            .await
            .unwrap();
        assert_eq!(record.status, GenerationStatus::Pending);

        let finished = wait_terminal(&f.store, record.id).await;
        assert_eq!(finished.status, GenerationStatus::Completed);
        assert_eq!(finished.results.len(), 2);

        wait_registry_empty(&f.coordinator).await;
        let status = f.coordinator.status(f.owner, record.id).await.unwrap();
        assert_eq!(status.status, GenerationStatus::Completed);
    }

    #[tokio::test]
    async fn test_start_rejects_foreign_profile() {
        let f = fixture();
        let err = f
            .coordinator
            .start(Uuid::new_v4(), f.profile_id, f.job, GenerationOptions::both())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Forbidden));
    }

    #[tokio::test]
    async fn test_start_with_unknown_job_is_not_found() {
        let f = fixture();
        let err = f
            .coordinator
            .start(
                f.owner,
                f.profile_id,
                JobRef::Posting(Uuid::new_v4()),
                GenerationOptions::both(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_start_requires_a_document_type() {
        let f = fixture();
        let options = GenerationOptions {
            document_types: vec![],
            fallback_enabled: false,
        };
        let err = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, options)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_cancel_in_flight_run_signals_and_cleans_up() {
        let gate = Arc::new(GatedClient::closed());
        let f = fixture_with(Arc::clone(&gate) as Arc<dyn CompletionClient>, 8);

        let record = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::both())
            .await
            .unwrap();
        assert_eq!(f.coordinator.in_flight_count(), 1);

        let cancelled = f.coordinator.cancel(f.owner, record.id).await.unwrap();
        assert!(cancelled);
        assert_eq!(f.coordinator.in_flight_count(), 0);

        // Let the parked stage finish; the next boundary observes the token.
        gate.release(16);
        let finished = wait_terminal(&f.store, record.id).await;
        assert_eq!(finished.status, GenerationStatus::Failed);
        assert!(finished.was_cancelled());
        assert!(finished.completed_at.is_some());

        // Repeat cancel answers false once the run is gone.
        let again = f.coordinator.cancel(f.owner, record.id).await.unwrap();
        assert!(!again);
    }

    #[tokio::test]
    async fn test_cancel_unknown_generation_returns_false() {
        let f = fixture();
        let cancelled = f.coordinator.cancel(f.owner, Uuid::new_v4()).await.unwrap();
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn test_cancel_completed_generation_returns_false() {
        let f = fixture();
        let record = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::resume())
            .await
            .unwrap();
        wait_terminal(&f.store, record.id).await;

        let cancelled = f.coordinator.cancel(f.owner, record.id).await.unwrap();
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn test_cancel_by_non_owner_returns_false() {
        let gate = Arc::new(GatedClient::closed());
        let f = fixture_with(Arc::clone(&gate) as Arc<dyn CompletionClient>, 8);
        let record = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::both())
            .await
            .unwrap();

        let cancelled = f
            .coordinator
            .cancel(Uuid::new_v4(), record.id)
            .await
            .unwrap();
        assert!(!cancelled);
        assert_eq!(f.coordinator.in_flight_count(), 1);

        gate.release(16);
        wait_terminal(&f.store, record.id).await;
    }

    #[tokio::test]
    async fn test_status_hides_foreign_generations() {
        let f = fixture();
        let record = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::resume())
            .await
            .unwrap();
        wait_terminal(&f.store, record.id).await;

        let err = f
            .coordinator
            .status(Uuid::new_v4(), record.id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_generations_do_not_interfere() {
        let f = fixture();
        let first = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::resume())
            .await
            .unwrap();
        let second = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::cover_letter())
            .await
            .unwrap();
        assert_ne!(first.id, second.id);

        let first = wait_terminal(&f.store, first.id).await;
        let second = wait_terminal(&f.store, second.id).await;
        assert_eq!(first.status, GenerationStatus::Completed);
        assert_eq!(second.status, GenerationStatus::Completed);
        assert!(first.results.contains_key(&DocumentType::Resume));
        assert!(!first.results.contains_key(&DocumentType::CoverLetter));
        assert!(second.results.contains_key(&DocumentType::CoverLetter));
    }

    #[tokio::test]
    async fn test_cancelling_one_run_leaves_the_other_registered() {
        let gate = Arc::new(GatedClient::closed());
        let f = fixture_with(Arc::clone(&gate) as Arc<dyn CompletionClient>, 8);

        let doomed = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::resume())
            .await
            .unwrap();
        let survivor = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::resume())
            .await
            .unwrap();
        assert_eq!(f.coordinator.in_flight_count(), 2);

        let cancelled = f.coordinator.cancel(f.owner, doomed.id).await.unwrap();
        assert!(cancelled);
        assert_eq!(f.coordinator.in_flight_count(), 1);

        gate.release(16);
        let doomed = wait_terminal(&f.store, doomed.id).await;
        assert!(doomed.was_cancelled());

        let survivor = wait_terminal(&f.store, survivor.id).await;
        assert_eq!(survivor.status, GenerationStatus::Completed);
        wait_registry_empty(&f.coordinator).await;
    }

    #[tokio::test]
    async fn test_cancelled_run_does_not_wait_for_an_admission_slot() {
        let gate = Arc::new(GatedClient::closed());
        let f = fixture_with(Arc::clone(&gate) as Arc<dyn CompletionClient>, 1);

        // First run holds the only permit, parked inside its first stage.
        let running = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::resume())
            .await
            .unwrap();
        let queued = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::resume())
            .await
            .unwrap();

        let cancelled = f.coordinator.cancel(f.owner, queued.id).await.unwrap();
        assert!(cancelled);

        // The queued run terminates while the permit is still held.
        let queued = wait_terminal(&f.store, queued.id).await;
        assert_eq!(queued.status, GenerationStatus::Failed);
        assert!(queued.was_cancelled());

        gate.release(16);
        let running = wait_terminal(&f.store, running.id).await;
        assert_eq!(running.status, GenerationStatus::Completed);
    }

    #[tokio::test]
    async fn test_admission_cap_bounds_concurrent_execution() {
        let probe = Arc::new(ConcurrencyProbe::new());
        let f = fixture_with(Arc::clone(&probe) as Arc<dyn CompletionClient>, 1);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let record = f
                .coordinator
                .start(f.owner, f.profile_id, f.job, GenerationOptions::resume())
                .await
                .unwrap();
            ids.push(record.id);
        }
        for id in ids {
            wait_terminal(&f.store, id).await;
        }

        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_regenerate_starts_a_fresh_run_against_same_target() {
        let f = fixture();
        let original = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::resume())
            .await
            .unwrap();
        wait_terminal(&f.store, original.id).await;

        let fresh = f
            .coordinator
            .regenerate(f.owner, original.id, GenerationOptions::both())
            .await
            .unwrap();
        assert_ne!(fresh.id, original.id);
        assert_eq!(fresh.profile_id, original.profile_id);
        assert_eq!(fresh.job, original.job);

        let finished = wait_terminal(&f.store, fresh.id).await;
        assert_eq!(finished.status, GenerationStatus::Completed);
        assert_eq!(finished.results.len(), 2);

        // The source record is untouched.
        let source = f.coordinator.status(f.owner, original.id).await.unwrap();
        assert_eq!(source.id, original.id);
        assert_eq!(source.results.len(), 1);
    }

    #[tokio::test]
    async fn test_list_scopes_to_owner() {
        let f = fixture();
        let record = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::resume())
            .await
            .unwrap();
        wait_terminal(&f.store, record.id).await;

        let mine = f.coordinator.list(f.owner).await.unwrap();
        assert_eq!(mine.len(), 1);
        let theirs = f.coordinator.list(Uuid::new_v4()).await.unwrap();
        assert!(theirs.is_empty());
    }

    #[tokio::test]
    async fn test_content_returns_generated_document() {
        let f = fixture();
        let record = f
            .coordinator
            .start(f.owner, f.profile_id, f.job, GenerationOptions::resume())
            .await
            .unwrap();
        wait_terminal(&f.store, record.id).await;

        let document = f
            .coordinator
            .content(f.owner, record.id, DocumentType::Resume)
            .await
            .unwrap();
        assert!(document.word_count > 0);

        let err = f
            .coordinator
            .content(f.owner, record.id, DocumentType::CoverLetter)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound(_)));
    }
}
