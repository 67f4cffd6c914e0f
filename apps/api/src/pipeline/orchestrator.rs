//! Orchestrator — drives one generation run end-to-end.
//!
//! Fixed stage order, bounded retry with exponential backoff per stage,
//! status advancement before each stage, and escalation to a terminal FAILED
//! record after retry exhaustion. Whatever happens, the record ends terminal
//! with a completion timestamp; there is no code path that leaves a run stuck.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Map;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::export::Exporter;
use crate::llm_client::CompletionClient;
use crate::models::generation::GenerationRecord;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::{PipelineError, StageError};
use crate::pipeline::stage::PipelineStage;
use crate::pipeline::stages::{
    DocumentGenerationStage, ExportStage, JobAnalysisStage, ProfileCompilationStage,
    QualityValidationStage,
};
use crate::store::GenerationStore;

/// Per-stage retry policy. Attempt n (n ≥ 2) waits `base_delay * 2^(n-2)`
/// before running: 1s, 2s for the default three attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn delay_before(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.saturating_sub(2))
    }
}

pub struct Orchestrator {
    stages: Vec<Arc<dyn PipelineStage>>,
    store: Arc<dyn GenerationStore>,
    retry: RetryPolicy,
}

impl Orchestrator {
    /// Production constructor — builds the five stages from the shared
    /// collaborator clients.
    pub fn new(
        llm: Arc<dyn CompletionClient>,
        exporter: Arc<dyn Exporter>,
        store: Arc<dyn GenerationStore>,
        retry: RetryPolicy,
    ) -> Self {
        let stages: Vec<Arc<dyn PipelineStage>> = vec![
            Arc::new(JobAnalysisStage::new(Arc::clone(&llm))),
            Arc::new(ProfileCompilationStage::new(Arc::clone(&llm))),
            Arc::new(DocumentGenerationStage::new(llm)),
            Arc::new(QualityValidationStage::new()),
            Arc::new(ExportStage::new(exporter)),
        ];
        Self {
            stages,
            store,
            retry,
        }
    }

    /// Runs the full pipeline for one generation. Always returns a terminal
    /// record; cancellation is observed at stage boundaries only.
    pub async fn run(
        &self,
        mut ctx: PipelineContext,
        cancel: CancellationToken,
    ) -> GenerationRecord {
        let started = Instant::now();
        let generation_id = ctx.generation.id;

        for stage in &self.stages {
            let kind = stage.kind();

            if cancel.is_cancelled() {
                return self.abort(ctx, PipelineError::Cancelled { stage: kind }).await;
            }

            // The orchestrator, never the stage, advances the status — and it
            // does so before execution so status always names what is running.
            ctx.generation.transition(kind.status());
            if let Err(e) = self.store.update_status(generation_id, kind.status()).await {
                let error = PipelineError::Persistence {
                    stage: kind,
                    message: e.to_string(),
                };
                return self.abort(ctx, error).await;
            }

            info!(generation_id = %generation_id, stage = %kind, "stage started");

            if let Err(stage_error) = self.execute_with_retry(stage.as_ref(), &mut ctx).await {
                if ctx.options.fallback_enabled {
                    warn!(
                        generation_id = %generation_id,
                        stage = %kind,
                        "retries exhausted, degrading to deterministic fallback"
                    );
                    if let Err(fallback_error) = stage.fallback(&mut ctx) {
                        let error = PipelineError::from_stage_error(
                            fallback_error,
                            self.retry.max_attempts,
                        );
                        return self.abort(ctx, error).await;
                    }
                } else {
                    let error =
                        PipelineError::from_stage_error(stage_error, self.retry.max_attempts);
                    return self.abort(ctx, error).await;
                }
            }

            self.persist_progress(&mut ctx, kind.metadata_key()).await;
        }

        ctx.generation.mark_completed();
        let duration = started.elapsed();
        if let Err(e) = self
            .store
            .complete(generation_id, &ctx.generation.results, duration)
            .await
        {
            error!(generation_id = %generation_id, error = %e, "failed to persist completion");
        }

        info!(
            generation_id = %generation_id,
            documents = ctx.generation.results.len(),
            duration_ms = duration.as_millis() as u64,
            "generation completed"
        );
        ctx.generation
    }

    async fn execute_with_retry(
        &self,
        stage: &dyn PipelineStage,
        ctx: &mut PipelineContext,
    ) -> Result<(), StageError> {
        let kind = stage.kind();
        let mut last_error: Option<StageError> = None;

        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                let delay = self.retry.delay_before(attempt);
                warn!(
                    stage = %kind,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying stage after backoff"
                );
                tokio::time::sleep(delay).await;
            }

            match stage.execute(ctx).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(stage = %kind, attempt, error = %e, "stage attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| StageError::new(kind, "no attempts executed")))
    }

    /// Mirrors the stage's published output onto the record's pipeline
    /// metadata and persists it. A progress-write failure is logged but not
    /// fatal: the run's source of truth is the context until the terminal
    /// write.
    async fn persist_progress(&self, ctx: &mut PipelineContext, key: &str) {
        let Some(output) = ctx.metadata.get(key) else {
            return;
        };
        let mut progress = Map::new();
        progress.insert(key.to_string(), output.clone());
        ctx.generation
            .pipeline_metadata
            .insert(key.to_string(), output.clone());

        if let Err(e) = self.store.update_progress(ctx.generation.id, &progress).await {
            warn!(
                generation_id = %ctx.generation.id,
                stage_key = key,
                error = %e,
                "failed to persist stage progress"
            );
        }
    }

    async fn abort(&self, mut ctx: PipelineContext, error: PipelineError) -> GenerationRecord {
        let message = error.to_string();
        match &error {
            PipelineError::Cancelled { stage } => {
                info!(generation_id = %ctx.generation.id, stage = %stage, "generation cancelled");
            }
            _ => {
                error!(generation_id = %ctx.generation.id, error = %message, "generation failed");
            }
        }

        ctx.generation.mark_failed(&message);
        if let Err(e) = self.store.fail(ctx.generation.id, &message).await {
            error!(generation_id = %ctx.generation.id, error = %e, "failed to persist failure");
        }
        ctx.generation
    }
}
