//! Pipeline Context — the mutable scratchpad threaded through the stages of
//! one run. Created per run, never persisted, never shared across runs.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::generation::{DocumentType, GenerationRecord};
use crate::models::job::JobSnapshot;
use crate::models::profile::ProfileSnapshot;
use crate::pipeline::error::StageError;
use crate::pipeline::stage::StageKind;

/// Per-generation request options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Which documents to produce. Never empty.
    pub document_types: Vec<DocumentType>,
    /// When set, a stage whose external call fails after all orchestrator
    /// retries degrades to its deterministic fallback instead of failing the
    /// whole generation. Off by default: failures surface as FAILED.
    pub fallback_enabled: bool,
}

impl GenerationOptions {
    pub fn resume() -> Self {
        Self {
            document_types: vec![DocumentType::Resume],
            fallback_enabled: false,
        }
    }

    pub fn cover_letter() -> Self {
        Self {
            document_types: vec![DocumentType::CoverLetter],
            fallback_enabled: false,
        }
    }

    pub fn both() -> Self {
        Self {
            document_types: vec![DocumentType::Resume, DocumentType::CoverLetter],
            fallback_enabled: false,
        }
    }

    pub fn with_fallback(mut self) -> Self {
        self.fallback_enabled = true;
        self
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::both()
    }
}

pub struct PipelineContext {
    /// The record this run owns. Mutated only through the orchestrator and
    /// the stages it drives; persisted snapshots are taken at stage
    /// boundaries.
    pub generation: GenerationRecord,
    pub profile: ProfileSnapshot,
    pub job: JobSnapshot,
    pub options: GenerationOptions,
    /// Stage outputs, keyed by `StageKind::metadata_key()`. A stage writes
    /// its own key exactly once per attempt (re-insertion on retry replaces
    /// the previous attempt's value, keeping retries idempotent) and may read
    /// any key written by an earlier stage.
    pub metadata: HashMap<String, Value>,
}

impl PipelineContext {
    pub fn new(
        generation: GenerationRecord,
        profile: ProfileSnapshot,
        job: JobSnapshot,
        options: GenerationOptions,
    ) -> Self {
        Self {
            generation,
            profile,
            job,
            options,
            metadata: HashMap::new(),
        }
    }

    /// Publishes a stage's output under its metadata key.
    pub fn publish<T: Serialize>(&mut self, stage: StageKind, output: &T) -> Result<(), StageError> {
        let value = serde_json::to_value(output).map_err(|e| {
            StageError::with_source(stage, "failed to serialize stage output", e)
        })?;
        self.metadata.insert(stage.metadata_key().to_string(), value);
        Ok(())
    }

    /// Reads a prior stage's output, failing with a stage error attributed to
    /// the *reading* stage when the dependency is missing or malformed.
    pub fn require<T: DeserializeOwned>(
        &self,
        reader: StageKind,
        dependency: StageKind,
    ) -> Result<T, StageError> {
        let value = self.metadata.get(dependency.metadata_key()).ok_or_else(|| {
            StageError::new(
                reader,
                format!("missing {} output in context", dependency.metadata_key()),
            )
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            StageError::with_source(
                reader,
                format!("malformed {} output in context", dependency.metadata_key()),
                e,
            )
        })
    }

    /// True when the named stage published a fallback (degraded) output.
    pub fn is_fallback(&self, stage: StageKind) -> bool {
        self.metadata
            .get(stage.metadata_key())
            .and_then(|v| v.get("fallback"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}
