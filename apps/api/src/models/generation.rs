//! Generation Record — the durable unit of work moved through the pipeline.
//!
//! A record is created PENDING by the coordinator, mutated only by the
//! orchestrator run that owns it, and always ends in a terminal state
//! (COMPLETED or FAILED) with a completion timestamp.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::job::JobRef;

/// Error-message prefix that marks a FAILED record as user-cancelled
/// rather than a pipeline failure.
pub const CANCELLED_PREFIX: &str = "cancelled";

/// The kind of document a generation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Resume,
    CoverLetter,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Resume => "resume",
            DocumentType::CoverLetter => "cover_letter",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generation lifecycle status. The status always names what is *currently
/// running*, not what just finished — the orchestrator advances it immediately
/// before each stage begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Pending,
    AnalyzingJob,
    CompilingProfile,
    GeneratingDocuments,
    ValidatingQuality,
    Exporting,
    Completed,
    Failed,
}

impl GenerationStatus {
    /// Position in the forward ordering. Used to reject backward transitions
    /// and to assert monotonic observation in tests.
    pub fn rank(&self) -> u8 {
        match self {
            GenerationStatus::Pending => 0,
            GenerationStatus::AnalyzingJob => 1,
            GenerationStatus::CompilingProfile => 2,
            GenerationStatus::GeneratingDocuments => 3,
            GenerationStatus::ValidatingQuality => 4,
            GenerationStatus::Exporting => 5,
            GenerationStatus::Completed => 6,
            GenerationStatus::Failed => 6,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::AnalyzingJob => "analyzing_job",
            GenerationStatus::CompilingProfile => "compiling_profile",
            GenerationStatus::GeneratingDocuments => "generating_documents",
            GenerationStatus::ValidatingQuality => "validating_quality",
            GenerationStatus::Exporting => "exporting",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(GenerationStatus::Pending),
            "analyzing_job" => Some(GenerationStatus::AnalyzingJob),
            "compiling_profile" => Some(GenerationStatus::CompilingProfile),
            "generating_documents" => Some(GenerationStatus::GeneratingDocuments),
            "validating_quality" => Some(GenerationStatus::ValidatingQuality),
            "exporting" => Some(GenerationStatus::Exporting),
            "completed" => Some(GenerationStatus::Completed),
            "failed" => Some(GenerationStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one pipeline stage for one document type.
/// At most one result per document type lives on a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    pub document_type: DocumentType,
    pub content: String,
    /// ATS keyword-coverage score, 0–100. Back-filled by quality validation.
    pub ats_score: Option<u32>,
    pub word_count: u32,
    pub generated_at: DateTime<Utc>,
    /// Stage-specific annotations: token usage, `fallback: true`, export location.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl DocumentResult {
    pub fn new(document_type: DocumentType, content: String) -> Self {
        let word_count = content.split_whitespace().count() as u32;
        Self {
            document_type,
            content,
            ats_score: None,
            word_count,
            generated_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.metadata
            .get("fallback")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub job: JobRef,
    pub status: GenerationStatus,
    pub results: BTreeMap<DocumentType, DocumentResult>,
    /// Set only when status is FAILED.
    pub error_message: Option<String>,
    /// Accumulated per-stage progress. Write-once per key per stage,
    /// never deleted mid-run. Preserved on failure for diagnostics.
    pub pipeline_metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationRecord {
    pub fn new(profile_id: Uuid, job: JobRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile_id,
            job,
            status: GenerationStatus::Pending,
            results: BTreeMap::new(),
            error_message: None,
            pipeline_metadata: Map::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Advances the status. Returns false (no-op) when the record is already
    /// terminal or the transition would move backward through the ordering.
    pub fn transition(&mut self, next: GenerationStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if next.rank() < self.status.rank() {
            return false;
        }
        self.status = next;
        true
    }

    /// Marks the record COMPLETED and stamps the completion time.
    /// No-op if already terminal.
    pub fn mark_completed(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = GenerationStatus::Completed;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Marks the record FAILED with a message and stamps the completion time.
    /// No-op if already terminal.
    pub fn mark_failed(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = GenerationStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn was_cancelled(&self) -> bool {
        self.error_message
            .as_deref()
            .map(|m| m.starts_with(CANCELLED_PREFIX))
            .unwrap_or(false)
    }
}
