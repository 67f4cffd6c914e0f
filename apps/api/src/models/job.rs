//! Job models — a generation targets exactly one of a stored job posting or a
//! user-authored job description. The `JobRef` enum makes the two references
//! mutually exclusive by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Reference to the job a generation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "id")]
pub enum JobRef {
    /// A job posting ingested from an external board.
    Posting(Uuid),
    /// A job description pasted by the user.
    Description(Uuid),
}

impl JobRef {
    /// Builds a `JobRef` from a pair of optional ids, enforcing exclusivity.
    pub fn from_ids(posting_id: Option<Uuid>, description_id: Option<Uuid>) -> Option<Self> {
        match (posting_id, description_id) {
            (Some(id), None) => Some(JobRef::Posting(id)),
            (None, Some(id)) => Some(JobRef::Description(id)),
            _ => None,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            JobRef::Posting(id) | JobRef::Description(id) => *id,
        }
    }
}

/// Immutable view of the targeted job, loaded once per run and threaded
/// through the pipeline context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job: JobRef,
    pub title: String,
    pub company: Option<String>,
    /// Full job text — posting body or user-authored description.
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobPostingRow {
    pub id: Uuid,
    pub title: String,
    pub company: Option<String>,
    pub body: String,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobDescriptionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
