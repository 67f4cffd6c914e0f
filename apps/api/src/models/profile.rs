//! Candidate profile models. The pipeline consumes an immutable
//! `ProfileSnapshot` loaded once per run; profile CRUD itself lives outside
//! this service.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProfileRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub headline: Option<String>,
    pub summary: Option<String>,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExperienceRow {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub title: String,
    pub organization: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub highlights: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SkillRow {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub years: Option<i16>,
}

/// Immutable per-run view of a profile: the row plus its experiences and
/// skills. Shared read-only across stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub profile: ProfileRow,
    pub experiences: Vec<ExperienceRow>,
    pub skills: Vec<SkillRow>,
}

impl ProfileSnapshot {
    pub fn id(&self) -> Uuid {
        self.profile.id
    }

    /// The user who owns this profile. Every control operation on a
    /// generation is authorized against this id.
    pub fn owner(&self) -> Uuid {
        self.profile.user_id
    }
}
