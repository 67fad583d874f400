//! Data models for the profile service.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// CEFR level, plus native.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProficiencyLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
    Native,
}

impl ProficiencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProficiencyLevel::A1 => "A1",
            ProficiencyLevel::A2 => "A2",
            ProficiencyLevel::B1 => "B1",
            ProficiencyLevel::B2 => "B2",
            ProficiencyLevel::C1 => "C1",
            ProficiencyLevel::C2 => "C2",
            ProficiencyLevel::Native => "Native",
        }
    }
}

impl fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProficiencyLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A1" => Ok(ProficiencyLevel::A1),
            "A2" => Ok(ProficiencyLevel::A2),
            "B1" => Ok(ProficiencyLevel::B1),
            "B2" => Ok(ProficiencyLevel::B2),
            "C1" => Ok(ProficiencyLevel::C1),
            "C2" => Ok(ProficiencyLevel::C2),
            "Native" => Ok(ProficiencyLevel::Native),
            _ => Err(()),
        }
    }
}

/// Projection row from `user_profile`.
#[derive(Debug, Clone, FromRow)]
pub struct Profile {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub standard_level: Option<String>,
    pub bio: Option<String>,
    pub timezone: Option<String>,
    pub locale: Option<String>,
    pub learning_style: Option<String>,
    pub accessibility_notes: Option<String>,
    pub goals: Option<String>,
    pub prior_knowledge_tags: Vec<String>,
    pub ai_profile: Option<serde_json::Value>,
    pub weekly_time_budget_min: Option<i32>,
    pub preferred_session_min: Option<i32>,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency token for PATCH.
    pub updated_at: DateTime<Utc>,
}

/// Row from `user_language_proficiencies`, also its wire form.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageProficiency {
    pub language_code: String,
    pub level: String,
    pub last_assessed_at: Option<NaiveDate>,
}

/// `GET /profile` and `PATCH /profile` response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub standard_level: Option<String>,
    pub bio: Option<String>,
    pub timezone: Option<String>,
    pub locale: Option<String>,
    pub learning_style: Option<String>,
    pub accessibility_notes: Option<String>,
    pub goals: Option<String>,
    pub prior_knowledge_tags: Vec<String>,
    pub ai_profile: Option<serde_json::Value>,
    pub weekly_time_budget_min: Option<i32>,
    pub preferred_session_min: Option<i32>,
    pub language_proficiencies: Vec<LanguageProficiency>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileView {
    pub fn new(profile: Profile, language_proficiencies: Vec<LanguageProficiency>) -> Self {
        Self {
            user_id: profile.user_id,
            email: profile.email,
            full_name: profile.full_name,
            standard_level: profile.standard_level,
            bio: profile.bio,
            timezone: profile.timezone,
            locale: profile.locale,
            learning_style: profile.learning_style,
            accessibility_notes: profile.accessibility_notes,
            goals: profile.goals,
            prior_knowledge_tags: profile.prior_knowledge_tags,
            ai_profile: profile.ai_profile,
            weekly_time_budget_min: profile.weekly_time_budget_min,
            preferred_session_min: profile.preferred_session_min,
            language_proficiencies,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

/// `PATCH /profile` request body.
///
/// Absent and `null` both mean "leave unchanged".
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatchRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub standard_level: Option<String>,
    pub bio: Option<String>,
    pub timezone: Option<String>,
    pub locale: Option<String>,
    pub learning_style: Option<String>,
    pub accessibility_notes: Option<String>,
    pub goals: Option<String>,
    pub prior_knowledge_tags: Option<Vec<String>>,
    pub ai_profile: Option<serde_json::Value>,
    pub weekly_time_budget_min: Option<i32>,
    pub preferred_session_min: Option<i32>,
    /// Full replacement; an empty list clears.
    pub language_proficiencies: Option<Vec<LanguageProficiencyInput>>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageProficiencyInput {
    pub language_code: String,
    pub level: String,
    pub last_assessed_at: Option<NaiveDate>,
}

/// Validated language row ready for insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLanguageProficiency {
    /// Trimmed and lowercased.
    pub language_code: String,
    pub level: ProficiencyLevel,
    pub last_assessed_at: Option<NaiveDate>,
}

/// Validated column changes for one PATCH.
///
/// `None` leaves the column alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub standard_level: Option<String>,
    pub bio: Option<String>,
    pub timezone: Option<String>,
    pub locale: Option<String>,
    pub learning_style: Option<String>,
    pub accessibility_notes: Option<String>,
    pub goals: Option<String>,
    pub prior_knowledge_tags: Option<Vec<String>>,
    pub ai_profile: Option<serde_json::Value>,
    pub weekly_time_budget_min: Option<i32>,
    pub preferred_session_min: Option<i32>,
    pub language_proficiencies: Option<Vec<NewLanguageProficiency>>,
}

impl ProfileChanges {
    /// No recognized field is present.
    pub fn is_empty(&self) -> bool {
        *self == ProfileChanges::default()
    }
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
