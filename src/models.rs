use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

use crate::err::Error;

const MAX_CODE_LEN: usize = 20;

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ExamRecord {
    pub id: i64,
    pub exam_day: NaiveDate,
    pub exam_hour: NaiveTime,
    pub duration_min: i32,
    pub subject_code: String,
    pub subject_name: String,
    pub acronym: Option<String>,
    pub degree: String,
    pub course_year: i32,
    pub semester: String,
    pub exam_place: Option<String>,
    pub comment: Option<String>,
}

impl ExamRecord {
    pub fn from_payload(id: i64, exam: &ExamPayload) -> Self {
        Self {
            id,
            exam_day: exam.exam_day,
            exam_hour: exam.exam_hour,
            duration_min: exam.duration_min,
            subject_code: exam.subject_code.clone(),
            subject_name: exam.subject_name.clone(),
            acronym: exam.acronym.clone(),
            degree: exam.degree.clone(),
            course_year: exam.course_year,
            semester: exam.semester.clone(),
            exam_place: exam.exam_place.clone(),
            comment: exam.comment.clone(),
        }
    }

    /// Acronym shown to users; the subject code stands in when none was recorded.
    pub fn display_acronym(&self) -> &str {
        self.acronym.as_deref().unwrap_or(&self.subject_code)
    }
}

/// Body of exam create/update requests. A client-sent `id` is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamPayload {
    pub exam_day: NaiveDate,
    pub exam_hour: NaiveTime,
    pub duration_min: i32,
    pub subject_code: String,
    pub subject_name: String,
    #[serde(default)]
    pub acronym: Option<String>,
    pub degree: String,
    pub course_year: i32,
    pub semester: String,
    #[serde(default)]
    pub exam_place: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl ExamPayload {
    pub fn validate(&self) -> Result<(), Error> {
        let mut problems = Vec::new();
        if self.duration_min < 1 {
            problems.push("`durationMin` must be greater than 0");
        }
        if self.course_year < 1 {
            problems.push("`courseYear` must be greater than 0");
        }
        if self.subject_code.trim().is_empty() {
            problems.push("`subjectCode` is required");
        } else if self.subject_code.chars().count() > MAX_CODE_LEN {
            problems.push("`subjectCode` must be at most 20 characters");
        }
        if self.subject_name.trim().is_empty() {
            problems.push("`subjectName` is required");
        }
        if self.degree.trim().is_empty() {
            problems.push("`degree` is required");
        }
        if self.semester.trim().is_empty() {
            problems.push("`semester` is required");
        }
        if let Some(acronym) = &self.acronym {
            if acronym.chars().count() > MAX_CODE_LEN {
                problems.push("`acronym` must be at most 20 characters");
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::invalid(problems.join("; ")))
        }
    }
}

/// A subject as listed by the filter endpoints, compared by its whole value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub acronym: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedFilters {
    #[serde(default)]
    pub degrees: BTreeSet<String>,
    #[serde(default)]
    pub semesters: BTreeSet<String>,
    #[serde(default)]
    pub subjects: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub uuid: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub saved: SavedFilters,
    pub created_at: DateTime<Utc>,
}

/// Public view of an account; the password hash never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub saved_filters: SavedFilters,
}

impl From<&UserAccount> for UserProfile {
    fn from(user: &UserAccount) -> Self {
        Self {
            id: user.uuid,
            name: user.name.clone(),
            email: user.email.clone(),
            saved_filters: user.saved.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSession {
    pub ssid: String,
    pub belongs_to: Uuid,
    pub expires_at: DateTime<Utc>,
}
