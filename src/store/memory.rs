//! In-process store, used by the tests and when no `DATABASE_URL` is set.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, ExamFilter, ExamStore, StoreResult};
use crate::degree::{contains_ignore_case, eq_ignore_case, has_prefix};
use crate::err::Error;
use crate::models::{ExamPayload, ExamRecord, SavedFilters, UserAccount, UserSession};

#[derive(Debug, Default)]
struct Exams {
    next_id: i64,
    rows: BTreeMap<i64, ExamRecord>,
}

/// Data lives as long as the last clone of the store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    exams: Arc<RwLock<Exams>>,
    users: Arc<RwLock<HashMap<Uuid, UserAccount>>>,
    sessions: Arc<RwLock<HashMap<String, UserSession>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExamFilter {
    fn matches(&self, exam: &ExamRecord) -> bool {
        match self {
            ExamFilter::SubjectCode(code) => eq_ignore_case(&exam.subject_code, code),
            ExamFilter::Degree(degree) => eq_ignore_case(&exam.degree, degree),
            ExamFilter::DegreePrefix(name) => has_prefix(&exam.degree, name),
            ExamFilter::CourseYearAndSemester {
                course_year,
                semester,
            } => exam.course_year == *course_year && exam.semester == *semester,
            ExamFilter::DateRange { start, end } => {
                *start <= exam.exam_day && exam.exam_day <= *end
            }
            ExamFilter::SubjectNameContaining(text) => {
                contains_ignore_case(&exam.subject_name, text)
            }
            ExamFilter::ExamPlaceContaining(text) => {
                contains_ignore_case(exam.exam_place.as_deref().unwrap_or(""), text)
            }
        }
    }
}

fn sorted(mut exams: Vec<ExamRecord>) -> Vec<ExamRecord> {
    exams.sort_by(|a, b| (a.exam_day, a.exam_hour, a.id).cmp(&(b.exam_day, b.exam_hour, b.id)));
    exams
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn all_exams(&self) -> StoreResult<Vec<ExamRecord>> {
        let exams = self.exams.read().await;
        Ok(sorted(exams.rows.values().cloned().collect()))
    }

    async fn get_exam(&self, id: i64) -> StoreResult<Option<ExamRecord>> {
        let exams = self.exams.read().await;
        Ok(exams.rows.get(&id).cloned())
    }

    async fn insert_exam(&self, exam: &ExamPayload) -> StoreResult<ExamRecord> {
        let mut exams = self.exams.write().await;
        exams.next_id += 1;
        let record = ExamRecord::from_payload(exams.next_id, exam);
        exams.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_exam(&self, id: i64, exam: &ExamPayload) -> StoreResult<Option<ExamRecord>> {
        let mut exams = self.exams.write().await;
        Ok(exams.rows.get_mut(&id).map(|row| {
            *row = ExamRecord::from_payload(id, exam);
            row.clone()
        }))
    }

    async fn delete_exam(&self, id: i64) -> StoreResult<bool> {
        let mut exams = self.exams.write().await;
        Ok(exams.rows.remove(&id).is_some())
    }

    async fn find_exams(&self, filter: &ExamFilter) -> StoreResult<Vec<ExamRecord>> {
        let exams = self.exams.read().await;
        Ok(sorted(
            exams
                .rows
                .values()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect(),
        ))
    }

    async fn distinct_degrees(&self, prefix: Option<&str>) -> StoreResult<Vec<String>> {
        let exams = self.exams.read().await;
        let degrees: BTreeSet<&String> = exams
            .rows
            .values()
            .map(|e| &e.degree)
            .filter(|d| prefix.map_or(true, |name| has_prefix(d, name)))
            .collect();
        Ok(degrees.into_iter().cloned().collect())
    }

    async fn distinct_semesters(&self) -> StoreResult<Vec<String>> {
        let exams = self.exams.read().await;
        let semesters: BTreeSet<&String> = exams.rows.values().map(|e| &e.semester).collect();
        Ok(semesters.into_iter().cloned().collect())
    }

    async fn distinct_course_years(&self) -> StoreResult<Vec<i32>> {
        let exams = self.exams.read().await;
        let years: BTreeSet<i32> = exams.rows.values().map(|e| e.course_year).collect();
        Ok(years.into_iter().collect())
    }

    async fn distinct_subject_pairs(&self) -> StoreResult<Vec<(Option<String>, Option<String>)>> {
        let exams = self.exams.read().await;
        let pairs: BTreeSet<(Option<String>, Option<String>)> = exams
            .rows
            .values()
            .map(|e| (Some(e.subject_name.clone()), e.acronym.clone()))
            .collect();
        Ok(pairs.into_iter().collect())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_user(&self, uuid: Uuid) -> StoreResult<Option<UserAccount>> {
        let users = self.users.read().await;
        Ok(users.get(&uuid).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserAccount>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: &UserAccount) -> StoreResult<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(Error::Conflict {
                message: format!("Email `{}` is already in use!", user.email),
            });
        }
        users.insert(user.uuid, user.clone());
        Ok(())
    }

    async fn replace_filters(
        &self,
        uuid: Uuid,
        filters: &SavedFilters,
    ) -> StoreResult<Option<UserAccount>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&uuid).map(|user| {
            user.saved = filters.clone();
            user.clone()
        }))
    }

    async fn find_session(&self, ssid: &str) -> StoreResult<Option<UserSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(ssid).cloned())
    }

    async fn find_session_of(&self, user: Uuid) -> StoreResult<Option<UserSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|s| s.belongs_to == user)
            .max_by_key(|s| s.expires_at)
            .cloned())
    }

    async fn insert_session(&self, session: &UserSession) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.ssid.clone(), session.clone());
        Ok(())
    }

    async fn delete_session(&self, ssid: &str) -> StoreResult<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(ssid).is_some())
    }
}
