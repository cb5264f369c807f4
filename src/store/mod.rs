pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::err::Error;
use crate::models::{ExamPayload, ExamRecord, SavedFilters, UserAccount, UserSession};

pub use memory::MemoryStore;
pub use pg::PgStore;

pub type StoreResult<T> = Result<T, Error>;

/// Filtered lookups over the exam table. Results come back ordered by
/// day, hour and id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExamFilter {
    /// Case-insensitive exact match on `subject_code`.
    SubjectCode(String),
    /// Case-insensitive exact match on `degree`.
    Degree(String),
    /// Case-insensitive prefix match on `degree`.
    DegreePrefix(String),
    CourseYearAndSemester { course_year: i32, semester: String },
    /// Inclusive on both ends.
    DateRange { start: NaiveDate, end: NaiveDate },
    SubjectNameContaining(String),
    /// A missing place counts as empty text.
    ExamPlaceContaining(String),
}

#[async_trait]
pub trait ExamStore: Send + Sync {
    async fn all_exams(&self) -> StoreResult<Vec<ExamRecord>>;

    async fn get_exam(&self, id: i64) -> StoreResult<Option<ExamRecord>>;

    async fn insert_exam(&self, exam: &ExamPayload) -> StoreResult<ExamRecord>;

    /// Overwrites every field of an existing row. `None` when the id is absent.
    async fn update_exam(&self, id: i64, exam: &ExamPayload) -> StoreResult<Option<ExamRecord>>;

    /// `false` when nothing was deleted.
    async fn delete_exam(&self, id: i64) -> StoreResult<bool>;

    async fn find_exams(&self, filter: &ExamFilter) -> StoreResult<Vec<ExamRecord>>;

    /// Distinct degrees, optionally restricted to a case-insensitive prefix.
    async fn distinct_degrees(&self, prefix: Option<&str>) -> StoreResult<Vec<String>>;

    async fn distinct_semesters(&self) -> StoreResult<Vec<String>>;

    async fn distinct_course_years(&self) -> StoreResult<Vec<i32>>;

    /// Raw distinct `(subject_name, acronym)` pairs, nulls included.
    async fn distinct_subject_pairs(&self) -> StoreResult<Vec<(Option<String>, Option<String>)>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_user(&self, uuid: Uuid) -> StoreResult<Option<UserAccount>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserAccount>>;

    /// Fails with `Conflict` when the email is taken.
    async fn insert_user(&self, user: &UserAccount) -> StoreResult<()>;

    /// Replaces all saved filter sets. `None` when the user is absent.
    async fn replace_filters(
        &self,
        uuid: Uuid,
        filters: &SavedFilters,
    ) -> StoreResult<Option<UserAccount>>;

    async fn find_session(&self, ssid: &str) -> StoreResult<Option<UserSession>>;

    async fn find_session_of(&self, user: Uuid) -> StoreResult<Option<UserSession>>;

    async fn insert_session(&self, session: &UserSession) -> StoreResult<()>;

    async fn delete_session(&self, ssid: &str) -> StoreResult<bool>;
}
