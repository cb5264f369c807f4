use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{AccountStore, ExamFilter, ExamStore, StoreResult};
use crate::degree::{contains_pattern, prefix_pattern};
use crate::err::Error;
use crate::models::{ExamPayload, ExamRecord, SavedFilters, UserAccount, UserSession};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS exams (
        id BIGSERIAL PRIMARY KEY,
        exam_day DATE NOT NULL,
        exam_hour TIME NOT NULL,
        duration_min INTEGER NOT NULL CHECK (duration_min >= 1),
        subject_code VARCHAR(20) NOT NULL,
        subject_name TEXT NOT NULL,
        acronym VARCHAR(20),
        degree TEXT NOT NULL,
        course_year INTEGER NOT NULL CHECK (course_year >= 1),
        semester TEXT NOT NULL,
        exam_place TEXT,
        comment TEXT
    )",
    "CREATE TABLE IF NOT EXISTS users (
        uuid UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        saved_degrees TEXT[] NOT NULL DEFAULT '{}',
        saved_semesters TEXT[] NOT NULL DEFAULT '{}',
        saved_subjects TEXT[] NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS user_sessions (
        ssid TEXT PRIMARY KEY,
        belongs_to UUID NOT NULL REFERENCES users(uuid) ON DELETE CASCADE,
        expires_at TIMESTAMPTZ NOT NULL
    )",
];

const EXAM_COLUMNS: &str = "id, exam_day, exam_hour, duration_min, subject_code, subject_name, \
     acronym, degree, course_year, semester, exam_place, comment";

const EXAM_ORDER: &str = "ORDER BY exam_day, exam_hour, id";

#[derive(Debug, Clone)]
pub struct PgStore {
    pg: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pg = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|err| {
                log::warn!("Failed to connect to database: {}", err);
                Error::from(err)
            })?;
        Ok(Self { pg })
    }

    pub async fn prepare_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pg).await?;
        }
        log::info!("Database schema is ready");
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    uuid: Uuid,
    name: String,
    email: String,
    password_hash: String,
    saved_degrees: Vec<String>,
    saved_semesters: Vec<String>,
    saved_subjects: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserAccount {
    fn from(row: UserRow) -> Self {
        Self {
            uuid: row.uuid,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            saved: SavedFilters {
                degrees: row.saved_degrees.into_iter().collect(),
                semesters: row.saved_semesters.into_iter().collect(),
                subjects: row.saved_subjects.into_iter().collect(),
            },
            created_at: row.created_at,
        }
    }
}

fn to_vec(set: &std::collections::BTreeSet<String>) -> Vec<String> {
    set.iter().cloned().collect()
}

#[async_trait]
impl ExamStore for PgStore {
    async fn all_exams(&self) -> StoreResult<Vec<ExamRecord>> {
        let sql = format!("SELECT {} FROM exams {}", EXAM_COLUMNS, EXAM_ORDER);
        Ok(sqlx::query_as::<_, ExamRecord>(&sql)
            .fetch_all(&self.pg)
            .await?)
    }

    async fn get_exam(&self, id: i64) -> StoreResult<Option<ExamRecord>> {
        let sql = format!("SELECT {} FROM exams WHERE id = $1 LIMIT 1", EXAM_COLUMNS);
        Ok(sqlx::query_as::<_, ExamRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pg)
            .await?)
    }

    async fn insert_exam(&self, exam: &ExamPayload) -> StoreResult<ExamRecord> {
        let sql = format!(
            "INSERT INTO exams (exam_day, exam_hour, duration_min, subject_code, subject_name, \
             acronym, degree, course_year, semester, exam_place, comment) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {}",
            EXAM_COLUMNS
        );
        Ok(sqlx::query_as::<_, ExamRecord>(&sql)
            .bind(exam.exam_day)
            .bind(exam.exam_hour)
            .bind(exam.duration_min)
            .bind(&exam.subject_code)
            .bind(&exam.subject_name)
            .bind(&exam.acronym)
            .bind(&exam.degree)
            .bind(exam.course_year)
            .bind(&exam.semester)
            .bind(&exam.exam_place)
            .bind(&exam.comment)
            .fetch_one(&self.pg)
            .await?)
    }

    async fn update_exam(&self, id: i64, exam: &ExamPayload) -> StoreResult<Option<ExamRecord>> {
        let sql = format!(
            "UPDATE exams SET exam_day = $2, exam_hour = $3, duration_min = $4, \
             subject_code = $5, subject_name = $6, acronym = $7, degree = $8, \
             course_year = $9, semester = $10, exam_place = $11, comment = $12 \
             WHERE id = $1 RETURNING {}",
            EXAM_COLUMNS
        );
        Ok(sqlx::query_as::<_, ExamRecord>(&sql)
            .bind(id)
            .bind(exam.exam_day)
            .bind(exam.exam_hour)
            .bind(exam.duration_min)
            .bind(&exam.subject_code)
            .bind(&exam.subject_name)
            .bind(&exam.acronym)
            .bind(&exam.degree)
            .bind(exam.course_year)
            .bind(&exam.semester)
            .bind(&exam.exam_place)
            .bind(&exam.comment)
            .fetch_optional(&self.pg)
            .await?)
    }

    async fn delete_exam(&self, id: i64) -> StoreResult<bool> {
        let affected = sqlx::query("DELETE FROM exams WHERE id = $1")
            .bind(id)
            .execute(&self.pg)
            .await?;
        Ok(affected.rows_affected() >= 1)
    }

    async fn find_exams(&self, filter: &ExamFilter) -> StoreResult<Vec<ExamRecord>> {
        let select = format!("SELECT {} FROM exams", EXAM_COLUMNS);
        let rows = match filter {
            ExamFilter::SubjectCode(code) => {
                let sql = format!(
                    "{} WHERE LOWER(subject_code) = LOWER($1) {}",
                    select, EXAM_ORDER
                );
                sqlx::query_as::<_, ExamRecord>(&sql)
                    .bind(code)
                    .fetch_all(&self.pg)
                    .await?
            }
            ExamFilter::Degree(degree) => {
                let sql = format!("{} WHERE LOWER(degree) = LOWER($1) {}", select, EXAM_ORDER);
                sqlx::query_as::<_, ExamRecord>(&sql)
                    .bind(degree)
                    .fetch_all(&self.pg)
                    .await?
            }
            ExamFilter::DegreePrefix(name) => {
                let sql = format!("{} WHERE LOWER(degree) LIKE $1 {}", select, EXAM_ORDER);
                sqlx::query_as::<_, ExamRecord>(&sql)
                    .bind(prefix_pattern(name))
                    .fetch_all(&self.pg)
                    .await?
            }
            ExamFilter::CourseYearAndSemester {
                course_year,
                semester,
            } => {
                let sql = format!(
                    "{} WHERE course_year = $1 AND semester = $2 {}",
                    select, EXAM_ORDER
                );
                sqlx::query_as::<_, ExamRecord>(&sql)
                    .bind(course_year)
                    .bind(semester)
                    .fetch_all(&self.pg)
                    .await?
            }
            ExamFilter::DateRange { start, end } => {
                let sql = format!(
                    "{} WHERE exam_day BETWEEN $1 AND $2 {}",
                    select, EXAM_ORDER
                );
                sqlx::query_as::<_, ExamRecord>(&sql)
                    .bind(start)
                    .bind(end)
                    .fetch_all(&self.pg)
                    .await?
            }
            ExamFilter::SubjectNameContaining(text) => {
                let sql = format!(
                    "{} WHERE LOWER(subject_name) LIKE $1 {}",
                    select, EXAM_ORDER
                );
                sqlx::query_as::<_, ExamRecord>(&sql)
                    .bind(contains_pattern(text))
                    .fetch_all(&self.pg)
                    .await?
            }
            ExamFilter::ExamPlaceContaining(text) => {
                let sql = format!(
                    "{} WHERE LOWER(COALESCE(exam_place, '')) LIKE $1 {}",
                    select, EXAM_ORDER
                );
                sqlx::query_as::<_, ExamRecord>(&sql)
                    .bind(contains_pattern(text))
                    .fetch_all(&self.pg)
                    .await?
            }
        };
        Ok(rows)
    }

    async fn distinct_degrees(&self, prefix: Option<&str>) -> StoreResult<Vec<String>> {
        let degrees = match prefix {
            Some(name) => {
                sqlx::query_scalar::<_, String>(
                    "SELECT DISTINCT degree FROM exams WHERE LOWER(degree) LIKE $1 ORDER BY degree",
                )
                .bind(prefix_pattern(name))
                .fetch_all(&self.pg)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, String>("SELECT DISTINCT degree FROM exams ORDER BY degree")
                    .fetch_all(&self.pg)
                    .await?
            }
        };
        Ok(degrees)
    }

    async fn distinct_semesters(&self) -> StoreResult<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT semester FROM exams ORDER BY semester",
        )
        .fetch_all(&self.pg)
        .await?)
    }

    async fn distinct_course_years(&self) -> StoreResult<Vec<i32>> {
        Ok(sqlx::query_scalar::<_, i32>(
            "SELECT DISTINCT course_year FROM exams ORDER BY course_year",
        )
        .fetch_all(&self.pg)
        .await?)
    }

    async fn distinct_subject_pairs(&self) -> StoreResult<Vec<(Option<String>, Option<String>)>> {
        Ok(sqlx::query_as::<_, (Option<String>, Option<String>)>(
            "SELECT DISTINCT subject_name, acronym FROM exams",
        )
        .fetch_all(&self.pg)
        .await?)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_user(&self, uuid: Uuid) -> StoreResult<Option<UserAccount>> {
        let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE uuid = $1 LIMIT 1")
            .bind(uuid)
            .fetch_optional(&self.pg)
            .await?;
        Ok(user.map(UserAccount::from))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<UserAccount>> {
        let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1 LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pg)
            .await?;
        Ok(user.map(UserAccount::from))
    }

    async fn insert_user(&self, user: &UserAccount) -> StoreResult<()> {
        let res = sqlx::query(
            "INSERT INTO users (uuid, name, email, password_hash, saved_degrees, \
             saved_semesters, saved_subjects, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(user.uuid)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(to_vec(&user.saved.degrees))
        .bind(to_vec(&user.saved.semesters))
        .bind(to_vec(&user.saved.subjects))
        .bind(user.created_at)
        .execute(&self.pg)
        .await
        .map_err(|err| match Error::from(err) {
            Error::Conflict { .. } => Error::Conflict {
                message: format!("Email `{}` is already in use!", user.email),
            },
            other => other,
        })?;

        if res.rows_affected() < 1 {
            return Err(Error::BackingFault {
                kind: "DatabaseError",
                message: "Could not save data to database!".to_string(),
            });
        }
        Ok(())
    }

    async fn replace_filters(
        &self,
        uuid: Uuid,
        filters: &SavedFilters,
    ) -> StoreResult<Option<UserAccount>> {
        let user = sqlx::query_as::<_, UserRow>(
            "UPDATE users SET saved_degrees = $2, saved_semesters = $3, saved_subjects = $4 \
             WHERE uuid = $1 RETURNING *",
        )
        .bind(uuid)
        .bind(to_vec(&filters.degrees))
        .bind(to_vec(&filters.semesters))
        .bind(to_vec(&filters.subjects))
        .fetch_optional(&self.pg)
        .await?;
        Ok(user.map(UserAccount::from))
    }

    async fn find_session(&self, ssid: &str) -> StoreResult<Option<UserSession>> {
        Ok(sqlx::query_as::<_, UserSession>(
            "SELECT ssid, belongs_to, expires_at FROM user_sessions WHERE ssid = $1 LIMIT 1",
        )
        .bind(ssid)
        .fetch_optional(&self.pg)
        .await?)
    }

    async fn find_session_of(&self, user: Uuid) -> StoreResult<Option<UserSession>> {
        Ok(sqlx::query_as::<_, UserSession>(
            "SELECT ssid, belongs_to, expires_at FROM user_sessions \
             WHERE belongs_to = $1 ORDER BY expires_at DESC LIMIT 1",
        )
        .bind(user)
        .fetch_optional(&self.pg)
        .await?)
    }

    async fn insert_session(&self, session: &UserSession) -> StoreResult<()> {
        let res = sqlx::query(
            "INSERT INTO user_sessions (ssid, belongs_to, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(&session.ssid)
        .bind(session.belongs_to)
        .bind(session.expires_at)
        .execute(&self.pg)
        .await?;

        if res.rows_affected() < 1 {
            return Err(Error::BackingFault {
                kind: "DatabaseError",
                message: "Could not update session ids!".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_session(&self, ssid: &str) -> StoreResult<bool> {
        let affected = sqlx::query("DELETE FROM user_sessions WHERE ssid = $1")
            .bind(ssid)
            .execute(&self.pg)
            .await?;
        Ok(affected.rows_affected() >= 1)
    }
}
