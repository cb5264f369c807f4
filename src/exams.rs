use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_with::{serde_as, NoneAsEmptyString};

use crate::extract::{JsonBody, PathParam, QueryParams};
use crate::models::{ExamPayload, ExamRecord, Subject};
use crate::{proceeds, AppState, Payload};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseQuery {
    pub course_year: i32,
    pub semester: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct TextQuery {
    #[serde(default)]
    pub query: String,
}

/// Both filters are optional; an empty value (`?courseYear=`) means no filter.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectQuery {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub course_year: Option<i32>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub semester: Option<String>,
}

pub async fn list_exams(Extension(state): Extension<AppState>) -> Payload<Vec<ExamRecord>> {
    proceeds(state.exams.get_all().await)
}

pub async fn read_exam(
    Extension(state): Extension<AppState>,
    PathParam(id): PathParam<i64>,
) -> Payload<ExamRecord> {
    proceeds(state.exams.get_by_id(id).await?)
}

pub async fn create_exam(
    Extension(state): Extension<AppState>,
    JsonBody(body): JsonBody<ExamPayload>,
) -> Result<(StatusCode, Json<ExamRecord>), crate::Error> {
    let exam = state.exams.create(&body).await?;
    Ok((StatusCode::CREATED, Json(exam)))
}

pub async fn update_exam(
    Extension(state): Extension<AppState>,
    PathParam(id): PathParam<i64>,
    JsonBody(body): JsonBody<ExamPayload>,
) -> Payload<ExamRecord> {
    proceeds(state.exams.update(id, &body).await?)
}

pub async fn delete_exam(
    Extension(state): Extension<AppState>,
    PathParam(id): PathParam<i64>,
) -> Result<StatusCode, crate::Error> {
    state.exams.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn exams_by_subject(
    Extension(state): Extension<AppState>,
    PathParam(code): PathParam<String>,
) -> Payload<Vec<ExamRecord>> {
    proceeds(state.exams.find_by_subject_code(&code).await)
}

pub async fn exams_by_school(
    Extension(state): Extension<AppState>,
    PathParam(school): PathParam<String>,
) -> Payload<Vec<ExamRecord>> {
    proceeds(state.exams.find_by_school(&school).await)
}

pub async fn exams_by_degree(
    Extension(state): Extension<AppState>,
    PathParam(degree): PathParam<String>,
) -> Payload<Vec<ExamRecord>> {
    proceeds(state.exams.find_by_degree(&degree).await)
}

pub async fn exams_by_course(
    Extension(state): Extension<AppState>,
    QueryParams(course): QueryParams<CourseQuery>,
) -> Payload<Vec<ExamRecord>> {
    proceeds(
        state
            .exams
            .find_by_course_year_and_semester(course.course_year, &course.semester)
            .await,
    )
}

pub async fn exams_by_date_range(
    Extension(state): Extension<AppState>,
    QueryParams(range): QueryParams<DateRangeQuery>,
) -> Payload<Vec<ExamRecord>> {
    proceeds(
        state
            .exams
            .find_by_date_range(range.start_date, range.end_date)
            .await?,
    )
}

pub async fn search_subject(
    Extension(state): Extension<AppState>,
    QueryParams(text): QueryParams<TextQuery>,
) -> Payload<Vec<ExamRecord>> {
    proceeds(state.exams.find_by_subject_name_containing(&text.query).await)
}

pub async fn search_place(
    Extension(state): Extension<AppState>,
    QueryParams(text): QueryParams<TextQuery>,
) -> Payload<Vec<ExamRecord>> {
    proceeds(state.exams.find_by_exam_place_containing(&text.query).await)
}

pub async fn distinct_schools(Extension(state): Extension<AppState>) -> Payload<Vec<String>> {
    proceeds(state.exams.distinct_schools().await)
}

pub async fn distinct_degrees(Extension(state): Extension<AppState>) -> Payload<Vec<String>> {
    proceeds(state.exams.distinct_degrees().await)
}

pub async fn distinct_semesters(Extension(state): Extension<AppState>) -> Payload<Vec<String>> {
    proceeds(state.exams.distinct_semesters().await)
}

pub async fn distinct_course_years(Extension(state): Extension<AppState>) -> Payload<Vec<i32>> {
    proceeds(state.exams.distinct_course_years().await)
}

pub async fn distinct_subjects(Extension(state): Extension<AppState>) -> Payload<Vec<Subject>> {
    proceeds(state.exams.distinct_subjects().await)
}

pub async fn degrees_by_school(
    Extension(state): Extension<AppState>,
    PathParam(school): PathParam<String>,
) -> Payload<Vec<String>> {
    proceeds(state.exams.degrees_by_school(&school).await)
}

pub async fn sub_degrees(
    Extension(state): Extension<AppState>,
    PathParam(degree): PathParam<String>,
) -> Payload<Vec<String>> {
    proceeds(state.exams.sub_degrees_of(&degree).await)
}

pub async fn subjects_by_degree(
    Extension(state): Extension<AppState>,
    PathParam(degree): PathParam<String>,
    QueryParams(filter): QueryParams<SubjectQuery>,
) -> Payload<Vec<Subject>> {
    proceeds(
        state
            .exams
            .subjects_by_degree(&degree, filter.course_year, filter.semester.as_deref())
            .await,
    )
}
