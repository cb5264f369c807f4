use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::degree::school_of;
use crate::err::Error;
use crate::models::{ExamPayload, ExamRecord, Subject};
use crate::store::{ExamFilter, ExamStore, StoreResult};

const UNKNOWN_SUBJECT: &str = "Unknown";

/// Answers every exam query. Lookups by id report `NotFound`; the other reads
/// log a store failure and answer with an empty list instead.
#[derive(Clone)]
pub struct ExamService {
    store: Arc<dyn ExamStore>,
}

fn masked<T>(result: StoreResult<Vec<T>>, operation: &str) -> Vec<T> {
    result.unwrap_or_else(|err| {
        log::error!("Error fetching {}: {:?}", operation, err);
        Vec::new()
    })
}

fn not_found(id: i64) -> Error {
    Error::not_found(format!("Exam not found with id: {}", id))
}

/// Fills in absent names and acronyms, then deduplicates by the filled-in pair.
pub fn normalize_subjects(pairs: Vec<(Option<String>, Option<String>)>) -> Vec<Subject> {
    let subjects: BTreeSet<Subject> = pairs
        .into_iter()
        .map(|(name, acronym)| Subject {
            name: name.unwrap_or_else(|| UNKNOWN_SUBJECT.to_string()),
            acronym: acronym.unwrap_or_default(),
        })
        .collect();
    subjects.into_iter().collect()
}

impl ExamService {
    pub fn new(store: Arc<dyn ExamStore>) -> Self {
        Self { store }
    }

    pub async fn get_all(&self) -> Vec<ExamRecord> {
        masked(self.store.all_exams().await, "all exams")
    }

    pub async fn get_by_id(&self, id: i64) -> Result<ExamRecord, Error> {
        self.store.get_exam(id).await?.ok_or_else(|| not_found(id))
    }

    pub async fn create(&self, exam: &ExamPayload) -> Result<ExamRecord, Error> {
        exam.validate()?;
        let record = self.store.insert_exam(exam).await?;
        log::info!("Created exam {} ({})", record.id, record.subject_code);
        Ok(record)
    }

    pub async fn update(&self, id: i64, exam: &ExamPayload) -> Result<ExamRecord, Error> {
        if self.store.get_exam(id).await?.is_none() {
            return Err(not_found(id));
        }
        exam.validate()?;
        // a concurrent delete between the read and the write still surfaces as a miss
        self.store
            .update_exam(id, exam)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn delete(&self, id: i64) -> Result<(), Error> {
        if self.store.delete_exam(id).await? {
            log::info!("Deleted exam {}", id);
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    async fn find(&self, filter: ExamFilter) -> Vec<ExamRecord> {
        let result = self.store.find_exams(&filter).await;
        masked(result, &format!("exams by {:?}", filter))
    }

    pub async fn find_by_subject_code(&self, code: &str) -> Vec<ExamRecord> {
        self.find(ExamFilter::SubjectCode(code.to_string())).await
    }

    pub async fn find_by_degree(&self, degree: &str) -> Vec<ExamRecord> {
        self.find(ExamFilter::Degree(degree.to_string())).await
    }

    /// Matches any degree starting with `school`, whatever its granularity.
    pub async fn find_by_school(&self, school: &str) -> Vec<ExamRecord> {
        self.find(ExamFilter::DegreePrefix(school.to_string())).await
    }

    pub async fn find_by_course_year_and_semester(
        &self,
        course_year: i32,
        semester: &str,
    ) -> Vec<ExamRecord> {
        self.find(ExamFilter::CourseYearAndSemester {
            course_year,
            semester: semester.to_string(),
        })
        .await
    }

    pub async fn find_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExamRecord>, Error> {
        if start > end {
            return Err(Error::invalid(format!(
                "`startDate` {} is after `endDate` {}",
                start, end
            )));
        }
        Ok(self.find(ExamFilter::DateRange { start, end }).await)
    }

    pub async fn find_by_subject_name_containing(&self, text: &str) -> Vec<ExamRecord> {
        self.find(ExamFilter::SubjectNameContaining(text.to_string()))
            .await
    }

    pub async fn find_by_exam_place_containing(&self, text: &str) -> Vec<ExamRecord> {
        self.find(ExamFilter::ExamPlaceContaining(text.to_string()))
            .await
    }

    pub async fn distinct_schools(&self) -> Vec<String> {
        let degrees = masked(self.store.distinct_degrees(None).await, "all schools");
        let schools: BTreeSet<&str> = degrees.iter().map(|d| school_of(d)).collect();
        log::debug!("Found {} distinct schools", schools.len());
        schools.into_iter().map(str::to_string).collect()
    }

    pub async fn distinct_degrees(&self) -> Vec<String> {
        let mut degrees = masked(self.store.distinct_degrees(None).await, "distinct degrees");
        degrees.sort();
        degrees.dedup();
        degrees
    }

    pub async fn distinct_semesters(&self) -> Vec<String> {
        let mut semesters = masked(
            self.store.distinct_semesters().await,
            "distinct semesters",
        );
        semesters.sort();
        semesters.dedup();
        semesters
    }

    pub async fn distinct_course_years(&self) -> Vec<i32> {
        let mut years = masked(
            self.store.distinct_course_years().await,
            "distinct course years",
        );
        years.sort_unstable();
        years.dedup();
        years
    }

    pub async fn distinct_subjects(&self) -> Vec<Subject> {
        let pairs = masked(
            self.store.distinct_subject_pairs().await,
            "distinct subjects",
        );
        let subjects = normalize_subjects(pairs);
        log::debug!("Found {} distinct subjects", subjects.len());
        subjects
    }

    pub async fn degrees_by_school(&self, school: &str) -> Vec<String> {
        let result = self.store.distinct_degrees(Some(school)).await;
        let mut degrees = masked(result, &format!("degrees for school {}", school));
        degrees.sort();
        degrees.dedup();
        log::debug!("Found {} degrees for school {}", degrees.len(), school);
        degrees
    }

    /// Same prefix rule as [`Self::degrees_by_school`], kept under its own name
    /// for the `/exams/subdegrees/{degree}` route.
    pub async fn sub_degrees_of(&self, degree: &str) -> Vec<String> {
        self.degrees_by_school(degree).await
    }

    pub async fn subjects_by_degree(
        &self,
        degree: &str,
        course_year: Option<i32>,
        semester: Option<&str>,
    ) -> Vec<Subject> {
        let exams = self.find(ExamFilter::Degree(degree.to_string())).await;
        let subjects: BTreeSet<Subject> = exams
            .iter()
            .filter(|e| course_year.map_or(true, |year| e.course_year == year))
            .filter(|e| semester.map_or(true, |s| e.semester == s))
            .map(|e| Subject {
                name: e.subject_name.clone(),
                acronym: e.display_acronym().to_string(),
            })
            .collect();
        log::debug!(
            "Found {} distinct subjects for degree {}",
            subjects.len(),
            degree
        );
        subjects.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::exam;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    async fn service_with(exams: Vec<ExamPayload>) -> ExamService {
        let service = ExamService::new(Arc::new(MemoryStore::new()));
        for payload in exams {
            service.create(&payload).await.unwrap();
        }
        service
    }

    fn scenario() -> Vec<ExamPayload> {
        vec![
            exam("ETSINF Computer Science", "IIP", "2024-01-10"),
            exam("ETSINF Telecom", "TEL", "2024-01-12"),
            exam("ETSID Design", "DIS", "2024-01-14"),
        ]
    }

    struct BrokenStore;

    fn fault<T>() -> StoreResult<T> {
        Err(Error::BackingFault {
            kind: "DatabaseError",
            message: "connection refused".to_string(),
        })
    }

    #[async_trait]
    impl ExamStore for BrokenStore {
        async fn all_exams(&self) -> StoreResult<Vec<ExamRecord>> {
            fault()
        }
        async fn get_exam(&self, _id: i64) -> StoreResult<Option<ExamRecord>> {
            fault()
        }
        async fn insert_exam(&self, _exam: &ExamPayload) -> StoreResult<ExamRecord> {
            fault()
        }
        async fn update_exam(
            &self,
            _id: i64,
            _exam: &ExamPayload,
        ) -> StoreResult<Option<ExamRecord>> {
            fault()
        }
        async fn delete_exam(&self, _id: i64) -> StoreResult<bool> {
            fault()
        }
        async fn find_exams(&self, _filter: &ExamFilter) -> StoreResult<Vec<ExamRecord>> {
            fault()
        }
        async fn distinct_degrees(&self, _prefix: Option<&str>) -> StoreResult<Vec<String>> {
            fault()
        }
        async fn distinct_semesters(&self) -> StoreResult<Vec<String>> {
            fault()
        }
        async fn distinct_course_years(&self) -> StoreResult<Vec<i32>> {
            fault()
        }
        async fn distinct_subject_pairs(
            &self,
        ) -> StoreResult<Vec<(Option<String>, Option<String>)>> {
            fault()
        }
    }

    #[tokio::test]
    async fn schools_and_degrees_by_school() {
        let service = service_with(scenario()).await;
        assert_eq!(service.distinct_schools().await, vec!["ETSID", "ETSINF"]);
        assert_eq!(
            service.degrees_by_school("ETSINF").await,
            vec!["ETSINF Computer Science", "ETSINF Telecom"]
        );
        assert_eq!(
            service.sub_degrees_of("etsinf tel").await,
            vec!["ETSINF Telecom"]
        );
    }

    #[tokio::test]
    async fn school_search_is_superset_of_degree_search() {
        let service = service_with(scenario()).await;
        let by_school = service.find_by_school("etsinf").await;
        let by_degree = service.find_by_degree("ETSINF Computer Science").await;
        assert_eq!(by_school.len(), 2);
        assert_eq!(by_degree.len(), 1);
        assert!(by_degree.iter().all(|e| by_school.contains(e)));

        // a full degree name is still just a prefix
        let exact = service.find_by_school("ETSINF Computer Science").await;
        assert_eq!(exact, by_degree);
    }

    #[tokio::test]
    async fn subject_code_and_degree_ignore_case() {
        let service = service_with(scenario()).await;
        assert_eq!(service.find_by_subject_code("iip").await.len(), 1);
        assert_eq!(service.find_by_degree("etsid design").await.len(), 1);
        assert!(service.find_by_degree("ETSID").await.is_empty());
    }

    #[tokio::test]
    async fn course_year_and_semester_are_anded() {
        let mut exams = scenario();
        exams[1].course_year = 2;
        exams[2].semester = "2B".into();
        let service = service_with(exams).await;
        let found = service.find_by_course_year_and_semester(1, "1A").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].subject_code, "IIP");
    }

    #[tokio::test]
    async fn date_range_is_inclusive_and_checked() {
        let service = service_with(scenario()).await;
        let d = |s: &str| s.parse::<NaiveDate>().unwrap();

        let same_day = service
            .find_by_date_range(d("2024-01-12"), d("2024-01-12"))
            .await
            .unwrap();
        assert_eq!(same_day.len(), 1);
        assert_eq!(same_day[0].subject_code, "TEL");

        let span = service
            .find_by_date_range(d("2024-01-10"), d("2024-01-12"))
            .await
            .unwrap();
        assert_eq!(span.len(), 2);

        let inverted = service
            .find_by_date_range(d("2024-01-12"), d("2024-01-10"))
            .await;
        assert!(matches!(inverted, Err(Error::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn substring_searches() {
        let mut exams = scenario();
        exams[0].exam_place = Some("Aula 1G 0.1".into());
        let service = service_with(exams).await;
        assert_eq!(
            service.find_by_subject_name_containing("subject ii").await.len(),
            1
        );
        assert_eq!(service.find_by_subject_name_containing("").await.len(), 3);
        assert_eq!(service.find_by_exam_place_containing("1g").await.len(), 1);
        assert_eq!(service.find_by_exam_place_containing("").await.len(), 3);
    }

    #[tokio::test]
    async fn distinct_listings_are_sorted() {
        let mut exams = scenario();
        exams[0].semester = "2B".into();
        exams[0].course_year = 3;
        exams[2].course_year = 2;
        let service = service_with(exams).await;
        assert_eq!(
            service.distinct_degrees().await,
            vec!["ETSID Design", "ETSINF Computer Science", "ETSINF Telecom"]
        );
        assert_eq!(service.distinct_semesters().await, vec!["1A", "2B"]);
        assert_eq!(service.distinct_course_years().await, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn distinct_subjects_dedup_by_pair() {
        let mut exams = scenario();
        exams[1].subject_name = exams[0].subject_name.clone();
        exams[1].acronym = Some("IIP".into());
        let mut repeated = exams[0].clone();
        repeated.exam_day = "2024-02-01".parse().unwrap();
        exams.push(repeated);
        let service = service_with(exams).await;

        let subjects = service.distinct_subjects().await;
        assert_eq!(
            subjects,
            vec![
                Subject {
                    name: "Subject DIS".into(),
                    acronym: "".into()
                },
                Subject {
                    name: "Subject IIP".into(),
                    acronym: "".into()
                },
                Subject {
                    name: "Subject IIP".into(),
                    acronym: "IIP".into()
                },
            ]
        );
    }

    #[test]
    fn null_names_collapse_onto_unknown_only() {
        let subjects = normalize_subjects(vec![
            (None, None),
            (Some("Unknown".into()), Some(String::new())),
            (Some("X".into()), None),
            (None, Some("AC".into())),
        ]);
        assert_eq!(
            subjects,
            vec![
                Subject {
                    name: "Unknown".into(),
                    acronym: "".into()
                },
                Subject {
                    name: "Unknown".into(),
                    acronym: "AC".into()
                },
                Subject {
                    name: "X".into(),
                    acronym: "".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn subjects_by_degree_applies_optional_filters() {
        let mut exams = vec![
            exam("ETSINF Computer Science", "IIP", "2024-01-10"),
            exam("ETSINF Computer Science", "PRG", "2024-01-11"),
            exam("ETSINF Computer Science", "EDA", "2024-01-12"),
            exam("ETSINF Telecom", "TEL", "2024-01-12"),
        ];
        exams[0].acronym = Some("IIP-A".into());
        exams[1].course_year = 2;
        exams[2].course_year = 2;
        exams[2].semester = "2B".into();
        let service = service_with(exams).await;

        let all = service
            .subjects_by_degree("etsinf computer science", None, None)
            .await;
        assert_eq!(all.len(), 3);
        assert!(all.contains(&Subject {
            name: "Subject IIP".into(),
            acronym: "IIP-A".into()
        }));
        assert!(all.contains(&Subject {
            name: "Subject PRG".into(),
            acronym: "PRG".into()
        }));

        let year_two = service
            .subjects_by_degree("ETSINF Computer Science", Some(2), None)
            .await;
        assert_eq!(year_two.len(), 2);

        let both = service
            .subjects_by_degree("ETSINF Computer Science", Some(2), Some("2B"))
            .await;
        assert_eq!(
            both,
            vec![Subject {
                name: "Subject EDA".into(),
                acronym: "EDA".into()
            }]
        );
    }

    #[tokio::test]
    async fn update_replaces_every_field() {
        let service = service_with(scenario()).await;
        let mut replacement = exam("ETSID Design", "NEW", "2024-06-01");
        replacement.acronym = Some("NW".into());
        replacement.exam_place = Some("Aula 2".into());
        replacement.comment = Some("bring a calculator".into());
        replacement.course_year = 4;

        service.update(1, &replacement).await.unwrap();
        let stored = service.get_by_id(1).await.unwrap();
        assert_eq!(stored, ExamRecord::from_payload(1, &replacement));
    }

    #[tokio::test]
    async fn update_of_missing_id_is_not_found() {
        let service = service_with(scenario()).await;
        let res = service.update(42, &scenario()[0]).await;
        assert!(matches!(res, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let service = service_with(scenario()).await;
        service.delete(2).await.unwrap();
        assert!(matches!(
            service.get_by_id(2).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(service.delete(2).await, Err(Error::NotFound { .. })));
        assert_eq!(service.get_all().await.len(), 2);
    }

    #[tokio::test]
    async fn create_rejects_invalid_records() {
        let service = service_with(vec![]).await;
        let mut payload = exam("", "IIP", "2024-01-10");
        payload.duration_min = 0;
        assert!(matches!(
            service.create(&payload).await,
            Err(Error::InvalidInput { .. })
        ));
        assert!(service.get_all().await.is_empty());
    }

    #[tokio::test]
    async fn store_faults_are_masked_on_listing_reads() {
        let service = ExamService::new(Arc::new(BrokenStore));
        assert!(service.get_all().await.is_empty());
        assert!(service.find_by_school("ETSINF").await.is_empty());
        assert!(service.distinct_schools().await.is_empty());
        assert!(service.distinct_subjects().await.is_empty());
        assert!(service.degrees_by_school("ETSINF").await.is_empty());
        assert!(service
            .subjects_by_degree("ETSINF CS", Some(1), None)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn store_faults_propagate_on_id_and_write_operations() {
        let service = ExamService::new(Arc::new(BrokenStore));
        assert!(matches!(
            service.get_by_id(1).await,
            Err(Error::BackingFault { .. })
        ));
        assert!(matches!(
            service.delete(1).await,
            Err(Error::BackingFault { .. })
        ));
        let payload = exam("ETSINF CS", "IIP", "2024-01-10");
        assert!(matches!(
            service.create(&payload).await,
            Err(Error::BackingFault { .. })
        ));
    }
}
