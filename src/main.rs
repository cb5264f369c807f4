pub mod auth;
pub mod config;
pub mod degree;
pub mod err;
pub mod exams;
pub mod extract;
pub mod models;
pub mod service;
pub mod store;

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Duration;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;
use crate::err::Error;
use crate::service::ExamService;
use crate::store::{AccountStore, MemoryStore, PgStore};

pub type Payload<T> = Result<Json<T>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(value))
}

#[derive(Clone)]
pub struct AppState {
    pub exams: ExamService,
    pub accounts: Arc<dyn AccountStore>,
    pub session_ttl: Duration,
}

impl AppState {
    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let session_ttl = config.session_ttl();
        match &config.database_url {
            Some(url) => {
                let store = Arc::new(PgStore::connect(url, config.database_pool_size).await?);
                store.prepare_schema().await?;
                log::info!("Using Postgres storage");
                Ok(Self {
                    exams: ExamService::new(store.clone()),
                    accounts: store,
                    session_ttl,
                })
            }
            None => {
                log::info!("DATABASE_URL is not set, keeping data in memory");
                Ok(Self::in_memory(MemoryStore::new(), session_ttl))
            }
        }
    }

    pub fn in_memory(store: MemoryStore, session_ttl: Duration) -> Self {
        let store = Arc::new(store);
        Self {
            exams: ExamService::new(store.clone()),
            accounts: store,
            session_ttl,
        }
    }
}

fn cors(config: &Config) -> CorsLayer {
    let origin = match &config.allowed_origin {
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                log::warn!("Ignoring unparseable ALLOWED_ORIGIN `{}`", origin);
                AllowOrigin::from(Any)
            }
        },
        None => AllowOrigin::from(Any),
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

pub fn router(state: AppState, config: &Config) -> Router {
    let exam_routes = Router::new()
        .route("/", get(exams::list_exams).post(exams::create_exam))
        .route(
            "/:id",
            get(exams::read_exam)
                .put(exams::update_exam)
                .delete(exams::delete_exam),
        )
        .route("/subject/:code", get(exams::exams_by_subject))
        .route("/school/:school", get(exams::exams_by_school))
        .route("/degree/:degree", get(exams::exams_by_degree))
        .route("/course", get(exams::exams_by_course))
        .route("/course-semester", get(exams::exams_by_course))
        .route("/daterange", get(exams::exams_by_date_range))
        .route("/search/subject", get(exams::search_subject))
        .route("/search/place", get(exams::search_place))
        .route("/schools/distinct", get(exams::distinct_schools))
        .route("/degrees/distinct", get(exams::distinct_degrees))
        .route("/degrees", get(exams::distinct_degrees))
        .route("/degrees/bySchool/:school", get(exams::degrees_by_school))
        .route("/semesters/distinct", get(exams::distinct_semesters))
        .route("/semesters", get(exams::distinct_semesters))
        .route("/courseyears/distinct", get(exams::distinct_course_years))
        .route("/courseyears", get(exams::distinct_course_years))
        .route("/subjects/distinct", get(exams::distinct_subjects))
        .route("/subjects", get(exams::distinct_subjects))
        .route("/subjects/byDegree/:degree", get(exams::subjects_by_degree))
        .route("/subdegrees", get(exams::distinct_degrees))
        .route("/subdegrees/:degree", get(exams::sub_degrees));

    let auth_routes = Router::new()
        .route("/login", post(auth::login_user))
        .route("/register", post(auth::register_user))
        .route("/preferences", post(auth::save_preferences))
        .route("/logout", post(auth::drop_session));

    Router::new()
        .nest("/exams", exam_routes)
        .nest("/auth", auth_routes)
        .fallback(err::handler404)
        .layer(cors(config))
        .layer(Extension(state))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from_env();
    let state = AppState::from_config(&config).await?;
    let app = router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    log::info!(
        "Starting exam calendar HTTP server on http://{}",
        config.bind_addr
    );
    axum::serve(listener, app).await?;
    Ok(())
}
