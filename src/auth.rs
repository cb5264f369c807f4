use std::ops::Add;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand::{thread_rng, Rng};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::extract::JsonBody;
use crate::models::{SavedFilters, UserAccount, UserProfile, UserSession};
use crate::store::AccountStore;
use crate::{proceeds, AppState, Error, Payload};

const BAD_CREDENTIALS: &str = "Invalid email or password!";

/// The account a request acts for, resolved from its session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginUser {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedInUser {
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDropped {
    pub dropped: bool,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn invalid_session() -> Error {
    Error::InvalidSession {
        message: "Missing, unknown or expired session!".to_string(),
    }
}

fn new_session_id() -> String {
    let ssid_bytes: [u8; 32] = thread_rng().gen();

    let mut hasher: Sha256 = Digest::new();
    hasher.update(ssid_bytes);
    hex::encode(hasher.finalize())
}

pub async fn ensure_authenticated(
    session_id: Option<String>,
    accounts: &dyn AccountStore,
) -> Result<Caller, Error> {
    let ssid = match session_id {
        Some(ssid) if !ssid.is_empty() => ssid,
        _ => return Err(invalid_session()),
    };

    let session = match accounts.find_session(&ssid).await? {
        Some(session) => session,
        None => {
            log::warn!("Rejected unknown session");
            return Err(invalid_session());
        }
    };

    if Utc::now().gt(&session.expires_at) {
        accounts.delete_session(&ssid).await?;
        log::warn!("Rejected expired session of {}", session.belongs_to);
        return Err(invalid_session());
    }
    Ok(Caller {
        user: session.belongs_to,
    })
}

pub async fn register(
    accounts: &dyn AccountStore,
    request: RegisterUser,
) -> Result<UserProfile, Error> {
    if request.name.trim().is_empty() || request.email.trim().is_empty() {
        return Err(Error::invalid("`name` and `email` are required"));
    }
    if request.password.is_empty() {
        return Err(Error::invalid("Provided password was empty!"));
    }

    if accounts.find_user_by_email(&request.email).await?.is_some() {
        return Err(Error::Conflict {
            message: "Error: Email is already in use!".to_string(),
        });
    }

    let salt = SaltString::generate(&mut OsRng);
    let user = UserAccount {
        uuid: Uuid::new_v4(),
        name: request.name,
        email: request.email,
        password_hash: Pbkdf2
            .hash_password(request.password.as_bytes(), &salt)?
            .to_string(),
        saved: SavedFilters::default(),
        created_at: Utc::now(),
    };
    accounts.insert_user(&user).await?;
    log::info!("Registered user {}", user.uuid);
    Ok(UserProfile::from(&user))
}

pub async fn login(
    accounts: &dyn AccountStore,
    session_ttl: Duration,
    request: LoginUser,
) -> Result<LoggedInUser, Error> {
    let rejected = || Error::AuthenticationFailure {
        message: BAD_CREDENTIALS.to_string(),
    };
    if request.password.is_empty() {
        return Err(rejected());
    }

    let user = match accounts.find_user_by_email(&request.email).await? {
        Some(user) => user,
        None => {
            log::warn!("Login attempt for unknown email");
            return Err(rejected());
        }
    };
    let hash = PasswordHash::new(&user.password_hash)?;
    if Pbkdf2
        .verify_password(request.password.as_bytes(), &hash)
        .is_err()
    {
        log::warn!("Wrong password for user {}", user.uuid);
        return Err(rejected());
    }

    if let Some(existing) = accounts.find_session_of(user.uuid).await? {
        if Utc::now().lt(&existing.expires_at) {
            // already authenticated
            return Ok(LoggedInUser {
                session_id: existing.ssid,
                expires_at: existing.expires_at,
                user: UserProfile::from(&user),
            });
        }
        accounts.delete_session(&existing.ssid).await?;
    }

    let session = UserSession {
        ssid: new_session_id(),
        belongs_to: user.uuid,
        expires_at: Utc::now().add(session_ttl),
    };
    accounts.insert_session(&session).await?;
    log::info!("Opened session for user {}", user.uuid);

    Ok(LoggedInUser {
        session_id: session.ssid,
        expires_at: session.expires_at,
        user: UserProfile::from(&user),
    })
}

pub async fn save_filters(
    accounts: &dyn AccountStore,
    caller: Caller,
    filters: SavedFilters,
) -> Result<UserProfile, Error> {
    accounts
        .replace_filters(caller.user, &filters)
        .await?
        .map(|user| UserProfile::from(&user))
        .ok_or_else(|| Error::not_found(format!("User `{}` does not exist!", caller.user)))
}

pub async fn register_user(
    Extension(state): Extension<AppState>,
    JsonBody(request): JsonBody<RegisterUser>,
) -> Result<(StatusCode, Json<UserProfile>), Error> {
    let profile = register(state.accounts.as_ref(), request).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn login_user(
    Extension(state): Extension<AppState>,
    JsonBody(request): JsonBody<LoginUser>,
) -> Payload<LoggedInUser> {
    proceeds(login(state.accounts.as_ref(), state.session_ttl, request).await?)
}

pub async fn save_preferences(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    JsonBody(filters): JsonBody<SavedFilters>,
) -> Payload<UserProfile> {
    let caller = ensure_authenticated(bearer_token(&headers), state.accounts.as_ref()).await?;
    proceeds(save_filters(state.accounts.as_ref(), caller, filters).await?)
}

pub async fn drop_session(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> Payload<SessionDropped> {
    let ssid = bearer_token(&headers).ok_or_else(invalid_session)?;
    let dropped = state.accounts.delete_session(&ssid).await?;
    proceeds(SessionDropped { dropped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registration(email: &str) -> RegisterUser {
        RegisterUser {
            name: "Ana".to_string(),
            email: email.to_string(),
            password: "s3cret".to_string(),
        }
    }

    fn credentials(email: &str, password: &str) -> LoginUser {
        LoginUser {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn registration_hashes_the_password() {
        let store = MemoryStore::new();
        let profile = register(&store, registration("ana@upv.es")).await.unwrap();
        assert_eq!(profile.email, "ana@upv.es");
        assert!(profile.saved_filters.degrees.is_empty());

        let stored = store.find_user(profile.id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "s3cret");
        assert!(stored.password_hash.starts_with("$pbkdf2"));
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict_and_keeps_the_account() {
        let store = MemoryStore::new();
        let first = register(&store, registration("ana@upv.es")).await.unwrap();
        let before = store.find_user(first.id).await.unwrap();

        let mut again = registration("ana@upv.es");
        again.name = "Impostor".to_string();
        let res = register(&store, again).await;
        assert!(matches!(res, Err(Error::Conflict { .. })));
        assert_eq!(store.find_user(first.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn blank_registration_fields_are_rejected() {
        let store = MemoryStore::new();
        let mut request = registration("ana@upv.es");
        request.password = String::new();
        assert!(matches!(
            register(&store, request).await,
            Err(Error::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn login_checks_credentials_and_reuses_sessions() {
        let store = MemoryStore::new();
        register(&store, registration("ana@upv.es")).await.unwrap();
        let ttl = Duration::hours(1);

        let wrong = login(&store, ttl, credentials("ana@upv.es", "nope")).await;
        assert!(matches!(wrong, Err(Error::AuthenticationFailure { .. })));
        let unknown = login(&store, ttl, credentials("bob@upv.es", "s3cret")).await;
        assert_eq!(unknown.unwrap_err(), wrong.unwrap_err());

        let first = login(&store, ttl, credentials("ana@upv.es", "s3cret"))
            .await
            .unwrap();
        assert_eq!(first.session_id.len(), 64);
        let second = login(&store, ttl, credentials("ana@upv.es", "s3cret"))
            .await
            .unwrap();
        assert_eq!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn expired_sessions_are_rejected_and_removed() {
        let store = MemoryStore::new();
        let profile = register(&store, registration("ana@upv.es")).await.unwrap();
        store
            .insert_session(&UserSession {
                ssid: "stale".to_string(),
                belongs_to: profile.id,
                expires_at: Utc::now() - Duration::minutes(1),
            })
            .await
            .unwrap();

        let res = ensure_authenticated(Some("stale".to_string()), &store).await;
        assert!(matches!(res, Err(Error::InvalidSession { .. })));
        assert!(store.find_session("stale").await.unwrap().is_none());

        assert!(ensure_authenticated(None, &store).await.is_err());
        assert!(ensure_authenticated(Some(String::new()), &store)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn preferences_are_replaced_not_merged() {
        let store = MemoryStore::new();
        register(&store, registration("ana@upv.es")).await.unwrap();
        let session = login(
            &store,
            Duration::hours(1),
            credentials("ana@upv.es", "s3cret"),
        )
        .await
        .unwrap();
        let caller = ensure_authenticated(Some(session.session_id), &store)
            .await
            .unwrap();

        let first = SavedFilters {
            degrees: ["ETSINF Computer Science".to_string()].into(),
            semesters: ["1A".to_string(), "1B".to_string()].into(),
            subjects: ["IIP".to_string()].into(),
        };
        save_filters(&store, caller, first).await.unwrap();

        let second = SavedFilters {
            degrees: ["ETSID Design".to_string()].into(),
            ..SavedFilters::default()
        };
        let profile = save_filters(&store, caller, second.clone()).await.unwrap();
        assert_eq!(profile.saved_filters, second);
    }

    #[test]
    fn bearer_tokens_are_parsed() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123".to_string()));
        headers.insert(AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
