//! User HTTP Routes
//!
//! CRUD endpoints over the record coordinator. Coordinator calls block on
//! the store, so each one runs on the blocking pool under a cancellation
//! signal with the configured request deadline. If the client goes away
//! the handler future is dropped, which cancels the signal and rolls the
//! in-flight transaction back.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::de::DeserializeOwned;

use super::errors::{ApiError, ApiResult};
use crate::cancel::CancelSignal;
use crate::coordinator::{CoordinatorResult, RecordCoordinator};
use crate::record::{NewUser, RecordId, UserPatch, UserRecord};

// ==================
// Shared State
// ==================

/// State shared across user handlers
pub struct UsersState {
    pub coordinator: RecordCoordinator,
    pub request_timeout: Duration,
}

impl UsersState {
    pub fn new(coordinator: RecordCoordinator, request_timeout: Duration) -> Self {
        Self {
            coordinator,
            request_timeout,
        }
    }

    /// Run `work` on the blocking pool, cancelling it if this future is
    /// dropped before it finishes
    async fn run<T, F>(&self, work: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&RecordCoordinator, &CancelSignal) -> CoordinatorResult<T> + Send + 'static,
    {
        let signal = CancelSignal::with_timeout(self.request_timeout);
        let guard = signal.guard();
        let coordinator = self.coordinator.clone();

        let result = tokio::task::spawn_blocking(move || work(&coordinator, &signal))
            .await
            .map_err(|e| ApiError::Worker(e.to_string()))?;

        guard.disarm();
        Ok(result?)
    }
}

// ==================
// User Routes
// ==================

/// Create user routes
pub fn user_routes(state: Arc<UsersState>) -> Router {
    Router::new()
        .route("/", get(list_users_handler))
        .route("/users", get(list_users_handler).post(create_user_handler))
        .route(
            "/users/:user_id",
            get(get_user_handler)
                .put(update_user_handler)
                .delete(delete_user_handler),
        )
        .with_state(state)
}

fn parse_user_id(raw: String) -> ApiResult<RecordId> {
    raw.parse().map_err(|_| ApiError::InvalidId(raw))
}

/// Decode a JSON body whatever `Content-Type` the client sent
fn decode_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidBody(e.to_string()))
}

// ==================
// Handlers
// ==================

async fn create_user_handler(
    State(state): State<Arc<UsersState>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<UserRecord>)> {
    let new_user: NewUser = decode_body(&body)?;
    let record = state
        .run(move |coordinator, signal| coordinator.create(new_user, signal))
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_users_handler(
    State(state): State<Arc<UsersState>>,
) -> ApiResult<Json<Vec<UserRecord>>> {
    let records = state
        .run(|coordinator, signal| coordinator.list(signal))
        .await?;
    Ok(Json(records))
}

async fn get_user_handler(
    State(state): State<Arc<UsersState>>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserRecord>> {
    let id = parse_user_id(user_id)?;
    let record = state
        .run(move |coordinator, signal| coordinator.get(id, signal))
        .await?;
    Ok(Json(record))
}

async fn update_user_handler(
    State(state): State<Arc<UsersState>>,
    Path(user_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<UserRecord>> {
    let id = parse_user_id(user_id)?;
    let patch: UserPatch = decode_body(&body)?;
    let record = state
        .run(move |coordinator, signal| coordinator.update(id, patch, signal))
        .await?;
    Ok(Json(record))
}

/// Deleting a missing id is still a success
async fn delete_user_handler(
    State(state): State<Arc<UsersState>>,
    Path(user_id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_user_id(user_id)?;
    state
        .run(move |coordinator, signal| coordinator.delete(id, signal))
        .await?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id("17".to_string()).unwrap(), 17);
        assert!(matches!(
            parse_user_id("abc".to_string()),
            Err(ApiError::InvalidId(raw)) if raw == "abc"
        ));
        assert!(parse_user_id("-1".to_string()).is_err());
    }

    #[test]
    fn test_decode_body_reports_invalid_json() {
        let patch: UserPatch = decode_body(&Bytes::from_static(br#"{"age": 31}"#)).unwrap();
        assert_eq!(patch.age, 31);

        assert!(matches!(
            decode_body::<NewUser>(&Bytes::from_static(b"{not json")),
            Err(ApiError::InvalidBody(_))
        ));
        assert!(matches!(
            decode_body::<UserPatch>(&Bytes::from_static(br#"{"age": 300}"#)),
            Err(ApiError::InvalidBody(_))
        ));
    }
}
