//! Per-user browser profile directory lifecycle.
//!
//! Profiles live under the configured user-data root, one directory per
//! validated profile id. The id charset rule doubles as the traversal guard
//! here, same as on the handshake path.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;
use tracing::warn;

use crate::auth::is_valid_user_data_id;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserDataInfo {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, format!(r#"{{"error": "{message}"}}"#))
}

/// GET /userdata/{id} - creation and modification timestamps, or 404.
pub async fn get_user_data(root: &Path, id: &str) -> Response<Full<Bytes>> {
    if !is_valid_user_data_id(id) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid user data id");
    }

    match tokio::fs::metadata(root.join(id)).await {
        Ok(metadata) => {
            let updated_at: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());
            // Creation time is not available on every filesystem; fall back
            // to the modification time.
            let created_at: DateTime<Utc> = metadata
                .created()
                .map(DateTime::from)
                .unwrap_or(updated_at);

            let info = UserDataInfo {
                id: id.to_string(),
                created_at,
                updated_at,
            };
            let body = serde_json::to_string(&info).unwrap_or_else(|_| "{}".to_string());
            json_response(StatusCode::OK, body)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            error_response(StatusCode::NOT_FOUND, "Not Found")
        }
        Err(e) => {
            warn!(id = %id, error = %e, "user data stat failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// DELETE /userdata/{id} - remove the profile directory; 400 if absent.
pub async fn delete_user_data(root: &Path, id: &str) -> Response<Full<Bytes>> {
    if !is_valid_user_data_id(id) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid user data id");
    }

    match tokio::fs::remove_dir_all(root.join(id)).await {
        Ok(()) => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Full::new(Bytes::new()))
            .unwrap(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            error_response(StatusCode::BAD_REQUEST, "Bad Request")
        }
        Err(e) => {
            warn!(id = %id, error = %e, "user data removal failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn scratch_root() -> PathBuf {
        std::env::temp_dir().join(format!("hivegate-userdata-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn stat_of_existing_profile_returns_timestamps() {
        let root = scratch_root();
        tokio::fs::create_dir_all(root.join("abc-123")).await.unwrap();

        let response = get_user_data(&root, "abc-123").await;
        assert_eq!(response.status(), StatusCode::OK);

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn stat_of_missing_profile_is_404() {
        let root = scratch_root();
        tokio::fs::create_dir_all(&root).await.unwrap();

        let response = get_user_data(&root, "missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn delete_of_missing_profile_is_400() {
        let root = scratch_root();
        tokio::fs::create_dir_all(&root).await.unwrap();

        let response = delete_user_data(&root, "missing").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_the_profile() {
        let root = scratch_root();
        tokio::fs::create_dir_all(root.join("abc-123")).await.unwrap();

        let response = delete_user_data(&root, "abc-123").await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(!root.join("abc-123").exists());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn traversal_attempts_are_rejected_up_front() {
        let root = scratch_root();

        let response = get_user_data(&root, "../etc").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = delete_user_data(&root, "../etc").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
