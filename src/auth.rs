//! Handshake authorization and query-string sanitization.
//!
//! Clients reach the streaming endpoint with a query string that may carry
//! an access token and browser launch parameters. The raw filesystem path
//! (`--user-data-dir`) is never accepted from a client; clients select a
//! profile through the validated `--user-data-id` indirection instead.
//!
//! Token policy is asymmetric: with a configured server token the client
//! must present it exactly; with none configured every request is accepted
//! and any client-supplied token is dropped from the forwarded query.

use std::path::Path;

use crate::types::{GatewayError, Result};

const TOKEN_PARAM: &str = "token";
const USER_DATA_DIR_PARAM: &str = "--user-data-dir";
const USER_DATA_ID_PARAM: &str = "--user-data-id";

/// The sanitized view of a client handshake query.
#[derive(Debug, Clone)]
pub struct SanitizedQuery {
    /// Validated profile id, when the client selected one.
    pub user_data_id: Option<String>,
    /// Computed profile directory forwarded to the worker.
    pub user_data_dir: Option<String>,
    /// Rebuilt query string to forward (no leading `?`, may be empty).
    forwarded: String,
}

impl SanitizedQuery {
    /// Authorize and sanitize the raw query string of an upgrade request.
    ///
    /// Order matters: the token check runs before any parameter handling so
    /// an unauthorized request never reaches dispatch.
    pub fn from_query(
        raw: Option<&str>,
        server_token: Option<&str>,
        user_data_root: &Path,
    ) -> Result<Self> {
        let pairs: Vec<(String, String)> = match raw {
            Some(raw) if !raw.is_empty() => serde_urlencoded::from_str(raw)
                .map_err(|e| GatewayError::Validation(format!("unparsable query string: {e}")))?,
            _ => Vec::new(),
        };

        let client_token = pairs
            .iter()
            .find(|(key, _)| key == TOKEN_PARAM)
            .map(|(_, value)| value.as_str());

        authorize(client_token, server_token)?;

        // Client-supplied paths and tokens never survive sanitization.
        let mut forwarded: Vec<(String, String)> = pairs
            .into_iter()
            .filter(|(key, _)| key != USER_DATA_DIR_PARAM && key != TOKEN_PARAM)
            .collect();

        let user_data_id = forwarded
            .iter()
            .find(|(key, _)| key == USER_DATA_ID_PARAM)
            .map(|(_, value)| value.clone())
            .filter(|value| !value.is_empty());

        let user_data_dir = match &user_data_id {
            Some(id) => {
                if !is_valid_user_data_id(id) {
                    return Err(GatewayError::Validation("Invalid user data id".to_string()));
                }
                let dir = user_data_root.join(id).display().to_string();
                forwarded.push((USER_DATA_DIR_PARAM.to_string(), dir.clone()));
                Some(dir)
            }
            None => None,
        };

        if let Some(token) = server_token {
            forwarded.push((TOKEN_PARAM.to_string(), token.to_string()));
        }

        let forwarded = serde_urlencoded::to_string(&forwarded)
            .map_err(|e| GatewayError::Validation(format!("query rebuild failed: {e}")))?;

        Ok(Self {
            user_data_id,
            user_data_dir,
            forwarded,
        })
    }

    /// The query string to attach to the worker handshake.
    pub fn forwarded(&self) -> &str {
        &self.forwarded
    }
}

/// Token check. A configured server token must be matched exactly; without
/// one, any or no client token is accepted.
pub fn authorize(client_token: Option<&str>, server_token: Option<&str>) -> Result<()> {
    match server_token {
        Some(expected) if client_token != Some(expected) => Err(GatewayError::Unauthorized),
        _ => Ok(()),
    }
}

/// Profile ids are limited to lowercase alphanumerics and hyphens, which
/// also rules out any path traversal through the id indirection.
pub fn is_valid_user_data_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn root() -> PathBuf {
        PathBuf::from("/userdata")
    }

    #[test]
    fn uppercase_or_underscore_id_is_rejected() {
        let result = SanitizedQuery::from_query(Some("--user-data-id=My_ID"), None, &root());
        match result {
            Err(GatewayError::Validation(message)) => {
                assert_eq!(message, "Invalid user data id");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_id_computes_the_profile_directory() {
        let query = SanitizedQuery::from_query(Some("--user-data-id=abc-123"), None, &root())
            .expect("sanitizes");

        assert_eq!(query.user_data_id.as_deref(), Some("abc-123"));
        assert_eq!(query.user_data_dir.as_deref(), Some("/userdata/abc-123"));
        assert!(query
            .forwarded()
            .contains("--user-data-dir=%2Fuserdata%2Fabc-123"));
    }

    #[test]
    fn client_supplied_directory_is_always_stripped() {
        let query = SanitizedQuery::from_query(
            Some("--user-data-dir=%2Fetc%2Fpasswd&launch=--headless"),
            None,
            &root(),
        )
        .expect("sanitizes");

        assert!(!query.forwarded().contains("--user-data-dir"));
        assert!(query.forwarded().contains("launch=--headless"));
    }

    #[test]
    fn wrong_token_fails_before_any_dispatch() {
        let result =
            SanitizedQuery::from_query(Some("token=wrong"), Some("secret"), &root());
        assert!(matches!(result, Err(GatewayError::Unauthorized)));
    }

    #[test]
    fn missing_token_fails_when_server_token_is_configured() {
        let result = SanitizedQuery::from_query(None, Some("secret"), &root());
        assert!(matches!(result, Err(GatewayError::Unauthorized)));
    }

    #[test]
    fn matching_token_is_reattached_to_the_forwarded_query() {
        let query = SanitizedQuery::from_query(Some("token=secret"), Some("secret"), &root())
            .expect("authorized");
        assert_eq!(query.forwarded(), "token=secret");
    }

    #[test]
    fn client_token_is_dropped_when_auth_is_disabled() {
        let query = SanitizedQuery::from_query(Some("token=whatever"), None, &root())
            .expect("accepted");
        assert_eq!(query.forwarded(), "");
    }

    #[test]
    fn empty_id_is_treated_as_absent() {
        let query = SanitizedQuery::from_query(Some("--user-data-id="), None, &root())
            .expect("accepted");
        assert_eq!(query.user_data_id, None);
        assert_eq!(query.user_data_dir, None);
    }

    #[test]
    fn id_charset_rules() {
        assert!(is_valid_user_data_id("abc-123"));
        assert!(is_valid_user_data_id("a"));
        assert!(!is_valid_user_data_id("My_ID"));
        assert!(!is_valid_user_data_id("has space"));
        assert!(!is_valid_user_data_id("dots.are.out"));
        assert!(!is_valid_user_data_id("../escape"));
        assert!(!is_valid_user_data_id(""));
    }
}
