use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Session;
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn resolve_session(
    conn: &Connection,
    headers: &HeaderMap,
    state: &AppState,
) -> Result<Session, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized)?;
    queries::get_session(conn, token, state.now_utc())?.ok_or(AppError::Unauthorized)
}

/// Resolves the caller's session, taking the database lock only briefly.
pub fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<Session, AppError> {
    let conn = state.db()?;
    resolve_session(&conn, headers, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert("authorization", HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
