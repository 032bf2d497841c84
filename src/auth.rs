//! Resolving the caller's identity.
//!
//! Sessions are issued elsewhere; this module only reads them. A request
//! carries its session id in the `fc_session` cookie, and the id is looked
//! up in the `sessions` table. Unknown or expired sessions are anonymous.

use anyhow::Result;
use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use chrono::Utc;
use sqlx::SqlitePool;

pub const SESSION_COOKIE_NAME: &str = "fc_session";

#[async_trait]
pub trait Auth: Send + Sync {
    /// The authenticated user id, or `None` for anonymous callers.
    async fn current_user_id(&self, headers: &HeaderMap) -> Result<Option<String>>;
}

/// Value of cookie `name` from the `Cookie` headers, if present.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
}

#[derive(Clone)]
pub struct SessionAuth {
    pool: SqlitePool,
}

impl SessionAuth {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Auth for SessionAuth {
    async fn current_user_id(&self, headers: &HeaderMap) -> Result<Option<String>> {
        let Some(session_id) = cookie_value(headers, SESSION_COOKIE_NAME) else {
            return Ok(None);
        };

        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT user_id, expires_at FROM sessions WHERE id = ?")
                .bind(&session_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(user_id, expires_at)| {
            (expires_at >= Utc::now().timestamp()).then_some(user_id)
        }))
    }
}
