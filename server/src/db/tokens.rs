//! Session token lookups.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// The user a live token belongs to, if any.
pub async fn find_token_owner(
    pool: &PgPool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT user_id FROM auth_tokens
        WHERE token = $1 AND (expires_at IS NULL OR expires_at > $2)
        "#,
    )
    .bind(token)
    .bind(now)
    .fetch_optional(pool)
    .await
}
