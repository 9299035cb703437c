use chrono::Utc;
use service_core::error::AppError;
use sqlx::SqliteConnection;

use crate::models::{PasswordPolicy, Settings};

pub async fn find(conn: &mut SqliteConnection) -> Result<Option<Settings>, AppError> {
    Ok(sqlx::query_as::<_, Settings>("SELECT * FROM settings WHERE id = 1")
        .fetch_optional(conn)
        .await?)
}

pub async fn get(conn: &mut SqliteConnection) -> Result<Settings, AppError> {
    find(conn)
        .await?
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("settings are not initialised")))
}

pub async fn insert(
    conn: &mut SqliteConnection,
    private_key: &str,
    public_jwk: &str,
    policy: &PasswordPolicy,
) -> Result<(), AppError> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO settings
            (id, private_key, public_jwk, length_min, lowercase_min, uppercase_min,
             number_min, symbol_min, setup_required, created_at, updated_at)
        VALUES (1, ?, ?, ?, ?, ?, ?, ?, TRUE, ?, ?)
        "#,
    )
    .bind(private_key)
    .bind(public_jwk)
    .bind(policy.length_min as i64)
    .bind(policy.lowercase_min as i64)
    .bind(policy.uppercase_min as i64)
    .bind(policy.number_min as i64)
    .bind(policy.symbol_min as i64)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update_policy(
    conn: &mut SqliteConnection,
    policy: &PasswordPolicy,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE settings SET length_min = ?, lowercase_min = ?, uppercase_min = ?,
            number_min = ?, symbol_min = ?, updated_at = ?
        WHERE id = 1
        "#,
    )
    .bind(policy.length_min as i64)
    .bind(policy.lowercase_min as i64)
    .bind(policy.uppercase_min as i64)
    .bind(policy.number_min as i64)
    .bind(policy.symbol_min as i64)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

/// Clear the setup flag. Returns false when it was already cleared, so two
/// racing setup calls cannot both succeed.
pub async fn clear_setup_required(conn: &mut SqliteConnection) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE settings SET setup_required = FALSE, updated_at = ? WHERE id = 1 AND setup_required = TRUE",
    )
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
