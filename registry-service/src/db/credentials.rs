use chrono::Utc;
use service_core::error::AppError;
use sqlx::SqliteConnection;

use crate::models::Credential;

pub async fn find_for_identity(
    conn: &mut SqliteConnection,
    identity_id: i64,
) -> Result<Option<Credential>, AppError> {
    Ok(
        sqlx::query_as::<_, Credential>("SELECT * FROM credentials WHERE identity_id = ?")
            .bind(identity_id)
            .fetch_optional(conn)
            .await?,
    )
}

pub async fn insert(
    conn: &mut SqliteConnection,
    identity_id: i64,
    password_hash: &str,
    one_time_password: bool,
) -> Result<(), AppError> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO credentials (identity_id, password_hash, one_time_password, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(identity_id)
    .bind(password_hash)
    .bind(one_time_password)
    .bind(now)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update(
    conn: &mut SqliteConnection,
    identity_id: i64,
    password_hash: &str,
    one_time_password: bool,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE credentials SET password_hash = ?, one_time_password = ?, updated_at = ?
        WHERE identity_id = ?
        "#,
    )
    .bind(password_hash)
    .bind(one_time_password)
    .bind(Utc::now())
    .bind(identity_id)
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("credential"));
    }
    Ok(())
}
