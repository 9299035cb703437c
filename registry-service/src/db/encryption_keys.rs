use chrono::Utc;
use service_core::error::AppError;
use sqlx::SqliteConnection;

use crate::models::EncryptionKey;

pub async fn find_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<EncryptionKey>, AppError> {
    Ok(
        sqlx::query_as::<_, EncryptionKey>("SELECT * FROM encryption_keys WHERE name = ?")
            .bind(name)
            .fetch_optional(conn)
            .await?,
    )
}

pub async fn insert(
    conn: &mut SqliteConnection,
    name: &str,
    encrypted: &[u8],
    algorithm: &str,
    root_key_id: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO encryption_keys (name, encrypted, algorithm, root_key_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(encrypted)
    .bind(algorithm)
    .bind(root_key_id)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}
