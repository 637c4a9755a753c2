use crate::error::AppError;
use crate::models::{BlockVersion, NewVersion};
use sqlx::SqlitePool;

/// 새 버전을 기록합니다.
///
/// 번호 발급, "첫 버전인가" 판단, INSERT를 하나의 트랜잭션으로 묶습니다.
/// 트랜잭션의 첫 문장이 쓰기이므로 같은 블록에 대한 동시 삽입은 직렬화됩니다.
pub async fn insert_version(
    pool: &SqlitePool,
    new: &NewVersion<'_>,
    content_hash: &str,
) -> Result<BlockVersion, AppError> {
    let mut tx = pool.begin().await?;

    // 카운터는 삭제되지 않으므로 정리된 버전의 번호가 다시 쓰이지 않는다
    let version_number: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO block_version_counters (block_id, last_number)
        VALUES (?, COALESCE((SELECT MAX(version_number) FROM block_versions WHERE block_id = ?), 0) + 1)
        ON CONFLICT(block_id) DO UPDATE
            SET last_number = MAX(block_version_counters.last_number + 1, excluded.last_number)
        RETURNING last_number
        "#,
    )
    .bind(new.block_id)
    .bind(new.block_id)
    .fetch_one(&mut *tx)
    .await?;

    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM block_versions WHERE block_id = ?")
            .bind(new.block_id)
            .fetch_one(&mut *tx)
            .await?;

    let version = sqlx::query_as::<_, BlockVersion>(
        r#"
        INSERT INTO block_versions
            (block_id, post_id, content, content_hash, author_id, version_number, is_current, change_summary)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id, block_id, post_id, content, content_hash, author_id, version_number,
                  is_current, change_summary, created_at
        "#,
    )
    .bind(new.block_id)
    .bind(new.post_id)
    .bind(new.content)
    .bind(content_hash)
    .bind(new.author_id)
    .bind(version_number)
    .bind(existing == 0)
    .bind(new.change_summary)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(version)
}

pub async fn list_versions(
    pool: &SqlitePool,
    block_id: &str,
) -> Result<Vec<BlockVersion>, AppError> {
    let versions = sqlx::query_as::<_, BlockVersion>(
        r#"
        SELECT id, block_id, post_id, content, content_hash, author_id, version_number,
               is_current, change_summary, created_at
        FROM block_versions
        WHERE block_id = ?
        ORDER BY version_number DESC
        "#,
    )
    .bind(block_id)
    .fetch_all(pool)
    .await?;

    Ok(versions)
}

pub async fn get_current_version(
    pool: &SqlitePool,
    block_id: &str,
) -> Result<Option<BlockVersion>, AppError> {
    let version = sqlx::query_as::<_, BlockVersion>(
        r#"
        SELECT id, block_id, post_id, content, content_hash, author_id, version_number,
               is_current, change_summary, created_at
        FROM block_versions
        WHERE block_id = ? AND is_current = 1
        "#,
    )
    .bind(block_id)
    .fetch_optional(pool)
    .await?;

    Ok(version)
}

pub async fn get_version(
    pool: &SqlitePool,
    version_id: i64,
) -> Result<Option<BlockVersion>, AppError> {
    let version = sqlx::query_as::<_, BlockVersion>(
        r#"
        SELECT id, block_id, post_id, content, content_hash, author_id, version_number,
               is_current, change_summary, created_at
        FROM block_versions
        WHERE id = ?
        "#,
    )
    .bind(version_id)
    .fetch_optional(pool)
    .await?;

    Ok(version)
}

/// 지정한 버전을 현재 버전으로 승격합니다.
///
/// 같은 블록의 현재 표시를 지우고 대상에 표시하는 두 단계를 한 트랜잭션에서 수행하므로
/// 다른 요청에서는 현재 버전이 0개나 2개인 순간이 보이지 않습니다.
/// 대상이 없으면 `None`, 성공하면 대상의 block_id를 반환합니다.
pub async fn merge_version(
    pool: &SqlitePool,
    version_id: i64,
) -> Result<Option<String>, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE block_versions SET is_current = 0
        WHERE is_current = 1
        AND block_id = (SELECT block_id FROM block_versions WHERE id = ?)
        "#,
    )
    .bind(version_id)
    .execute(&mut *tx)
    .await?;

    let block_id: Option<String> = sqlx::query_scalar(
        "UPDATE block_versions SET is_current = 1 WHERE id = ? RETURNING block_id",
    )
    .bind(version_id)
    .fetch_optional(&mut *tx)
    .await?;

    match block_id {
        Some(block_id) => {
            tx.commit().await?;
            Ok(Some(block_id))
        }
        None => {
            tx.rollback().await?;
            Ok(None)
        }
    }
}

/// 정규화 해시가 같은 버전 중 가장 최근 것을 찾습니다.
pub async fn find_version_by_hash(
    pool: &SqlitePool,
    block_id: &str,
    content_hash: &str,
) -> Result<Option<i64>, AppError> {
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT id FROM block_versions
        WHERE block_id = ? AND content_hash = ?
        ORDER BY version_number DESC
        LIMIT 1
        "#,
    )
    .bind(block_id)
    .bind(content_hash)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

/// 블록의 가장 최근 버전이 가리키는 post_id (NULL은 건너뜀)
pub async fn latest_post_id(pool: &SqlitePool, block_id: &str) -> Result<Option<i64>, AppError> {
    let post_id: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT post_id FROM block_versions
        WHERE block_id = ? AND post_id IS NOT NULL
        ORDER BY version_number DESC
        LIMIT 1
        "#,
    )
    .bind(block_id)
    .fetch_optional(pool)
    .await?;

    Ok(post_id)
}
