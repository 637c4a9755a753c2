//! # 보존/정리 쿼리
//!
//! 정리 엔진(services::retention)이 블록 단위 트랜잭션 안에서 호출하는 삭제 쿼리들입니다.
//! 삭제 함수는 `&mut SqliteConnection`을 받아 호출자의 트랜잭션에 참여합니다.

use crate::error::AppError;
use sqlx::{SqliteConnection, SqlitePool};

/// 버전이 하나라도 있는 모든 block_id
pub async fn list_block_ids(pool: &SqlitePool) -> Result<Vec<String>, AppError> {
    let ids = sqlx::query_scalar("SELECT DISTINCT block_id FROM block_versions ORDER BY block_id")
        .fetch_all(pool)
        .await?;

    Ok(ids)
}

/// 현재 버전이 하나도 없는 block_id
pub async fn block_ids_without_current(pool: &SqlitePool) -> Result<Vec<String>, AppError> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT block_id FROM block_versions
        GROUP BY block_id
        HAVING SUM(is_current) = 0
        ORDER BY block_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// (block_id, post_id) 쌍 전체. post_id가 NULL인 버전도 포함합니다.
pub async fn block_post_refs(pool: &SqlitePool) -> Result<Vec<(String, Option<i64>)>, AppError> {
    let refs = sqlx::query_as::<_, (String, Option<i64>)>(
        "SELECT DISTINCT block_id, post_id FROM block_versions ORDER BY block_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(refs)
}

/// 특정 문서를 참조하는 버전을 가진 block_id
pub async fn block_ids_for_post(pool: &SqlitePool, post_id: i64) -> Result<Vec<String>, AppError> {
    let ids = sqlx::query_scalar(
        "SELECT DISTINCT block_id FROM block_versions WHERE post_id = ? ORDER BY block_id",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

pub async fn delete_block_versions(
    conn: &mut SqliteConnection,
    block_id: &str,
) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM block_versions WHERE block_id = ?")
        .bind(block_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// 현재 버전이 없을 때만 블록의 버전을 모두 삭제합니다.
///
/// 판정과 삭제가 한 문장이므로 목록을 뽑은 뒤 병합된 블록은 건드리지 않습니다.
pub async fn delete_dangling_block(
    conn: &mut SqliteConnection,
    block_id: &str,
) -> Result<u64, AppError> {
    let result = sqlx::query(
        r#"
        DELETE FROM block_versions
        WHERE block_id = ?
        AND NOT EXISTS (
            SELECT 1 FROM block_versions WHERE block_id = ? AND is_current = 1
        )
        "#,
    )
    .bind(block_id)
    .bind(block_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// 블록의 버전들이 가리키는 post_id 집합 (정렬됨, NULL 먼저)
pub async fn block_post_ids(
    conn: &mut SqliteConnection,
    block_id: &str,
) -> Result<Vec<Option<i64>>, AppError> {
    let post_ids = sqlx::query_scalar(
        "SELECT DISTINCT post_id FROM block_versions WHERE block_id = ? ORDER BY post_id",
    )
    .bind(block_id)
    .fetch_all(conn)
    .await?;

    Ok(post_ids)
}

pub async fn delete_post_versions(
    conn: &mut SqliteConnection,
    post_id: i64,
) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM block_versions WHERE post_id = ?")
        .bind(post_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// 블록 하나의 이력을 줄입니다. 현재 버전은 건드리지 않습니다.
///
/// 비현재 버전 중 `cutoff` 이전에 만들어졌거나,
/// 최신 `keep_recent`개에 들지 못한 것을 삭제합니다.
pub async fn prune_block_history(
    conn: &mut SqliteConnection,
    block_id: &str,
    keep_recent: u32,
    cutoff: &str,
) -> Result<u64, AppError> {
    let result = sqlx::query(
        r#"
        DELETE FROM block_versions
        WHERE block_id = ? AND is_current = 0
        AND (
            created_at <= ?
            OR id NOT IN (
                SELECT id FROM block_versions
                WHERE block_id = ? AND is_current = 0
                ORDER BY version_number DESC
                LIMIT ?
            )
        )
        "#,
    )
    .bind(block_id)
    .bind(cutoff)
    .bind(block_id)
    .bind(i64::from(keep_recent))
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_version, merge_version, test_pool};
    use crate::models::NewVersion;

    async fn add(pool: &SqlitePool, block_id: &str, content: &str, post_id: Option<i64>) -> i64 {
        let new = NewVersion {
            block_id,
            content,
            author_id: "u1",
            change_summary: None,
            post_id,
        };
        insert_version(pool, &new, content).await.unwrap().id
    }

    #[tokio::test]
    async fn dangling_delete_spares_block_merged_after_listing() {
        let pool = test_pool().await;
        add(&pool, "faq-1", "<p>a</p>", Some(1)).await;
        let v2 = add(&pool, "faq-1", "<p>b</p>", Some(1)).await;
        sqlx::query("UPDATE block_versions SET is_current = 0 WHERE block_id = 'faq-1'")
            .execute(&pool)
            .await
            .unwrap();

        let listed = block_ids_without_current(&pool).await.unwrap();
        assert_eq!(listed, vec!["faq-1".to_string()]);

        // 목록을 뽑은 뒤 검토자가 병합
        merge_version(&pool, v2).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        assert_eq!(delete_dangling_block(&mut tx, "faq-1").await.unwrap(), 0);
        tx.commit().await.unwrap();

        let currents: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM block_versions WHERE block_id = 'faq-1' AND is_current = 1",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(currents, 1);
    }

    #[tokio::test]
    async fn dangling_delete_removes_block_without_current() {
        let pool = test_pool().await;
        add(&pool, "faq-1", "<p>a</p>", Some(1)).await;
        add(&pool, "faq-1", "<p>b</p>", Some(1)).await;
        sqlx::query("UPDATE block_versions SET is_current = 0")
            .execute(&pool)
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(delete_dangling_block(&mut conn, "faq-1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn post_ids_are_sorted_with_null_first() {
        let pool = test_pool().await;
        add(&pool, "faq-1", "<p>a</p>", Some(3)).await;
        add(&pool, "faq-1", "<p>b</p>", None).await;
        add(&pool, "faq-1", "<p>c</p>", Some(1)).await;
        add(&pool, "faq-1", "<p>d</p>", Some(3)).await;

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(
            block_post_ids(&mut conn, "faq-1").await.unwrap(),
            vec![None, Some(1), Some(3)]
        );
    }
}
