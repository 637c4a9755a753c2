use crate::error::AppError;
use crate::models::{ActivityEntry, AdminStats};
use sqlx::SqlitePool;

/// 최근 활동 목록에 포함할 버전 수
const RECENT_ACTIVITY_LIMIT: i64 = 5;

/// 관리자 대시보드용 집계
pub async fn admin_stats(pool: &SqlitePool) -> Result<AdminStats, AppError> {
    let (total_versions, total_blocks, total_users) = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT COUNT(*), COUNT(DISTINCT block_id), COUNT(DISTINCT author_id)
        FROM block_versions
        "#,
    )
    .fetch_one(pool)
    .await?;

    let recent_activity = sqlx::query_as::<_, ActivityEntry>(
        r#"
        SELECT id, block_id, post_id, author_id, version_number, change_summary, created_at
        FROM block_versions
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(RECENT_ACTIVITY_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(AdminStats {
        total_versions,
        total_blocks,
        total_users,
        recent_activity,
    })
}
