//! # 블록 설정 쿼리
//!
//! `block_settings` 테이블은 블록당 최대 한 행입니다.
//! 역할 목록은 JSON 배열 문자열, 값이 NULL이면 "오버라이드 없음"입니다.

use crate::error::AppError;
use crate::models::BlockSettingsRow;
use sqlx::{SqliteConnection, SqlitePool};

pub async fn get_settings_row(
    pool: &SqlitePool,
    block_id: &str,
) -> Result<Option<BlockSettingsRow>, AppError> {
    let row = sqlx::query_as::<_, BlockSettingsRow>(
        r#"
        SELECT merge_permissions, browse_permissions, suggest_permissions, require_login_browse
        FROM block_settings
        WHERE block_id = ?
        "#,
    )
    .bind(block_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// 설정 행을 만들거나 부분 갱신합니다.
///
/// `None`으로 넘긴 컬럼은 기존 값을 유지합니다 (COALESCE).
/// 행이 없으면 넘긴 값만 채워진 새 행이 생깁니다.
pub async fn upsert_settings(
    pool: &SqlitePool,
    block_id: &str,
    merge_permissions: Option<&str>,
    browse_permissions: Option<&str>,
    suggest_permissions: Option<&str>,
    require_login_browse: Option<bool>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO block_settings
            (block_id, merge_permissions, browse_permissions, suggest_permissions, require_login_browse)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(block_id) DO UPDATE SET
            merge_permissions = COALESCE(excluded.merge_permissions, block_settings.merge_permissions),
            browse_permissions = COALESCE(excluded.browse_permissions, block_settings.browse_permissions),
            suggest_permissions = COALESCE(excluded.suggest_permissions, block_settings.suggest_permissions),
            require_login_browse = COALESCE(excluded.require_login_browse, block_settings.require_login_browse),
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        "#,
    )
    .bind(block_id)
    .bind(merge_permissions)
    .bind(browse_permissions)
    .bind(suggest_permissions)
    .bind(require_login_browse)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_settings(conn: &mut SqliteConnection, block_id: &str) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM block_settings WHERE block_id = ?")
        .bind(block_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}
