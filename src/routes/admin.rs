//! # 관리자 라우트 핸들러
//!
//! 모든 엔드포인트는 `admin` nonce와 관리자 역할을 요구합니다.
//!
//! - `GET    /api/v1/admin/stats`             → 집계 통계 (2분 캐시)
//! - `POST   /api/v1/admin/cleanup/versions`  → 현재 버전 없는 블록 정리
//! - `POST   /api/v1/admin/cleanup/orphans`   → 고아 블록 정리
//! - `POST   /api/v1/admin/cleanup/activity`  → 보존 정책에 따른 이력 정리
//! - `DELETE /api/v1/posts/{post_id}/blocks`  → 삭제된 문서의 블록 데이터 정리

use super::blocks::{require_login, AppState};
use crate::{
    db,
    error::AppError,
    middleware::{
        auth::{AuthUser, MaybeAuthUser},
        nonce,
    },
    models::{AdminStats, CleanupReport},
    services::permissions::PermissionResolver,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

const STATS_KEY: &str = "admin";

fn require_admin(
    state: &AppState,
    headers: &HeaderMap,
    actor: Option<AuthUser>,
) -> Result<AuthUser, AppError> {
    nonce::verify_nonce(headers, &state.jwt_secret, nonce::ADMIN, actor.as_ref())?;
    let user = require_login(actor)?;
    if !PermissionResolver::has_any_role(&user, &state.config.admin_roles) {
        return Err(AppError::Forbidden);
    }
    Ok(user)
}

fn cleanup_response(report: CleanupReport, what: &str) -> Json<Value> {
    Json(json!({
        "deleted_versions": report.deleted_versions,
        "deleted_settings": report.deleted_settings,
        "message": format!("Deleted {} {}", report.deleted_versions, what),
    }))
}

pub async fn get_stats(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    headers: HeaderMap,
) -> Result<Json<AdminStats>, AppError> {
    require_admin(&state, &headers, actor)?;

    if let Some(stats) = state.stats_cache.get(STATS_KEY).await {
        return Ok(Json(stats));
    }
    let ticket = state.stats_cache.ticket().await;
    let stats = db::admin_stats(&state.pool).await?;
    state.stats_cache.insert(STATS_KEY, stats.clone(), ticket).await;
    Ok(Json(stats))
}

pub async fn cleanup_versions(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers, actor)?;
    let result = state.retention.prune_dangling().await;
    state.stats_cache.clear().await;
    Ok(cleanup_response(result?, "unmerged versions"))
}

pub async fn cleanup_orphans(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers, actor)?;
    let result = state.retention.prune_orphans().await;
    state.stats_cache.clear().await;
    Ok(cleanup_response(result?, "orphaned versions"))
}

pub async fn cleanup_activity(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers, actor)?;
    let result = state.retention.prune_history().await;
    state.stats_cache.clear().await;
    Ok(cleanup_response(result?, "old versions"))
}

/// 호스트 CMS가 문서를 삭제한 뒤 호출합니다.
pub async fn cleanup_post(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    headers: HeaderMap,
    Path(post_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers, actor)?;
    let result = state.retention.cleanup_post(post_id).await;
    state.stats_cache.clear().await;

    match result? {
        Some(report) => Ok(cleanup_response(report, "versions")),
        None => Ok(Json(json!({
            "deleted_versions": 0,
            "deleted_settings": 0,
            "message": "Cleanup on delete is disabled",
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewVersion;
    use crate::routes::blocks::tests::{actor, nonce_for, test_state};

    async fn seed(state: &AppState, block_id: &str, post_id: Option<i64>) {
        state
            .versions
            .insert_version(NewVersion {
                block_id,
                content: "<p>x</p>",
                author_id: "9",
                change_summary: None,
                post_id,
            })
            .await
            .unwrap();
    }

    fn admin_call(user: &AuthUser) -> (MaybeAuthUser, HeaderMap) {
        (
            MaybeAuthUser(Some(user.clone())),
            nonce_for(nonce::ADMIN, Some(user)),
        )
    }

    #[tokio::test]
    async fn only_administrators_get_in() {
        let state = test_state().await;
        let editor = actor("1", "editor");
        let (who, headers) = admin_call(&editor);
        assert!(matches!(
            get_stats(State(state.clone()), who, headers).await,
            Err(AppError::Forbidden)
        ));

        let admin = actor("2", "administrator");
        assert!(matches!(
            get_stats(
                State(state.clone()),
                MaybeAuthUser(Some(admin.clone())),
                nonce_for(nonce::MERGE_VERSION, Some(&admin)),
            )
            .await,
            Err(AppError::InvalidNonce)
        ));
    }

    #[tokio::test]
    async fn stats_are_cached_until_cleanup() {
        let state = test_state().await;
        let admin = actor("2", "administrator");
        seed(&state, "faq-1", Some(1)).await;

        let (who, headers) = admin_call(&admin);
        let Json(stats) = get_stats(State(state.clone()), who, headers).await.unwrap();
        assert_eq!(stats.total_versions, 1);
        assert_eq!(stats.recent_activity.len(), 1);

        seed(&state, "faq-2", Some(1)).await;
        let (who, headers) = admin_call(&admin);
        let Json(cached) = get_stats(State(state.clone()), who, headers).await.unwrap();
        assert_eq!(cached.total_versions, 1);

        // 문서 1이 없으므로 두 블록 모두 고아
        let (who, headers) = admin_call(&admin);
        let Json(body) = cleanup_orphans(State(state.clone()), who, headers).await.unwrap();
        assert_eq!(body["deleted_versions"], 2);

        let (who, headers) = admin_call(&admin);
        let Json(fresh) = get_stats(State(state.clone()), who, headers).await.unwrap();
        assert_eq!(fresh.total_versions, 0);
    }

    #[tokio::test]
    async fn cleanup_endpoints_report_counts() {
        let state = test_state().await;
        let admin = actor("2", "administrator");
        seed(&state, "faq-1", Some(4)).await;
        seed(&state, "faq-1", Some(4)).await;
        seed(&state, "faq-2", Some(5)).await;

        let (who, headers) = admin_call(&admin);
        let Json(body) = cleanup_versions(State(state.clone()), who, headers).await.unwrap();
        assert_eq!(body["deleted_versions"], 0);

        let (who, headers) = admin_call(&admin);
        let Json(body) = cleanup_activity(State(state.clone()), who, headers).await.unwrap();
        assert_eq!(body["deleted_versions"], 0);

        let (who, headers) = admin_call(&admin);
        let Json(body) = cleanup_post(State(state.clone()), who, headers, Path(4)).await.unwrap();
        assert_eq!(body["deleted_versions"], 2);
        assert_eq!(body["message"], "Deleted 2 versions");
        assert_eq!(state.versions.list_versions("faq-2").await.unwrap().len(), 1);
    }
}
