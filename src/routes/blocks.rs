//! # 블록 버전 라우트 핸들러
//!
//! ## 엔드포인트
//! - `POST /api/v1/blocks/{block_id}/versions` → 변경 제안 (새 비현재 버전)
//! - `GET  /api/v1/blocks/{block_id}/versions` → 버전 목록 + 병합 가능 여부
//! - `POST /api/v1/blocks/{block_id}/merge`    → 버전 병합
//! - `GET  /api/v1/blocks/{block_id}/current`  → 현재 버전 콘텐츠 (로그인 필요)
//! - `POST /api/v1/posts/{post_id}/blocks`     → 구조화 편집기 저장 (블록 일괄)
//!
//! ## 검사 순서
//! 상태를 바꾸는 핸들러는 항상 같은 순서로 거부합니다.
//! 1. 위조 방지 토큰(nonce) → 403 "Security check failed"
//! 2. 로그인 여부 → 401
//! 3. block_id 형식 → 400
//! 4. 권한 → 403 "Permission denied"
//!
//! 로그인 검사를 nonce 뒤에 두기 위해 `AuthUser` 대신 `MaybeAuthUser`를 받습니다.

use crate::{
    config::GlobalConfig,
    db::SqliteDocuments,
    error::AppError,
    middleware::{
        auth::{AuthUser, MaybeAuthUser},
        nonce,
    },
    models::*,
    services::{
        cache::TtlCache,
        content::{self, BasicSanitizer},
        permissions::PermissionResolver,
        reconcile::{Edit, EditOutcome, EditPathway, Reconciler},
        retention::RetentionEngine,
        settings_store::SettingsStore,
        version_store::VersionStore,
    },
};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// 관리자 통계 캐시 수명
const STATS_CACHE_TTL: Duration = Duration::from_secs(120);

/// 애플리케이션 공유 상태
///
/// 모든 컴포넌트는 시작 시 한 번 만들어지고, 핸들러는 `State(state): State<AppState>`로 접근합니다.
/// 각 필드는 내부적으로 Arc를 공유하므로 clone해도 캐시와 풀은 하나입니다.
#[derive(Clone)]
pub struct AppState {
    /// SQLite 연결 풀
    pub pool: SqlitePool,
    /// 액세스 토큰 검증, nonce 서명용 비밀키
    pub jwt_secret: String,
    pub config: Arc<GlobalConfig>,
    pub versions: VersionStore,
    pub settings: SettingsStore,
    pub permissions: PermissionResolver,
    pub reconciler: Reconciler,
    pub retention: RetentionEngine<SqliteDocuments>,
    pub stats_cache: Arc<TtlCache<AdminStats>>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt_secret: String, config: GlobalConfig) -> Self {
        let config = Arc::new(config);
        let cache_ttl = Duration::from_secs(config.cache_ttl_secs);

        let versions = VersionStore::new(pool.clone(), Arc::new(BasicSanitizer), cache_ttl);
        let settings = SettingsStore::new(pool.clone(), config.clone(), cache_ttl);
        let permissions = PermissionResolver::new(settings.clone());
        let stale_window = chrono::Duration::seconds(i64::from(
            u32::try_from(config.stale_write_window_secs).unwrap_or(u32::MAX),
        ));
        let reconciler = Reconciler::new(versions.clone(), stale_window);
        let retention = RetentionEngine::new(
            versions.clone(),
            settings.clone(),
            SqliteDocuments::new(pool.clone()),
            config.clone(),
        );

        Self {
            pool,
            jwt_secret,
            config,
            versions,
            settings,
            permissions,
            reconciler,
            retention,
            stats_cache: Arc::new(TtlCache::new(STATS_CACHE_TTL)),
        }
    }
}

/// 로그인하지 않은 요청을 401로 거부합니다.
pub(crate) fn require_login(actor: Option<AuthUser>) -> Result<AuthUser, AppError> {
    actor.ok_or_else(|| AppError::Unauthorized("You must be logged in".to_string()))
}

/// `POST /blocks/{block_id}/versions`: 변경을 제안합니다.
///
/// 새 버전은 현재 버전이 아닙니다 (블록의 첫 버전만 예외).
/// `post_id`가 없으면 블록의 가장 최근 버전이 가리키던 문서를 이어받습니다.
pub async fn suggest_change(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    headers: HeaderMap,
    Path(block_id): Path<String>,
    Json(req): Json<SuggestChangeRequest>,
) -> Result<(StatusCode, Json<BlockVersion>), AppError> {
    nonce::verify_nonce(&headers, &state.jwt_secret, nonce::SUGGEST_CHANGE, actor.as_ref())?;
    let user = require_login(actor)?;
    content::validate_block_id(&block_id)?;
    content::validate_content(&req.content)?;
    if !state.permissions.can_suggest(&block_id, Some(&user)).await? {
        return Err(AppError::Forbidden);
    }

    let post_id = match req.post_id {
        Some(post_id) => Some(post_id),
        None => state.versions.latest_post_id(&block_id).await?,
    };

    let outcome = state
        .reconciler
        .record(
            EditPathway::Suggestion,
            Edit {
                block_id: &block_id,
                content: &req.content,
                author_id: &user.user_id,
                change_summary: req.change_summary.as_deref(),
                post_id,
            },
        )
        .await?;

    match outcome {
        EditOutcome::Suggested(version) => Ok((StatusCode::CREATED, Json(version))),
        other => Err(AppError::Internal(format!(
            "unexpected suggestion outcome: {other:?}"
        ))),
    }
}

/// `GET /blocks/{block_id}/versions`: 버전 목록 (최신 번호 먼저)
///
/// 응답의 `can_merge`는 요청자가 이 블록에서 병합할 수 있는지 알려줍니다.
pub async fn list_versions(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    Path(block_id): Path<String>,
) -> Result<Json<VersionListResponse>, AppError> {
    content::validate_block_id(&block_id)?;
    if !state.permissions.can_browse(&block_id, actor.as_ref()).await? {
        return Err(AppError::Forbidden);
    }

    let versions = state.versions.list_versions(&block_id).await?;
    let can_merge = state.permissions.can_merge(&block_id, actor.as_ref()).await?;

    Ok(Json(VersionListResponse {
        versions,
        can_merge,
    }))
}

/// `POST /blocks/{block_id}/merge`: 버전을 현재 버전으로 승격합니다.
///
/// 권한은 경로의 블록 기준으로 판정하므로, 다른 블록의 버전은 찾을 수 없는 것으로 취급합니다.
pub async fn merge_version(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    headers: HeaderMap,
    Path(block_id): Path<String>,
    Json(req): Json<MergeVersionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    nonce::verify_nonce(&headers, &state.jwt_secret, nonce::MERGE_VERSION, actor.as_ref())?;
    let user = require_login(actor)?;
    content::validate_block_id(&block_id)?;
    if !state.permissions.can_merge(&block_id, Some(&user)).await? {
        return Err(AppError::Forbidden);
    }

    let version = state
        .versions
        .get_version(req.version_id)
        .await?
        .filter(|version| version.block_id == block_id)
        .ok_or(AppError::NotFound)?;

    if !state.versions.merge_version(version.id).await? {
        return Err(AppError::NotFound);
    }

    Ok(Json(serde_json::json!({ "success": true })))
}

/// `GET /blocks/{block_id}/current`: 현재 버전의 원본 콘텐츠
pub async fn get_current_content(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(block_id): Path<String>,
) -> Result<Json<CurrentContent>, AppError> {
    content::validate_block_id(&block_id)?;
    let current = state
        .versions
        .get_current_version(&block_id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(CurrentContent {
        content: current.content,
    }))
}

/// `POST /posts/{post_id}/blocks`: 구조화 편집기가 저장한 문서의 블록들을 기록합니다.
///
/// 블록마다 독립적으로 조정하며, 개별 블록의 실패는 응답에 드러나지 않습니다.
/// id가 비었거나 내용이 공백뿐인 블록은 건너뜁니다.
pub async fn structured_save(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    headers: HeaderMap,
    Path(post_id): Path<i64>,
    Json(req): Json<StructuredSaveRequest>,
) -> Result<StatusCode, AppError> {
    nonce::verify_nonce(&headers, &state.jwt_secret, nonce::STRUCTURED_SAVE, actor.as_ref())?;
    let user = require_login(actor)?;
    if !PermissionResolver::has_any_role(&user, &state.config.editor_roles) {
        return Err(AppError::Forbidden);
    }

    for block in &req.blocks {
        if block.block_id.is_empty() || block.content.trim().is_empty() {
            continue;
        }
        let decoded = content::decode_block_content(&block.content);
        let edit = Edit {
            block_id: &block.block_id,
            content: &decoded,
            author_id: &user.user_id,
            change_summary: None,
            post_id: Some(post_id),
        };
        match state.reconciler.record(EditPathway::Structured, edit).await {
            Ok(outcome) => {
                tracing::debug!(block_id = %block.block_id, ?outcome, "Reconciled block")
            }
            Err(e) => tracing::warn!(block_id = %block.block_id, "Block save failed: {}", e),
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
