//! # 블록 설정 라우트 핸들러
//!
//! - `GET /api/v1/blocks/{block_id}/settings` → 유효 설정 (인증 불필요)
//! - `PUT /api/v1/blocks/{block_id}/settings` → 부분 갱신 (편집자 역할)

use super::blocks::{require_login, AppState};
use crate::{
    error::AppError,
    middleware::{auth::MaybeAuthUser, nonce},
    models::{ResolvedSettings, SettingsPatch},
    services::{content, permissions::PermissionResolver},
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

pub async fn get_block_settings(
    State(state): State<AppState>,
    Path(block_id): Path<String>,
) -> Result<Json<ResolvedSettings>, AppError> {
    content::validate_block_id(&block_id)?;
    let settings = state.settings.get_settings(&block_id).await?;
    Ok(Json(settings))
}

/// 요청에 포함된 필드만 갱신합니다. 알 수 없는 역할 이름은 조용히 버려집니다.
pub async fn save_block_settings(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    headers: HeaderMap,
    Path(block_id): Path<String>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Value>, AppError> {
    nonce::verify_nonce(&headers, &state.jwt_secret, nonce::SAVE_SETTINGS, actor.as_ref())?;
    let user = require_login(actor)?;
    content::validate_block_id(&block_id)?;
    if !PermissionResolver::has_any_role(&user, &state.config.editor_roles) {
        return Err(AppError::Forbidden);
    }

    state.settings.save_settings(&block_id, patch).await?;
    Ok(Json(json!({ "success": true })))
}
