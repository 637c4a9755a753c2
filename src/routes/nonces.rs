use super::blocks::AppState;
use crate::{
    error::AppError,
    middleware::{auth::MaybeAuthUser, nonce},
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

/// `GET /nonces/{action}`: 요청자에 묶인 위조 방지 토큰을 발급합니다.
///
/// 익명 요청자도 받을 수 있지만, 그 토큰은 익명 요청에서만 통과합니다.
pub async fn issue_nonce(
    State(state): State<AppState>,
    MaybeAuthUser(actor): MaybeAuthUser,
    Path(action): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !nonce::ACTIONS.contains(&action.as_str()) {
        return Err(AppError::BadRequest(format!("Unknown action: {action}")));
    }

    let token = nonce::create_nonce(&state.jwt_secret, &action, actor.as_ref())?;
    Ok(Json(json!({
        "action": action,
        "header": nonce::NONCE_HEADER,
        "nonce": token,
    })))
}
