//! # 위조 방지 토큰(nonce)
//!
//! 상태를 바꾸는 모든 요청은 `X-WB-Nonce` 헤더에 작업 이름과 요청자에 묶인 토큰을 실어야 합니다.
//! 토큰은 액세스 토큰 비밀키에서 유도한 별도 키로 서명한 JWT이며,
//! 다른 작업이나 다른 사용자의 토큰은 통과하지 못합니다.
//!
//! 검사는 로그인/권한 검사보다 먼저 수행합니다.

use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::middleware::auth::AuthUser;

pub const NONCE_HEADER: &str = "x-wb-nonce";

pub const SUGGEST_CHANGE: &str = "suggest_change";
pub const MERGE_VERSION: &str = "merge_version";
pub const SAVE_SETTINGS: &str = "save_settings";
pub const STRUCTURED_SAVE: &str = "structured_save";
pub const ADMIN: &str = "admin";

/// 발급 가능한 작업 이름
pub const ACTIONS: [&str; 5] = [SUGGEST_CHANGE, MERGE_VERSION, SAVE_SETTINGS, STRUCTURED_SAVE, ADMIN];

/// 익명 요청자의 subject
const ANONYMOUS_SUBJECT: &str = "0";

const NONCE_LIFETIME_HOURS: i64 = 12;

#[derive(Debug, Serialize, Deserialize)]
struct NonceClaims {
    sub: String,
    action: String,
    jti: String,
    iat: i64,
    exp: i64,
}

fn nonce_key(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(format!("{secret}:nonce").as_bytes());
    hasher.finalize().to_vec()
}

fn subject(actor: Option<&AuthUser>) -> &str {
    actor.map_or(ANONYMOUS_SUBJECT, |user| user.user_id.as_str())
}

/// `action`과 요청자에 묶인 토큰을 발급합니다.
pub fn create_nonce(
    secret: &str,
    action: &str,
    actor: Option<&AuthUser>,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = NonceClaims {
        sub: subject(actor).to_string(),
        action: action.to_string(),
        jti: uuid::Uuid::now_v7().to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(NONCE_LIFETIME_HOURS)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&nonce_key(secret)),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}

/// 요청 헤더의 토큰을 검사합니다. 실패 사유는 구분하지 않습니다.
pub fn verify_nonce(
    headers: &HeaderMap,
    secret: &str,
    action: &str,
    actor: Option<&AuthUser>,
) -> Result<(), AppError> {
    let token = headers
        .get(NONCE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::InvalidNonce)?;

    let claims = decode::<NonceClaims>(
        token,
        &DecodingKey::from_secret(&nonce_key(secret)),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected nonce: {}", e);
        AppError::InvalidNonce
    })?
    .claims;

    if claims.action != action || claims.sub != subject(actor) {
        return Err(AppError::InvalidNonce);
    }

    Ok(())
}
