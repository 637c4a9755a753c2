//! # 액세스 토큰 인증
//!
//! 사용자 계정은 외부 ID 공급자가 관리합니다. 이 서버는 공급자가 같은 비밀키로 서명한
//! JWT(`sub` = 사용자 ID, `roles` = 역할 목록)를 검증만 합니다.
//!
//! - `AuthUser`: 로그인이 필수인 핸들러용 추출기
//! - `MaybeAuthUser`: 익명 접근도 허용하는 핸들러용 추출기.
//!   헤더가 없으면 익명이지만, 헤더가 있는데 토큰이 잘못됐으면 거부합니다.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::routes::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

/// 인증된 요청자
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_any_role(&self, allowed: &[String]) -> bool {
        self.roles.iter().any(|role| allowed.contains(role))
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        user_from_header(auth_header, &state.jwt_secret)
    }
}

/// 익명일 수도 있는 요청자
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match parts.headers.get(AUTHORIZATION) {
            None => Ok(MaybeAuthUser(None)),
            Some(value) => {
                let auth_header = value.to_str().map_err(|_| AuthError::InvalidToken)?;
                Ok(MaybeAuthUser(Some(user_from_header(
                    auth_header,
                    &state.jwt_secret,
                )?)))
            }
        }
    }
}

fn user_from_header(auth_header: &str, secret: &str) -> Result<AuthUser, AuthError> {
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidToken)?;

    let claims = verify_access_token(token, secret)?;

    Ok(AuthUser {
        user_id: claims.sub,
        roles: claims.roles,
    })
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    ExpiredToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "missing_token",
                "You must be logged in",
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid authorization token",
            ),
            AuthError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "expired_token",
                "Authorization token has expired",
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// 액세스 토큰을 발급합니다. 운영에서는 ID 공급자가 발급하며, 개발 도구와 테스트에서 씁니다.
pub fn create_access_token(
    user_id: &str,
    roles: &[String],
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        roles: roles.to_vec(),
        iat: now.timestamp(),
        exp: (now + Duration::minutes(15)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        _ => AuthError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_carries_roles() {
        let roles = vec!["editor".to_string()];
        let token = create_access_token("42", &roles, SECRET).unwrap();
        let user = user_from_header(&format!("Bearer {token}"), SECRET).unwrap();
        assert_eq!(user.user_id, "42");
        assert!(user.has_any_role(&["administrator".to_string(), "editor".to_string()]));
        assert!(!user.has_any_role(&["administrator".to_string()]));
    }

    #[test]
    fn wrong_secret_or_scheme_is_rejected() {
        let token = create_access_token("42", &[], SECRET).unwrap();
        assert!(matches!(
            user_from_header(&format!("Bearer {token}"), "other"),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            user_from_header(&token, SECRET),
            Err(AuthError::InvalidToken)
        ));
    }
}
