//! # 애플리케이션 설정(Configuration) 모듈
//!
//! 환경변수에서 서버 설정값과 전역 기본값(GlobalConfig)을 읽어옵니다.
//! `.env` 파일이나 시스템 환경변수에서 값을 가져옵니다.
//!
//! 서버 설정 항목:
//! - `DATABASE_URL`: SQLite 데이터베이스 경로 (필수)
//! - `JWT_SECRET`: 액세스 토큰 검증 및 nonce 서명용 비밀키 (필수)
//! - `HOST`, `PORT`: 서버 바인딩 주소
//!
//! 전역 기본값(`WB_*`)은 블록별 설정이 없을 때 권한 판정과 보존 정책에 쓰입니다.

use std::env;

/// 기본 역할 목록. 블록 열람/제안 기본값과 알려진 역할 집합에 함께 쓰입니다.
const DEFAULT_ROLES: &str = "administrator,editor,author,contributor,subscriber";

/// 애플리케이션 전체 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite 데이터베이스 파일 경로 (예: "sqlite:data/wiki-blocks.db")
    pub database_url: String,
    /// JWT 토큰 검증에 사용하는 비밀키
    pub jwt_secret: String,
    /// 서버가 바인딩할 호스트 주소 (기본값: "0.0.0.0")
    pub host: String,
    /// 서버 포트 번호 (기본값: 3000)
    pub port: u16,
    /// 권한/보존 정책 전역 기본값
    pub global: GlobalConfig,
}

/// 프로세스 전역 기본값
///
/// 시작 시 한 번 만들어 `Arc`로 각 컴포넌트에 주입합니다.
/// 권한 판정기는 이 값만 보고 결정하므로 환경 설정 없이도 테스트할 수 있습니다.
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    /// 기본 병합(merge) 허용 역할
    pub merge_roles: Vec<String>,
    /// 기본 열람(browse) 허용 역할
    pub browse_roles: Vec<String>,
    /// 기본 제안(suggest) 허용 역할
    pub suggest_roles: Vec<String>,
    /// 열람에 로그인이 필요한지 여부
    pub require_login_browse: bool,
    /// 권한 시스템이 아는 역할 전체. 설정 저장 시 이 밖의 역할은 버려집니다.
    pub known_roles: Vec<String>,
    /// 블록 설정 저장과 구조화 편집기 저장이 허용되는 역할
    pub editor_roles: Vec<String>,
    /// 관리자 작업(통계, 정리)이 허용되는 역할
    pub admin_roles: Vec<String>,
    /// 현재 버전이 아닌 버전을 보존하는 일수
    pub keep_days: u32,
    /// 블록당 보존하는 비현재 버전 수
    pub max_versions_per_block: u32,
    /// 문서 삭제 시 블록 데이터를 함께 지울지 여부
    pub cleanup_on_delete: bool,
    /// stale-write 가드가 "최근"으로 보는 시간(초)
    pub stale_write_window_secs: u64,
    /// 읽기 캐시 TTL(초)
    pub cache_ttl_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            merge_roles: parse_roles("administrator"),
            browse_roles: parse_roles(DEFAULT_ROLES),
            suggest_roles: parse_roles(DEFAULT_ROLES),
            require_login_browse: false,
            known_roles: parse_roles(DEFAULT_ROLES),
            editor_roles: parse_roles("administrator,editor"),
            admin_roles: parse_roles("administrator"),
            keep_days: 90,
            max_versions_per_block: 50,
            cleanup_on_delete: true,
            stale_write_window_secs: 300,
            cache_ttl_secs: 300,
        }
    }
}

impl GlobalConfig {
    /// 환경변수에서 전역 기본값을 읽습니다. 없거나 파싱에 실패한 항목은 기본값을 씁니다.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            merge_roles: roles_var("WB_MERGE_ROLES").unwrap_or(defaults.merge_roles),
            browse_roles: roles_var("WB_BROWSE_ROLES").unwrap_or(defaults.browse_roles),
            suggest_roles: roles_var("WB_SUGGEST_ROLES").unwrap_or(defaults.suggest_roles),
            require_login_browse: parsed_var("WB_REQUIRE_LOGIN_BROWSE")
                .unwrap_or(defaults.require_login_browse),
            known_roles: roles_var("WB_KNOWN_ROLES").unwrap_or(defaults.known_roles),
            editor_roles: roles_var("WB_EDITOR_ROLES").unwrap_or(defaults.editor_roles),
            admin_roles: roles_var("WB_ADMIN_ROLES").unwrap_or(defaults.admin_roles),
            keep_days: parsed_var("WB_KEEP_DAYS").unwrap_or(defaults.keep_days),
            max_versions_per_block: parsed_var("WB_MAX_VERSIONS_PER_BLOCK")
                .unwrap_or(defaults.max_versions_per_block),
            cleanup_on_delete: parsed_var("WB_CLEANUP_ON_DELETE")
                .unwrap_or(defaults.cleanup_on_delete),
            stale_write_window_secs: parsed_var("WB_STALE_WRITE_WINDOW_SECS")
                .unwrap_or(defaults.stale_write_window_secs),
            cache_ttl_secs: parsed_var("WB_CACHE_TTL_SECS").unwrap_or(defaults.cache_ttl_secs),
        }
    }

    /// 알려진 역할만 남깁니다. 순서는 유지하고 중복은 제거합니다.
    pub fn filter_known_roles(&self, roles: &[String]) -> Vec<String> {
        let mut kept: Vec<String> = Vec::new();
        for role in roles {
            let role = role.trim();
            if self.known_roles.iter().any(|known| known == role)
                && !kept.iter().any(|k| k == role)
            {
                kept.push(role.to_string());
            }
        }
        kept
    }
}

impl Config {
    /// 환경변수에서 설정값을 읽어 Config 인스턴스를 생성합니다.
    ///
    /// # 에러
    /// `DATABASE_URL`과 `JWT_SECRET`은 필수이며, 없으면 에러가 발생합니다.
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            global: GlobalConfig::from_env(),
        })
    }
}

/// "a, b,,c" → ["a", "b", "c"]
pub fn parse_roles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|role| !role.is_empty())
        .map(str::to_string)
        .collect()
}

fn roles_var(key: &str) -> Option<Vec<String>> {
    let roles = parse_roles(&env::var(key).ok()?);
    if roles.is_empty() {
        None
    } else {
        Some(roles)
    }
}

fn parsed_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok()?.trim().parse().ok()
}
