use serde::{Deserialize, Serialize};

/// `block_settings` 테이블의 한 행. 역할 목록은 JSON 배열 문자열로 저장됩니다.
/// None = 오버라이드 없음 (전역 기본값 사용)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BlockSettingsRow {
    pub merge_permissions: Option<String>,
    pub browse_permissions: Option<String>,
    pub suggest_permissions: Option<String>,
    pub require_login_browse: Option<bool>,
}

/// 전역 기본값과 합쳐진, 항상 모든 필드가 채워진 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSettings {
    pub merge_permissions: Vec<String>,
    pub browse_permissions: Vec<String>,
    pub suggest_permissions: Vec<String>,
    pub require_login_browse: bool,
}

/// 부분 업데이트 요청. 누락된 필드는 저장된 값을 그대로 둡니다.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub merge_permissions: Option<Vec<String>>,
    pub browse_permissions: Option<Vec<String>>,
    pub suggest_permissions: Option<Vec<String>>,
    pub require_login_browse: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.merge_permissions.is_none()
            && self.browse_permissions.is_none()
            && self.suggest_permissions.is_none()
            && self.require_login_browse.is_none()
    }
}
