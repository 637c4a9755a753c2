//! # 블록 권한 판정
//!
//! `decide()`는 유효 설정과 요청자만 보고 결정하는 순수 함수입니다.
//! `PermissionResolver`는 설정 저장소에서 유효 설정을 읽어 `decide()`에 넘깁니다.
//!
//! | 작업     | 익명   | 로그인 사용자                                  |
//! |----------|--------|------------------------------------------------|
//! | suggest  | 거부   | 역할이 suggest 목록과 겹치면 허용              |
//! | merge    | 거부   | 역할이 merge 목록과 겹치면 허용                |
//! | browse   | 로그인 불필요 설정이면 허용 | 로그인 불필요면 허용, 아니면 browse 목록과 겹칠 때 |

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::ResolvedSettings;
use crate::services::settings_store::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Suggest,
    Browse,
    Merge,
}

pub fn decide(action: Action, settings: &ResolvedSettings, actor: Option<&AuthUser>) -> bool {
    match action {
        Action::Suggest => {
            actor.is_some_and(|user| user.has_any_role(&settings.suggest_permissions))
        }
        Action::Merge => actor.is_some_and(|user| user.has_any_role(&settings.merge_permissions)),
        Action::Browse => {
            if !settings.require_login_browse {
                return true;
            }
            actor.is_some_and(|user| user.has_any_role(&settings.browse_permissions))
        }
    }
}

#[derive(Clone)]
pub struct PermissionResolver {
    settings: SettingsStore,
}

impl PermissionResolver {
    pub fn new(settings: SettingsStore) -> Self {
        Self { settings }
    }

    pub async fn check(
        &self,
        action: Action,
        block_id: &str,
        actor: Option<&AuthUser>,
    ) -> Result<bool, AppError> {
        let settings = self.settings.get_settings(block_id).await?;
        let allowed = decide(action, &settings, actor);
        if !allowed {
            tracing::debug!(
                ?action,
                %block_id,
                user_id = actor.map(|user| user.user_id.as_str()),
                "Permission denied"
            );
        }
        Ok(allowed)
    }

    pub async fn can_suggest(&self, block_id: &str, actor: Option<&AuthUser>) -> Result<bool, AppError> {
        self.check(Action::Suggest, block_id, actor).await
    }

    pub async fn can_browse(&self, block_id: &str, actor: Option<&AuthUser>) -> Result<bool, AppError> {
        self.check(Action::Browse, block_id, actor).await
    }

    pub async fn can_merge(&self, block_id: &str, actor: Option<&AuthUser>) -> Result<bool, AppError> {
        self.check(Action::Merge, block_id, actor).await
    }

    /// 블록과 무관한 역할 검사 (설정 저장, 구조화 저장, 관리자 작업)
    pub fn has_any_role(actor: &AuthUser, roles: &[String]) -> bool {
        actor.has_any_role(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::db::test_pool;
    use crate::models::SettingsPatch;
    use std::sync::Arc;
    use std::time::Duration;

    fn user(roles: &[&str]) -> AuthUser {
        AuthUser {
            user_id: "7".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn settings(require_login_browse: bool) -> ResolvedSettings {
        ResolvedSettings {
            merge_permissions: vec!["administrator".to_string()],
            browse_permissions: vec!["subscriber".to_string()],
            suggest_permissions: vec!["author".to_string(), "editor".to_string()],
            require_login_browse,
        }
    }

    #[test]
    fn anonymous_cannot_write() {
        let open = settings(false);
        assert!(!decide(Action::Suggest, &open, None));
        assert!(!decide(Action::Merge, &open, None));
        assert!(decide(Action::Browse, &open, None));
    }

    #[test]
    fn roles_must_intersect() {
        let s = settings(false);
        let author = user(&["author"]);
        let admin = user(&["administrator"]);

        assert!(decide(Action::Suggest, &s, Some(&author)));
        assert!(!decide(Action::Merge, &s, Some(&author)));
        assert!(decide(Action::Merge, &s, Some(&admin)));
        assert!(!decide(Action::Suggest, &s, Some(&admin)));
        assert!(!decide(Action::Suggest, &s, Some(&user(&[]))));
    }

    #[test]
    fn login_required_browse() {
        let s = settings(true);
        assert!(!decide(Action::Browse, &s, None));
        assert!(decide(Action::Browse, &s, Some(&user(&["subscriber"]))));
        assert!(!decide(Action::Browse, &s, Some(&user(&["author"]))));
    }

    #[tokio::test]
    async fn resolver_uses_defaults_then_overrides() {
        let config = Arc::new(GlobalConfig::default());
        let store = SettingsStore::new(test_pool().await, config, Duration::from_secs(60));
        let resolver = PermissionResolver::new(store.clone());
        let editor = user(&["editor"]);

        // 기본값: merge는 administrator만
        assert!(!resolver.can_merge("faq-1", Some(&editor)).await.unwrap());
        assert!(resolver.can_suggest("faq-1", Some(&editor)).await.unwrap());
        assert!(resolver.can_browse("faq-1", None).await.unwrap());

        store
            .save_settings(
                "faq-1",
                SettingsPatch {
                    merge_permissions: Some(vec!["editor".to_string()]),
                    require_login_browse: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(resolver.can_merge("faq-1", Some(&editor)).await.unwrap());
        assert!(!resolver.can_browse("faq-1", None).await.unwrap());
        // 다른 블록은 영향 없음
        assert!(!resolver.can_merge("faq-2", Some(&editor)).await.unwrap());
    }
}
