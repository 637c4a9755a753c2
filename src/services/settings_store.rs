//! # 블록 설정 저장소
//!
//! 저장된 오버라이드와 전역 기본값을 필드 단위로 합쳐 `ResolvedSettings`를 만듭니다.
//! 저장된 역할 목록이 비어 있거나 JSON으로 읽을 수 없으면 그 필드만 전역 기본값을 씁니다.

use crate::config::GlobalConfig;
use crate::db;
use crate::error::AppError;
use crate::models::{BlockSettingsRow, ResolvedSettings, SettingsPatch};
use crate::services::cache::TtlCache;
use crate::services::content;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
    config: Arc<GlobalConfig>,
    cache: Arc<TtlCache<Option<BlockSettingsRow>>>,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool, config: Arc<GlobalConfig>, cache_ttl: Duration) -> Self {
        Self {
            pool,
            config,
            cache: Arc::new(TtlCache::new(cache_ttl)),
        }
    }

    /// 블록의 유효 설정. 저장된 행이 없으면 전역 기본값 그대로입니다.
    pub async fn get_settings(&self, block_id: &str) -> Result<ResolvedSettings, AppError> {
        let row = match self.cache.get(block_id).await {
            Some(row) => row,
            None => {
                let ticket = self.cache.ticket().await;
                let row = db::get_settings_row(&self.pool, block_id).await?;
                self.cache.insert(block_id, row.clone(), ticket).await;
                row
            }
        };

        Ok(self.resolve(row.as_ref()))
    }

    fn resolve(&self, row: Option<&BlockSettingsRow>) -> ResolvedSettings {
        let config = &self.config;
        let pick = |stored: Option<&String>, fallback: &Vec<String>| {
            stored
                .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
                .filter(|roles| !roles.is_empty())
                .unwrap_or_else(|| fallback.clone())
        };

        ResolvedSettings {
            merge_permissions: pick(
                row.and_then(|r| r.merge_permissions.as_ref()),
                &config.merge_roles,
            ),
            browse_permissions: pick(
                row.and_then(|r| r.browse_permissions.as_ref()),
                &config.browse_roles,
            ),
            suggest_permissions: pick(
                row.and_then(|r| r.suggest_permissions.as_ref()),
                &config.suggest_roles,
            ),
            require_login_browse: row
                .and_then(|r| r.require_login_browse)
                .unwrap_or(config.require_login_browse),
        }
    }

    /// 넘겨받은 필드만 갱신합니다.
    ///
    /// 역할 목록에서 알려지지 않은 역할은 조용히 버립니다.
    /// 걸러낸 결과가 빈 목록이면 저장은 되지만 읽을 때는 전역 기본값으로 해석됩니다.
    pub async fn save_settings(&self, block_id: &str, patch: SettingsPatch) -> Result<(), AppError> {
        content::validate_block_id(block_id)?;
        if patch.is_empty() {
            return Err(AppError::BadRequest("No settings provided".to_string()));
        }

        let encode = |roles: Option<Vec<String>>| -> Result<Option<String>, AppError> {
            roles
                .map(|roles| {
                    serde_json::to_string(&self.config.filter_known_roles(&roles))
                        .map_err(|e| AppError::Internal(e.to_string()))
                })
                .transpose()
        };
        let merge = encode(patch.merge_permissions)?;
        let browse = encode(patch.browse_permissions)?;
        let suggest = encode(patch.suggest_permissions)?;

        db::upsert_settings(
            &self.pool,
            block_id,
            merge.as_deref(),
            browse.as_deref(),
            suggest.as_deref(),
            patch.require_login_browse,
        )
        .await?;

        self.invalidate(block_id).await;
        tracing::info!(%block_id, "Saved block settings");
        Ok(())
    }

    pub async fn invalidate(&self, block_id: &str) {
        self.cache.invalidate(block_id).await;
    }

    pub async fn invalidate_all(&self) {
        self.cache.clear().await;
    }
}
