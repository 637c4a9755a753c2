//! # 버전 저장소
//!
//! `db::versions` 위에 입력 검증, 정화(sanitize), 해시 계산, 읽기 캐시를 얹은 계층입니다.
//! 핸들러와 조정기(reconcile)는 DB 함수 대신 이 타입을 사용합니다.
//!
//! 캐시는 block_id 키로 "버전 목록"과 "현재 버전" 두 가지를 보관하며,
//! 쓰기(삽입, 병합)가 성공하면 반환 전에 해당 블록 키를 모두 지웁니다.

use crate::db;
use crate::error::AppError;
use crate::models::{BlockVersion, NewVersion};
use crate::services::cache::TtlCache;
use crate::services::content::{self, Sanitizer};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct VersionStore {
    pool: SqlitePool,
    sanitizer: Arc<dyn Sanitizer>,
    versions_cache: Arc<TtlCache<Vec<BlockVersion>>>,
    current_cache: Arc<TtlCache<Option<BlockVersion>>>,
}

impl VersionStore {
    pub fn new(pool: SqlitePool, sanitizer: Arc<dyn Sanitizer>, cache_ttl: Duration) -> Self {
        Self {
            pool,
            sanitizer,
            versions_cache: Arc::new(TtlCache::new(cache_ttl)),
            current_cache: Arc::new(TtlCache::new(cache_ttl)),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn sanitize(&self, html: &str) -> String {
        self.sanitizer.sanitize(html)
    }

    /// 새 버전을 기록합니다.
    ///
    /// 콘텐츠는 정화된 형태로 저장되며, 정화 후 비어 버리면 거부합니다.
    /// 블록의 첫 버전이면 곧바로 현재 버전이 됩니다.
    pub async fn insert_version(&self, new: NewVersion<'_>) -> Result<BlockVersion, AppError> {
        content::validate_block_id(new.block_id)?;
        content::validate_content(new.content)?;

        let sanitized = self.sanitizer.sanitize(new.content);
        content::validate_content(&sanitized)?;
        let hash = content::content_hash(&sanitized);
        let summary = new
            .change_summary
            .map(str::trim)
            .filter(|summary| !summary.is_empty());

        let version = db::insert_version(
            &self.pool,
            &NewVersion {
                content: &sanitized,
                change_summary: summary,
                ..new
            },
            &hash,
        )
        .await?;

        self.invalidate(new.block_id).await;
        tracing::debug!(
            block_id = %version.block_id,
            version_number = version.version_number,
            "Recorded block version"
        );

        Ok(version)
    }

    /// 블록의 모든 버전 (최신 번호 먼저)
    pub async fn list_versions(&self, block_id: &str) -> Result<Vec<BlockVersion>, AppError> {
        if let Some(versions) = self.versions_cache.get(block_id).await {
            return Ok(versions);
        }
        let ticket = self.versions_cache.ticket().await;
        let versions = db::list_versions(&self.pool, block_id).await?;
        self.versions_cache
            .insert(block_id, versions.clone(), ticket)
            .await;
        Ok(versions)
    }

    pub async fn get_current_version(
        &self,
        block_id: &str,
    ) -> Result<Option<BlockVersion>, AppError> {
        if let Some(current) = self.current_cache.get(block_id).await {
            return Ok(current);
        }
        let ticket = self.current_cache.ticket().await;
        let current = db::get_current_version(&self.pool, block_id).await?;
        self.current_cache
            .insert(block_id, current.clone(), ticket)
            .await;
        Ok(current)
    }

    pub async fn get_version(&self, version_id: i64) -> Result<Option<BlockVersion>, AppError> {
        db::get_version(&self.pool, version_id).await
    }

    /// 버전을 현재 버전으로 승격합니다. 대상이 없으면 `false`.
    pub async fn merge_version(&self, version_id: i64) -> Result<bool, AppError> {
        match db::merge_version(&self.pool, version_id).await? {
            Some(block_id) => {
                self.invalidate(&block_id).await;
                tracing::info!(%block_id, version_id, "Merged block version");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// 정규화 결과가 같은 과거 버전을 찾습니다.
    pub async fn find_matching_version(
        &self,
        block_id: &str,
        content: &str,
    ) -> Result<Option<i64>, AppError> {
        db::find_version_by_hash(&self.pool, block_id, &content::content_hash(content)).await
    }

    pub async fn latest_post_id(&self, block_id: &str) -> Result<Option<i64>, AppError> {
        db::latest_post_id(&self.pool, block_id).await
    }

    pub async fn invalidate(&self, block_id: &str) {
        self.versions_cache.invalidate(block_id).await;
        self.current_cache.invalidate(block_id).await;
    }

    pub async fn invalidate_all(&self) {
        self.versions_cache.clear().await;
        self.current_cache.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::services::content::BasicSanitizer;

    async fn store() -> VersionStore {
        VersionStore::new(
            test_pool().await,
            Arc::new(BasicSanitizer),
            Duration::from_secs(60),
        )
    }

    fn edit<'a>(block_id: &'a str, content: &'a str) -> NewVersion<'a> {
        NewVersion {
            block_id,
            content,
            author_id: "u1",
            change_summary: Some("  fix typo  "),
            post_id: Some(1),
        }
    }

    #[tokio::test]
    async fn stores_sanitized_content() {
        let store = store().await;
        let version = store
            .insert_version(edit("faq-1", "<p>Hi<script>x()</script></p>"))
            .await
            .unwrap();
        assert_eq!(version.content, "<p>Hi</p>");
        assert_eq!(version.change_summary.as_deref(), Some("fix typo"));
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let store = store().await;
        assert!(matches!(
            store.insert_version(edit("faq 1", "<p>x</p>")).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            store.insert_version(edit("faq-1", "   ")).await,
            Err(AppError::BadRequest(_))
        ));
        // 정화 후 비어 버리는 콘텐츠
        assert!(matches!(
            store
                .insert_version(edit("faq-1", "<script>x()</script>"))
                .await,
            Err(AppError::BadRequest(_))
        ));
        assert!(store.list_versions("faq-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn writes_invalidate_cached_reads() {
        let store = store().await;
        let v1 = store.insert_version(edit("faq-1", "<p>a</p>")).await.unwrap();

        // 캐시 채우기
        assert_eq!(store.list_versions("faq-1").await.unwrap().len(), 1);
        assert_eq!(
            store.get_current_version("faq-1").await.unwrap().unwrap().id,
            v1.id
        );

        let v2 = store.insert_version(edit("faq-1", "<p>b</p>")).await.unwrap();
        assert_eq!(store.list_versions("faq-1").await.unwrap().len(), 2);

        assert!(store.merge_version(v2.id).await.unwrap());
        assert_eq!(
            store.get_current_version("faq-1").await.unwrap().unwrap().id,
            v2.id
        );
        assert!(!store.merge_version(9_999).await.unwrap());
    }

    #[tokio::test]
    async fn matching_uses_normalized_content() {
        let store = store().await;
        let v1 = store
            .insert_version(edit("faq-1", "<p>Hello world</p>"))
            .await
            .unwrap();
        assert_eq!(
            store
                .find_matching_version("faq-1", "  <p>Hello   world</p>\r\n")
                .await
                .unwrap(),
            Some(v1.id)
        );
        assert_eq!(
            store.find_matching_version("faq-1", "<p>Bye</p>").await.unwrap(),
            None
        );
    }
}
