//! # 보존/정리 엔진
//!
//! 관리자가 실행하는 일괄 삭제 작업들입니다. 모두 멱등이며 삭제한 행 수를 보고합니다.
//!
//! - `prune_orphans()`: 실려 있던 문서가 사라진 블록을 통째로 삭제
//! - `prune_dangling()`: 현재 버전이 하나도 없는 블록의 버전 삭제
//! - `prune_history()`: 보존 기간/개수를 넘긴 비현재 버전 삭제
//! - `cleanup_post()`: 문서 삭제 시 그 문서의 블록 데이터 삭제
//!
//! 블록마다 별도 트랜잭션으로 처리합니다. 중간에 실패해도 이미 끝난 블록과
//! 아직 손대지 않은 블록은 온전하며, 실패 여부와 상관없이 끝나면 모든 캐시를 비웁니다.

use crate::config::GlobalConfig;
use crate::db::{self, retention};
use crate::error::AppError;
use crate::models::CleanupReport;
use crate::services::documents::DocumentSource;
use crate::services::settings_store::SettingsStore;
use crate::services::version_store::VersionStore;
use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Clone)]
pub struct RetentionEngine<D> {
    versions: VersionStore,
    settings: SettingsStore,
    documents: D,
    config: Arc<GlobalConfig>,
}

impl<D: DocumentSource> RetentionEngine<D> {
    pub fn new(
        versions: VersionStore,
        settings: SettingsStore,
        documents: D,
        config: Arc<GlobalConfig>,
    ) -> Self {
        Self {
            versions,
            settings,
            documents,
            config,
        }
    }

    /// 고아 블록을 삭제합니다.
    ///
    /// 블록은 다음 두 조건을 모두 만족할 때 고아입니다.
    /// - 버전이 가리키는 post_id 중 살아 있는 문서가 하나도 없다
    /// - post_id가 비어 있는 버전이 있다면, 어떤 문서 본문에도 block_id가 등장하지 않는다
    ///
    /// 고아 블록은 현재 버전을 포함한 모든 버전과 설정 행이 삭제됩니다.
    /// 판정 뒤 새 버전이 다른 문서를 가리키게 된 블록은 건너뜁니다.
    pub async fn prune_orphans(&self) -> Result<CleanupReport, AppError> {
        let mut posts_by_block: BTreeMap<String, Vec<Option<i64>>> = BTreeMap::new();
        for (block_id, post_id) in retention::block_post_refs(self.versions.pool()).await? {
            posts_by_block.entry(block_id).or_default().push(post_id);
        }

        let mut orphans = Vec::new();
        let mut known_posts: HashMap<i64, bool> = HashMap::new();
        for (block_id, mut post_ids) in posts_by_block {
            if self.is_orphan(&block_id, &post_ids, &mut known_posts).await? {
                post_ids.sort_unstable();
                orphans.push((block_id, post_ids));
            }
        }

        let mut report = CleanupReport::default();
        let mut skipped = 0usize;
        let mut result = Ok(());
        for (block_id, post_ids) in &orphans {
            match self.delete_orphan(block_id, post_ids).await {
                Ok(Some(deleted)) => {
                    report.deleted_versions += deleted.deleted_versions;
                    report.deleted_settings += deleted.deleted_settings;
                }
                Ok(None) => skipped += 1,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        self.invalidate_all().await;
        result?;
        tracing::info!(
            blocks = orphans.len() - skipped,
            skipped,
            deleted_versions = report.deleted_versions,
            deleted_settings = report.deleted_settings,
            "Pruned orphaned blocks"
        );
        Ok(report)
    }

    /// 트랜잭션 안에서 post_id 집합을 다시 읽어 판정 때와 같을 때만 삭제합니다.
    async fn delete_orphan(
        &self,
        block_id: &str,
        expected: &[Option<i64>],
    ) -> Result<Option<CleanupReport>, AppError> {
        let mut tx = self.versions.pool().begin().await?;

        let post_ids = retention::block_post_ids(&mut tx, block_id).await?;
        if post_ids != expected {
            tracing::debug!(block_id, "Block changed since orphan check, skipping");
            tx.rollback().await?;
            return Ok(None);
        }

        let report = CleanupReport {
            deleted_versions: retention::delete_block_versions(&mut tx, block_id).await?,
            deleted_settings: db::delete_settings(&mut tx, block_id).await?,
        };
        tx.commit().await?;
        Ok(Some(report))
    }

    async fn is_orphan(
        &self,
        block_id: &str,
        post_ids: &[Option<i64>],
        known_posts: &mut HashMap<i64, bool>,
    ) -> Result<bool, AppError> {
        // post_id 없는 버전이 섞여 있어도 살아 있는 문서를 가리키는 버전이 있으면 블록 전체를 남긴다
        for post_id in post_ids.iter().flatten() {
            let exists = match known_posts.get(post_id) {
                Some(exists) => *exists,
                None => {
                    let exists = self.documents.exists(*post_id).await?;
                    known_posts.insert(*post_id, exists);
                    exists
                }
            };
            if exists {
                return Ok(false);
            }
        }

        if post_ids.iter().any(Option::is_none) && self.documents.content_mentions(block_id).await? {
            return Ok(false);
        }

        Ok(true)
    }

    /// 현재 버전이 없는 블록의 버전을 모두 삭제합니다. 설정 행은 남깁니다.
    ///
    /// 삭제 직전에 다시 확인하므로 목록을 뽑은 뒤 병합된 블록은 남습니다.
    pub async fn prune_dangling(&self) -> Result<CleanupReport, AppError> {
        let block_ids = retention::block_ids_without_current(self.versions.pool()).await?;

        let mut report = CleanupReport::default();
        let mut result = Ok(());
        for block_id in &block_ids {
            match self.delete_dangling(block_id).await {
                Ok(deleted) => report.deleted_versions += deleted,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        self.invalidate_all().await;
        result?;
        tracing::info!(
            blocks = block_ids.len(),
            deleted_versions = report.deleted_versions,
            "Pruned blocks without a current version"
        );
        Ok(report)
    }

    async fn delete_dangling(&self, block_id: &str) -> Result<u64, AppError> {
        let mut tx = self.versions.pool().begin().await?;
        let deleted = retention::delete_dangling_block(&mut tx, block_id).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    /// 설정된 보존 정책(`keep_days`, `max_versions_per_block`)으로 이력을 줄입니다.
    pub async fn prune_history(&self) -> Result<CleanupReport, AppError> {
        self.prune_history_with(self.config.keep_days, self.config.max_versions_per_block)
            .await
    }

    /// 블록마다 현재 버전은 항상 남기고, 비현재 버전은
    /// 최근 `max_versions`개 안에 들면서 `keep_days`일 이내인 것만 남깁니다.
    /// 0은 "하나도 남기지 않음"입니다.
    pub async fn prune_history_with(
        &self,
        keep_days: u32,
        max_versions: u32,
    ) -> Result<CleanupReport, AppError> {
        let cutoff = (Utc::now() - Duration::days(i64::from(keep_days)))
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        let block_ids = retention::list_block_ids(self.versions.pool()).await?;

        let mut report = CleanupReport::default();
        let mut result = Ok(());
        for block_id in &block_ids {
            match self.prune_block(block_id, max_versions, &cutoff).await {
                Ok(deleted) => report.deleted_versions += deleted,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        self.invalidate_all().await;
        result?;
        tracing::info!(
            keep_days,
            max_versions,
            deleted_versions = report.deleted_versions,
            "Pruned version history"
        );
        Ok(report)
    }

    async fn prune_block(
        &self,
        block_id: &str,
        max_versions: u32,
        cutoff: &str,
    ) -> Result<u64, AppError> {
        let mut tx = self.versions.pool().begin().await?;
        let deleted = retention::prune_block_history(&mut tx, block_id, max_versions, cutoff).await?;
        tx.commit().await?;
        Ok(deleted)
    }

    /// 문서가 삭제됐을 때 그 문서에 실린 블록의 버전과 설정을 지웁니다.
    ///
    /// `cleanup_on_delete`가 꺼져 있으면 아무것도 하지 않고 `None`을 돌려줍니다.
    pub async fn cleanup_post(&self, post_id: i64) -> Result<Option<CleanupReport>, AppError> {
        if !self.config.cleanup_on_delete {
            tracing::debug!(post_id, "Post cleanup disabled");
            return Ok(None);
        }

        let block_ids = retention::block_ids_for_post(self.versions.pool(), post_id).await?;
        let result = self.cleanup_post_blocks(post_id, &block_ids).await;
        self.invalidate_all().await;
        let report = result?;

        tracing::info!(
            post_id,
            deleted_versions = report.deleted_versions,
            deleted_settings = report.deleted_settings,
            "Cleaned up blocks of deleted post"
        );
        Ok(Some(report))
    }

    async fn cleanup_post_blocks(
        &self,
        post_id: i64,
        block_ids: &[String],
    ) -> Result<CleanupReport, AppError> {
        let mut report = self.delete_blocks(block_ids).await?;

        let mut tx = self.versions.pool().begin().await?;
        report.deleted_versions += retention::delete_post_versions(&mut tx, post_id).await?;
        tx.commit().await?;

        Ok(report)
    }

    /// 블록의 버전과 설정을 블록 단위 트랜잭션으로 삭제합니다.
    async fn delete_blocks(&self, block_ids: &[String]) -> Result<CleanupReport, AppError> {
        let mut report = CleanupReport::default();
        for block_id in block_ids {
            let mut tx = self.versions.pool().begin().await?;
            report.deleted_versions += retention::delete_block_versions(&mut tx, block_id).await?;
            report.deleted_settings += db::delete_settings(&mut tx, block_id).await?;
            tx.commit().await?;
        }
        Ok(report)
    }

    async fn invalidate_all(&self) {
        self.versions.invalidate_all().await;
        self.settings.invalidate_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::{NewVersion, SettingsPatch};
    use crate::services::content::BasicSanitizer;
    use crate::services::documents::MemoryDocuments;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// 문서 조회 도중 편집자가 살아 있는 문서에 블록을 다시 싣는 상황
    struct RelinkingDocuments {
        inner: MemoryDocuments,
        versions: VersionStore,
        block_id: &'static str,
        live_post: i64,
        fired: AtomicBool,
    }

    impl DocumentSource for RelinkingDocuments {
        async fn exists(&self, post_id: i64) -> Result<bool, AppError> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                self.versions
                    .insert_version(NewVersion {
                        block_id: self.block_id,
                        content: "<p>relinked</p>",
                        author_id: "u2",
                        change_summary: None,
                        post_id: Some(self.live_post),
                    })
                    .await?;
            }
            self.inner.exists(post_id).await
        }

        async fn content_mentions(&self, needle: &str) -> Result<bool, AppError> {
            self.inner.content_mentions(needle).await
        }
    }

    struct Fixture {
        versions: VersionStore,
        settings: SettingsStore,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = test_pool().await;
            let config = Arc::new(GlobalConfig::default());
            let ttl = std::time::Duration::from_secs(60);
            Self {
                versions: VersionStore::new(pool.clone(), Arc::new(BasicSanitizer), ttl),
                settings: SettingsStore::new(pool, config, ttl),
            }
        }

        fn engine(&self, documents: MemoryDocuments, config: GlobalConfig) -> RetentionEngine<MemoryDocuments> {
            RetentionEngine::new(
                self.versions.clone(),
                self.settings.clone(),
                documents,
                Arc::new(config),
            )
        }

        async fn add(&self, block_id: &str, content: &str, post_id: Option<i64>) -> i64 {
            self.versions
                .insert_version(NewVersion {
                    block_id,
                    content,
                    author_id: "u1",
                    change_summary: None,
                    post_id,
                })
                .await
                .unwrap()
                .id
        }

        async fn count(&self, block_id: &str) -> usize {
            self.versions.list_versions(block_id).await.unwrap().len()
        }
    }

    #[tokio::test]
    async fn history_pruning_keeps_current() {
        let fx = Fixture::new().await;
        for i in 0..10 {
            fx.add("faq-1", &format!("<p>{i}</p>"), Some(1)).await;
        }
        let engine = fx.engine(MemoryDocuments::default(), GlobalConfig::default());

        let report = engine.prune_history_with(0, 0).await.unwrap();
        assert_eq!(report.deleted_versions, 9);

        let remaining = fx.versions.list_versions("faq-1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].is_current);
        assert_eq!(remaining[0].version_number, 1);

        // 멱등
        assert_eq!(engine.prune_history_with(0, 0).await.unwrap().deleted_versions, 0);
    }

    #[tokio::test]
    async fn history_pruning_keeps_most_recent() {
        let fx = Fixture::new().await;
        for i in 0..6 {
            fx.add("faq-1", &format!("<p>{i}</p>"), Some(1)).await;
        }
        let engine = fx.engine(MemoryDocuments::default(), GlobalConfig::default());

        let report = engine.prune_history_with(90, 2).await.unwrap();
        assert_eq!(report.deleted_versions, 3);

        let numbers: Vec<i64> = fx
            .versions
            .list_versions("faq-1")
            .await
            .unwrap()
            .iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(numbers, vec![6, 5, 1]);

        // 정리된 번호는 다시 쓰이지 않는다
        fx.add("faq-1", "<p>again</p>", Some(1)).await;
        assert_eq!(fx.versions.list_versions("faq-1").await.unwrap()[0].version_number, 7);
    }

    #[tokio::test]
    async fn old_versions_go_regardless_of_count() {
        let fx = Fixture::new().await;
        fx.add("faq-1", "<p>a</p>", Some(1)).await;
        let old = fx.add("faq-1", "<p>b</p>", Some(1)).await;
        fx.add("faq-1", "<p>c</p>", Some(1)).await;
        sqlx::query("UPDATE block_versions SET created_at = '2020-01-01T00:00:00.000Z' WHERE id = ?")
            .bind(old)
            .execute(fx.versions.pool())
            .await
            .unwrap();
        let engine = fx.engine(MemoryDocuments::default(), GlobalConfig::default());

        let report = engine.prune_history().await.unwrap();
        assert_eq!(report.deleted_versions, 1);
        assert!(fx.versions.get_version(old).await.unwrap().is_none());
        assert_eq!(fx.count("faq-1").await, 2);
    }

    #[tokio::test]
    async fn dangling_blocks_lose_all_versions() {
        let fx = Fixture::new().await;
        fx.add("faq-1", "<p>a</p>", Some(1)).await;
        fx.add("faq-1", "<p>b</p>", Some(1)).await;
        fx.add("faq-2", "<p>c</p>", Some(1)).await;
        fx.add("faq-2", "<p>d</p>", Some(1)).await;
        sqlx::query("UPDATE block_versions SET is_current = 0 WHERE block_id = 'faq-2'")
            .execute(fx.versions.pool())
            .await
            .unwrap();
        let engine = fx.engine(MemoryDocuments::default(), GlobalConfig::default());

        let report = engine.prune_dangling().await.unwrap();
        assert_eq!(report.deleted_versions, 2);
        assert_eq!(fx.count("faq-1").await, 2);
        assert_eq!(fx.count("faq-2").await, 0);
        assert_eq!(engine.prune_dangling().await.unwrap().deleted_versions, 0);
    }

    #[tokio::test]
    async fn orphans_by_missing_post_and_by_content_scan() {
        let fx = Fixture::new().await;
        // 살아 있는 문서에 실린 블록
        fx.add("live", "<p>a</p>", Some(1)).await;
        // 문서가 사라진 블록
        fx.add("gone", "<p>b</p>", Some(2)).await;
        fx.add("gone", "<p>c</p>", Some(2)).await;
        // post_id 없이 본문 검색으로 판정되는 블록
        fx.add("mentioned", "<p>d</p>", None).await;
        fx.add("forgotten", "<p>e</p>", None).await;
        fx.settings
            .save_settings(
                "gone",
                SettingsPatch {
                    require_login_browse: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let documents = MemoryDocuments::default()
            .with_post(1, r#"<div data-block-id="live"></div>"#)
            .with_post(3, r#"<div data-block-id="mentioned"></div>"#);
        let engine = fx.engine(documents.clone(), GlobalConfig::default());

        let report = engine.prune_orphans().await.unwrap();
        assert_eq!(
            report,
            CleanupReport {
                deleted_versions: 3,
                deleted_settings: 1,
            }
        );
        assert_eq!(fx.count("live").await, 1);
        assert_eq!(fx.count("mentioned").await, 1);
        assert_eq!(fx.count("gone").await, 0);
        assert_eq!(fx.count("forgotten").await, 0);
        assert!(!fx.settings.get_settings("gone").await.unwrap().require_login_browse);

        // 문서 1이 삭제되면 live도 고아
        documents.remove(1);
        assert_eq!(engine.prune_orphans().await.unwrap().deleted_versions, 1);
        assert_eq!(engine.prune_orphans().await.unwrap().deleted_versions, 0);
    }

    #[tokio::test]
    async fn live_post_keeps_unlinked_versions_too() {
        let fx = Fixture::new().await;
        fx.add("faq-1", "<p>a</p>", Some(1)).await;
        fx.add("faq-1", "<p>b</p>", None).await;
        // 본문에는 block_id가 없음
        let documents = MemoryDocuments::default().with_post(1, "<p>host</p>");
        let engine = fx.engine(documents, GlobalConfig::default());

        assert_eq!(engine.prune_orphans().await.unwrap(), CleanupReport::default());
        assert_eq!(fx.count("faq-1").await, 2);
    }

    #[tokio::test]
    async fn orphan_relinked_during_check_survives() {
        let fx = Fixture::new().await;
        fx.add("gone", "<p>a</p>", Some(2)).await;
        fx.add("gone", "<p>b</p>", Some(2)).await;
        fx.settings
            .save_settings(
                "gone",
                SettingsPatch {
                    require_login_browse: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let documents = RelinkingDocuments {
            inner: MemoryDocuments::default().with_post(1, "<p>host</p>"),
            versions: fx.versions.clone(),
            block_id: "gone",
            live_post: 1,
            fired: AtomicBool::new(false),
        };
        let engine = RetentionEngine::new(
            fx.versions.clone(),
            fx.settings.clone(),
            documents,
            Arc::new(GlobalConfig::default()),
        );

        let report = engine.prune_orphans().await.unwrap();
        assert_eq!(report, CleanupReport::default());
        assert_eq!(fx.count("gone").await, 3);
        assert!(fx.settings.get_settings("gone").await.unwrap().require_login_browse);

        // 다음 실행에서는 살아 있는 문서를 가리키므로 고아가 아니다
        assert_eq!(engine.prune_orphans().await.unwrap().deleted_versions, 0);
    }

    #[tokio::test]
    async fn post_cleanup_respects_flag() {
        let fx = Fixture::new().await;
        fx.add("faq-1", "<p>a</p>", Some(5)).await;
        fx.add("faq-1", "<p>b</p>", None).await;
        fx.add("faq-2", "<p>c</p>", Some(6)).await;

        let disabled = fx.engine(
            MemoryDocuments::default(),
            GlobalConfig {
                cleanup_on_delete: false,
                ..GlobalConfig::default()
            },
        );
        assert_eq!(disabled.cleanup_post(5).await.unwrap(), None);
        assert_eq!(fx.count("faq-1").await, 2);

        let enabled = fx.engine(MemoryDocuments::default(), GlobalConfig::default());
        let report = enabled.cleanup_post(5).await.unwrap().unwrap();
        assert_eq!(report.deleted_versions, 2);
        assert_eq!(fx.count("faq-1").await, 0);
        assert_eq!(fx.count("faq-2").await, 1);
    }
}
