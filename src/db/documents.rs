//! # 호스트 문서 조회
//!
//! 블록이 실려 있는 문서(post)는 호스트 CMS가 소유합니다.
//! 이 모듈은 `documents` 테이블을 읽기만 하며, 고아 블록 판정에 필요한 두 가지 질문에 답합니다.
//! - 이 post_id의 문서가 아직 살아 있는가?
//! - 살아 있는 문서 중 본문에 이 block_id가 등장하는 것이 있는가?

use crate::error::AppError;
use crate::services::documents::DocumentSource;
use sqlx::SqlitePool;

/// 삭제되지 않은 것으로 보는 문서 상태
const LIVE_STATUSES: &str = "('publish', 'draft', 'private', 'pending')";

#[derive(Clone)]
pub struct SqliteDocuments {
    pool: SqlitePool,
}

impl SqliteDocuments {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl DocumentSource for SqliteDocuments {
    async fn exists(&self, post_id: i64) -> Result<bool, AppError> {
        let found: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT id FROM documents WHERE id = ? AND status IN {LIVE_STATUSES}"
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    async fn content_mentions(&self, needle: &str) -> Result<bool, AppError> {
        // LIKE는 '_'를 와일드카드로 해석하므로 instr로 그대로 비교한다
        let found: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT id FROM documents WHERE instr(content, ?) > 0 AND status IN {LIVE_STATUSES} LIMIT 1"
        ))
        .bind(needle)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn add_document(pool: &SqlitePool, id: i64, content: &str, status: &str) {
        sqlx::query("INSERT INTO documents (id, content, status) VALUES (?, ?, ?)")
            .bind(id)
            .bind(content)
            .bind(status)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn trashed_documents_do_not_count() {
        let pool = test_pool().await;
        add_document(&pool, 1, r#"<div data-block-id="faq-1"></div>"#, "publish").await;
        add_document(&pool, 2, r#"<div data-block-id="faq-2"></div>"#, "trash").await;
        let documents = SqliteDocuments::new(pool);

        assert!(documents.exists(1).await.unwrap());
        assert!(!documents.exists(2).await.unwrap());
        assert!(!documents.exists(3).await.unwrap());

        assert!(documents.content_mentions("faq-1").await.unwrap());
        assert!(!documents.content_mentions("faq-2").await.unwrap());
    }

    #[tokio::test]
    async fn underscore_is_literal() {
        let pool = test_pool().await;
        add_document(&pool, 1, "block wikiXblock here", "draft").await;
        let documents = SqliteDocuments::new(pool);

        assert!(!documents.content_mentions("wiki_block").await.unwrap());
        assert!(documents.content_mentions("wikiXblock").await.unwrap());
    }
}
