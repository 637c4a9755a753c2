//! # 호스트 문서 저장소 인터페이스
//!
//! 정리 엔진은 문서가 살아 있는지, 본문에 block_id가 남아 있는지만 알면 됩니다.
//! 운영에서는 `db::SqliteDocuments`가, 테스트에서는 `MemoryDocuments`가 구현합니다.

use crate::error::AppError;
use std::future::Future;

pub trait DocumentSource: Send + Sync {
    /// 삭제되지 않은 문서인지
    fn exists(&self, post_id: i64) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// 살아 있는 문서 중 본문에 `needle`이 그대로 등장하는 것이 있는지
    fn content_mentions(&self, needle: &str)
        -> impl Future<Output = Result<bool, AppError>> + Send;
}

#[cfg(test)]
pub use memory::MemoryDocuments;
