use serde::{Deserialize, Serialize};

/// 블록 콘텐츠의 불변 스냅샷 한 건
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlockVersion {
    pub id: i64,
    pub block_id: String,
    pub post_id: Option<i64>,
    pub content: String,
    /// 비교용으로 정규화한 콘텐츠의 SHA-256 (내부 전용)
    #[serde(skip_serializing, default)]
    pub content_hash: String,
    pub author_id: String,
    pub version_number: i64,
    pub is_current: bool,
    pub change_summary: Option<String>,
    pub created_at: String,
}

/// 새 버전 삽입에 필요한 값
#[derive(Debug, Clone)]
pub struct NewVersion<'a> {
    pub block_id: &'a str,
    pub content: &'a str,
    pub author_id: &'a str,
    pub change_summary: Option<&'a str>,
    pub post_id: Option<i64>,
}

/// `POST /blocks/{block_id}/versions`
#[derive(Debug, Deserialize)]
pub struct SuggestChangeRequest {
    pub content: String,
    pub change_summary: Option<String>,
    pub post_id: Option<i64>,
}

/// `POST /blocks/{block_id}/merge`
#[derive(Debug, Deserialize)]
pub struct MergeVersionRequest {
    pub version_id: i64,
}

/// 구조화 편집기 저장에 포함된 블록 하나
#[derive(Debug, Clone, Deserialize)]
pub struct StructuredBlock {
    pub block_id: String,
    pub content: String,
}

/// `POST /posts/{post_id}/blocks`
#[derive(Debug, Deserialize)]
pub struct StructuredSaveRequest {
    pub blocks: Vec<StructuredBlock>,
}

#[derive(Debug, Serialize)]
pub struct VersionListResponse {
    pub versions: Vec<BlockVersion>,
    pub can_merge: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CurrentContent {
    pub content: String,
}
