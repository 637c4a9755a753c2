use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityEntry {
    pub id: i64,
    pub block_id: String,
    pub post_id: Option<i64>,
    pub author_id: String,
    pub version_number: i64,
    pub change_summary: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_versions: i64,
    pub total_blocks: i64,
    pub total_users: i64,
    pub recent_activity: Vec<ActivityEntry>,
}

/// 정리 작업 결과. 삭제된 행 수를 보고합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted_versions: u64,
    pub deleted_settings: u64,
}
