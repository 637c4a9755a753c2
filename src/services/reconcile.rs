//! # 편집 조정(reconciliation)
//!
//! 블록 콘텐츠가 저장되는 경로는 두 가지이며, 호출자가 `EditPathway`로 명시합니다.
//!
//! - `Suggestion`: 무조건 새 (비현재) 버전을 기록합니다. 검토자가 병합해야 현재가 됩니다.
//! - `Structured`: 구조화 편집기의 문서 저장. 실제 변경일 때만 버전을 만들고 곧바로 현재로 승격합니다.
//!
//! 구조화 경로의 판단 순서:
//! 1. 정화한 입력과 현재 버전을 정규화해서 비교, 같으면 아무것도 하지 않음
//! 2. stale-write 가드: 현재 버전이 최근에 다른 사람에 의해 만들어졌고
//!    입력이 과거 버전 중 하나와 같다면, 편집기가 병합 이전 스냅샷을 되돌려 보낸 것으로 보고 무시
//! 3. 그 외에는 새 버전을 기록하고 현재로 승격
//!
//! 구조화 경로의 실패는 호출자에게 전달되지 않습니다. 로그만 남기고 `Skipped`를 돌려줍니다.

use crate::error::AppError;
use crate::models::{BlockVersion, NewVersion};
use crate::services::content;
use crate::services::version_store::VersionStore;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// 구조화 저장으로 만들어진 버전의 변경 요약
pub const STRUCTURED_SUMMARY: &str = "Edited in structured editor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditPathway {
    Structured,
    Suggestion,
}

#[derive(Debug, Clone, Copy)]
pub struct Edit<'a> {
    pub block_id: &'a str,
    pub content: &'a str,
    pub author_id: &'a str,
    pub change_summary: Option<&'a str>,
    pub post_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum EditOutcome {
    /// 제안으로 기록됨 (현재 버전은 그대로)
    Suggested(BlockVersion),
    /// 구조화 저장으로 기록되고 현재가 됨
    Recorded(BlockVersion),
    /// 현재 버전과 같은 내용
    Unchanged,
    /// 병합 이전 스냅샷의 재전송으로 판단해 무시함
    StaleEcho,
    /// 실패해서 건너뜀 (로그에만 남음)
    Skipped,
}

#[derive(Clone)]
pub struct Reconciler {
    versions: VersionStore,
    stale_window: Duration,
}

impl Reconciler {
    pub fn new(versions: VersionStore, stale_window: Duration) -> Self {
        Self {
            versions,
            stale_window,
        }
    }

    pub async fn record(
        &self,
        pathway: EditPathway,
        edit: Edit<'_>,
    ) -> Result<EditOutcome, AppError> {
        match pathway {
            EditPathway::Suggestion => {
                let version = self
                    .versions
                    .insert_version(NewVersion {
                        block_id: edit.block_id,
                        content: edit.content,
                        author_id: edit.author_id,
                        change_summary: edit.change_summary,
                        post_id: edit.post_id,
                    })
                    .await?;
                Ok(EditOutcome::Suggested(version))
            }
            EditPathway::Structured => Ok(self.reconcile_quietly(edit).await),
        }
    }

    async fn reconcile_quietly(&self, edit: Edit<'_>) -> EditOutcome {
        match self.reconcile(edit).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(block_id = %edit.block_id, "Skipped block reconciliation: {}", e);
                EditOutcome::Skipped
            }
        }
    }

    async fn reconcile(&self, edit: Edit<'_>) -> Result<EditOutcome, AppError> {
        content::validate_block_id(edit.block_id)?;
        content::validate_content(edit.content)?;

        let incoming = self.versions.sanitize(edit.content);
        let current = self.versions.get_current_version(edit.block_id).await?;

        if let Some(current) = &current {
            if content::normalize_for_comparison(&incoming)
                == content::normalize_for_comparison(&current.content)
            {
                return Ok(EditOutcome::Unchanged);
            }

            if current.author_id != edit.author_id
                && self.is_recent(&current.created_at)
                && self
                    .versions
                    .find_matching_version(edit.block_id, &incoming)
                    .await?
                    .is_some()
            {
                tracing::info!(
                    block_id = %edit.block_id,
                    author_id = %edit.author_id,
                    "Ignored stale structured save"
                );
                return Ok(EditOutcome::StaleEcho);
            }
        }

        let version = self
            .versions
            .insert_version(NewVersion {
                block_id: edit.block_id,
                content: &incoming,
                author_id: edit.author_id,
                change_summary: Some(STRUCTURED_SUMMARY),
                post_id: edit.post_id,
            })
            .await?;

        if !version.is_current && !self.versions.merge_version(version.id).await? {
            return Err(AppError::Internal(format!(
                "version {} disappeared before merge",
                version.id
            )));
        }

        Ok(EditOutcome::Recorded(BlockVersion {
            is_current: true,
            ..version
        }))
    }

    fn is_recent(&self, created_at: &str) -> bool {
        match parse_timestamp(created_at) {
            Some(created) => Utc::now() - created < self.stale_window,
            None => false,
        }
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ")
        .ok()
        .map(|naive| naive.and_utc())
}
