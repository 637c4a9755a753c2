//! # 서비스 계층
//!
//! DB 함수 위의 도메인 로직입니다.
//! - `content`: 검증, 정규화, 디코딩, 정화 (순수 함수)
//! - `cache`: TTL 읽기 캐시
//! - `version_store` / `settings_store`: 캐시를 갖춘 저장소
//! - `permissions`: 권한 판정
//! - `reconcile`: 구조화 저장과 제안 경로의 버전 기록
//! - `retention`: 정리 작업
//! - `documents`: 호스트 문서 저장소 인터페이스

pub mod cache;
pub mod content;
pub mod documents;
pub mod permissions;
pub mod reconcile;
pub mod retention;
pub mod settings_store;
pub mod version_store;
