//! # 라우트 핸들러 모듈
//!
//! HTTP 요청을 처리하는 핸들러 함수들을 모아둔 모듈입니다.
//!
//! 각 하위 모듈:
//! - `blocks`: 버전 제안/목록/병합, 현재 콘텐츠, 구조화 저장 (+ `AppState`)
//! - `settings`: 블록 설정 조회/저장
//! - `admin`: 통계와 정리 작업
//! - `nonces`: 위조 방지 토큰 발급
//! - `health`: 서버 상태 확인

pub mod admin;
pub mod blocks;
pub mod health;
pub mod nonces;
pub mod settings;

pub use admin::*;
pub use blocks::*;
pub use health::*;
pub use nonces::*;
pub use settings::*;
