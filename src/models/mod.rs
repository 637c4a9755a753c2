//! # 데이터 모델 모듈
//!
//! 애플리케이션에서 사용하는 데이터 구조체(struct)들을 정의합니다.
//! - `version`: 블록 버전과 버전 관련 요청/응답
//! - `settings`: 블록별 권한 설정
//! - `stats`: 관리자 통계와 정리 결과
//!
//! `pub use X::*;`로 재공개하므로 `crate::models::BlockVersion`처럼 짧게 접근할 수 있습니다.

pub mod settings;
pub mod stats;
pub mod version;

pub use settings::*;
pub use stats::*;
pub use version::*;
