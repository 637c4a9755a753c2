//! # 데이터베이스 접근 계층 (Data Access Layer)
//!
//! 데이터베이스와 직접 상호작용하는 함수들을 모아둔 모듈입니다.
//! 서비스 계층(services/)이 이 함수들을 호출하고, 캐시 무효화는 서비스 쪽 책임입니다.
//!
//! 각 하위 모듈:
//! - `versions`: 버전 원장 삽입/조회/병합
//! - `settings`: 블록별 권한 오버라이드
//! - `retention`: 정리 작업용 삭제 쿼리
//! - `stats`: 관리자 통계
//! - `documents`: 호스트 문서 테이블 읽기

pub mod documents;
pub mod retention;
pub mod settings;
pub mod stats;
pub mod versions;

pub use documents::SqliteDocuments;
pub use settings::*;
pub use stats::*;
pub use versions::*;

use crate::error::AppError;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool};

/// 데이터베이스가 없으면 만들고 연결 풀을 엽니다.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, AppError> {
    if !Sqlite::database_exists(url).await? {
        tracing::info!("Creating database at {}", url);
        Sqlite::create_database(url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;

    Ok(pool)
}

/// 아직 적용되지 않은 마이그레이션을 순서대로 실행합니다.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// 테스트마다 격리된 인메모리 DB
///
/// 인메모리 DB는 마지막 연결이 닫히면 사라지므로
/// 연결 하나를 유휴 타임아웃 없이 계속 붙잡아 둡니다.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let url = format!(
        "sqlite://dbmem{}?mode=memory&cache=private",
        uuid::Uuid::now_v7().simple()
    );
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None::<std::time::Duration>)
        .max_lifetime(None::<std::time::Duration>)
        .connect(&url)
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}
