//! # wiki-blocks 서버 진입점
//!
//! 협업형 콘텐츠 블록의 버전 이력, 블록별 권한, 정리 작업을 제공하는 HTTP 서버입니다.
//!
//! 이 파일이 수행하는 작업:
//! 1. 환경변수(.env) 로딩
//! 2. 로깅(tracing) 초기화
//! 3. SQLite 연결 풀 생성과 마이그레이션
//! 4. 컴포넌트 조립 (AppState)
//! 5. API 라우터 설정과 HTTP 서버 시작

mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use config::Config;
use routes::*;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1단계: 환경변수 로딩 ──
    // .env 파일이 없어도 에러 없이 넘어갑니다.
    dotenvy::dotenv().ok();

    // ── 2단계: 로깅 초기화 ──
    // RUST_LOG가 없으면 wiki_blocks, tower_http, axum 모듈을 debug 레벨로 설정
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wiki_blocks=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── 3단계: 설정 로딩 ──
    let config = Config::from_env()?;
    tracing::info!("Starting wiki-blocks server on {}:{}", config.host, config.port);
    tracing::debug!(
        keep_days = config.global.keep_days,
        max_versions_per_block = config.global.max_versions_per_block,
        cleanup_on_delete = config.global.cleanup_on_delete,
        "Loaded global defaults"
    );

    // ── 4단계: 데이터베이스 연결과 마이그레이션 ──
    let pool = db::connect(&config.database_url, 5).await?;
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    // ── 5단계: 컴포넌트 조립 ──
    // 저장소, 권한 판정기, 조정기, 정리 엔진을 한 번 만들어 모든 핸들러가 공유합니다.
    let state = AppState::new(pool, config.jwt_secret.clone(), config.global.clone());

    // ── 6단계: API 라우터 설정 ──
    // {block_id}, {post_id}는 URL 경로 파라미터 (Path<T>로 핸들러에서 추출)
    let block_routes = Router::new()
        .route("/blocks/{block_id}/versions", get(list_versions).post(suggest_change))
        .route("/blocks/{block_id}/merge", post(merge_version))
        .route("/blocks/{block_id}/current", get(get_current_content))
        .route(
            "/blocks/{block_id}/settings",
            get(get_block_settings).put(save_block_settings),
        )
        .route("/posts/{post_id}/blocks", post(structured_save).delete(cleanup_post));

    let admin_routes = Router::new()
        .route("/admin/stats", get(get_stats))
        .route("/admin/cleanup/versions", post(cleanup_versions))
        .route("/admin/cleanup/orphans", post(cleanup_orphans))
        .route("/admin/cleanup/activity", post(cleanup_activity));

    let api_routes = Router::new()
        .merge(block_routes)
        .merge(admin_routes)
        .route("/nonces/{action}", get(issue_nonce))
        .route("/health", get(health_check))
        .with_state(state);

    // ── 7단계: CORS 미들웨어 설정 ──
    // 위조 방지 토큰 헤더(X-WB-Nonce)를 포함해 모든 헤더를 허용합니다.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // ── 8단계: 서버 시작 ──
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
