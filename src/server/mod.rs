//! 브라우저 채팅 UI 서버 (axum)

pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::index::{IndexAction, IndexStats};
use crate::resolver::ResponseResolver;
use crate::session::SessionStore;

pub use error::{ApiError, ApiResult};

/// 이 시간 넘게 쉬는 세션은 정리
pub const SESSION_MAX_IDLE: Duration = Duration::from_secs(60 * 60);

const PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// health 응답용 정적 정보
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    pub model: String,
    pub index_action: Option<IndexAction>,
    pub document_count: usize,
    pub chunk_count: usize,
}

impl ServerInfo {
    pub fn new(model: impl Into<String>, action: IndexAction, stats: &IndexStats) -> Self {
        Self {
            model: model.into(),
            index_action: Some(action),
            document_count: stats.document_count,
            chunk_count: stats.chunk_count,
        }
    }
}

/// 핸들러 공유 상태
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<ResponseResolver>,
    pub sessions: Arc<SessionStore>,
    pub info: Arc<ServerInfo>,
}

impl AppState {
    pub fn new(resolver: ResponseResolver, info: ServerInfo) -> Self {
        Self {
            resolver: Arc::new(resolver),
            sessions: Arc::new(SessionStore::new()),
            info: Arc::new(info),
        }
    }
}

/// 라우터 생성
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index_page))
        .route("/api/health", get(handlers::health_handler))
        .route("/api/sessions", post(handlers::create_session_handler))
        .route(
            "/api/sessions/{id}",
            axum::routing::delete(handlers::delete_session_handler),
        )
        .route("/api/sessions/{id}/messages", get(handlers::messages_handler))
        .route("/api/chat", post(handlers::chat_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 서버 실행 (Ctrl+C로 종료)
pub async fn run(bind: SocketAddr, state: AppState) -> Result<()> {
    let sessions = state.sessions.clone();
    let pruner = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            sessions.prune_idle(SESSION_MAX_IDLE).await;
        }
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    tracing::info!("Chat UI listening on http://{}", bind);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    pruner.abort();
    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
