//! HTTP 핸들러

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, Json},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::index::{IndexAction, RetrievedNode};
use crate::resolver::ResponseKind;
use crate::session::ChatTurn;

const INDEX_HTML: &str = include_str!("static/index.html");

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub index: Option<IndexAction>,
    pub documents: usize,
    pub chunks: usize,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub messages: Vec<ChatTurn>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<Uuid>,
    pub message: String,
}

/// 답변 근거 청크 요약
#[derive(Debug, Serialize)]
pub struct SourceRef {
    pub source: Option<String>,
    pub page: Option<usize>,
    pub score: f32,
    pub excerpt: String,
}

impl From<&RetrievedNode> for SourceRef {
    fn from(node: &RetrievedNode) -> Self {
        Self {
            source: node.source.clone(),
            page: node.page,
            score: node.score,
            excerpt: excerpt(&node.text, 200),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    pub session_id: Uuid,
    pub reply: String,
    pub kind: ResponseKind,
    pub sources: Vec<SourceRef>,
    pub messages: Vec<ChatTurn>,
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

fn parse_session_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid session id: {}", raw)))
}

// ============================================================================
// Handlers
// ============================================================================

/// 채팅 페이지
pub async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.info.model.clone(),
        index: state.info.index_action,
        documents: state.info.document_count,
        chunks: state.info.chunk_count,
        sessions: state.sessions.len().await,
    })
}

/// 새 세션 (안내 메시지 포함)
pub async fn create_session_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionResponse>) {
    let (session_id, handle) = state.sessions.create().await;
    let messages = handle.lock().await.transcript().to_vec();
    (
        StatusCode::CREATED,
        Json(SessionResponse {
            session_id,
            messages,
        }),
    )
}

pub async fn messages_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    let session_id = parse_session_id(&id)?;
    let handle = state
        .sessions
        .get(session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", session_id)))?;

    let messages = handle.lock().await.transcript().to_vec();
    Ok(Json(SessionResponse {
        session_id,
        messages,
    }))
}

pub async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let session_id = parse_session_id(&id)?;
    if state.sessions.remove(session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Session not found: {}", session_id)))
    }
}

/// 메시지 한 번 처리
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponseBody>> {
    let (session_id, handle) = state.sessions.get_or_create(req.session_id).await?;

    let mut session = handle.lock().await;
    let resolution = session.interact(&state.resolver, &req.message).await?;

    tracing::info!(
        "Session {}: {:?} reply ({} sources)",
        session_id,
        resolution.kind(),
        resolution.sources().len()
    );

    Ok(Json(ChatResponseBody {
        session_id,
        reply: resolution.content().to_string(),
        kind: resolution.kind(),
        sources: resolution.sources().iter().map(SourceRef::from).collect(),
        messages: session.transcript().to_vec(),
    }))
}
