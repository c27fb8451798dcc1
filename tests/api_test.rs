//! HTTP API 통합 테스트 (네트워크/모델 없이 가짜 검색기와 엔진 사용)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use rag_chatbot::{
    create_router, AppState, ChatEngine, ChatMemory, ChatResponse, IndexAction, ResponseResolver,
    RetrievedNode, Retriever, ServerInfo, INSTRUCTION, WELCOME_MESSAGE,
};

#[derive(Default)]
struct FakeRetriever {
    calls: AtomicUsize,
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedNode>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![RetrievedNode {
            doc_id: 1,
            chunk_index: 0,
            text: "The warranty lasts two years.".to_string(),
            score: 0.87,
            source: Some("data/manual.pdf".to_string()),
            page: Some(3),
        }])
    }
}

#[derive(Default)]
struct FakeEngine {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatEngine for FakeEngine {
    async fn chat(&self, memory: &mut ChatMemory, message: &str) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(message.starts_with(INSTRUCTION));
        assert!(message.contains("Relevant Documents:\nThe warranty lasts two years.\n\n"));
        let reply = "Two years.".to_string();
        memory.record(message, reply.clone());
        Ok(ChatResponse {
            response: reply,
            source_nodes: Vec::new(),
        })
    }
}

struct Harness {
    app: Router,
    retriever: Arc<FakeRetriever>,
    engine: Arc<FakeEngine>,
}

fn harness() -> Harness {
    let retriever = Arc::new(FakeRetriever::default());
    let engine = Arc::new(FakeEngine::default());
    let resolver = ResponseResolver::new(retriever.clone(), engine.clone());
    let info = ServerInfo {
        model: "gpt-3.5-turbo".to_string(),
        index_action: Some(IndexAction::Load),
        document_count: 1,
        chunk_count: 4,
    };
    Harness {
        app: create_router(AppState::new(resolver, info)),
        retriever,
        engine,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn new_session(app: &Router) -> String {
    let (status, body) = send(
        app,
        Request::builder()
            .method("POST")
            .uri("/api/sessions")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_index_page_is_served() {
    let h = harness();
    let response = h.app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("RAG CHATBOT"));
    assert!(html.contains("Your question"));
    assert!(html.contains("Thinking...."));
}

#[tokio::test]
async fn test_health_reports_index() {
    let h = harness();
    let (status, body) = send(&h.app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["index"], "load");
    assert_eq!(body["chunks"], 4);
}

#[tokio::test]
async fn test_new_session_starts_with_welcome() {
    let h = harness();
    let id = new_session(&h.app).await;

    let (status, body) = send(&h.app, get(&format!("/api/sessions/{}/messages", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["messages"],
        json!([{ "role": "assistant", "content": WELCOME_MESSAGE }])
    );
}

#[tokio::test]
async fn test_greeting_answers_without_retrieval() {
    let h = harness();
    let id = new_session(&h.app).await;

    let (status, body) = send(
        &h.app,
        post_json("/api/chat", json!({ "session_id": id, "message": "  Hello " })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "Hi there! How can I assist you today?");
    assert_eq!(body["kind"], "casual");
    assert_eq!(body["messages"].as_array().unwrap().len(), 3);
    assert_eq!(h.retriever.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_question_grows_transcript_by_one_pair() {
    let h = harness();
    let id = new_session(&h.app).await;

    for expected_len in [3, 5] {
        let (status, body) = send(
            &h.app,
            post_json(
                "/api/chat",
                json!({ "session_id": id, "message": "How long is the warranty?" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "Two years.");
        assert_eq!(body["kind"], "retrieved");
        assert_eq!(body["sources"][0]["source"], "data/manual.pdf");
        assert_eq!(body["sources"][0]["page"], 3);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), expected_len);
        assert_eq!(messages[expected_len - 2]["role"], "user");
        assert_eq!(messages[expected_len - 1]["content"], "Two years.");
    }

    assert_eq!(h.retriever.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.engine.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_chat_without_session_creates_one() {
    let h = harness();
    let (status, body) = send(&h.app, post_json("/api/chat", json!({ "message": "bye" }))).await;

    assert_eq!(status, StatusCode::OK);
    let id = body["session_id"].as_str().unwrap();
    let (status, body) = send(&h.app, get(&format!("/api/sessions/{}/messages", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"][2]["content"], "Goodbye! Have a great day!");
}

#[tokio::test]
async fn test_blank_message_is_bad_request() {
    let h = harness();
    let id = new_session(&h.app).await;

    let (status, body) = send(
        &h.app,
        post_json("/api/chat", json!({ "session_id": id, "message": "   " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (_, body) = send(&h.app, get(&format!("/api/sessions/{}/messages", id))).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let h = harness();
    let missing = uuid::Uuid::new_v4();

    let (status, body) = send(
        &h.app,
        post_json("/api/chat", json!({ "session_id": missing, "message": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&h.app, get(&format!("/api/sessions/{}/messages", missing))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&h.app, get("/api/sessions/not-a-uuid/messages")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_session() {
    let h = harness();
    let id = new_session(&h.app).await;
    let delete = |id: &str| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/api/sessions/{}", id))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send(&h.app, delete(&id)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&h.app, delete(&id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
