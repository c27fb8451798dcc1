//! 응답 결정 모듈
//!
//! 인사말이면 고정 답변을 돌려주고, 아니면 관련 청크를 붙인 프롬프트를
//! 채팅 엔진에 보냅니다.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::chat::{ChatEngine, ChatMemory};
use crate::index::{RetrievedNode, Retriever};

/// 모델에게 주는 답변 범위 지시문
pub const INSTRUCTION: &str = "Please answer only questions relevant to the provided documents. \
Do not answer out-of-context questions. If out of context is asked avoid hallucinating the answer. \
Provide a short detailed answer for contextual answers only.";

/// 인사말 → 고정 답변 (소문자 키)
pub const CASUAL_RESPONSES: &[(&str, &str)] = &[
    ("thank you", "You're welcome!"),
    ("thanks", "You're welcome!"),
    ("hello", "Hi there! How can I assist you today?"),
    ("hi", "Hello! What can I do for you?"),
    ("bye", "Goodbye! Have a great day!"),
];

/// 인사말이면 고정 답변 반환
///
/// 앞뒤 공백을 무시하고 대소문자 구분 없이 정확히 일치해야 합니다.
pub fn casual_response(prompt: &str) -> Option<&'static str> {
    let key = prompt.trim().to_lowercase();
    CASUAL_RESPONSES
        .iter()
        .find(|(phrase, _)| *phrase == key)
        .map(|(_, reply)| *reply)
}

/// 지시문 + 질문 + 검색된 청크를 이어 붙인 프롬프트
pub fn build_augmented_prompt(prompt: &str, nodes: &[RetrievedNode]) -> String {
    let mut augmented = format!("{}\n\n{}\n\nRelevant Documents:\n", INSTRUCTION, prompt);
    for node in nodes {
        augmented.push_str(&node.text);
        augmented.push_str("\n\n");
    }
    augmented
}

// ============================================================================
// Resolution
// ============================================================================

/// 답변 출처
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// 인사말 테이블
    Casual,
    /// 문서 검색 + LLM
    Retrieved,
}

/// 결정된 답변
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// 인사말 고정 답변
    Casual(String),
    /// 검색된 청크를 붙여 받은 답변
    Retrieved {
        content: String,
        sources: Vec<RetrievedNode>,
    },
}

impl Resolution {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Resolution::Casual(_) => ResponseKind::Casual,
            Resolution::Retrieved { .. } => ResponseKind::Retrieved,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Resolution::Casual(content) | Resolution::Retrieved { content, .. } => content,
        }
    }

    /// 프롬프트에 붙인 청크 (인사말이면 빈 슬라이스)
    pub fn sources(&self) -> &[RetrievedNode] {
        match self {
            Resolution::Casual(_) => &[],
            Resolution::Retrieved { sources, .. } => sources,
        }
    }
}

// ============================================================================
// ResponseResolver
// ============================================================================

/// 응답 결정기
pub struct ResponseResolver {
    retriever: Arc<dyn Retriever>,
    engine: Arc<dyn ChatEngine>,
}

impl ResponseResolver {
    pub fn new(retriever: Arc<dyn Retriever>, engine: Arc<dyn ChatEngine>) -> Self {
        Self { retriever, engine }
    }

    /// 사용자 메시지에 대한 답변 결정
    ///
    /// 인사말이 아니면 검색 1회, 채팅 호출 1회를 수행합니다.
    pub async fn resolve(&self, memory: &mut ChatMemory, prompt: &str) -> Result<Resolution> {
        if let Some(reply) = casual_response(prompt) {
            tracing::debug!("Casual response for {:?}", prompt);
            return Ok(Resolution::Casual(reply.to_string()));
        }

        let nodes = self
            .retriever
            .retrieve(prompt)
            .await
            .context("Failed to retrieve relevant documents")?;

        let augmented = build_augmented_prompt(prompt, &nodes);
        let response = self
            .engine
            .chat(memory, &augmented)
            .await
            .context("Chat engine failed")?;

        tracing::info!(
            "Answered with {} retrieved nodes ({} chars)",
            nodes.len(),
            response.response.len()
        );

        Ok(Resolution::Retrieved {
            content: response.response,
            sources: nodes,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    //! 호출 횟수를 세는 가짜 검색기/채팅 엔진

    use super::*;
    use crate::chat::ChatResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub struct CountingRetriever {
        pub calls: AtomicUsize,
        pub texts: Vec<String>,
    }

    impl CountingRetriever {
        pub fn new(texts: &[&str]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                texts: texts.iter().map(|s| s.to_string()).collect(),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Retriever for CountingRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedNode>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .texts
                .iter()
                .enumerate()
                .map(|(i, text)| RetrievedNode {
                    doc_id: i as i64 + 1,
                    chunk_index: 0,
                    text: text.clone(),
                    score: 1.0 - i as f32 * 0.1,
                    source: Some(format!("doc{}.txt", i + 1)),
                    page: None,
                })
                .collect())
        }
    }

    pub struct CountingEngine {
        pub calls: AtomicUsize,
        pub prompts: Mutex<Vec<String>>,
        pub reply: String,
        pub fail: bool,
    }

    impl CountingEngine {
        pub fn new(reply: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
                reply: reply.to_string(),
                fail: false,
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new("")
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatEngine for CountingEngine {
        async fn chat(&self, memory: &mut ChatMemory, message: &str) -> Result<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(message.to_string());
            if self.fail {
                anyhow::bail!("LLM unavailable");
            }
            memory.record(message, self.reply.clone());
            Ok(ChatResponse {
                response: self.reply.clone(),
                source_nodes: Vec::new(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{CountingEngine, CountingRetriever};
    use super::*;

    fn resolver(
        texts: &[&str],
        reply: &str,
    ) -> (ResponseResolver, Arc<CountingRetriever>, Arc<CountingEngine>) {
        let retriever = Arc::new(CountingRetriever::new(texts));
        let engine = Arc::new(CountingEngine::new(reply));
        (
            ResponseResolver::new(retriever.clone(), engine.clone()),
            retriever,
            engine,
        )
    }

    #[test]
    fn test_casual_response_case_insensitive() {
        assert_eq!(casual_response("hello"), Some("Hi there! How can I assist you today?"));
        assert_eq!(casual_response("HeLLo"), Some("Hi there! How can I assist you today?"));
        assert_eq!(casual_response("  Thank You \n"), Some("You're welcome!"));
        assert_eq!(casual_response("Bye"), Some("Goodbye! Have a great day!"));
        assert_eq!(casual_response("hi"), Some("Hello! What can I do for you?"));
    }

    #[test]
    fn test_casual_response_requires_exact_phrase() {
        assert_eq!(casual_response("hello there"), None);
        assert_eq!(casual_response("hi!"), None);
        assert_eq!(casual_response("what is this document about?"), None);
        assert_eq!(casual_response(""), None);
    }

    #[test]
    fn test_casual_table_keys_are_lowercase() {
        for (phrase, _) in CASUAL_RESPONSES {
            assert_eq!(*phrase, phrase.to_lowercase());
        }
    }

    #[test]
    fn test_build_augmented_prompt_layout() {
        let nodes = vec![
            RetrievedNode {
                doc_id: 1,
                chunk_index: 0,
                text: "Chunk one.".to_string(),
                score: 0.9,
                source: None,
                page: None,
            },
            RetrievedNode {
                doc_id: 2,
                chunk_index: 3,
                text: "Chunk two.".to_string(),
                score: 0.8,
                source: None,
                page: None,
            },
        ];

        let prompt = build_augmented_prompt("What is it?", &nodes);
        assert_eq!(
            prompt,
            format!(
                "{}\n\nWhat is it?\n\nRelevant Documents:\nChunk one.\n\nChunk two.\n\n",
                INSTRUCTION
            )
        );
    }

    #[test]
    fn test_build_augmented_prompt_without_nodes() {
        let prompt = build_augmented_prompt("q", &[]);
        assert!(prompt.ends_with("q\n\nRelevant Documents:\n"));
    }

    #[tokio::test]
    async fn test_greeting_skips_retrieval_and_chat() {
        let (resolver, retriever, engine) = resolver(&["ctx"], "unused");
        let mut memory = ChatMemory::default();

        for greeting in ["hello", "THANKS", " bye "] {
            let resolution = resolver.resolve(&mut memory, greeting).await.unwrap();
            assert_eq!(resolution.kind(), ResponseKind::Casual);
            assert!(resolution.sources().is_empty());
        }

        assert_eq!(retriever.calls(), 0);
        assert_eq!(engine.calls(), 0);
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_question_uses_one_retrieval_and_one_chat() {
        let (resolver, retriever, engine) = resolver(&["Alpha text.", "Beta text."], "Answer.");
        let mut memory = ChatMemory::default();

        let resolution = resolver
            .resolve(&mut memory, "What does alpha say?")
            .await
            .unwrap();

        assert_eq!(resolution.kind(), ResponseKind::Retrieved);
        assert_eq!(resolution.content(), "Answer.");
        assert_eq!(resolution.sources().len(), 2);
        assert_eq!(retriever.calls(), 1);
        assert_eq!(engine.calls(), 1);

        let prompts = engine.prompts.lock().unwrap();
        assert!(prompts[0].starts_with(INSTRUCTION));
        assert!(prompts[0].contains("What does alpha say?\n\nRelevant Documents:\nAlpha text.\n\nBeta text.\n\n"));
    }

    #[tokio::test]
    async fn test_engine_failure_propagates() {
        let retriever = Arc::new(CountingRetriever::new(&[]));
        let engine = Arc::new(CountingEngine::failing());
        let resolver = ResponseResolver::new(retriever, engine);
        let mut memory = ChatMemory::default();

        let err = resolver.resolve(&mut memory, "question").await.unwrap_err();
        assert!(format!("{:#}", err).contains("LLM unavailable"));
    }
}
