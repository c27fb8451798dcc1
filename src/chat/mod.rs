//! Chat 모듈 - condense-question 채팅 엔진
//!
//! 1. 대화 기록이 있으면 후속 질문을 독립 질문으로 다시 씀
//! 2. 독립 질문으로 청크 검색 후 문맥 기반 답변 생성
//! 3. 질문/답변을 세션 메모리에 기록

pub mod prompts;

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::index::{RetrievedNode, Retriever};
use crate::llm::{ChatMessage, LanguageModel};

/// 메모리 기본 문자 예산 (약 3000 토큰)
pub const DEFAULT_MEMORY_CHARS: usize = 12_000;

// ============================================================================
// ChatMemory
// ============================================================================

/// 세션별 채팅 엔진 메모리
///
/// 문자 수 예산을 넘으면 오래된 메시지부터 버립니다.
/// 가장 최근 질문/답변 한 쌍은 예산을 넘어도 남깁니다.
#[derive(Debug, Clone)]
pub struct ChatMemory {
    messages: VecDeque<ChatMessage>,
    max_chars: usize,
}

impl Default for ChatMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CHARS)
    }
}

impl ChatMemory {
    pub fn new(max_chars: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            max_chars,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// 현재 메시지 목록 (오래된 순)
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    /// 질문/답변 한 쌍 기록
    pub fn record(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.messages.push_back(ChatMessage::user(user));
        self.messages.push_back(ChatMessage::assistant(assistant));
        self.trim();
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn total_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }

    fn trim(&mut self) {
        while self.messages.len() > 2 && self.total_chars() > self.max_chars {
            self.messages.pop_front();
        }
    }
}

// ============================================================================
// ChatEngine Trait
// ============================================================================

/// 채팅 엔진 응답
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// 답변 텍스트
    pub response: String,
    /// 답변에 사용한 청크
    pub source_nodes: Vec<RetrievedNode>,
}

/// 채팅 엔진 트레이트
#[async_trait]
pub trait ChatEngine: Send + Sync {
    /// 메시지 하나에 답하고 메모리를 갱신
    async fn chat(&self, memory: &mut ChatMemory, message: &str) -> Result<ChatResponse>;
}

// ============================================================================
// CondenseQuestionChatEngine
// ============================================================================

/// 후속 질문을 독립 질문으로 압축한 뒤 인덱스에 질의하는 엔진
pub struct CondenseQuestionChatEngine {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LanguageModel>,
}

impl CondenseQuestionChatEngine {
    pub fn new(retriever: Arc<dyn Retriever>, llm: Arc<dyn LanguageModel>) -> Self {
        Self { retriever, llm }
    }

    /// 대화 기록 + 메시지 → 독립 질문
    async fn condense(&self, memory: &ChatMemory, message: &str) -> Result<String> {
        if memory.is_empty() {
            return Ok(message.to_string());
        }

        let prompt = prompts::condense_prompt(&memory.messages(), message);
        let question = self
            .llm
            .complete(&[ChatMessage::user(prompt)])
            .await
            .context("Failed to condense question")?;

        tracing::debug!("Condensed question: {}", question);
        if question.trim().is_empty() {
            Ok(message.to_string())
        } else {
            Ok(question)
        }
    }
}

#[async_trait]
impl ChatEngine for CondenseQuestionChatEngine {
    async fn chat(&self, memory: &mut ChatMemory, message: &str) -> Result<ChatResponse> {
        let question = self.condense(memory, message).await?;

        let source_nodes = self
            .retriever
            .retrieve(&question)
            .await
            .context("Failed to retrieve context")?;

        let messages = [
            ChatMessage::system(prompts::QA_SYSTEM_PROMPT),
            ChatMessage::user(prompts::qa_prompt(&source_nodes, &question)),
        ];
        let response = self
            .llm
            .complete(&messages)
            .await
            .context("Failed to generate answer")?;

        memory.record(message, response.clone());

        Ok(ChatResponse {
            response,
            source_nodes,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
