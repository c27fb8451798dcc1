//! LLM 모듈 - OpenAI Chat Completions API 클라이언트
//!
//! ref: https://platform.openai.com/docs/api-reference/chat

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{get_api_key, ChatbotConfig};
use crate::embedding::{backoff, describe_api_error, is_retryable, RateLimiter, MAX_RETRIES};

// ============================================================================
// Types
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// LLM에 보내는 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

// ============================================================================
// LanguageModel Trait
// ============================================================================

/// 언어 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 메시지 목록에 대한 응답 생성
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Chat
// ============================================================================

/// 호출 간 최소 딜레이
const MIN_DELAY_MS: u64 = 100;

/// OpenAI Chat Completions 구현체
#[derive(Debug)]
pub struct OpenAiChat {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    /// 새 클라이언트 생성
    pub fn new(
        api_key: String,
        base_url: &str,
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens,
            temperature,
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(Duration::from_millis(
                MIN_DELAY_MS,
            )))),
        })
    }

    /// 설정과 환경변수의 API 키로 생성
    pub fn from_config(config: &ChatbotConfig) -> Result<Self> {
        let api_key = get_api_key()?;
        let llm = Self::new(
            api_key,
            &config.openai_base_url,
            &config.model,
            config.max_tokens,
            config.temperature,
        )?;
        tracing::info!("Using OpenAI chat model {} (max_tokens: {})", llm.model, llm.max_tokens);
        Ok(llm)
    }
}

/// 응답 본문에서 첫 번째 답변 추출
fn parse_completion(body: &str) -> Result<String> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).context("Failed to parse chat completion response")?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Chat completion response contained no message"))
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=MAX_RETRIES {
            self.rate_limiter.lock().await.acquire().await;

            let response = match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send chat request: {}", e));
                    if attempt < MAX_RETRIES {
                        let wait = backoff(attempt);
                        tracing::warn!(
                            "Chat request failed, retrying in {:?} (attempt {}/{})",
                            wait,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            if status.is_success() {
                return parse_completion(&body);
            }

            if is_retryable(status) {
                last_error = Some(anyhow::anyhow!(describe_api_error(status, &body)));
                if attempt < MAX_RETRIES {
                    let wait = backoff(attempt);
                    tracing::warn!(
                        "Chat API returned {}, backing off {:?} (attempt {}/{})",
                        status,
                        wait,
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(wait).await;
                    continue;
                }
            } else {
                anyhow::bail!(describe_api_error(status, &body));
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Chat completion failed after {} retries", MAX_RETRIES)))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
