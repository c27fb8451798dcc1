//! 임베딩 모듈 - OpenAI Embeddings API를 통한 텍스트 벡터화
//!
//! 문서 청크와 질문을 같은 벡터 공간으로 옮깁니다.
//! ref: https://platform.openai.com/docs/api-reference/embeddings
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OpenAiEmbedding::from_config(&config)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{get_api_key, ChatbotConfig};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Rate Limiter / Retry
// ============================================================================

/// 호출 간 최소 딜레이
const MIN_DELAY_MS: u64 = 200;
/// 429/5xx 에러 시 최대 재시도 횟수
pub(crate) const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
pub(crate) const INITIAL_BACKOFF_MS: u64 = 1000;
/// 한 요청에 담을 최대 입력 수
const MAX_BATCH_SIZE: usize = 96;

/// 요청 간 최소 간격을 보장하는 Rate Limiter
#[derive(Debug)]
pub(crate) struct RateLimiter {
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub(crate) fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_request: None,
        }
    }

    /// 다음 요청까지 대기
    pub(crate) async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

/// 재시도 대상 상태 코드인지 확인 (429, 5xx)
pub(crate) fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// 지수 백오프 간격
pub(crate) fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
}

/// OpenAI 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiError {
    pub error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiErrorDetail {
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// 에러 응답 본문을 사람이 읽을 수 있는 메시지로
pub(crate) fn describe_api_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<OpenAiError>(body) {
        Ok(err) => format!(
            "OpenAI API error ({}, {}): {}",
            status,
            err.error.kind.as_deref().unwrap_or("unknown"),
            err.error.message
        ),
        Err(_) => format!("OpenAI API error ({}): {}", status, body),
    }
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

/// OpenAI 임베딩 구현체
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Embeddings API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Embeddings API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedding {
    /// 새 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API 키
    /// * `base_url` - API 주소 (예: https://api.openai.com/v1)
    /// * `model` - 임베딩 모델 이름
    /// * `dimension` - 모델이 돌려주는 벡터 차원
    pub fn new(api_key: String, base_url: &str, model: &str, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Invalid dimension: {}. Must be at least 1", dimension);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            dimension,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(Duration::from_millis(
                MIN_DELAY_MS,
            )))),
        })
    }

    /// 설정과 환경변수의 API 키로 생성
    pub fn from_config(config: &ChatbotConfig) -> Result<Self> {
        let api_key = get_api_key()?;
        let embedder = Self::new(
            api_key,
            &config.openai_base_url,
            &config.embedding_model,
            config.embedding_dimension,
        )?;
        tracing::info!(
            "Using OpenAI embedding {} (dimension: {})",
            embedder.model,
            embedder.dimension
        );
        Ok(embedder)
    }

    /// 한 번의 API 호출로 여러 입력 임베딩 (재시도 포함)
    async fn request_embeddings(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            input: inputs,
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
                    last_error = Some(anyhow::anyhow!("Failed to send embedding request: {}", e));
                    if attempt < MAX_RETRIES {
                        let wait = backoff(attempt);
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
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
                let parsed: EmbedResponse =
                    serde_json::from_str(&body).context("Failed to parse embedding response")?;
                return self.order_embeddings(parsed, inputs.len());
            }

            if is_retryable(status) {
                last_error = Some(anyhow::anyhow!(describe_api_error(status, &body)));
                if attempt < MAX_RETRIES {
                    let wait = backoff(attempt);
                    tracing::warn!(
                        "Embedding API returned {}, backing off {:?} (attempt {}/{})",
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
            .unwrap_or_else(|| anyhow::anyhow!("Embedding failed after {} retries", MAX_RETRIES)))
    }

    /// 응답의 `index` 필드로 입력 순서 복원 및 차원 검증
    fn order_embeddings(&self, response: EmbedResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
        if response.data.len() != expected {
            anyhow::bail!(
                "Embedding response has {} items, expected {}",
                response.data.len(),
                expected
            );
        }

        let mut ordered: Vec<Option<Vec<f32>>> = vec![None; expected];
        for item in response.data {
            if item.embedding.len() != self.dimension {
                anyhow::bail!(
                    "Embedding dimension mismatch: got {}, expected {}",
                    item.embedding.len(),
                    self.dimension
                );
            }
            let slot = ordered
                .get_mut(item.index)
                .ok_or_else(|| anyhow::anyhow!("Embedding index {} out of range", item.index))?;
            *slot = Some(item.embedding);
        }

        ordered
            .into_iter()
            .enumerate()
            .map(|(i, e)| e.ok_or_else(|| anyhow::anyhow!("Missing embedding for input {}", i)))
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let mut result = self.request_embeddings(&[text.to_string()]).await?;
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];

        // 빈 텍스트는 API를 거치지 않고 0 벡터
        let pending: Vec<usize> = texts
            .iter()
            .enumerate()
            .filter_map(|(i, t)| {
                if t.trim().is_empty() {
                    None
                } else {
                    Some(i)
                }
            })
            .collect();

        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                results[i] = vec![0.0; self.dimension];
            }
        }

        let batches = pending.chunks(MAX_BATCH_SIZE).count();
        for (batch_no, indices) in pending.chunks(MAX_BATCH_SIZE).enumerate() {
            tracing::debug!("Embedding batch {}/{}", batch_no + 1, batches);
            let inputs: Vec<String> = indices.iter().map(|&i| texts[i].clone()).collect();
            let embeddings = self.request_embeddings(&inputs).await?;
            for (&i, embedding) in indices.iter().zip(embeddings) {
                results[i] = embedding;
            }
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
