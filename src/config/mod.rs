//! 설정 모듈
//!
//! 챗봇 실행에 필요한 경로, 모델, 검색 파라미터를 한 곳에 모읍니다.
//! 값은 CLI 플래그 → 환경변수 → 기본값 순으로 결정되며,
//! 환경변수는 `.env` 파일에서도 읽어옵니다 (dotenvy).

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

/// 문서 폴더 기본 경로
pub const DEFAULT_DOCUMENTS_PATH: &str = "./data";

/// 벡터 인덱스 저장 경로 기본값
pub const DEFAULT_STORAGE_PATH: &str = "./vectorstore";

/// 기본 채팅 모델
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// 기본 임베딩 모델
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// OpenAI API 기본 주소
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// API 키 환경변수 이름
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

// ============================================================================
// ChatbotConfig
// ============================================================================

/// 챗봇 설정
///
/// clap `Args`로 선언되어 모든 서브커맨드에서 공유합니다.
#[derive(Debug, Clone, Args)]
pub struct ChatbotConfig {
    /// 문서 폴더 경로
    #[arg(long = "documents", env = "RAG_DOCUMENTS_PATH", default_value = DEFAULT_DOCUMENTS_PATH, global = true)]
    pub documents_path: PathBuf,

    /// 벡터 인덱스 저장 경로
    #[arg(long = "storage", env = "RAG_STORAGE_PATH", default_value = DEFAULT_STORAGE_PATH, global = true)]
    pub storage_path: PathBuf,

    /// 채팅 모델 이름
    #[arg(long, env = "RAG_MODEL", default_value = DEFAULT_MODEL, global = true)]
    pub model: String,

    /// 응답 최대 토큰 수
    #[arg(long, env = "RAG_MAX_TOKENS", default_value_t = 512, global = true)]
    pub max_tokens: u32,

    /// 샘플링 온도
    #[arg(long, env = "RAG_TEMPERATURE", default_value_t = 0.1, global = true)]
    pub temperature: f32,

    /// 임베딩 모델 이름
    #[arg(long, env = "RAG_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL, global = true)]
    pub embedding_model: String,

    /// 임베딩 차원
    #[arg(long, env = "RAG_EMBEDDING_DIMENSION", default_value_t = 1536, global = true)]
    pub embedding_dimension: usize,

    /// 질문당 검색할 청크 수
    #[arg(long = "top-k", env = "RAG_TOP_K", default_value_t = 2, global = true)]
    pub similarity_top_k: usize,

    /// 하위 폴더까지 문서 수집
    #[arg(long, env = "RAG_RECURSIVE", global = true)]
    pub recursive: bool,

    /// OpenAI 호환 API 주소
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL, global = true)]
    pub openai_base_url: String,

    /// 웹 UI 바인드 주소
    #[arg(long, env = "RAG_BIND", default_value = "127.0.0.1:8501", global = true)]
    pub bind: SocketAddr,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            documents_path: PathBuf::from(DEFAULT_DOCUMENTS_PATH),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 512,
            temperature: 0.1,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: 1536,
            similarity_top_k: 2,
            recursive: false,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            bind: SocketAddr::from(([127, 0, 0, 1], 8501)),
        }
    }
}

impl ChatbotConfig {
    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        if self.similarity_top_k == 0 {
            bail!("similarity_top_k must be at least 1");
        }
        if self.max_tokens == 0 {
            bail!("max_tokens must be at least 1");
        }
        if self.model.trim().is_empty() {
            bail!("model name must not be empty");
        }
        if self.embedding_dimension == 0 {
            bail!("embedding_dimension must be at least 1");
        }
        Ok(())
    }

    /// `.partial` 스테이징 디렉토리 경로
    ///
    /// 인덱스 빌드는 이 경로에 쓰고 성공 시 `storage_path`로 이름을 바꿉니다.
    pub fn staging_path(&self) -> PathBuf {
        self.sibling_path(".partial")
    }

    /// 재빌드 중 기존 인덱스를 잠시 옮겨 둘 경로 (`<storage>.old`)
    pub fn retired_path(&self) -> PathBuf {
        self.sibling_path(".old")
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .storage_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "vectorstore".into());
        name.push(suffix);
        self.storage_path.with_file_name(name)
    }
}

// ============================================================================
// Environment
// ============================================================================

/// `.env` 파일 로드
///
/// 파일이 없으면 조용히 넘어갑니다. 이미 설정된 환경변수는 덮어쓰지 않습니다.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {:?}", path),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!("Failed to load .env: {}", e),
    }
}

/// API 키 로드 (환경변수에서)
pub fn get_api_key() -> Result<String> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!(
            "API key not found. Set {} in the environment or in a .env file.\n\
             Get your API key at: https://platform.openai.com/api-keys",
            API_KEY_ENV
        ),
    }
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    std::env::var(API_KEY_ENV)
        .map(|key| !key.trim().is_empty())
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================
