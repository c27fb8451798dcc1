//! CLI 모듈
//!
//! rag-chatbot 명령어 정의 및 구현

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::chat::CondenseQuestionChatEngine;
use crate::config::{has_api_key, ChatbotConfig, API_KEY_ENV};
use crate::embedding::{EmbeddingProvider, OpenAiEmbedding};
use crate::index::{
    bootstrap, build_index, load_index, rebuild_index, BootstrappedIndex, IndexAction, RetrievedNode,
    VectorIndexRetriever,
};
use crate::llm::{LanguageModel, OpenAiChat};
use crate::resolver::{ResponseKind, ResponseResolver};
use crate::server::{self, AppState, ServerInfo};
use crate::session::{Role, Session};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "rag-chatbot")]
#[command(version, about = "문서 기반 RAG 챗봇", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub config: ChatbotConfig,

    /// 생략하면 serve
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 인덱스를 준비하고 브라우저 채팅 UI 실행
    Serve,

    /// 문서 폴더에서 인덱스 빌드
    Index {
        /// 기존 인덱스를 지우고 다시 빌드
        #[arg(long)]
        rebuild: bool,
    },

    /// 질문 하나에 답하고 종료
    Ask {
        /// 질문
        question: String,
    },

    /// 터미널 대화 모드
    Chat,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.config;
    config.validate()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(&config).await,
        Commands::Index { rebuild } => cmd_index(&config, rebuild).await,
        Commands::Ask { question } => cmd_ask(&config, &question).await,
        Commands::Chat => cmd_chat(&config).await,
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Setup
// ============================================================================

/// 인덱스 + 모델 + 응답 결정기 준비
struct Chatbot {
    resolver: ResponseResolver,
    bootstrapped: BootstrappedIndex,
}

fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export {}=your-api-key\n  \
             또는 .env 파일에 {}=your-api-key\n\n\
             API 키 발급: https://platform.openai.com/api-keys",
            API_KEY_ENV,
            API_KEY_ENV
        );
    }
    Ok(())
}

fn embedder(config: &ChatbotConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder = OpenAiEmbedding::from_config(config).context("임베딩 클라이언트 생성 실패")?;
    Ok(Arc::new(embedder))
}

async fn prepare(config: &ChatbotConfig) -> Result<Chatbot> {
    require_api_key()?;

    let embedder = embedder(config)?;
    let llm: Arc<dyn LanguageModel> =
        Arc::new(OpenAiChat::from_config(config).context("LLM 클라이언트 생성 실패")?);

    match IndexAction::for_path(&config.storage_path) {
        IndexAction::Build => println!(
            "[*] 인덱스 빌드 중: {} → {}",
            config.documents_path.display(),
            config.storage_path.display()
        ),
        IndexAction::Load => println!("[*] 인덱스 로드 중: {}", config.storage_path.display()),
    }

    let bootstrapped = bootstrap(config, embedder).await?;

    let retriever = Arc::new(VectorIndexRetriever::new(
        bootstrapped.index.clone(),
        config.similarity_top_k,
    ));
    let engine = Arc::new(CondenseQuestionChatEngine::new(retriever.clone(), llm));

    Ok(Chatbot {
        resolver: ResponseResolver::new(retriever, engine),
        bootstrapped,
    })
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 웹 UI 실행 (serve)
async fn cmd_serve(config: &ChatbotConfig) -> Result<()> {
    let chatbot = prepare(config).await?;
    let stats = chatbot.bootstrapped.index.stats().await?;

    println!(
        "[OK] 인덱스 준비 완료 ({:?}): 문서 {} 건, 청크 {} 개",
        chatbot.bootstrapped.action, stats.document_count, stats.chunk_count
    );
    println!("[OK] 채팅 UI: http://{}", config.bind);

    let info = ServerInfo::new(&config.model, chatbot.bootstrapped.action, &stats);
    let state = AppState::new(chatbot.resolver, info);
    server::run(config.bind, state).await
}

/// 인덱스 빌드 명령어 (index)
async fn cmd_index(config: &ChatbotConfig, rebuild: bool) -> Result<()> {
    require_api_key()?;
    let embedder = embedder(config)?;

    let index = if rebuild {
        println!("[*] 인덱스 재빌드 중: {}", config.documents_path.display());
        let index = rebuild_index(config, embedder).await?;
        println!("[*] 기존 인덱스 교체: {}", config.storage_path.display());
        index
    } else if config.storage_path.exists() {
        println!(
            "[!] 인덱스가 이미 있습니다: {} (다시 만들려면 --rebuild)",
            config.storage_path.display()
        );
        load_index(config, embedder).await?
    } else {
        println!("[*] 인덱스 빌드 중: {}", config.documents_path.display());
        build_index(config, embedder).await?
    };

    let stats = index.stats().await?;
    println!();
    println!("[OK] 문서: {} 건 (파일 {} 개)", stats.document_count, stats.source_count);
    println!("     청크: {} 개", stats.chunk_count);
    println!("     총 콘텐츠: {}", format_bytes(stats.total_content_bytes));
    if let Some(model) = stats.embedding_model {
        println!("     임베딩 모델: {}", model);
    }

    Ok(())
}

/// 질문 하나 (ask)
async fn cmd_ask(config: &ChatbotConfig, question: &str) -> Result<()> {
    let chatbot = prepare(config).await?;
    let mut session = Session::new();

    let resolution = session.interact(&chatbot.resolver, question).await?;

    println!();
    println!("{}", resolution.content());
    print_sources(resolution.sources());

    Ok(())
}

/// 터미널 대화 모드 (chat)
async fn cmd_chat(config: &ChatbotConfig) -> Result<()> {
    let chatbot = prepare(config).await?;
    let mut session = Session::new();

    for turn in session.transcript() {
        println!("{}", turn.content);
    }
    println!("(종료: Ctrl+D 또는 /quit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if prompt == "/quit" {
            break;
        }

        println!("Thinking....");
        match session.interact(&chatbot.resolver, prompt).await {
            Ok(resolution) => {
                println!("{}", resolution.content());
                if resolution.kind() == ResponseKind::Retrieved {
                    print_sources(resolution.sources());
                }
            }
            Err(e) => println!("[!] 오류: {:#}", e),
        }
    }

    let exchanged = session
        .transcript()
        .iter()
        .filter(|t| t.role == Role::User)
        .count();
    println!("[OK] 대화 종료 (질문 {} 개)", exchanged);
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &ChatbotConfig) -> Result<()> {
    println!("rag-chatbot v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 문서 폴더: {}", config.documents_path.display());
    println!("[*] 인덱스 경로: {}", config.storage_path.display());
    println!("[*] 모델: {} / 임베딩: {}", config.model, config.embedding_model);

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export {}=your-key", API_KEY_ENV);
    }

    if !config.storage_path.exists() {
        println!("[!] 인덱스 없음 (다음 실행 시 빌드됨)");
        return Ok(());
    }

    // 통계만 볼 때는 네트워크를 쓰지 않도록 docstore만 엽니다
    let docstore_path = config.storage_path.join(crate::index::DOCSTORE_FILE);
    match crate::index::DocStore::open_existing(&docstore_path) {
        Ok(store) => match store.stats() {
            Ok(stats) => {
                println!(
                    "[OK] 저장된 문서: {} 건 (파일 {} 개)",
                    stats.document_count, stats.source_count
                );
                println!("     총 콘텐츠: {}", format_bytes(stats.total_content_bytes));
                if let Ok(Some(chunks)) = store.get_meta(crate::index::meta_keys::CHUNK_COUNT) {
                    println!("     청크: {} 개", chunks);
                }
                if let Ok(Some(built_at)) = store.get_meta(crate::index::meta_keys::BUILT_AT) {
                    println!("     빌드 시각: {}", built_at);
                }
            }
            Err(e) => println!("[!] 통계 조회 실패: {}", e),
        },
        Err(e) => println!("[!] 인덱스 열기 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn print_sources(sources: &[RetrievedNode]) {
    if sources.is_empty() {
        return;
    }
    println!();
    for (i, node) in sources.iter().enumerate() {
        let source = node.source.as_deref().unwrap_or("-");
        let page = node.page.map(|p| format!(" (Page {})", p)).unwrap_or_default();
        println!("  [{}] {}{} [점수: {:.4}]", i + 1, source, page, node.score);
        println!("      {}", truncate_text(&node.text, 120));
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
