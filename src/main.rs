//! rag-chatbot CLI 진입점

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    // .env를 먼저 읽어야 clap의 env 기본값에 반영됨
    rag_chatbot::config::load_dotenv();

    // 로깅 초기화
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // CLI 실행
    let cli = rag_chatbot::cli::Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(rag_chatbot::cli::run(cli))
}
