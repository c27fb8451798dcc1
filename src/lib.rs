//! rag-chatbot - 문서 기반 RAG 챗봇
//!
//! 문서 폴더를 LanceDB 벡터 인덱스로 만들고, 질문마다 관련 청크를
//! 찾아 OpenAI 채팅 모델에 붙여 답합니다. 인사말은 고정 답변으로 처리합니다.

pub mod chat;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod extractor;
pub mod index;
pub mod llm;
pub mod resolver;
pub mod server;
pub mod session;

// Re-exports
pub use chat::{ChatEngine, ChatMemory, ChatResponse, CondenseQuestionChatEngine};
pub use config::{get_api_key, has_api_key, ChatbotConfig};
pub use embedding::{EmbeddingProvider, OpenAiEmbedding};
pub use index::{
    bootstrap, BootstrappedIndex, IndexAction, IndexStats, RetrievedNode, Retriever, VectorIndex,
    VectorIndexRetriever,
};
pub use llm::{ChatMessage, LanguageModel, OpenAiChat};
pub use resolver::{
    build_augmented_prompt, casual_response, Resolution, ResponseKind, ResponseResolver,
    CASUAL_RESPONSES, INSTRUCTION,
};
pub use server::{create_router, AppState, ServerInfo};
pub use session::{ChatTurn, Role, Session, SessionError, SessionStore, WELCOME_MESSAGE};
