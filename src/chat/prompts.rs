//! 채팅 엔진 프롬프트 템플릿

use crate::index::RetrievedNode;
use crate::llm::{ChatMessage, MessageRole};

/// QA 호출의 시스템 메시지
pub const QA_SYSTEM_PROMPT: &str = "You are an expert Q&A system that is trusted around the world.\n\
Always answer the query using the provided context information, and not prior knowledge.\n\
Some rules to follow:\n\
1. Never directly reference the given context in your answer.\n\
2. Avoid statements like 'Based on the context, ...' or 'The context information ...' or anything along those lines.";

/// 대화 기록을 "Human: ... / Assistant: ..." 형식으로
pub fn format_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| {
            let speaker = match m.role {
                MessageRole::Assistant => "Assistant",
                _ => "Human",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 후속 질문을 독립 질문으로 바꾸는 프롬프트
pub fn condense_prompt(history: &[ChatMessage], question: &str) -> String {
    format!(
        "Given a conversation (between Human and Assistant) and a follow up message from Human, \
         rewrite the message to be a standalone question that captures all relevant context \
         from the conversation.\n\n\
         <Chat History>\n{}\n\n\
         <Follow Up Message>\n{}\n\n\
         <Standalone question>\n",
        format_history(history),
        question
    )
}

/// 검색 문맥으로 답하는 프롬프트
pub fn qa_prompt(nodes: &[RetrievedNode], query: &str) -> String {
    let context = nodes
        .iter()
        .map(|n| n.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {}\n\
         Answer: ",
        context, query
    )
}
