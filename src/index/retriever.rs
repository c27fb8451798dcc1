//! Retriever - 질문에 맞는 문서 청크 검색

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use super::VectorIndex;

/// 검색된 청크 하나
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedNode {
    pub doc_id: i64,
    pub chunk_index: i32,
    /// 청크 텍스트
    pub text: String,
    /// 유사도 스코어
    pub score: f32,
    /// 원본 파일 경로
    pub source: Option<String>,
    /// PDF 페이지 번호
    pub page: Option<usize>,
}

/// 검색기 트레이트
#[async_trait]
pub trait Retriever: Send + Sync {
    /// 스코어 내림차순으로 관련 청크 반환
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedNode>>;
}

/// 벡터 인덱스 기반 검색기
pub struct VectorIndexRetriever {
    index: Arc<VectorIndex>,
    top_k: usize,
}

impl VectorIndexRetriever {
    pub fn new(index: Arc<VectorIndex>, top_k: usize) -> Self {
        Self {
            index,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl Retriever for VectorIndexRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedNode>> {
        let nodes = self.index.query(query, self.top_k).await?;
        tracing::debug!("Retrieved {} nodes for query", nodes.len());
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::embedder;
    use super::super::NewDocument;
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_retriever_respects_top_k() {
        let dir = TempDir::new().unwrap();
        let index = VectorIndex::create(dir.path(), embedder()).await.unwrap();
        for (name, text) in [("a", "apple"), ("b", "banana"), ("c", "cherry")] {
            index
                .insert(NewDocument {
                    source: name.to_string(),
                    page: None,
                    content: text.to_string(),
                })
                .await
                .unwrap();
        }

        let retriever = VectorIndexRetriever::new(Arc::new(index), 2);
        let nodes = retriever.retrieve("banana bread").await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].source.as_deref(), Some("b"));
        assert!(nodes[0].score >= nodes[1].score);
    }
}
