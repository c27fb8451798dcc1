//! Index 모듈 - 문서 벡터 인덱스
//!
//! - DocStore: 원문 문서 + 인덱스 메타데이터 (SQLite)
//! - LanceVectorStore: 청크 임베딩 (LanceDB)
//! - Chunker: 문단/문장 경계 인식 분할
//! - bootstrap: 저장 폴더 유무로 빌드/로드 결정
//! - retriever: 질문 → 상위 청크

mod bootstrap;
mod chunker;
mod docstore;
mod lance;
mod retriever;
mod vector;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::embedding::EmbeddingProvider;

// Re-exports
pub use bootstrap::{bootstrap, build_index, load_index, rebuild_index, BootstrappedIndex, IndexAction};
pub use chunker::{default_chunker, ChunkConfig, Chunker, SentenceChunker};
pub use docstore::{content_hash, meta_keys, AddOutcome, DocStore, Document, NewDocument, StoreStats};
pub use lance::LanceVectorStore;
pub use retriever::{RetrievedNode, Retriever, VectorIndexRetriever};
pub use vector::{cosine_similarity, SearchResult, VectorEntry, VectorStore};

/// docstore 파일 이름
pub const DOCSTORE_FILE: &str = "docstore.db";
/// 벡터 테이블 디렉토리 이름
pub const VECTORS_DIR: &str = "vectors.lance";

// ============================================================================
// VectorIndex
// ============================================================================

/// 문서 벡터 인덱스 핸들
///
/// 프로세스당 한 번 만들어 모든 세션이 `Arc`로 공유합니다.
pub struct VectorIndex {
    docstore: DocStore,
    vectors: LanceVectorStore,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
}

/// 인덱스 통계
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub document_count: usize,
    pub source_count: usize,
    pub chunk_count: usize,
    pub total_content_bytes: usize,
    pub embedding_model: Option<String>,
    pub built_at: Option<String>,
}

impl VectorIndex {
    /// 빈 인덱스 생성 (디렉토리가 없으면 만듦)
    pub async fn create(root: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("Failed to create index directory {:?}", root))?;

        let docstore = DocStore::open(&root.join(DOCSTORE_FILE))?;
        let vectors = LanceVectorStore::open(&root.join(VECTORS_DIR), embedder.dimension()).await?;

        Ok(Self {
            docstore,
            vectors,
            embedder,
            chunker: default_chunker(),
        })
    }

    /// 저장된 인덱스 열기
    ///
    /// 기록된 임베딩 차원이 현재 프로바이더와 다르면 에러입니다.
    pub async fn open(root: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let docstore = DocStore::open_existing(&root.join(DOCSTORE_FILE))
            .with_context(|| format!("Index at {:?} is incomplete", root))?;

        if let Some(stored) = docstore.get_meta(meta_keys::EMBEDDING_DIMENSION)? {
            let stored: usize = stored
                .parse()
                .with_context(|| format!("Corrupt embedding dimension {:?}", stored))?;
            if stored != embedder.dimension() {
                anyhow::bail!(
                    "Index at {:?} was built with embedding dimension {}, but the configured model produces {}. Rebuild the index.",
                    root,
                    stored,
                    embedder.dimension()
                );
            }
        }

        if let Some(model) = docstore.get_meta(meta_keys::EMBEDDING_MODEL)? {
            if model != embedder.name() {
                tracing::warn!(
                    "Index was built with {} but querying with {}",
                    model,
                    embedder.name()
                );
            }
        }

        let vectors = LanceVectorStore::open(&root.join(VECTORS_DIR), embedder.dimension()).await?;

        Ok(Self {
            docstore,
            vectors,
            embedder,
            chunker: default_chunker(),
        })
    }

    /// 문서 추가 (청킹 + 임베딩)
    ///
    /// 저장된 청크 수를 반환합니다. 중복 내용이면 0입니다.
    pub async fn insert(&self, doc: NewDocument) -> Result<usize> {
        let doc_id = match self.docstore.add_document(&doc)? {
            AddOutcome::Inserted(id) => id,
            AddOutcome::Duplicate(id) => {
                tracing::info!("Skipping duplicate content: {} (same as id={})", doc.source, id);
                return Ok(0);
            }
        };

        let chunks = self.chunker.chunk(&doc.content);
        if chunks.is_empty() {
            tracing::warn!("No chunks generated for document: {}", doc.source);
            return Ok(0);
        }

        let embeddings = self
            .embedder
            .embed_batch(&chunks)
            .await
            .with_context(|| format!("Failed to embed chunks of {}", doc.source))?;

        let entries: Vec<VectorEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk_text, embedding))| VectorEntry {
                doc_id,
                chunk_index: i as i32,
                chunk_text,
                embedding,
            })
            .collect();

        let inserted = self
            .vectors
            .insert_batch(&entries)
            .await
            .context("Failed to insert vectors")?;

        tracing::info!(
            "Indexed document: {} (id={}, chunks={})",
            doc.source,
            doc_id,
            inserted
        );
        Ok(inserted)
    }

    /// 빌드 완료 메타데이터 기록
    pub async fn record_build(&self) -> Result<()> {
        let chunk_count = self.vectors.count().await?;
        self.docstore
            .set_meta(meta_keys::EMBEDDING_MODEL, self.embedder.name())?;
        self.docstore.set_meta(
            meta_keys::EMBEDDING_DIMENSION,
            &self.embedder.dimension().to_string(),
        )?;
        self.docstore
            .set_meta(meta_keys::CHUNK_COUNT, &chunk_count.to_string())?;
        self.docstore
            .set_meta(meta_keys::BUILT_AT, &chrono::Utc::now().to_rfc3339())?;
        Ok(())
    }

    /// 질문과 가장 가까운 청크 검색
    pub async fn query(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedNode>> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let results = self.vectors.search(&embedding, top_k).await?;

        let mut nodes = Vec::with_capacity(results.len());
        for result in results {
            let doc = self.docstore.get_document(result.doc_id)?;
            nodes.push(RetrievedNode {
                doc_id: result.doc_id,
                chunk_index: result.chunk_index,
                text: result.chunk_text,
                score: result.similarity,
                source: doc.as_ref().map(|d| d.source.clone()),
                page: doc.and_then(|d| d.page),
            });
        }

        Ok(nodes)
    }

    /// 인덱스 통계
    pub async fn stats(&self) -> Result<IndexStats> {
        let store = self.docstore.stats()?;
        Ok(IndexStats {
            document_count: store.document_count,
            source_count: store.source_count,
            chunk_count: self.vectors.count().await?,
            total_content_bytes: store.total_content_bytes,
            embedding_model: self.docstore.get_meta(meta_keys::EMBEDDING_MODEL)?,
            built_at: self.docstore.get_meta(meta_keys::BUILT_AT)?,
        })
    }
}

// ============================================================================
// Test Support
// ============================================================================

/// 테스트용 결정적 임베딩 (네트워크 없음)
///
/// 소문자 알파벳 빈도를 차원 수만큼 접어 넣습니다.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;

    pub struct LetterEmbedding {
        pub dimension: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![0.0; self.dimension];
            for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
                let slot = (c.to_ascii_lowercase() as usize - 'a' as usize) % self.dimension;
                v[slot] += 1.0;
            }
            Ok(v)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "letter-test"
        }
    }

    pub fn embedder() -> Arc<dyn EmbeddingProvider> {
        Arc::new(LetterEmbedding { dimension: 26 })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{embedder, LetterEmbedding};
    use super::*;
    use tempfile::TempDir;

    fn doc(source: &str, content: &str) -> NewDocument {
        NewDocument {
            source: source.to_string(),
            page: None,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_query() {
        let dir = TempDir::new().unwrap();
        let index = VectorIndex::create(&dir.path().join("idx"), embedder())
            .await
            .unwrap();

        assert_eq!(index.insert(doc("a.txt", "aaaa aaaa aaaa")).await.unwrap(), 1);
        assert_eq!(index.insert(doc("z.txt", "zzzz zzzz zzzz")).await.unwrap(), 1);
        // 같은 내용은 건너뜀
        assert_eq!(index.insert(doc("copy.txt", "zzzz zzzz zzzz")).await.unwrap(), 0);

        let nodes = index.query("zzz", 1).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].source.as_deref(), Some("z.txt"));
        assert_eq!(nodes[0].text, "zzzz zzzz zzzz");
    }

    #[tokio::test]
    async fn test_open_rejects_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("idx");
        {
            let index = VectorIndex::create(&root, embedder()).await.unwrap();
            index.insert(doc("a.txt", "hello")).await.unwrap();
            index.record_build().await.unwrap();
        }

        let other: Arc<dyn EmbeddingProvider> = Arc::new(LetterEmbedding { dimension: 8 });
        let err = VectorIndex::open(&root, other).await.err().unwrap();
        assert!(err.to_string().contains("embedding dimension 26"));

        let reopened = VectorIndex::open(&root, embedder()).await.unwrap();
        let stats = reopened.stats().await.unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.embedding_model.as_deref(), Some("letter-test"));
    }
}
