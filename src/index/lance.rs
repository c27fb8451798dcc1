//! LanceDB Vector Store - 디스크 기반 벡터 테이블
//!
//! 청크 텍스트와 임베딩을 `<storage>/vectors.lance`에 저장하고
//! 코사인 거리로 최근접 청크를 찾습니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::vector::{cosine_similarity, SearchResult, VectorEntry, VectorStore};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "chunks";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    dimension: usize,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db, dimension })
    }

    /// 임베딩 차원
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn list_size(&self) -> Result<i32> {
        i32::try_from(self.dimension).context("Embedding dimension too large")
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(&self) -> Result<Schema> {
        Ok(Schema::new(vec![
            Field::new("doc_id", DataType::Int64, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("chunk_text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.list_size()?,
                ),
                false,
            ),
        ]))
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != self.dimension) {
            anyhow::bail!(
                "Embedding for doc {} chunk {} has dimension {}, expected {}",
                bad.doc_id,
                bad.chunk_index,
                bad.embedding.len(),
                self.dimension
            );
        }

        let doc_ids: Vec<i64> = entries.iter().map(|e| e.doc_id).collect();
        let chunk_indices: Vec<i32> = entries.iter().map(|e| e.chunk_index).collect();
        let chunk_texts: Vec<&str> = entries.iter().map(|e| e.chunk_text.as_str()).collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.list_size()?,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(self.create_schema()?),
            vec![
                Arc::new(Int64Array::from(doc_ids)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(chunk_texts)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == TABLE_NAME))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")
    }
}

/// 검색 결과 배치에서 SearchResult 추출
fn batch_to_results(batch: &RecordBatch, query: &[f32]) -> Result<Vec<SearchResult>> {
    let doc_ids = batch
        .column_by_name("doc_id")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing doc_id column"))?;

    let chunk_indices = batch
        .column_by_name("chunk_index")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow::anyhow!("Missing chunk_index column"))?;

    let chunk_texts = batch
        .column_by_name("chunk_text")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing chunk_text column"))?;

    let embeddings = batch
        .column_by_name("embedding")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing embedding column"))?;

    let mut results = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let row = embeddings.value(i);
        let values = row
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| anyhow::anyhow!("Embedding column is not float32"))?;

        results.push(SearchResult {
            doc_id: doc_ids.value(i),
            chunk_index: chunk_indices.value(i),
            chunk_text: chunk_texts.value(i).to_string(),
            similarity: cosine_similarity(query, values.values()),
        });
    }

    Ok(results)
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if limit == 0 || !self.table_exists().await {
            return Ok(vec![]);
        }

        if query_embedding.len() != self.dimension {
            anyhow::bail!(
                "Query embedding has dimension {}, expected {}",
                query_embedding.len(),
                self.dimension
            );
        }

        let stream = self
            .open_table()
            .await?
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(batch_to_results(batch, query_embedding)?);
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")
    }
}

// ============================================================================
// Tests
// ============================================================================
