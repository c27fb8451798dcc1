//! Document Store - rusqlite 기반 문서/메타데이터 저장소
//!
//! 인덱싱한 원문 문서와 인덱스 메타데이터를 `<storage>/docstore.db`에 보관합니다.
//! 벡터 검색 결과의 출처(파일, 페이지)를 여기서 찾습니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};

// ============================================================================
// Types
// ============================================================================

/// 저장된 문서
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: i64,
    /// 원본 파일 경로
    pub source: String,
    /// PDF 페이지 번호
    pub page: Option<usize>,
    pub content: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// 새 문서 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub source: String,
    pub page: Option<usize>,
    pub content: String,
}

/// 저장 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// 새로 저장됨
    Inserted(i64),
    /// 같은 내용의 문서가 이미 있음
    Duplicate(i64),
}

impl AddOutcome {
    pub fn id(&self) -> i64 {
        match self {
            AddOutcome::Inserted(id) | AddOutcome::Duplicate(id) => *id,
        }
    }
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub source_count: usize,
    pub total_content_bytes: usize,
    pub db_path: PathBuf,
}

/// 인덱스 메타데이터 키
pub mod meta_keys {
    pub const EMBEDDING_MODEL: &str = "embedding_model";
    pub const EMBEDDING_DIMENSION: &str = "embedding_dimension";
    pub const BUILT_AT: &str = "built_at";
    pub const CHUNK_COUNT: &str = "chunk_count";
}

// ============================================================================
// DocStore
// ============================================================================

/// rusqlite 기반 동기 문서 저장소
pub struct DocStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl DocStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 기존 저장소만 열기 (파일이 없으면 에러)
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            anyhow::bail!("Document store not found: {:?}", path);
        }
        Self::open(path)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                page INTEGER,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source);
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )
        .context("Failed to create docstore schema")?;

        tracing::debug!("Document store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 문서 저장
    ///
    /// 내용이 같은 문서가 이미 있으면 기존 ID를 돌려줍니다.
    pub fn add_document(&self, doc: &NewDocument) -> Result<AddOutcome> {
        let conn = self.lock()?;
        let hash = content_hash(&doc.content);

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM documents WHERE content_hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            tracing::debug!("Duplicate content for {} (id={})", doc.source, id);
            return Ok(AddOutcome::Duplicate(id));
        }

        conn.execute(
            "INSERT INTO documents (source, page, content, content_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                doc.source,
                doc.page.map(|p| p as i64),
                doc.content,
                hash,
                Utc::now().to_rfc3339()
            ],
        )
        .context("Failed to insert document")?;

        Ok(AddOutcome::Inserted(conn.last_insert_rowid()))
    }

    /// ID로 문서 조회
    pub fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let conn = self.lock()?;
        let doc = conn
            .query_row(
                "SELECT id, source, page, content, content_hash, created_at
                 FROM documents WHERE id = ?1",
                params![id],
                row_to_document,
            )
            .optional()?;
        Ok(doc)
    }

    /// 문서 목록 (ID 순)
    pub fn list_documents(&self, limit: usize) -> Result<Vec<Document>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, source, page, content, content_hash, created_at
             FROM documents ORDER BY id LIMIT ?1",
        )?;

        let docs = stmt
            .query_map(params![limit as i64], row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs)
    }

    /// 문서 수
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// 메타데이터 저장
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .with_context(|| format!("Failed to store index metadata {}", key))?;
        Ok(())
    }

    /// 메타데이터 조회
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let (count, sources, total_size): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT source), COALESCE(SUM(LENGTH(content)), 0)
             FROM documents",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(StoreStats {
            document_count: count as usize,
            source_count: sources as usize,
            total_content_bytes: total_size as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        source: row.get(1)?,
        page: row.get::<_, Option<i64>>(2)?.map(|p| p as usize),
        content: row.get(3)?,
        content_hash: row.get(4)?,
        created_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// 내용 SHA-256 (hex)
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, DocStore) {
        let dir = TempDir::new().unwrap();
        let store = DocStore::open(&dir.path().join("docstore.db")).unwrap();
        (dir, store)
    }

    fn new_doc(source: &str, page: Option<usize>, content: &str) -> NewDocument {
        NewDocument {
            source: source.to_string(),
            page,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_add_and_get_document() {
        let (_dir, store) = create_test_store();

        let outcome = store
            .add_document(&new_doc("data/guide.pdf", Some(3), "page three"))
            .unwrap();
        let AddOutcome::Inserted(id) = outcome else {
            panic!("expected insert, got {:?}", outcome);
        };

        let doc = store.get_document(id).unwrap().unwrap();
        assert_eq!(doc.source, "data/guide.pdf");
        assert_eq!(doc.page, Some(3));
        assert_eq!(doc.content, "page three");
        assert_eq!(doc.content_hash, content_hash("page three"));

        assert!(store.get_document(9999).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_content_returns_existing_id() {
        let (_dir, store) = create_test_store();

        let first = store.add_document(&new_doc("a.txt", None, "same")).unwrap();
        let second = store.add_document(&new_doc("b.txt", None, "same")).unwrap();

        assert!(matches!(first, AddOutcome::Inserted(_)));
        assert_eq!(second, AddOutcome::Duplicate(first.id()));
        assert_eq!(store.stats().unwrap().document_count, 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_list_documents_in_insert_order() {
        let (_dir, store) = create_test_store();
        for i in 0..5 {
            store
                .add_document(&new_doc(&format!("doc{}.md", i), None, &format!("content {}", i)))
                .unwrap();
        }

        let docs = store.list_documents(3).unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].source, "doc0.md");
        assert_eq!(docs[2].source, "doc2.md");
    }

    #[test]
    fn test_meta_roundtrip_and_overwrite() {
        let (_dir, store) = create_test_store();
        assert!(store.get_meta(meta_keys::EMBEDDING_DIMENSION).unwrap().is_none());

        store.set_meta(meta_keys::EMBEDDING_DIMENSION, "1536").unwrap();
        store.set_meta(meta_keys::EMBEDDING_DIMENSION, "768").unwrap();
        assert_eq!(
            store.get_meta(meta_keys::EMBEDDING_DIMENSION).unwrap().as_deref(),
            Some("768")
        );
    }

    #[test]
    fn test_stats() {
        let (_dir, store) = create_test_store();
        store.add_document(&new_doc("a.pdf", Some(1), "12345")).unwrap();
        store.add_document(&new_doc("a.pdf", Some(2), "67890")).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.source_count, 1);
        assert_eq!(stats.total_content_bytes, 10);
    }

    #[test]
    fn test_open_existing_requires_file() {
        let dir = TempDir::new().unwrap();
        assert!(DocStore::open_existing(&dir.path().join("missing.db")).is_err());
    }
}
