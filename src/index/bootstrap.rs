//! 인덱스 부트스트랩
//!
//! 저장 폴더가 없으면 문서 폴더에서 인덱스를 빌드해 저장하고,
//! 있으면 저장된 인덱스를 다시 엽니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::collector::{CollectorConfig, FileCollector};
use crate::config::ChatbotConfig;
use crate::embedding::EmbeddingProvider;
use crate::extractor;

use super::docstore::NewDocument;
use super::VectorIndex;

/// 빌드/로드 분기
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexAction {
    /// 문서 폴더에서 새로 빌드
    Build,
    /// 저장된 인덱스 로드
    Load,
}

impl IndexAction {
    /// 저장 폴더 존재 여부만으로 결정
    pub fn for_path(storage_path: &Path) -> Self {
        if storage_path.exists() {
            IndexAction::Load
        } else {
            IndexAction::Build
        }
    }
}

/// 부트스트랩 결과
pub struct BootstrappedIndex {
    pub index: Arc<VectorIndex>,
    pub action: IndexAction,
}

/// 인덱스 준비 (빌드 또는 로드)
pub async fn bootstrap(
    config: &ChatbotConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<BootstrappedIndex> {
    let action = IndexAction::for_path(&config.storage_path);
    tracing::info!("Index bootstrap: {:?} ({:?})", action, config.storage_path);

    let index = match action {
        IndexAction::Build => build_index(config, embedder).await?,
        IndexAction::Load => load_index(config, embedder).await?,
    };

    Ok(BootstrappedIndex {
        index: Arc::new(index),
        action,
    })
}

/// 저장된 인덱스 로드
pub async fn load_index(
    config: &ChatbotConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<VectorIndex> {
    VectorIndex::open(&config.storage_path, embedder)
        .await
        .with_context(|| format!("Failed to load index from {:?}", config.storage_path))
}

/// 문서 폴더에서 인덱스 빌드
///
/// `<storage>.partial`에 먼저 쓰고 성공하면 `<storage>`로 이름을 바꿉니다.
pub async fn build_index(
    config: &ChatbotConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<VectorIndex> {
    let staging = stage(config, embedder.clone()).await?;

    tokio::fs::rename(&staging, &config.storage_path)
        .await
        .with_context(|| {
            format!(
                "Failed to move index from {:?} to {:?}",
                staging, config.storage_path
            )
        })?;

    tracing::info!("Index persisted to {:?}", config.storage_path);
    VectorIndex::open(&config.storage_path, embedder).await
}

/// 기존 인덱스를 새 빌드로 교체
///
/// 스테이징 빌드가 성공한 뒤에만 기존 인덱스를 치웁니다.
/// 빌드가 실패하면 기존 인덱스는 그대로 남습니다.
pub async fn rebuild_index(
    config: &ChatbotConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<VectorIndex> {
    if !config.storage_path.exists() {
        return build_index(config, embedder).await;
    }

    let staging = stage(config, embedder.clone()).await?;
    let retired = config.retired_path();
    if retired.exists() {
        tokio::fs::remove_dir_all(&retired)
            .await
            .with_context(|| format!("Failed to remove {:?}", retired))?;
    }

    tokio::fs::rename(&config.storage_path, &retired)
        .await
        .with_context(|| format!("Failed to move old index to {:?}", retired))?;

    if let Err(e) = tokio::fs::rename(&staging, &config.storage_path).await {
        // 기존 인덱스 복구
        let _ = tokio::fs::rename(&retired, &config.storage_path).await;
        return Err(e).with_context(|| {
            format!(
                "Failed to move index from {:?} to {:?}",
                staging, config.storage_path
            )
        });
    }

    if let Err(e) = tokio::fs::remove_dir_all(&retired).await {
        tracing::warn!("Failed to remove old index {:?}: {}", retired, e);
    }

    tracing::info!("Index rebuilt at {:?}", config.storage_path);
    VectorIndex::open(&config.storage_path, embedder).await
}

/// `<storage>.partial`에 인덱스를 만들고 그 경로를 반환
///
/// 실패하면 스테이징 폴더를 지웁니다.
async fn stage(config: &ChatbotConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<PathBuf> {
    let staging = config.staging_path();
    if staging.exists() {
        tracing::warn!("Removing leftover staging directory {:?}", staging);
        tokio::fs::remove_dir_all(&staging)
            .await
            .with_context(|| format!("Failed to remove {:?}", staging))?;
    }

    let collector = FileCollector::new(CollectorConfig {
        recursive: config.recursive,
        ..Default::default()
    });
    let files = collector.collect_required(&config.documents_path)?;

    if let Err(e) = populate(&staging, embedder, &files).await {
        let _ = tokio::fs::remove_dir_all(&staging).await;
        return Err(e);
    }

    Ok(staging)
}


/// 스테이징 폴더에 문서 적재
async fn populate(
    staging: &Path,
    embedder: Arc<dyn EmbeddingProvider>,
    files: &[crate::collector::CollectedFile],
) -> Result<()> {
    let index = VectorIndex::create(staging, embedder).await?;
    let mut chunk_total = 0;

    for (i, file) in files.iter().enumerate() {
        tracing::info!(
            "[{}/{}] [{}] {}",
            i + 1,
            files.len(),
            file.file_type.label(),
            file.file_name()
        );

        let docs = extractor::extract(file)
            .await
            .with_context(|| format!("Failed to read {:?}", file.path))?;

        for doc in docs {
            chunk_total += index
                .insert(NewDocument {
                    source: doc.source,
                    page: doc.page,
                    content: doc.text,
                })
                .await?;
        }
    }

    if chunk_total == 0 {
        anyhow::bail!("No indexable text found in the documents directory");
    }

    index.record_build().await
}


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::super::testing::embedder;
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &Path) -> ChatbotConfig {
        ChatbotConfig {
            documents_path: dir.join("data"),
            storage_path: dir.join("vectorstore"),
            ..Default::default()
        }
    }

    #[test]
    fn test_action_depends_only_on_directory_existence() {
        let dir = TempDir::new().unwrap();
        let storage = dir.path().join("vectorstore");
        assert_eq!(IndexAction::for_path(&storage), IndexAction::Build);
        assert_eq!(IndexAction::for_path(&storage), IndexAction::Build);

        // 빈 폴더도 "존재"로 본다
        std::fs::create_dir(&storage).unwrap();
        assert_eq!(IndexAction::for_path(&storage), IndexAction::Load);
    }

    #[tokio::test]
    async fn test_build_then_load() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        std::fs::create_dir_all(&config.documents_path).unwrap();
        std::fs::write(config.documents_path.join("cats.txt"), "Cats purr and nap.").unwrap();
        std::fs::write(config.documents_path.join("dogs.md"), "Dogs bark loudly.").unwrap();

        let first = bootstrap(&config, embedder()).await.unwrap();
        assert_eq!(first.action, IndexAction::Build);
        assert!(config.storage_path.join("docstore.db").exists());
        assert!(!config.staging_path().exists());
        let stats = first.index.stats().await.unwrap();
        assert_eq!(stats.document_count, 2);
        drop(first);

        // 문서를 지워도 저장된 인덱스를 그대로 로드
        std::fs::remove_dir_all(&config.documents_path).unwrap();
        let second = bootstrap(&config, embedder()).await.unwrap();
        assert_eq!(second.action, IndexAction::Load);
        assert_eq!(second.index.stats().await.unwrap().chunk_count, 2);
    }

    #[tokio::test]
    async fn test_failed_build_leaves_no_storage() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        std::fs::create_dir_all(&config.documents_path).unwrap();

        let err = bootstrap(&config, embedder()).await.err().unwrap();
        assert!(err.to_string().contains("No files found"));
        assert!(!config.storage_path.exists());
        assert_eq!(IndexAction::for_path(&config.storage_path), IndexAction::Build);
    }

    #[tokio::test]
    async fn test_blank_documents_fail_and_clean_staging() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        std::fs::create_dir_all(&config.documents_path).unwrap();
        std::fs::write(config.documents_path.join("empty.txt"), "   \n").unwrap();

        let err = bootstrap(&config, embedder()).await.err().unwrap();
        assert!(err.to_string().contains("No indexable text"));
        assert!(!config.storage_path.exists());
        assert!(!config.staging_path().exists());
    }

    #[tokio::test]
    async fn test_rebuild_replaces_index() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        std::fs::create_dir_all(&config.documents_path).unwrap();
        std::fs::write(config.documents_path.join("cats.txt"), "Cats purr and nap.").unwrap();
        drop(build_index(&config, embedder()).await.unwrap());

        std::fs::write(config.documents_path.join("dogs.txt"), "Dogs bark loudly.").unwrap();
        let index = rebuild_index(&config, embedder()).await.unwrap();

        assert_eq!(index.stats().await.unwrap().document_count, 2);
        assert!(!config.staging_path().exists());
        assert!(!config.retired_path().exists());
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_existing_index() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        std::fs::create_dir_all(&config.documents_path).unwrap();
        std::fs::write(config.documents_path.join("cats.txt"), "Cats purr and nap.").unwrap();
        drop(build_index(&config, embedder()).await.unwrap());

        // 문서가 모두 사라진 상태에서 재빌드 시도
        std::fs::remove_file(config.documents_path.join("cats.txt")).unwrap();
        let err = rebuild_index(&config, embedder()).await.err().unwrap();
        assert!(err.to_string().contains("No files found"));

        assert!(!config.staging_path().exists());
        let index = load_index(&config, embedder()).await.unwrap();
        assert_eq!(index.stats().await.unwrap().document_count, 1);
    }

    #[tokio::test]
    async fn test_rebuild_without_existing_index_builds() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        std::fs::create_dir_all(&config.documents_path).unwrap();
        std::fs::write(config.documents_path.join("cats.txt"), "Cats purr and nap.").unwrap();

        let index = rebuild_index(&config, embedder()).await.unwrap();
        assert_eq!(index.stats().await.unwrap().document_count, 1);
        assert_eq!(IndexAction::for_path(&config.storage_path), IndexAction::Load);
    }
}
