//! 문서 폴더 수집 모듈
//!
//! 인덱싱할 문서 파일 목록을 만듭니다.
//! 기본은 폴더 최상위만 읽고, 숨김 파일은 건너뛰며 .gitignore 패턴을 존중합니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::WalkBuilder;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 텍스트 파일 (마크다운, 코드, CSV 등)
    Text,
    /// PDF 파일
    Pdf,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "md" | "markdown" | "txt" | "rst" | "rs" | "ts" | "tsx" | "js" | "jsx" | "py"
            | "json" | "toml" | "yaml" | "yml" | "html" | "htm" | "css" | "go" | "java" | "c"
            | "cpp" | "h" | "hpp" | "sh" | "sql" | "xml" | "csv" | "tsv" | "log" => {
                Some(FileType::Text)
            }
            "pdf" => Some(FileType::Pdf),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// 짧은 표시용 라벨
    pub fn label(&self) -> &'static str {
        match self {
            FileType::Text => "TXT",
            FileType::Pdf => "PDF",
        }
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 파일 타입
    pub file_type: FileType,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedFile {
    /// 경로에서 CollectedFile 생성 (지원하지 않는 확장자면 None)
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        let Some(file_type) = FileType::from_path(&path) else {
            return Ok(None);
        };

        let metadata = std::fs::metadata(&path)
            .with_context(|| format!("Failed to read metadata: {:?}", path))?;

        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            file_type,
            size: metadata.len(),
        }))
    }

    /// 파일 이름 (표시용)
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 하위 폴더까지 수집
    pub recursive: bool,
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 20 * 1024 * 1024, // 20MB
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    /// 새 수집기 생성
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 문서 폴더 수집
    ///
    /// 경로 순으로 정렬된 목록을 반환합니다.
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        if !path.exists() {
            anyhow::bail!("Directory not found: {:?}", path);
        }

        if !path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", path);
        }

        let mut builder = WalkBuilder::new(path);
        builder
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            // git 저장소 밖에서도 .gitignore 적용
            .require_git(false);

        if !self.config.recursive {
            builder.max_depth(Some(1));
        }

        let mut files = Vec::new();

        for entry in builder.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedFile::from_path(entry.path().to_path_buf()) {
                Ok(Some(file)) => {
                    if self.should_include(&file) {
                        files.push(file);
                    }
                }
                Ok(None) => {
                    tracing::debug!("Skipping unsupported file: {:?}", entry.path());
                }
                Err(e) => {
                    tracing::warn!("Failed to collect file: {}", e);
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));

        tracing::info!("Collected {} files from {:?}", files.len(), path);
        Ok(files)
    }

    /// 문서 폴더 수집 (빈 결과는 에러)
    ///
    /// 인덱스는 최소 한 개의 문서가 있어야 만들 수 있습니다.
    pub fn collect_required(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        let files = self.collect_directory(path)?;
        if files.is_empty() {
            anyhow::bail!("No files found in {:?}", path);
        }
        Ok(files)
    }

    /// 파일이 필터 조건을 만족하는지 확인
    fn should_include(&self, file: &CollectedFile) -> bool {
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            tracing::warn!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
            return false;
        }

        true
    }
}

// ============================================================================
// Tests
// ============================================================================
