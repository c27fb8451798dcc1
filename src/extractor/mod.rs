//! 콘텐츠 추출 모듈
//!
//! 수집된 파일에서 인덱싱할 텍스트를 꺼냅니다.
//! - 텍스트 파일: 파일 하나 = 문서 하나
//! - PDF 파일: 페이지 하나 = 문서 하나

pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::{CollectedFile, FileType};

// ============================================================================
// Extracted Document
// ============================================================================

/// 추출된 문서
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// 원본 파일 경로 (표시용 문자열)
    pub source: String,
    /// PDF 페이지 번호 (1부터 시작)
    pub page: Option<usize>,
    /// 추출된 텍스트
    pub text: String,
}

// ============================================================================
// Extraction
// ============================================================================

/// 수집된 파일 하나에서 문서 추출
pub async fn extract(file: &CollectedFile) -> Result<Vec<ExtractedDocument>> {
    let source = file.path.display().to_string();
    match file.file_type {
        FileType::Text => {
            let text = read_text(&file.path).await?;
            Ok(vec![ExtractedDocument {
                source,
                page: None,
                text,
            }])
        }
        FileType::Pdf => {
            // pdf-extract는 CPU 바운드
            let path = file.path.clone();
            let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&path))
                .await
                .context("PDF extraction task failed")??;

            Ok(pages
                .into_iter()
                .filter(|(_, text)| !text.trim().is_empty())
                .map(|(page, text)| ExtractedDocument {
                    source: source.clone(),
                    page: Some(page),
                    text,
                })
                .collect())
        }
    }
}

/// 텍스트 파일 읽기 (잘못된 UTF-8은 대체 문자로)
async fn read_text(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read text file: {:?}", path))?;

    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Invalid UTF-8 in {:?}, decoding lossily", path);
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
