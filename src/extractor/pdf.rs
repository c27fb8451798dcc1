//! PDF 텍스트 추출
//!
//! pdf-extract 크레이트로 텍스트를 뽑고 페이지 단위로 나눕니다.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;

/// PDF에서 페이지별 텍스트 추출
///
/// (페이지 번호, 텍스트) 목록을 반환합니다. 페이지 번호는 1부터 시작합니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<(usize, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![]);
    }

    Ok(split_pdf_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, page)| (i + 1, page))
        .collect())
}

fn page_marker() -> &'static Regex {
    static PAGE_MARKER: OnceLock<Regex> = OnceLock::new();
    // 예: "--- Page 3 ---", "== 12 =="
    PAGE_MARKER.get_or_init(|| {
        Regex::new(r"(?m)^\s*[-=]+\s*(?:Page\s*)?\d+\s*[-=]+\s*$").expect("valid page regex")
    })
}

/// PDF 텍스트를 페이지별로 분리
///
/// 폼피드(`\x0c`)를 우선 사용하고, 없으면 페이지 구분선 패턴을 시도합니다.
fn split_pdf_pages(text: &str) -> Vec<String> {
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    let marker = page_marker();
    if marker.is_match(text) {
        let pages: Vec<String> = marker
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    vec![text.trim().to_string()]
}
