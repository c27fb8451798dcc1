//! Text Chunking Module
//!
//! 문단 → 문장 → 단어 순으로 경계를 존중하며 텍스트를 분할합니다.
//! 인접 청크는 앞 청크의 끝부분을 일부 공유합니다 (오버랩).

use std::sync::OnceLock;

use regex::Regex;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수, 오버랩 포함)
    pub max_characters: usize,
    /// 오버랩 크기 (문자 수)
    pub overlap_characters: usize,
}

impl Default for ChunkConfig {
    /// 약 1024 토큰 청크, 20 토큰 오버랩 (토큰당 4문자 기준)
    fn default() -> Self {
        Self {
            max_characters: 4096,
            overlap_characters: 80,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;
}

// ============================================================================
// SentenceChunker
// ============================================================================

/// 문장 인식 청커
///
/// - 문단(빈 줄 구분)을 최대 크기까지 이어 붙임
/// - 너무 긴 문단은 문장 끝에서 분할
/// - 너무 긴 문장은 단어 경계에서 분할
pub struct SentenceChunker {
    config: ChunkConfig,
}

fn sentence_end() -> &'static Regex {
    static SENTENCE_END: OnceLock<Regex> = OnceLock::new();
    SENTENCE_END.get_or_init(|| Regex::new(r#"[.!?。！？]["')\]]*\s+"#).expect("valid sentence regex"))
}

impl SentenceChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        let max = config.max_characters.max(1);
        // 오버랩은 청크의 절반까지, 본문이 한 글자도 안 남으면 끔
        let overlap = if max < 3 {
            0
        } else {
            config.overlap_characters.min(max / 2)
        };
        Self {
            config: ChunkConfig {
                max_characters: max,
                overlap_characters: overlap,
            },
        }
    }

    /// 오버랩 앞부분과 구분 공백을 뺀 본문 한도
    fn content_budget(&self) -> usize {
        match self.config.overlap_characters {
            0 => self.config.max_characters,
            overlap => self.config.max_characters - overlap - 1,
        }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// 최대 크기 이하의 조각(split) 목록 생성
    fn splits(&self, text: &str) -> Vec<String> {
        let max = self.content_budget();
        let mut out = Vec::new();

        for para in text.split("\n\n") {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }
            if char_len(para) <= max {
                out.push(para.to_string());
                continue;
            }
            for sentence in split_sentences(para) {
                if char_len(&sentence) <= max {
                    out.push(sentence);
                } else {
                    out.extend(split_words(&sentence, max));
                }
            }
        }

        out
    }

    /// 조각들을 본문 한도까지 이어 붙이기
    fn merge(&self, splits: Vec<String>) -> Vec<String> {
        let max = self.content_budget();
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for split in splits {
            if !current.is_empty() && char_len(&current) + 2 + char_len(&split) > max {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&split);
        }

        if !current.trim().is_empty() {
            chunks.push(current);
        }

        chunks
    }

    /// 오버랩 적용
    fn apply_overlap(&self, chunks: Vec<String>) -> Vec<String> {
        if self.config.overlap_characters == 0 || chunks.len() < 2 {
            return chunks;
        }

        let mut result = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                result.push(chunk.clone());
                continue;
            }
            let tail = overlap_tail(&chunks[i - 1], self.config.overlap_characters);
            if tail.is_empty() {
                result.push(chunk.clone());
            } else {
                result.push(format!("{} {}", tail, chunk));
            }
        }
        result
    }
}

impl Chunker for SentenceChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let splits = self.splits(text);
        let chunks = self.merge(splits);
        self.apply_overlap(chunks)
    }

}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 문장 끝(., !, ? 뒤 공백)에서 분할
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in sentence_end().find_iter(text) {
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = m.end();
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }

    sentences
}

/// 단어 경계에서 최대 크기 이하로 분할 (단어 하나가 더 길면 문자 단위)
fn split_words(text: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if char_len(word) > max {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            for part in chars.chunks(max) {
                pieces.push(part.iter().collect());
            }
            continue;
        }
        if !current.is_empty() && char_len(&current) + 1 + char_len(word) > max {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

/// 앞 청크의 끝에서 최대 `limit` 문자, 단어 경계에서 시작하는 부분
fn overlap_tail(prev: &str, limit: usize) -> &str {
    let total = char_len(prev);
    if total <= limit {
        return "";
    }

    let start = prev
        .char_indices()
        .nth(total - limit)
        .map(|(i, _)| i)
        .unwrap_or(prev.len());
    let tail = &prev[start..];

    // 단어 중간에서 시작하지 않도록 첫 공백 이후로
    match tail.find(char::is_whitespace) {
        Some(p) => tail[p..].trim(),
        None => "",
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(SentenceChunker::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================
