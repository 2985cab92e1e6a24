//! Text Chunking Module
//!
//! 페이지 텍스트를 고정 크기의 겹치는 문자 윈도우로 분할합니다.
//! 각 청크는 출처(문서, 페이지)와 페이지 내 문자 구간을 기록합니다.
//!
//! 오프셋은 바이트가 아니라 문자(Unicode scalar) 단위입니다.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::extractor::Page;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 인접 청크 간 오버랩 (문자 수)
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            overlap: 120,
        }
    }
}

impl ChunkConfig {
    /// RAG 최적화된 설정
    pub fn for_rag() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 150,
        }
    }

    /// 빠른 인덱싱용 설정 (오버랩 없음)
    pub fn for_fast() -> Self {
        Self {
            chunk_size: 500,
            overlap: 0,
        }
    }

    /// `chunk_size > 0`, `overlap < chunk_size` 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig(
                "chunk_size must be greater than 0".into(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// 윈도우 시작점 이동 폭
    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 인덱싱 단위 청크
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 빌드 내 청크 번호 (0부터 연속)
    pub id: usize,
    /// 원본 문서 ID (파일명)
    pub document_id: String,
    /// 원본 페이지 번호 (1부터 시작)
    pub page_number: usize,
    /// 페이지 텍스트 내 시작 문자 오프셋
    pub start: usize,
    /// 페이지 텍스트 내 끝 문자 오프셋 (미포함)
    pub end: usize,
    /// 청크 텍스트 (윈도우 원문, trim 하지 않음)
    pub text: String,
}

impl Chunk {
    /// 문자 구간 길이
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

// ============================================================================
// WindowChunker
// ============================================================================

/// 고정 크기 슬라이딩 윈도우 청커
///
/// 윈도우 시작점을 `chunk_size - overlap` 만큼씩 이동합니다.
/// 같은 입력과 설정에는 항상 같은 경계를 만듭니다.
#[derive(Debug, Clone)]
pub struct WindowChunker {
    config: ChunkConfig,
}

impl WindowChunker {
    /// 설정으로 생성 (설정이 잘못되면 `InvalidConfig`)
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// 텍스트를 문자 구간 `(start, end)` 목록으로 분할
    pub fn split(&self, text: &str) -> Vec<(usize, usize)> {
        if text.trim().is_empty() {
            return vec![];
        }

        let total = text.chars().count();
        let bounds = char_boundaries(text);
        let step = self.config.step();

        let mut spans = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.config.chunk_size).min(total);
            let is_last = end == total;

            // 마지막 윈도우가 공백뿐이면 버림
            if !(is_last && text[bounds[start]..bounds[end]].trim().is_empty()) {
                spans.push((start, end));
            }

            if is_last {
                break;
            }
            start += step;
        }

        spans
    }

    /// 페이지를 청크로 분할
    ///
    /// 청크 ID는 `first_id`부터 순서대로 부여됩니다.
    pub fn chunk_page(&self, page: &Page, first_id: usize) -> Vec<Chunk> {
        let bounds = char_boundaries(&page.text);

        self.split(&page.text)
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| Chunk {
                id: first_id + i,
                document_id: page.document_id.clone(),
                page_number: page.number,
                start,
                end,
                text: page.text[bounds[start]..bounds[end]].to_string(),
            })
            .collect()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문자 인덱스 -> 바이트 오프셋 테이블 (마지막 원소는 `text.len()`)
fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}

/// 텍스트를 청크 문자열로 분할
///
/// # Arguments
/// * `text` - 분할할 텍스트
/// * `chunk_size` - 청크 당 문자 수
/// * `overlap` - 청크 간 중첩 문자 수
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    let chunker = WindowChunker::new(ChunkConfig {
        chunk_size,
        overlap,
    })?;
    let bounds = char_boundaries(text);

    Ok(chunker
        .split(text)
        .into_iter()
        .map(|(start, end)| text[bounds[start]..bounds[end]].to_string())
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
