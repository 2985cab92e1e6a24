//! Lexical Retriever - 키워드 겹침 기반 검색
//!
//! 임베딩을 쓸 수 없을 때의 폴백 검색기입니다.
//!
//! 점수 = 0.8 × (청크에 등장한 질의어 비율) + 0.2 × (질의어 구문이 그대로 등장하면 1)
//!
//! 점수는 0.0 ~ 1.0 범위이며 같은 입력에는 항상 같은 결과를 냅니다.

use std::collections::HashSet;
use std::sync::LazyLock;

use super::chunker::Chunk;
use super::vector::{select_top_k, ScoredId};

/// 질의어 비율 가중치
const OVERLAP_WEIGHT: f32 = 0.8;
/// 구문 일치 가중치
const PHRASE_WEIGHT: f32 = 0.2;

/// 영어 불용어
static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    "the a an and or but if while is are was were be been being to of in on for with as by \
     from at this that these those into over under within without about up down out off then \
     than so such it its their your our my we you he she they them i me his her theirs ours \
     yours"
        .split_whitespace()
        .collect()
});

/// 소문자화 후 영숫자가 아닌 문자로 분리, 불용어 제거
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(t.as_str()))
        .collect()
}

// ============================================================================
// LexicalRetriever
// ============================================================================

/// 키워드 겹침 검색기
#[derive(Debug, Clone)]
pub struct LexicalRetriever {
    /// 이 점수 이하의 청크는 결과에서 제외
    min_score: f32,
}

impl Default for LexicalRetriever {
    fn default() -> Self {
        Self { min_score: 0.0 }
    }
}

impl LexicalRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// 최소 점수 지정
    pub fn with_min_score(min_score: f32) -> Self {
        Self { min_score }
    }

    /// 단일 청크 점수 계산
    pub fn score(&self, query_terms: &[String], chunk_text: &str) -> f32 {
        let distinct: HashSet<&str> = query_terms.iter().map(String::as_str).collect();
        if distinct.is_empty() {
            return 0.0;
        }

        let chunk_terms = tokenize(chunk_text);
        let chunk_set: HashSet<&str> = chunk_terms.iter().map(String::as_str).collect();

        let matched = distinct.iter().filter(|t| chunk_set.contains(*t)).count();
        let overlap = matched as f32 / distinct.len() as f32;

        let phrase = format!(" {} ", query_terms.join(" "));
        let haystack = format!(" {} ", chunk_terms.join(" "));
        let phrase_bonus = if haystack.contains(&phrase) { 1.0 } else { 0.0 };

        OVERLAP_WEIGHT * overlap + PHRASE_WEIGHT * phrase_bonus
    }

    /// 상위 K개 청크 검색
    ///
    /// 청크 ID 기준으로 동점을 정렬하므로 결과가 결정적입니다.
    pub fn search(&self, query: &str, chunks: &[Chunk], k: usize) -> Vec<ScoredId> {
        let query_terms = tokenize(query);
        if query_terms.is_empty() || chunks.is_empty() {
            return vec![];
        }

        let scored = chunks
            .iter()
            .map(|chunk| ScoredId {
                chunk_id: chunk.id,
                score: self.score(&query_terms, &chunk.text),
            })
            .filter(|s| s.score > self.min_score);

        select_top_k(scored, k)
    }
}

// ============================================================================
// Tests
// ============================================================================
