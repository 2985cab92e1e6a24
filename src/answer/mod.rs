//! 답변 구성 모듈
//!
//! 검색된 청크만으로 근거 있는 답변을 만듭니다.
//! - 상위 3개 스니펫의 앞 문장들로 답변
//! - 6~140자 문장 최대 5개를 핵심 요약으로
//! - 사용한 청크마다 문서/페이지 출처
//!
//! 외부 생성기(`AnswerGenerator`)는 선택 사항이며, 실패하면 결정적 답변을 그대로 반환합니다.

mod generator;

use serde::Serialize;

use crate::knowledge::{RetrievalHit, RetrievalResult, SearchMethod};

pub use generator::{AnswerGenerator, GeminiGenerator};

/// 근거가 없을 때의 답변
pub const NO_GROUNDING_ANSWER: &str = "I couldn't find a clear answer in the provided documents. \
     No grounding material was found for this question.";

/// 프롬프트 머리말
const PROMPT_HEADER: &str = "You are a helpful assistant that must answer the user's question \
     using ONLY the provided document snippets. If the answer cannot be found, say \
     'I couldn't find a clear answer in the provided documents.'\n\n";

/// 답변에 사용할 스니펫 수
const MAX_SNIPPETS: usize = 3;
/// 답변 문장 수
const ANSWER_SENTENCES: usize = 3;
/// 핵심 요약 최대 개수
const MAX_KEY_POINTS: usize = 5;
/// 핵심 요약 문장 길이 범위 (문자 수)
const KEY_POINT_CHARS: std::ops::RangeInclusive<usize> = 6..=140;
/// 출처 발췌 길이
const EXCERPT_CHARS: usize = 300;
/// 프롬프트 스니펫 길이
const PROMPT_SNIPPET_CHARS: usize = 700;

// ============================================================================
// Types
// ============================================================================

/// 답변 출처
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub document_id: String,
    pub page_number: usize,
    pub chunk_id: usize,
    pub excerpt: String,
    pub score: f32,
    pub rank: usize,
}

/// 답변 생성 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerOrigin {
    /// 스니펫 문장 조합
    Composed,
    /// 외부 생성기
    Generated,
}

/// 최종 답변
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerPayload {
    pub answer: String,
    pub key_points: Vec<String>,
    pub sources: Vec<Source>,
    /// 검색 방법 (검색 결과 없이 구성하면 None)
    pub method: Option<SearchMethod>,
    pub origin: AnswerOrigin,
}

impl AnswerPayload {
    /// 근거 자료가 있는지
    pub fn is_grounded(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Markdown 렌더링
    pub fn render_markdown(&self) -> String {
        let mut out = vec!["**Answer**".to_string(), self.answer.clone()];

        if !self.key_points.is_empty() {
            out.push(String::new());
            out.push("**Key points**".to_string());
            out.extend(self.key_points.iter().map(|kp| format!("- {}", kp)));
        }

        if !self.sources.is_empty() {
            let sources: Vec<String> = self
                .sources
                .iter()
                .map(|s| format!("{} p.{} (idx={})", s.document_id, s.page_number, s.chunk_id))
                .collect();
            out.push(String::new());
            out.push(format!("**Sources**: {}", sources.join(", ")));
        }

        out.join("\n")
    }
}

// ============================================================================
// AnswerComposer
// ============================================================================

/// 결정적 답변 구성기
#[derive(Debug, Clone, Default)]
pub struct AnswerComposer;

impl AnswerComposer {
    pub fn new() -> Self {
        Self
    }

    /// 검색 결과로 답변 구성
    pub fn compose(&self, _query: &str, hits: &[RetrievalHit]) -> AnswerPayload {
        let used = select_snippets(hits);

        if used.is_empty() {
            return AnswerPayload {
                answer: NO_GROUNDING_ANSWER.to_string(),
                key_points: vec![],
                sources: vec![],
                method: None,
                origin: AnswerOrigin::Composed,
            };
        }

        let snippets: Vec<&str> = used.iter().map(|(_, text)| text.as_str()).collect();

        let joined = snippets.join(" ").replace('•', " ");
        let lead: Vec<&str> = sentences(&joined).take(ANSWER_SENTENCES).collect();
        let answer = if lead.is_empty() {
            truncate_chars(snippets[0], EXCERPT_CHARS)
        } else {
            format!("{}.", lead.join(". "))
        };

        let key_points = snippets
            .iter()
            .flat_map(|s| sentences(s))
            .filter(|s| KEY_POINT_CHARS.contains(&s.chars().count()))
            .take(MAX_KEY_POINTS)
            .map(str::to_string)
            .collect();

        let sources = used
            .iter()
            .map(|(hit, text)| Source {
                document_id: hit.chunk.document_id.clone(),
                page_number: hit.chunk.page_number,
                chunk_id: hit.chunk.id,
                excerpt: truncate_chars(text, EXCERPT_CHARS),
                score: hit.score,
                rank: hit.rank,
            })
            .collect();

        AnswerPayload {
            answer,
            key_points,
            sources,
            method: None,
            origin: AnswerOrigin::Composed,
        }
    }

    /// 검색 결과 전체로 답변 구성 (검색 방법 기록)
    pub fn compose_result(&self, query: &str, result: &RetrievalResult) -> AnswerPayload {
        let mut payload = self.compose(query, &result.hits);
        payload.method = Some(result.method);
        payload
    }

    /// 외부 생성기로 답변 문장을 다듬음
    ///
    /// 근거가 없거나 생성에 실패하면 결정적 답변을 반환합니다.
    pub async fn compose_with(
        &self,
        query: &str,
        result: &RetrievalResult,
        generator: &dyn AnswerGenerator,
    ) -> AnswerPayload {
        let mut payload = self.compose_result(query, result);
        if !payload.is_grounded() {
            return payload;
        }

        // 출처에 나열된 스니펫만 프롬프트에 사용
        let used: Vec<RetrievalHit> = select_snippets(&result.hits)
            .into_iter()
            .map(|(hit, _)| hit.clone())
            .collect();
        let prompt = build_prompt(query, &used);
        match generator.generate(&prompt).await {
            Ok(text) => {
                payload.answer = text.trim().to_string();
                payload.origin = AnswerOrigin::Generated;
            }
            Err(e) => {
                tracing::warn!(
                    "Answer generation with {} failed, using composed answer: {}",
                    generator.name(),
                    e
                );
            }
        }
        payload
    }
}

/// 답변에 사용할 스니펫 (중복 제거, 빈 텍스트 제외, 상위 3개)
fn select_snippets(hits: &[RetrievalHit]) -> Vec<(&RetrievalHit, String)> {
    dedup_by_chunk(hits)
        .into_iter()
        .map(|hit| (hit, clean(&hit.chunk.text)))
        .filter(|(_, text)| !text.is_empty())
        .take(MAX_SNIPPETS)
        .collect()
}

/// 근거 스니펫으로 LLM 프롬프트 구성
pub fn build_prompt(question: &str, hits: &[RetrievalHit]) -> String {
    let blocks: Vec<String> = dedup_by_chunk(hits)
        .into_iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "Snippet {} (idx={}, score={:.4}, page={}):\n{}\n",
                i + 1,
                hit.chunk.id,
                hit.score,
                hit.chunk.page_number,
                truncate_chars(&clean(&hit.chunk.text), PROMPT_SNIPPET_CHARS)
            )
        })
        .collect();

    let context = if blocks.is_empty() {
        "(no snippets)".to_string()
    } else {
        blocks.join("\n---\n")
    };

    format!(
        "{}CONTEXT (top retrieved snippets):\n{}\n\nQUESTION:\n{}\n\n\
         INSTRUCTION: Provide a concise answer grounded ONLY in the CONTEXT. \
         Then, list sources as 'Sources: idx=X (page Y)'.\n",
        PROMPT_HEADER, context, question
    )
}

// ============================================================================
// Text helpers
// ============================================================================

/// 같은 청크는 첫 번째(가장 높은 순위)만 남김
fn dedup_by_chunk(hits: &[RetrievalHit]) -> Vec<&RetrievalHit> {
    let mut seen = std::collections::HashSet::new();
    hits.iter().filter(|h| seen.insert(h.chunk.id)).collect()
}

/// 줄마다 공백을 하나로 줄이고 빈 줄 제거
fn clean(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 마침표 기준 문장 분리 (공백 정리, 빈 문장 제외)
fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split('.')
        .map(|s| s.trim_matches(|c: char| c.is_whitespace()))
        .filter(|s| !s.is_empty())
}

/// 문자 단위 자르기
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RagError, Result};
    use crate::knowledge::Chunk;
    use async_trait::async_trait;

    fn hit(id: usize, page: usize, text: &str, rank: usize) -> RetrievalHit {
        RetrievalHit {
            chunk: Chunk {
                id,
                document_id: "handbook.pdf".to_string(),
                page_number: page,
                start: 0,
                end: text.chars().count(),
                text: text.to_string(),
            },
            score: 1.0 / rank as f32,
            rank,
        }
    }

    fn result(hits: Vec<RetrievalHit>) -> RetrievalResult {
        RetrievalResult {
            method: SearchMethod::Lexical,
            degraded: false,
            hits,
        }
    }

    struct FixedGenerator(&'static str);

    #[async_trait]
    impl AnswerGenerator for FixedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// 받은 프롬프트를 기록하는 생성기
    #[derive(Default)]
    struct RecordingGenerator {
        prompt: std::sync::Mutex<String>,
    }

    #[async_trait]
    impl AnswerGenerator for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            if let Ok(mut slot) = self.prompt.lock() {
                *slot = prompt.to_string();
            }
            Ok("Generated.".to_string())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl AnswerGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(RagError::Generation {
                provider: "failing".to_string(),
                message: "quota".to_string(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_empty_hits_answer_without_sources() {
        let payload = AnswerComposer::new().compose("anything?", &[]);
        assert_eq!(payload.answer, NO_GROUNDING_ANSWER);
        assert!(payload.key_points.is_empty());
        assert!(payload.sources.is_empty());
        assert!(!payload.is_grounded());
    }

    #[test]
    fn test_answer_uses_leading_sentences() {
        let hits = vec![
            hit(0, 1, "The cat sat on the mat.  It was   warm.", 1),
            hit(1, 2, "Dogs bark loudly at night. Neighbours complain.", 2),
        ];
        let payload = AnswerComposer::new().compose("cat", &hits);
        assert_eq!(
            payload.answer,
            "The cat sat on the mat. It was warm. Dogs bark loudly at night."
        );
        assert_eq!(payload.sources.len(), 2);
        assert_eq!(payload.sources[0].page_number, 1);
        assert_eq!(payload.sources[0].document_id, "handbook.pdf");
    }

    #[test]
    fn test_key_points_length_window() {
        let long = "x".repeat(200);
        let text = format!("Tiny. Employees get twenty days of leave. {}.", long);
        let payload = AnswerComposer::new().compose("leave", &[hit(0, 1, &text, 1)]);
        assert_eq!(payload.key_points, vec!["Employees get twenty days of leave"]);
    }

    #[test]
    fn test_key_points_capped_at_five() {
        let text = "Alpha one. Beta two. Gamma three. Delta four. Epsilon five. Zeta six.";
        let payload = AnswerComposer::new().compose("q", &[hit(0, 1, text, 1)]);
        assert_eq!(payload.key_points.len(), 5);
    }

    #[test]
    fn test_duplicate_chunks_are_merged() {
        let hits = vec![
            hit(3, 2, "Remote work needs approval.", 1),
            hit(3, 2, "Remote work needs approval.", 2),
        ];
        let payload = AnswerComposer::new().compose("remote", &hits);
        assert_eq!(payload.sources.len(), 1);
        assert_eq!(payload.sources[0].chunk_id, 3);
    }

    #[test]
    fn test_only_top_three_snippets_used() {
        let hits: Vec<RetrievalHit> = (0..5)
            .map(|i| hit(i, i + 1, &format!("Fact number {} here.", i), i + 1))
            .collect();
        let payload = AnswerComposer::new().compose("fact", &hits);
        assert_eq!(payload.sources.len(), 3);
        assert_eq!(payload.sources[2].rank, 3);
    }

    #[test]
    fn test_render_markdown_layout() {
        let payload = AnswerComposer::new().compose(
            "cat",
            &[hit(0, 1, "The cat sat on the mat.", 1)],
        );
        let md = payload.render_markdown();
        assert!(md.starts_with("**Answer**\nThe cat sat on the mat."));
        assert!(md.contains("**Key points**\n- The cat sat on the mat"));
        assert!(md.ends_with("**Sources**: handbook.pdf p.1 (idx=0)"));
    }

    #[test]
    fn test_build_prompt_lists_snippets() {
        let prompt = build_prompt("Where did the cat sit?", &[hit(0, 1, "The cat\n\nsat.", 1)]);
        assert!(prompt.starts_with(PROMPT_HEADER));
        assert!(prompt.contains("Snippet 1 (idx=0, score=1.0000, page=1):\nThe cat\nsat.\n"));
        assert!(prompt.contains("QUESTION:\nWhere did the cat sit?"));

        let empty = build_prompt("q", &[]);
        assert!(empty.contains("(no snippets)"));
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("가나다라", 2), "가나…");
        assert_eq!(truncate_chars("abc", 5), "abc");
    }

    #[tokio::test]
    async fn test_compose_with_generator() {
        let result = result(vec![hit(0, 1, "The cat sat on the mat.", 1)]);
        let payload = AnswerComposer::new()
            .compose_with("cat?", &result, &FixedGenerator("  On the mat.  "))
            .await;
        assert_eq!(payload.answer, "On the mat.");
        assert_eq!(payload.origin, AnswerOrigin::Generated);
        assert_eq!(payload.method, Some(SearchMethod::Lexical));
        assert_eq!(payload.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_prompt_only_contains_cited_snippets() {
        let hits: Vec<RetrievalHit> = (0..5)
            .map(|i| hit(i, i + 1, &format!("Fact number {} here.", i), i + 1))
            .collect();
        let generator = RecordingGenerator::default();
        let payload = AnswerComposer::new()
            .compose_with("fact", &result(hits), &generator)
            .await;

        let pages: Vec<usize> = payload.sources.iter().map(|s| s.page_number).collect();
        assert_eq!(pages, vec![1, 2, 3]);

        let prompt = generator.prompt.lock().unwrap().clone();
        for source in &payload.sources {
            assert!(prompt.contains(&format!("idx={},", source.chunk_id)));
        }
        assert!(!prompt.contains("idx=3,"));
        assert!(!prompt.contains("idx=4,"));
        assert!(!prompt.contains("Snippet 4"));
    }

    #[tokio::test]
    async fn test_generator_failure_falls_back() {
        let result = result(vec![hit(0, 1, "The cat sat on the mat.", 1)]);
        let payload = AnswerComposer::new()
            .compose_with("cat?", &result, &FailingGenerator)
            .await;
        assert_eq!(payload.origin, AnswerOrigin::Composed);
        assert_eq!(payload.answer, "The cat sat on the mat.");
    }

    #[tokio::test]
    async fn test_generator_skipped_without_hits() {
        let payload = AnswerComposer::new()
            .compose_with("cat?", &result(vec![]), &FixedGenerator("made up"))
            .await;
        assert_eq!(payload.answer, NO_GROUNDING_ANSWER);
        assert_eq!(payload.origin, AnswerOrigin::Composed);
    }
}
