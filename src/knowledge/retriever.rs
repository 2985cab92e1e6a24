//! Retriever - 벡터/키워드 검색 전략 선택
//!
//! `RetrievalMode`에 따라 벡터 검색 또는 키워드 검색을 실행하고,
//! 실제로 실행된 방법을 결과에 기록합니다.
//!
//! - `Vector`: 벡터 검색만. 임베딩 불가 시 에러 반환
//! - `Lexical`: 키워드 검색만
//! - `Auto`: 벡터 우선, 임베딩 불가 또는 벡터 없는 인덱스면 키워드로 폴백 (`degraded`)
//!
//! 두 방법의 결과는 절대 섞지 않습니다.

use std::sync::Arc;

use serde::Serialize;

use crate::config::RetrievalMode;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::chunker::Chunk;
use super::index::ChunkIndex;
use super::lexical::LexicalRetriever;
use super::vector::{ScoredId, Vector};

// ============================================================================
// Types
// ============================================================================

/// 실제로 실행된 검색 방법
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// 벡터 (코사인 유사도)
    Vector,
    /// 키워드 겹침
    Lexical,
}

impl std::fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMethod::Vector => write!(f, "vector"),
            SearchMethod::Lexical => write!(f, "lexical"),
        }
    }
}

/// 검색된 청크 하나
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    pub chunk: Chunk,
    /// 벡터: 코사인 유사도, 키워드: 0.0 ~ 1.0 겹침 점수
    pub score: f32,
    /// 1부터 시작하는 순위
    pub rank: usize,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub method: SearchMethod,
    /// `Auto` 모드에서 키워드 검색으로 폴백했는지
    pub degraded: bool,
    pub hits: Vec<RetrievalHit>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// 인덱스 진단 정보
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDiagnostics {
    pub chunk_count: usize,
    pub vector_count: usize,
    pub has_vectors: bool,
    pub backend: &'static str,
    pub dimension: Option<usize>,
    pub embedder: Option<String>,
}

// ============================================================================
// Retriever
// ============================================================================

/// 검색 파사드
///
/// 빌드가 끝난 인덱스를 소유하며, 이후에는 읽기 전용입니다.
pub struct Retriever {
    index: ChunkIndex,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    lexical: LexicalRetriever,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("index", &self.index)
            .field("embedder", &self.embedder.as_ref().map(|e| e.name().to_string()))
            .finish()
    }
}

impl Retriever {
    /// 인덱스와 (선택적) 질의 임베더로 생성
    pub fn new(index: ChunkIndex, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            index,
            embedder,
            lexical: LexicalRetriever::new(),
        }
    }

    /// 키워드 검색기 교체 (최소 점수 조정 등)
    pub fn with_lexical(mut self, lexical: LexicalRetriever) -> Self {
        self.lexical = lexical;
        self
    }

    /// 빈 인덱스 (문서 없음)
    pub fn empty() -> Self {
        Self::new(ChunkIndex::default(), None)
    }

    pub fn index(&self) -> &ChunkIndex {
        &self.index
    }

    /// 상위 K개 검색
    pub async fn retrieve(&self, query: &str, k: usize, mode: RetrievalMode) -> Result<RetrievalResult> {
        match mode {
            RetrievalMode::Lexical => Ok(self.lexical_result(query, k, false)),
            RetrievalMode::Vector => {
                let scored = self.vector_search(query, k).await?;
                Ok(self.to_result(SearchMethod::Vector, false, scored))
            }
            RetrievalMode::Auto => {
                if !self.index.has_vectors() {
                    // 빈 인덱스는 폴백이 아니라 정상 상태
                    let degraded = !self.index.is_empty();
                    if degraded {
                        tracing::warn!("Index has no vectors, using lexical retrieval");
                    }
                    return Ok(self.lexical_result(query, k, degraded));
                }

                match self.vector_search(query, k).await {
                    Ok(scored) => Ok(self.to_result(SearchMethod::Vector, false, scored)),
                    Err(e) if e.is_embedding_unavailable() => {
                        tracing::warn!("Query embedding failed ({}), using lexical retrieval", e);
                        Ok(self.lexical_result(query, k, true))
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// 진단 정보
    pub fn diagnostics(&self) -> IndexDiagnostics {
        IndexDiagnostics {
            chunk_count: self.index.len(),
            vector_count: self.index.vector_count(),
            has_vectors: self.index.has_vectors(),
            backend: self.index.backend_name(),
            dimension: self.index.dimension(),
            embedder: self.embedder.as_ref().map(|e| e.name().to_string()),
        }
    }

    async fn vector_search(&self, query: &str, k: usize) -> Result<Vec<ScoredId>> {
        if self.index.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let embedder = self.embedder.as_ref().ok_or_else(|| {
            RagError::embedding_unavailable("none", "no embedding provider for this index")
        })?;
        if !self.index.has_vectors() {
            return Err(RagError::embedding_unavailable(
                embedder.name(),
                "index was built without vectors",
            ));
        }

        let query_vector = Vector::new(embedder.embed_query(query).await?);
        self.index.search(&query_vector, k)
    }

    fn lexical_result(&self, query: &str, k: usize, degraded: bool) -> RetrievalResult {
        let scored = self.lexical.search(query, self.index.chunks(), k);
        self.to_result(SearchMethod::Lexical, degraded, scored)
    }

    fn to_result(&self, method: SearchMethod, degraded: bool, scored: Vec<ScoredId>) -> RetrievalResult {
        let hits = scored
            .into_iter()
            .filter_map(|s| self.index.chunk(s.chunk_id).map(|chunk| (chunk, s.score)))
            .enumerate()
            .map(|(i, (chunk, score))| RetrievalHit {
                chunk: chunk.clone(),
                score,
                rank: i + 1,
            })
            .collect();

        RetrievalResult {
            method,
            degraded,
            hits,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use crate::knowledge::IndexBackend;
    use async_trait::async_trait;

    fn chunk(id: usize, page: usize, text: &str) -> Chunk {
        Chunk {
            id,
            document_id: "animals.pdf".to_string(),
            page_number: page,
            start: 0,
            end: text.chars().count(),
            text: text.to_string(),
        }
    }

    fn chunks() -> Vec<Chunk> {
        vec![
            chunk(0, 1, "The cat sat on the mat."),
            chunk(1, 2, "Dogs bark loudly at night."),
        ]
    }

    fn vector_retriever() -> Retriever {
        let embedder = HashEmbedding::default();
        let vectors = chunks()
            .iter()
            .map(|c| Vector::new(embedder.embed_sync(&c.text)))
            .collect();
        let mut index = ChunkIndex::new(IndexBackend::BruteForce);
        index.build(vectors, chunks()).unwrap();
        Retriever::new(index, Some(Arc::new(embedder)))
    }

    fn lexical_only_retriever() -> Retriever {
        let mut index = ChunkIndex::default();
        index.build_lexical_only(chunks()).unwrap();
        Retriever::new(index, None)
    }

    /// 질의 임베딩이 항상 실패하는 프로바이더
    struct Offline;

    #[async_trait]
    impl EmbeddingProvider for Offline {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::embedding_unavailable("offline", "network down"))
        }

        fn dimension(&self) -> usize {
            HashEmbedding::default().dimension()
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    #[tokio::test]
    async fn test_vector_mode_finds_cat_page() {
        let retriever = vector_retriever();
        let result = retriever
            .retrieve("Where did the cat sit?", 5, RetrievalMode::Vector)
            .await
            .unwrap();

        assert_eq!(result.method, SearchMethod::Vector);
        assert!(!result.degraded);
        assert_eq!(result.hits[0].chunk.page_number, 1);
        assert_eq!(result.hits[0].rank, 1);
    }

    #[tokio::test]
    async fn test_lexical_mode_finds_cat_page() {
        let retriever = vector_retriever();
        let result = retriever
            .retrieve("Where did the cat sit?", 5, RetrievalMode::Lexical)
            .await
            .unwrap();

        assert_eq!(result.method, SearchMethod::Lexical);
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].chunk.id, 0);
    }

    #[tokio::test]
    async fn test_auto_falls_back_without_vectors() {
        let result = lexical_only_retriever()
            .retrieve("cat", 5, RetrievalMode::Auto)
            .await
            .unwrap();
        assert_eq!(result.method, SearchMethod::Lexical);
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn test_auto_falls_back_when_query_embedding_fails() {
        let embedder = HashEmbedding::default();
        let vectors = chunks()
            .iter()
            .map(|c| Vector::new(embedder.embed_sync(&c.text)))
            .collect();
        let mut index = ChunkIndex::default();
        index.build(vectors, chunks()).unwrap();
        let retriever = Retriever::new(index, Some(Arc::new(Offline)));

        let result = retriever
            .retrieve("dogs at night", 5, RetrievalMode::Auto)
            .await
            .unwrap();
        assert_eq!(result.method, SearchMethod::Lexical);
        assert!(result.degraded);
        assert_eq!(result.hits[0].chunk.id, 1);
    }

    #[tokio::test]
    async fn test_vector_mode_reports_unavailable() {
        let result = lexical_only_retriever()
            .retrieve("cat", 5, RetrievalMode::Vector)
            .await;
        assert!(result.err().map(|e| e.is_embedding_unavailable()).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_hits() {
        let retriever = Retriever::empty();
        for mode in [RetrievalMode::Vector, RetrievalMode::Lexical, RetrievalMode::Auto] {
            let result = retriever.retrieve("anything", 3, mode).await.unwrap();
            assert!(result.is_empty());
            assert!(!result.degraded);
        }
    }

    #[tokio::test]
    async fn test_retrieval_is_deterministic() {
        let retriever = vector_retriever();
        let a = retriever.retrieve("cat mat", 2, RetrievalMode::Auto).await.unwrap();
        let b = retriever.retrieve("cat mat", 2, RetrievalMode::Auto).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_diagnostics() {
        let diag = vector_retriever().diagnostics();
        assert_eq!(diag.chunk_count, 2);
        assert!(diag.has_vectors);
        assert_eq!(diag.backend, "brute-force");
        assert_eq!(diag.embedder.as_deref(), Some("hash-embedding"));

        let diag = lexical_only_retriever().diagnostics();
        assert!(!diag.has_vectors);
        assert_eq!(diag.backend, "none");
    }
}
