//! Chunk Index - 청크 메타데이터 + 벡터 저장소
//!
//! 한 번의 빌드 세션에서 만든 청크와 벡터를 함께 보관합니다.
//! - 빌드는 단일 writer (`&mut self`), 검증이 끝난 뒤에만 내용을 교체
//! - 빌드 후 검색은 `&self` 이므로 여러 스레드에서 동시에 호출 가능
//! - 벡터가 있으면 항상 `vectors.len() == chunks.len()`

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

use super::chunker::Chunk;
use super::flat::FlatIndex;
use super::vector::{ScoredId, Vector};

// ============================================================================
// VectorStore Trait
// ============================================================================

/// 벡터 저장소 트레이트
///
/// 입력 검증과 정규화는 [`ChunkIndex`]가 담당합니다.
/// 구현체는 위치(0부터)를 청크 ID로 사용합니다.
pub trait VectorStore: Send + Sync {
    /// 내용을 통째로 교체
    fn load(&mut self, dimension: usize, vectors: Vec<Vector>);

    /// 상위 K개 검색 (점수 내림차순, 동점은 낮은 ID 우선)
    fn search(&self, query: &[f32], k: usize) -> Vec<ScoredId>;

    /// 벡터 개수
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 백엔드 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// IndexBackend
// ============================================================================

/// 벡터 인덱스 백엔드 선택
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    /// 가속 백엔드가 컴파일되어 있으면 사용, 아니면 brute-force
    #[default]
    Auto,
    /// 선형 스캔
    BruteForce,
    /// rayon 병렬 스캔
    Parallel,
}

impl IndexBackend {
    /// 가속(병렬) 백엔드가 컴파일되었는지
    pub fn accelerated_available() -> bool {
        cfg!(feature = "parallel")
    }

    /// 백엔드 인스턴스 생성
    ///
    /// 가속 백엔드를 요청했지만 사용할 수 없으면 brute-force로 폴백합니다.
    pub fn create(self) -> Box<dyn VectorStore> {
        match self {
            IndexBackend::BruteForce => Box::new(FlatIndex::new()),
            IndexBackend::Auto | IndexBackend::Parallel => accelerated_store(self),
        }
    }
}

#[cfg(feature = "parallel")]
fn accelerated_store(_requested: IndexBackend) -> Box<dyn VectorStore> {
    Box::new(super::parallel::ParallelFlatIndex::new())
}

#[cfg(not(feature = "parallel"))]
fn accelerated_store(requested: IndexBackend) -> Box<dyn VectorStore> {
    if requested == IndexBackend::Parallel {
        tracing::warn!("Parallel index backend not compiled in, using brute-force scan");
    }
    Box::new(FlatIndex::new())
}

// ============================================================================
// ChunkIndex
// ============================================================================

/// 청크 인덱스
///
/// 청크 ID `i`는 `chunks[i]`와 `i`번째 벡터에 대응합니다.
pub struct ChunkIndex {
    backend: IndexBackend,
    chunks: Vec<Chunk>,
    vectors: Option<Box<dyn VectorStore>>,
    dimension: Option<usize>,
}

impl std::fmt::Debug for ChunkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkIndex")
            .field("backend", &self.backend_name())
            .field("chunks", &self.chunks.len())
            .field("vectors", &self.vector_count())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl Default for ChunkIndex {
    fn default() -> Self {
        Self::new(IndexBackend::Auto)
    }
}

impl ChunkIndex {
    /// 빈 인덱스 생성
    pub fn new(backend: IndexBackend) -> Self {
        Self {
            backend,
            chunks: Vec::new(),
            vectors: None,
            dimension: None,
        }
    }

    /// 벡터와 청크로 인덱스를 통째로 재구성
    ///
    /// 검증에 실패하면 기존 내용은 그대로 유지됩니다.
    pub fn build(&mut self, vectors: Vec<Vector>, chunks: Vec<Chunk>) -> Result<()> {
        if vectors.len() != chunks.len() {
            return Err(RagError::IndexInvariant(format!(
                "{} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        check_chunk_ids(&chunks)?;

        let dimension = match vectors.first() {
            Some(first) => {
                let expected = first.dimension();
                if let Some(bad) = vectors.iter().find(|v| v.dimension() != expected) {
                    return Err(RagError::DimensionMismatch {
                        expected,
                        actual: bad.dimension(),
                    });
                }
                Some(expected)
            }
            None => None,
        };

        let normalized: Vec<Vector> = vectors.into_iter().map(Vector::normalized).collect();

        let mut store = self.backend.create();
        store.load(dimension.unwrap_or(0), normalized);

        self.chunks = chunks;
        self.vectors = Some(store);
        self.dimension = dimension;

        tracing::debug!(
            "Built chunk index: {} chunks, dimension {:?}, backend {}",
            self.chunks.len(),
            self.dimension,
            self.backend_name()
        );
        Ok(())
    }

    /// 벡터 없이 청크만으로 구성 (키워드 검색 전용)
    pub fn build_lexical_only(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        check_chunk_ids(&chunks)?;
        self.chunks = chunks;
        self.vectors = None;
        self.dimension = None;
        Ok(())
    }

    /// 벡터 검색
    ///
    /// 빈 인덱스면 빈 결과를 반환합니다 (에러 아님).
    pub fn search(&self, query: &Vector, k: usize) -> Result<Vec<ScoredId>> {
        let (store, dimension) = match (&self.vectors, self.dimension) {
            (Some(store), Some(dimension)) => (store, dimension),
            _ => return Ok(vec![]),
        };

        if query.dimension() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: query.dimension(),
            });
        }

        let query = query.clone().normalized();
        Ok(store.search(query.as_slice(), k))
    }

    /// 전체 청크
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// ID로 청크 조회
    pub fn chunk(&self, id: usize) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 검색 가능한 벡터가 있는지
    pub fn has_vectors(&self) -> bool {
        self.vector_count() > 0
    }

    pub fn vector_count(&self) -> usize {
        self.vectors.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// 실제 사용 중인 백엔드 이름
    pub fn backend_name(&self) -> &'static str {
        match &self.vectors {
            Some(store) => store.name(),
            None => "none",
        }
    }
}

/// 청크 ID가 위치와 일치하는지 확인
fn check_chunk_ids(chunks: &[Chunk]) -> Result<()> {
    match chunks.iter().enumerate().find(|(i, c)| c.id != *i) {
        Some((i, c)) => Err(RagError::IndexInvariant(format!(
            "chunk at position {} has id {}",
            i, c.id
        ))),
        None => Ok(()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: usize, text: &str) -> Chunk {
        Chunk {
            id,
            document_id: "doc.pdf".to_string(),
            page_number: 1,
            start: 0,
            end: text.chars().count(),
            text: text.to_string(),
        }
    }

    fn sample() -> (Vec<Vector>, Vec<Chunk>) {
        (
            vec![
                Vector::new(vec![1.0, 0.0, 0.0]),
                Vector::new(vec![0.0, 2.0, 0.0]),
                Vector::new(vec![1.0, 1.0, 0.0]),
            ],
            vec![chunk(0, "a"), chunk(1, "b"), chunk(2, "c")],
        )
    }

    #[test]
    fn test_build_and_search() {
        let (vectors, chunks) = sample();
        let mut index = ChunkIndex::default();
        index.build(vectors, chunks).unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.vector_count(), 3);
        assert_eq!(index.dimension(), Some(3));

        let hits = index.search(&Vector::new(vec![2.0, 0.0, 0.0]), 2).unwrap();
        assert_eq!(hits[0].chunk_id, 0);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].chunk_id, 2);
    }

    #[test]
    fn test_search_fewer_than_k_and_empty() {
        let (vectors, chunks) = sample();
        let mut index = ChunkIndex::new(IndexBackend::BruteForce);

        let empty = index.search(&Vector::new(vec![1.0, 0.0, 0.0]), 5).unwrap();
        assert!(empty.is_empty());

        index.build(vectors, chunks).unwrap();
        let hits = index.search(&Vector::new(vec![1.0, 0.0, 0.0]), 10).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_build_rejects_inconsistent_dimensions() {
        let mut index = ChunkIndex::default();
        let result = index.build(
            vec![Vector::new(vec![1.0, 0.0]), Vector::new(vec![1.0, 0.0, 0.0])],
            vec![chunk(0, "a"), chunk(1, "b")],
        );
        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_failed_build_keeps_previous_content() {
        let (vectors, chunks) = sample();
        let mut index = ChunkIndex::default();
        index.build(vectors, chunks).unwrap();

        let result = index.build(vec![Vector::new(vec![1.0])], vec![]);
        assert!(matches!(result, Err(RagError::IndexInvariant(_))));
        assert_eq!(index.len(), 3);
        assert_eq!(index.vector_count(), 3);
    }

    #[test]
    fn test_build_rejects_out_of_order_ids() {
        let mut index = ChunkIndex::default();
        let result = index.build_lexical_only(vec![chunk(1, "a")]);
        assert!(matches!(result, Err(RagError::IndexInvariant(_))));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let (vectors, chunks) = sample();
        let mut index = ChunkIndex::default();
        index.build(vectors, chunks).unwrap();

        let result = index.search(&Vector::new(vec![1.0, 0.0]), 1);
        assert!(matches!(result, Err(RagError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_lexical_only_index_has_no_vectors() {
        let mut index = ChunkIndex::default();
        index.build_lexical_only(vec![chunk(0, "a")]).unwrap();
        assert_eq!(index.len(), 1);
        assert!(!index.has_vectors());
        assert_eq!(index.backend_name(), "none");
        assert!(index
            .search(&Vector::new(vec![1.0]), 3)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_backends_agree() {
        let (vectors, chunks) = sample();
        let mut flat = ChunkIndex::new(IndexBackend::BruteForce);
        let mut fast = ChunkIndex::new(IndexBackend::Parallel);
        flat.build(vectors.clone(), chunks.clone()).unwrap();
        fast.build(vectors, chunks).unwrap();

        let query = Vector::new(vec![0.3, 0.7, 0.1]);
        assert_eq!(flat.search(&query, 3).unwrap(), fast.search(&query, 3).unwrap());
    }
}
