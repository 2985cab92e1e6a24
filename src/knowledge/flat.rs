//! Brute-force Vector Store
//!
//! 저장된 모든 벡터와 내적을 계산하는 선형 스캔입니다.
//! 가속 인덱스를 쓸 수 없을 때의 기준 구현이며, 결과는 가속 경로와 동일해야 합니다.

use super::index::VectorStore;
use super::vector::{dot, select_top_k, ScoredId, Vector};

/// 선형 스캔 벡터 저장소
#[derive(Debug, Default)]
pub struct FlatIndex {
    vectors: Vec<Vector>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorStore for FlatIndex {
    fn load(&mut self, _dimension: usize, vectors: Vec<Vector>) {
        self.vectors = vectors;
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<ScoredId> {
        let scored = self
            .vectors
            .iter()
            .enumerate()
            .map(|(chunk_id, v)| ScoredId {
                chunk_id,
                score: dot(v.as_slice(), query),
            });
        select_top_k(scored, k)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn name(&self) -> &'static str {
        "brute-force"
    }
}
