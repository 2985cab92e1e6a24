//! Parallel Flat Vector Store
//!
//! 벡터를 연속된 row-major 행렬로 보관하고 rayon으로 병렬 스캔합니다.
//! 정확 검색이므로 brute-force 경로와 같은 ID와 점수를 반환합니다.

use rayon::prelude::*;

use super::index::VectorStore;
use super::vector::{dot, select_top_k, ScoredId, Vector};

/// 병렬 스캔 벡터 저장소
#[derive(Debug, Default)]
pub struct ParallelFlatIndex {
    /// row-major 행렬 (len = rows * dimension)
    matrix: Vec<f32>,
    dimension: usize,
    rows: usize,
}

impl ParallelFlatIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorStore for ParallelFlatIndex {
    fn load(&mut self, dimension: usize, vectors: Vec<Vector>) {
        self.rows = vectors.len();
        self.dimension = dimension;
        self.matrix = Vec::with_capacity(self.rows * dimension);
        for v in vectors {
            self.matrix.extend_from_slice(v.as_slice());
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<ScoredId> {
        if self.rows == 0 || self.dimension == 0 {
            return vec![];
        }

        let scores: Vec<f32> = self
            .matrix
            .par_chunks(self.dimension)
            .map(|row| dot(row, query))
            .collect();

        select_top_k(
            scores
                .into_iter()
                .enumerate()
                .map(|(chunk_id, score)| ScoredId { chunk_id, score }),
            k,
        )
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn name(&self) -> &'static str {
        "parallel-flat"
    }
}
