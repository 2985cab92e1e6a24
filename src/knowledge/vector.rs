//! 벡터 타입 및 유틸리티
//!
//! 정규화된 벡터의 내적은 코사인 유사도와 같습니다.
//! 인덱스에 넣기 전, 질의하기 전에 항상 L2 정규화합니다.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Vector
// ============================================================================

/// 고정 길이 임베딩 벡터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vector(Vec<f32>);

impl Vector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// 차원 수
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// 내적
    pub fn dot(&self, other: &Vector) -> f32 {
        dot(&self.0, &other.0)
    }

    /// L2 노름
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// L2 정규화 (영벡터는 그대로 둠)
    pub fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for v in &mut self.0 {
                *v /= norm;
            }
        }
    }

    /// 정규화된 사본
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }
}

impl From<Vec<f32>> for Vector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 내적 (길이가 다르면 짧은 쪽 기준)
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot(a, b) / (norm_a * norm_b)
}

// ============================================================================
// Top-K Selection
// ============================================================================

/// 점수가 매겨진 청크 ID
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredId {
    pub chunk_id: usize,
    pub score: f32,
}

impl ScoredId {
    /// 순위 비교: 점수 높은 쪽이 앞, 동점이면 ID 낮은 쪽이 앞
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.chunk_id.cmp(&other.chunk_id))
    }
}

/// 힙 내부용: "가장 나쁜" 후보가 최대값이 되도록 정렬
struct Candidate(ScoredId);

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.rank_cmp(&other.0)
    }
}

/// 상위 K개 선택 (점수 내림차순, 동점은 낮은 ID 우선)
///
/// 크기 K의 힙을 유지하므로 O(n log k) 입니다.
pub fn select_top_k<I>(scored: I, k: usize) -> Vec<ScoredId>
where
    I: IntoIterator<Item = ScoredId>,
{
    if k == 0 {
        return vec![];
    }

    let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
    for item in scored {
        if heap.len() < k {
            heap.push(Candidate(item));
        } else if let Some(worst) = heap.peek() {
            if item.rank_cmp(&worst.0) == Ordering::Less {
                heap.pop();
                heap.push(Candidate(item));
            }
        }
    }

    let mut top: Vec<ScoredId> = heap.into_iter().map(|c| c.0).collect();
    top.sort_by(|a, b| a.rank_cmp(b));
    top
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(chunk_id: usize, score: f32) -> ScoredId {
        ScoredId { chunk_id, score }
    }

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_empty() {
        let a: Vec<f32> = vec![];
        assert_eq!(cosine_similarity(&a, &a), 0.0);
    }

    #[test]
    fn test_normalized_dot_equals_cosine() {
        let a = Vector::new(vec![3.0, 4.0, 0.0]);
        let b = Vector::new(vec![1.0, 2.0, 2.0]);
        let cos = cosine_similarity(a.as_slice(), b.as_slice());

        let a = a.normalized();
        let b = b.normalized();
        assert!((a.norm() - 1.0).abs() < 1e-6);
        assert!((a.dot(&b) - cos).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let v = Vector::new(vec![0.0; 4]).normalized();
        assert_eq!(v.as_slice(), &[0.0; 4]);
    }

    #[test]
    fn test_select_top_k_orders_and_breaks_ties_by_id() {
        let items = vec![sid(3, 0.5), sid(1, 0.9), sid(2, 0.5), sid(0, 0.1)];
        let top = select_top_k(items, 3);
        let ids: Vec<usize> = top.iter().map(|s| s.chunk_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_select_top_k_fewer_than_k() {
        let top = select_top_k(vec![sid(0, 0.2), sid(1, 0.4)], 10);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].chunk_id, 1);
    }

    #[test]
    fn test_select_top_k_zero() {
        assert!(select_top_k(vec![sid(0, 1.0)], 0).is_empty());
    }
}
