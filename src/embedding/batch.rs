//! 배치 임베딩
//!
//! 청크를 `batch_size`개씩 나누어 최대 `concurrency`개 배치를 동시에 임베딩합니다.
//! 완료 순서와 무관하게 결과는 입력 순서를 유지합니다 (`buffered`).

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{RagError, Result};
use crate::knowledge::{Chunk, Vector};

use super::EmbeddingProvider;

/// 순서 보존 배치 임베더
#[derive(Clone)]
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    concurrency: usize,
}

impl std::fmt::Debug for BatchEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEmbedder")
            .field("provider", &self.provider.name())
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl BatchEmbedder {
    /// 0은 1로 올림
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize, concurrency: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// 청크 목록 임베딩
    ///
    /// 반환 벡터 `i`는 `chunks[i]`에 대응하며 L2 정규화되어 있습니다.
    /// 취소되면 진행 중인 배치를 버리고 `Cancelled`를 반환합니다.
    pub async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vector>> {
        if chunks.is_empty() {
            return Ok(vec![]);
        }

        let batches: Vec<Vec<String>> = chunks
            .chunks(self.batch_size)
            .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
            .collect();
        let total_batches = batches.len();

        tracing::info!(
            "Embedding {} chunks in {} batches with {}",
            chunks.len(),
            total_batches,
            self.provider.name()
        );

        let results: Vec<Vec<Vec<f32>>> = stream::iter(batches.into_iter().enumerate())
            .map(|(n, texts)| {
                let provider = Arc::clone(&self.provider);
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return Err(RagError::Cancelled);
                    }
                    tracing::debug!("Embedding batch {}/{}", n + 1, total_batches);
                    let expected = texts.len();
                    // 취소되거나 다른 배치가 실패하면 진행 중인 요청도 함께 drop
                    let vectors = tokio::select! {
                        _ = cancel.cancelled() => return Err(RagError::Cancelled),
                        embedded = provider.embed_batch(&texts) => embedded?,
                    };
                    if vectors.len() != expected {
                        return Err(RagError::IndexInvariant(format!(
                            "embedder returned {} vectors for {} texts",
                            vectors.len(),
                            expected
                        )));
                    }
                    Ok(vectors)
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let dimension = self.provider.dimension();
        let mut vectors = Vec::with_capacity(chunks.len());
        for values in results.into_iter().flatten() {
            if values.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: values.len(),
                });
            }
            vectors.push(Vector::new(values).normalized());
        }

        Ok(vectors)
    }

    /// 검색 질의 임베딩 (정규화됨)
    pub async fn embed_query(&self, query: &str) -> Result<Vector> {
        let values = self.provider.embed_query(query).await?;
        if values.len() != self.provider.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: self.provider.dimension(),
                actual: values.len(),
            });
        }
        Ok(Vector::new(values).normalized())
    }
}
