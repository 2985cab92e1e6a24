//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 청크 텍스트를 고정 차원 벡터로 변환합니다.
//! - `HashEmbedding`: 로컬 해시 임베딩 (네트워크 불필요, 기본값)
//! - `GeminiEmbedding`: Gemini 임베딩 API
//!
//! 프로바이더를 만들 수 없거나 호출할 수 없으면 `EmbeddingUnavailable`을 반환하며,
//! 호출 측은 키워드 검색으로 폴백할 수 있습니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let provider = create_embedder(&PipelineConfig::default())?;
//! let embedder = BatchEmbedder::new(provider, 32, 4);
//! let vectors = embedder.embed_chunks(&chunks, &CancellationToken::new()).await?;
//! ```

mod batch;
mod gemini;
mod hashing;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbedderKind, PipelineConfig};
use crate::error::{RagError, Result};

pub use batch::BatchEmbedder;
pub use gemini::{
    check_dimension as check_gemini_dimension, get_api_key, has_api_key, GeminiEmbedding,
    DEFAULT_DIMENSION as GEMINI_DIMENSION,
};
pub use hashing::{HashEmbedding, DEFAULT_DIMENSION as HASH_DIMENSION};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 같은 텍스트에는 배치 경계와 무관하게 같은 벡터를 반환해야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 검색 질의 임베딩 (기본 구현: `embed`)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
///
/// `Disabled`이거나 Gemini API 키가 없으면 `EmbeddingUnavailable`을 반환합니다.
pub fn create_embedder(config: &PipelineConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedder {
        EmbedderKind::Hashing => {
            let dimension = config.embedding_dimension.unwrap_or(HASH_DIMENSION);
            let embedder = HashEmbedding::new(dimension)?;
            tracing::info!("Using local hash embedding (dimension: {})", dimension);
            Ok(Arc::new(embedder))
        }
        EmbedderKind::Gemini => {
            let dimension = config.embedding_dimension.unwrap_or(GEMINI_DIMENSION);
            let embedder = GeminiEmbedding::from_env_with_dimension(dimension)?;
            tracing::info!(
                "Using Gemini API embedding (dimension: {})",
                embedder.dimension()
            );
            Ok(Arc::new(embedder))
        }
        EmbedderKind::Disabled => Err(RagError::embedding_unavailable(
            "disabled",
            "embeddings are disabled by configuration",
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================
