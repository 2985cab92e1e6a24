//! 로컬 해시 임베딩
//!
//! 단어 토큰을 SHA-256으로 해시하여 부호 있는 특성 벡터(feature hashing)를 만듭니다.
//! 모델 로딩이나 네트워크가 필요 없고, 실행 환경과 무관하게 결정적입니다.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::knowledge::tokenize;

use super::EmbeddingProvider;

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 384;

/// 해시 기반 임베딩 프로바이더
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
}

impl HashEmbedding {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::InvalidConfig(
                "embedding dimension must be greater than 0".into(),
            ));
        }
        Ok(Self { dimension })
    }

    /// 토큰 -> (버킷, 부호)
    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);

        let bucket = (u64::from_le_bytes(head) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }

    /// 동기 임베딩 (정규화 전 원시 벡터)
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut values = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let (bucket, sign) = self.bucket(&token);
            values[bucket] += sign;
        }
        values
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash-embedding"
    }
}
