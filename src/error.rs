//! 에러 타입
//!
//! 파이프라인 단계별 실패를 구분할 수 있도록 타입 있는 에러를 제공합니다.
//! CLI 레이어에서는 anyhow로 감싸서 사용합니다.

use thiserror::Error;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 문서 파싱 실패 (손상/암호화된 PDF 등). 해당 문서만 건너뜀
    #[error("Failed to parse document '{document}': {message}")]
    Parse { document: String, message: String },

    /// 청킹/파이프라인 설정 오류. 처리 시작 전에 반환됨
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 임베딩 백엔드를 로드하거나 호출할 수 없음. 키워드 검색으로 폴백
    #[error("Embedding unavailable ({provider}): {message}")]
    EmbeddingUnavailable { provider: String, message: String },

    /// 벡터 차원 불일치 (상위 임베더의 프로그래밍 오류)
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 인덱스 불변식 위반 (청크/벡터 개수 불일치, 청크 ID 순서 오류)
    #[error("Index invariant violated: {0}")]
    IndexInvariant(String),

    /// 외부 답변 생성기 호출 실패
    #[error("Generation failed ({provider}): {message}")]
    Generation { provider: String, message: String },

    /// 호출자가 빌드를 취소함
    #[error("Build cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub(crate) fn embedding_unavailable(provider: &str, message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// 키워드 검색으로 폴백 가능한 에러인지
    pub fn is_embedding_unavailable(&self) -> bool {
        matches!(self, Self::EmbeddingUnavailable { .. })
    }
}

/// 파이프라인 결과 타입
pub type Result<T> = std::result::Result<T, RagError>;
