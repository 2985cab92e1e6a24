//! 파이프라인 설정
//!
//! 우선순위: 기본값 < 설정 파일(~/.docubot-rag/config.json) < 환경변수 < CLI 플래그
//!
//! 설정은 전역 상태가 아니라 호출마다 명시적으로 전달됩니다.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::embedding::check_gemini_dimension;
use crate::error::{RagError, Result};
use crate::knowledge::{ChunkConfig, IndexBackend};

/// 설정 파일 이름
const CONFIG_FILE_NAME: &str = "config.json";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.docubot-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docubot-rag")
}

// ============================================================================
// Enums
// ============================================================================

/// 검색 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// 벡터 검색만 사용
    Vector,
    /// 키워드(어휘) 검색만 사용
    Lexical,
    /// 벡터 우선, 불가능하면 키워드로 폴백
    #[default]
    Auto,
}

impl FromStr for RetrievalMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "vector" => Ok(Self::Vector),
            "lexical" => Ok(Self::Lexical),
            "auto" => Ok(Self::Auto),
            other => Err(RagError::InvalidConfig(format!(
                "unknown retrieval mode '{}' (expected vector, lexical or auto)",
                other
            ))),
        }
    }
}

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// 로컬 해시 임베딩 (네트워크 불필요)
    #[default]
    Hashing,
    /// Gemini 임베딩 API
    Gemini,
    /// 임베딩 비활성화 (키워드 검색 전용)
    Disabled,
}

impl FromStr for EmbedderKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "hashing" | "hash" => Ok(Self::Hashing),
            "gemini" => Ok(Self::Gemini),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(RagError::InvalidConfig(format!(
                "unknown embedder '{}' (expected hashing, gemini or disabled)",
                other
            ))),
        }
    }
}

// ============================================================================
// PipelineConfig
// ============================================================================

/// 파이프라인 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 청크 간 오버랩 (문자 수)
    pub chunk_overlap: usize,
    /// 이 길이 이하의 청크 제거 (0이면 비활성화)
    pub min_chunk_chars: usize,
    /// 검색 결과 개수
    pub top_k: usize,
    /// 검색 모드
    pub retrieval_mode: RetrievalMode,
    /// 임베딩 프로바이더
    pub embedder: EmbedderKind,
    /// 임베딩 차원 (None이면 프로바이더 기본값)
    pub embedding_dimension: Option<usize>,
    /// 임베딩 배치 크기
    pub batch_size: usize,
    /// 동시에 처리할 배치 수
    pub concurrency: usize,
    /// 벡터 인덱스 백엔드
    pub index_backend: IndexBackend,
    /// 외부 생성기로 답변 다듬기
    pub generate: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let chunk = ChunkConfig::default();
        Self {
            chunk_size: chunk.chunk_size,
            chunk_overlap: chunk.overlap,
            min_chunk_chars: 0,
            top_k: 5,
            retrieval_mode: RetrievalMode::Auto,
            embedder: EmbedderKind::Hashing,
            embedding_dimension: None,
            batch_size: 32,
            concurrency: 4,
            index_backend: IndexBackend::Auto,
            generate: false,
        }
    }
}

impl PipelineConfig {
    /// 청커 설정 추출
    pub fn chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_size: self.chunk_size,
            overlap: self.chunk_overlap,
        }
    }

    /// 설정 검증
    ///
    /// 처리를 시작하기 전에 호출되며, 실패하면 `InvalidConfig`를 반환합니다.
    pub fn validate(&self) -> Result<()> {
        self.chunk_config().validate()?;

        if self.top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be greater than 0".into()));
        }
        if self.batch_size == 0 {
            return Err(RagError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(RagError::InvalidConfig(
                "concurrency must be greater than 0".into(),
            ));
        }
        if self.embedding_dimension == Some(0) {
            return Err(RagError::InvalidConfig(
                "embedding_dimension must be greater than 0".into(),
            ));
        }
        if self.embedder == EmbedderKind::Gemini {
            if let Some(dimension) = self.embedding_dimension {
                check_gemini_dimension(dimension)?;
            }
        }

        Ok(())
    }

    /// 기본 위치의 설정 파일 + 환경변수로 로드
    pub fn load() -> Result<Self> {
        let path = get_data_dir().join(CONFIG_FILE_NAME);
        Self::load_from(Some(&path))
    }

    /// 지정된 설정 파일 + 환경변수로 로드
    ///
    /// 파일이 없으면 기본값에서 시작합니다.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                let config: PipelineConfig = serde_json::from_str(&raw).map_err(|e| {
                    RagError::InvalidConfig(format!("{}: {}", p.display(), e))
                })?;
                tracing::debug!("Loaded config from {:?}", p);
                config
            }
            _ => Self::default(),
        };

        config.apply_env()?;
        Ok(config)
    }

    /// 환경변수 오버라이드 적용
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_value("DOCUBOT_CHUNK_SIZE")? {
            self.chunk_size = v;
        }
        if let Some(v) = env_value("DOCUBOT_CHUNK_OVERLAP")? {
            self.chunk_overlap = v;
        }
        if let Some(v) = env_value("DOCUBOT_TOP_K")? {
            self.top_k = v;
        }
        if let Some(v) = env_value("DOCUBOT_RETRIEVAL_MODE")? {
            self.retrieval_mode = v;
        }
        if let Some(v) = env_value("DOCUBOT_EMBEDDER")? {
            self.embedder = v;
        }
        Ok(())
    }
}

/// 환경변수 파싱 (없거나 비어있으면 None)
fn env_value<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RagError::InvalidConfig(format!("{}: {}", name, e))),
        _ => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================
