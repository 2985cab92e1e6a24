//! 빌드 파이프라인
//!
//! 업로드 문서 → 파싱 → 청킹 → 임베딩 → 인덱스
//!
//! - 파싱 실패 문서는 건너뛰고 경고로 기록
//! - 임베딩 불가 시 벡터 없이 인덱스를 만들고 경고로 기록 (키워드 검색)
//! - 설정 오류, 차원 불일치, 취소는 빌드 실패
//!
//! 빌드마다 새 인덱스를 만들며, 결과 `Retriever`는 호출 측이 소유합니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::answer::{AnswerComposer, AnswerPayload, GeminiGenerator};
use crate::config::PipelineConfig;
use crate::embedding::{create_embedder, BatchEmbedder, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::extractor::{ContentExtractor, Document, DocumentParser, UploadedDocument};
use crate::knowledge::{Chunk, ChunkIndex, Retriever, Vector, WindowChunker};

// ============================================================================
// Build Report
// ============================================================================

/// 빌드 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Completed,
    CompletedWithWarnings,
}

/// 빌드 중 복구된 문제
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildWarning {
    /// 파싱할 수 없어 건너뛴 문서
    DocumentSkipped { document: String, reason: String },
    /// 임베딩을 쓸 수 없어 키워드 검색 전용으로 빌드
    EmbeddingUnavailable { provider: String, message: String },
}

impl std::fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildWarning::DocumentSkipped { document, reason } => {
                write!(f, "skipped '{}': {}", document, reason)
            }
            BuildWarning::EmbeddingUnavailable { provider, message } => {
                write!(f, "embeddings unavailable ({}): {}, using lexical retrieval", provider, message)
            }
        }
    }
}

/// 빌드 결과 요약
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildReport {
    pub build_id: Uuid,
    pub built_at: DateTime<Utc>,
    pub status: BuildStatus,
    pub documents_received: usize,
    pub documents_indexed: usize,
    pub pages_processed: usize,
    pub chunks_indexed: usize,
    pub vectors_indexed: usize,
    pub warnings: Vec<BuildWarning>,
}

/// 빌드 산출물
#[derive(Debug)]
pub struct BuildOutcome {
    pub report: BuildReport,
    pub retriever: Retriever,
}

// ============================================================================
// Pipeline
// ============================================================================

/// 문서 처리 파이프라인
pub struct Pipeline {
    config: PipelineConfig,
    parser: Arc<dyn DocumentParser>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    composer: AnswerComposer,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("parser", &self.parser.name())
            .field("embedder", &self.embedder.as_ref().map(|e| e.name().to_string()))
            .finish()
    }
}

impl Pipeline {
    /// 설정으로 생성 (검증 실패 시 `InvalidConfig`)
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            parser: Arc::new(ContentExtractor::new()),
            embedder: None,
            composer: AnswerComposer::new(),
        })
    }

    /// 문서 파서 교체
    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    /// 임베딩 프로바이더 지정 (없으면 설정에서 생성)
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 문서 집합으로 새 인덱스 빌드
    pub async fn build(
        &self,
        documents: Vec<UploadedDocument>,
        cancel: &CancellationToken,
    ) -> Result<BuildOutcome> {
        self.config.validate()?;
        let chunker = WindowChunker::new(self.config.chunk_config())?;

        let documents_received = documents.len();
        let mut warnings = Vec::new();

        tracing::info!("Building index from {} documents", documents_received);

        // 1. 파싱
        let mut parsed = Vec::with_capacity(documents.len());
        for upload in documents {
            if cancel.is_cancelled() {
                return Err(RagError::Cancelled);
            }
            match self.parse(upload).await {
                Ok(doc) => parsed.push(doc),
                Err(RagError::Parse { document, message }) => {
                    tracing::warn!("Skipping document '{}': {}", document, message);
                    warnings.push(BuildWarning::DocumentSkipped {
                        document,
                        reason: message,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let pages_processed = parsed.iter().map(|d| d.pages.len()).sum();

        // 2. 청킹
        let chunks = self.chunk_documents(&chunker, &parsed);
        tracing::info!(
            "Chunked {} documents ({} pages) into {} chunks",
            parsed.len(),
            pages_processed,
            chunks.len()
        );

        // 3. 임베딩
        let (vectors, embedder) = match self.embed(&chunks, cancel).await {
            Ok((vectors, embedder)) => (Some(vectors), Some(embedder)),
            Err(RagError::EmbeddingUnavailable { provider, message }) => {
                tracing::warn!(
                    "Embeddings unavailable ({}): {}, building lexical-only index",
                    provider,
                    message
                );
                warnings.push(BuildWarning::EmbeddingUnavailable { provider, message });
                (None, None)
            }
            Err(e) => return Err(e),
        };

        // 4. 인덱스
        let mut index = ChunkIndex::new(self.config.index_backend);
        match vectors {
            Some(vectors) => index.build(vectors, chunks)?,
            None => index.build_lexical_only(chunks)?,
        }

        let status = if warnings.is_empty() {
            BuildStatus::Completed
        } else {
            BuildStatus::CompletedWithWarnings
        };

        let report = BuildReport {
            build_id: Uuid::new_v4(),
            built_at: Utc::now(),
            status,
            documents_received,
            documents_indexed: parsed.len(),
            pages_processed,
            chunks_indexed: index.len(),
            vectors_indexed: index.vector_count(),
            warnings,
        };

        tracing::info!(
            "Build {} finished: {} chunks, {} vectors, {} warnings",
            report.build_id,
            report.chunks_indexed,
            report.vectors_indexed,
            report.warnings.len()
        );

        Ok(BuildOutcome {
            report,
            retriever: Retriever::new(index, embedder),
        })
    }

    /// 질문에 대한 답변 (설정의 top_k, 검색 모드 사용)
    pub async fn ask(&self, retriever: &Retriever, query: &str) -> Result<AnswerPayload> {
        let result = retriever
            .retrieve(query, self.config.top_k, self.config.retrieval_mode)
            .await?;

        if !self.config.generate {
            return Ok(self.composer.compose_result(query, &result));
        }

        match GeminiGenerator::from_env() {
            Ok(generator) => Ok(self.composer.compose_with(query, &result, &generator).await),
            Err(e) => {
                tracing::warn!("Answer generator unavailable: {}", e);
                Ok(self.composer.compose_result(query, &result))
            }
        }
    }

    /// CPU 바운드 파싱은 blocking 스레드에서
    async fn parse(&self, upload: UploadedDocument) -> Result<Document> {
        let parser = Arc::clone(&self.parser);
        let name = upload.name.clone();

        tokio::task::spawn_blocking(move || parser.parse(&upload.name, &upload.bytes))
            .await
            .map_err(|e| RagError::Parse {
                document: name,
                message: format!("parser task failed: {}", e),
            })?
    }

    /// 모든 페이지를 청킹하고 빌드 전체에서 연속된 ID를 부여
    fn chunk_documents(&self, chunker: &WindowChunker, documents: &[Document]) -> Vec<Chunk> {
        let min_chars = self.config.min_chunk_chars;
        let mut chunks = Vec::new();
        let mut dropped = 0usize;

        for page in documents.iter().flat_map(|d| d.pages.iter()) {
            for mut chunk in chunker.chunk_page(page, 0) {
                if min_chars > 0 && chunk.text.trim().chars().count() <= min_chars {
                    dropped += 1;
                    continue;
                }
                chunk.id = chunks.len();
                chunks.push(chunk);
            }
        }

        if dropped > 0 {
            tracing::debug!(
                "Dropped {} chunks with {} characters or fewer",
                dropped,
                min_chars
            );
        }
        chunks
    }

    /// 청크 임베딩 (프로바이더 생성 포함)
    async fn embed(
        &self,
        chunks: &[Chunk],
        cancel: &CancellationToken,
    ) -> Result<(Vec<Vector>, Arc<dyn EmbeddingProvider>)> {
        let provider = match &self.embedder {
            Some(provider) => Arc::clone(provider),
            None => create_embedder(&self.config)?,
        };

        let batcher = BatchEmbedder::new(
            Arc::clone(&provider),
            self.config.batch_size,
            self.config.concurrency,
        );
        let vectors = batcher.embed_chunks(chunks, cancel).await?;
        Ok((vectors, provider))
    }
}

// ============================================================================
// Tests
// ============================================================================
