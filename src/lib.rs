//! docubot-rag - PDF 문서 기반 RAG 파이프라인
//!
//! 업로드된 문서를 페이지별로 파싱하고, 겹치는 청크로 나누어 임베딩한 뒤
//! 벡터 인덱스(또는 키워드 폴백)로 검색하여 출처가 달린 답변을 만듭니다.
//!
//! ```rust,ignore
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! let outcome = pipeline.build(documents, &CancellationToken::new()).await?;
//! let answer = pipeline.ask(&outcome.retriever, "What is the leave policy?").await?;
//! println!("{}", answer.render_markdown());
//! ```

pub mod answer;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod knowledge;
pub mod pipeline;

// Re-exports
pub use answer::{
    build_prompt, AnswerComposer, AnswerGenerator, AnswerOrigin, AnswerPayload, GeminiGenerator,
    Source,
};
pub use config::{get_data_dir, EmbedderKind, PipelineConfig, RetrievalMode};
pub use embedding::{
    create_embedder, get_api_key, has_api_key, BatchEmbedder, EmbeddingProvider, GeminiEmbedding,
    HashEmbedding,
};
pub use error::{RagError, Result};
pub use extractor::{ContentExtractor, Document, DocumentParser, Page, UploadedDocument};
pub use knowledge::{
    Chunk, ChunkConfig, ChunkIndex, IndexBackend, IndexDiagnostics, LexicalRetriever,
    RetrievalHit, RetrievalResult, Retriever, ScoredId, SearchMethod, Vector, WindowChunker,
};
pub use pipeline::{BuildOutcome, BuildReport, BuildStatus, BuildWarning, Pipeline};
