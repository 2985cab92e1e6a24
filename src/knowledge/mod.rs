//! Knowledge 모듈 - 청크 인덱스와 검색
//!
//! - Chunker: 페이지 텍스트를 겹치는 문자 윈도우로 분할
//! - Vector: L2 정규화 벡터와 상위 K 선택
//! - Index: 청크 메타데이터 + 벡터 저장소 (brute-force / rayon 병렬 스캔)
//! - Lexical: 키워드 겹침 폴백 검색
//! - Retriever: 벡터/키워드 전략 선택

mod chunker;
mod flat;
mod index;
mod lexical;
#[cfg(feature = "parallel")]
mod parallel;
mod retriever;
mod vector;

// Re-exports
pub use chunker::{chunk_text, Chunk, ChunkConfig, WindowChunker};
pub use flat::FlatIndex;
pub use index::{ChunkIndex, IndexBackend, VectorStore};
pub use lexical::{tokenize, LexicalRetriever};
#[cfg(feature = "parallel")]
pub use parallel::ParallelFlatIndex;
pub use retriever::{IndexDiagnostics, RetrievalHit, RetrievalResult, Retriever, SearchMethod};
pub use vector::{cosine_similarity, dot, select_top_k, ScoredId, Vector};
