//! 콘텐츠 추출 모듈
//!
//! 업로드된 파일 바이트에서 페이지별 텍스트를 추출합니다.
//! - PDF 파일: pdf-extract로 텍스트 추출
//! - 텍스트 파일: UTF-8 디코딩 (폼피드로 페이지 구분)

pub mod pdf;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::collector::FileType;
use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 업로드된 원본 문서 (파일명 + 바이트)
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// 파일에서 읽기 (파일명이 문서 ID가 됨)
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        Ok(Self { name, bytes })
    }
}

/// 파싱된 문서
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// 문서 ID (파일명)
    pub id: String,
    /// 페이지 목록 (페이지 번호 순)
    pub pages: Vec<Page>,
}

/// 문서의 한 페이지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 소속 문서 ID
    pub document_id: String,
    /// 페이지 번호 (1부터 시작)
    pub number: usize,
    /// 추출된 텍스트 (추출 실패 시 빈 문자열)
    pub text: String,
}

impl Document {
    /// 페이지 텍스트 목록으로 문서 생성 (페이지 번호는 1부터 부여)
    pub fn from_page_texts(id: impl Into<String>, texts: Vec<String>) -> Self {
        let id = id.into();
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| Page {
                document_id: id.clone(),
                number: i + 1,
                text,
            })
            .collect();
        Self { id, pages }
    }
}

// ============================================================================
// DocumentParser Trait
// ============================================================================

/// 문서 파서 트레이트
///
/// CPU 바운드 동기 작업입니다. 호출 측에서 `spawn_blocking`으로 감쌉니다.
pub trait DocumentParser: Send + Sync {
    /// 바이트를 페이지별 문서로 파싱
    fn parse(&self, name: &str, bytes: &[u8]) -> Result<Document>;

    /// 파서 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// Content Extractor
// ============================================================================

/// 파일 형식별 콘텐츠 추출기
///
/// 확장자로 형식을 판단하고, 확장자가 없으면 `%PDF` 시그니처를 확인합니다.
#[derive(Debug, Clone, Default)]
pub struct ContentExtractor;

impl ContentExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 파일 형식 결정
    fn detect(name: &str, bytes: &[u8]) -> Option<FileType> {
        FileType::from_path(Path::new(name)).or_else(|| {
            if bytes.starts_with(b"%PDF") {
                Some(FileType::Pdf)
            } else {
                None
            }
        })
    }

    /// PDF에서 추출
    fn extract_pdf(&self, name: &str, bytes: &[u8]) -> Result<Document> {
        let pages = pdf::extract_pages_from_pdf(bytes).map_err(|message| RagError::Parse {
            document: name.to_string(),
            message,
        })?;
        Ok(Document::from_page_texts(name, pages))
    }

    /// 텍스트 파일에서 추출
    fn extract_text(&self, name: &str, bytes: &[u8]) -> Result<Document> {
        let text = std::str::from_utf8(bytes).map_err(|e| RagError::Parse {
            document: name.to_string(),
            message: format!("unsupported encoding: {}", e),
        })?;

        let pages = text.split('\x0c').map(str::to_string).collect();
        Ok(Document::from_page_texts(name, pages))
    }
}

impl DocumentParser for ContentExtractor {
    fn parse(&self, name: &str, bytes: &[u8]) -> Result<Document> {
        match Self::detect(name, bytes) {
            Some(FileType::Pdf) => self.extract_pdf(name, bytes),
            Some(FileType::Text) => self.extract_text(name, bytes),
            None => Err(RagError::Parse {
                document: name.to_string(),
                message: "unsupported file type".to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "ContentExtractor"
    }
}

// ============================================================================
// Tests
// ============================================================================
