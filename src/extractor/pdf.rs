//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF 바이트에서 페이지별 텍스트를 추출합니다.

use std::sync::LazyLock;

use regex::Regex;

/// 줄 끝 공백
static TRAILING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("Invalid regex"));

/// 세 줄 이상 연속된 빈 줄
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("Invalid regex"));

/// PDF 바이트에서 페이지별 텍스트 추출
///
/// 페이지 순서대로 텍스트를 반환합니다 (인덱스 0 = 1페이지).
/// 빈 페이지도 유지하여 페이지 번호가 밀리지 않도록 합니다.
/// 손상되었거나 암호화된 PDF는 에러 메시지를 반환합니다.
pub fn extract_pages_from_pdf(bytes: &[u8]) -> Result<Vec<String>, String> {
    if !bytes.starts_with(b"%PDF") {
        return Err("missing %PDF header".to_string());
    }

    // pdf-extract는 일부 손상된 입력에서 panic 하므로 격리
    let raw = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| "PDF parser panicked on malformed input".to_string())?
        .map_err(|e| e.to_string())?;

    if raw.is_empty() {
        return Err("PDF has no readable pages".to_string());
    }

    let pages: Vec<String> = raw.iter().map(|p| normalize_page_text(p)).collect();

    if pages.iter().all(|p| p.is_empty()) {
        tracing::warn!("No text extracted from PDF. It might be a scanned document.");
    }

    Ok(pages)
}

/// 페이지 텍스트 정리 (줄 끝 공백, 과도한 빈 줄)
pub fn normalize_page_text(text: &str) -> String {
    let text = TRAILING_SPACE.replace_all(text, "\n");
    BLANK_LINES.replace_all(&text, "\n\n").trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PAGES: &[u8] = include_bytes!("../../tests/fixtures/two_pages.pdf");

    #[test]
    fn test_extract_keeps_pages_separate() {
        let pages = extract_pages_from_pdf(TWO_PAGES).unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("The cat sat on the mat."));
        assert!(pages[1].contains("Dogs bark loudly at night."));
        assert!(!pages[0].contains("Dogs"));
    }

    #[test]
    fn test_normalize_page_text() {
        let text = "\n\nfirst line   \n\n\n\n\nsecond line\t\n";
        assert_eq!(normalize_page_text(text), "first line\n\nsecond line");
    }

    #[test]
    fn test_normalize_blank_page() {
        assert_eq!(normalize_page_text(" \n\n \n"), "");
    }

    #[test]
    fn test_extract_rejects_non_pdf() {
        let result = extract_pages_from_pdf(b"definitely not a pdf");
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_rejects_truncated_pdf() {
        let result = extract_pages_from_pdf(b"%PDF-1.4\n1 0 obj\n<<");
        assert!(result.is_err());
    }
}
