//! End-to-end build and query scenarios.

use std::sync::Arc;

use docubot_rag::{
    BuildStatus, BuildWarning, Document, DocumentParser, Pipeline, PipelineConfig, RagError,
    RetrievalMode, SearchMethod, UploadedDocument,
};
use tokio_util::sync::CancellationToken;

/// Parser that splits on form feed regardless of file type, standing in for a PDF reader.
struct FormFeedParser;

impl DocumentParser for FormFeedParser {
    fn parse(&self, name: &str, bytes: &[u8]) -> docubot_rag::Result<Document> {
        let text = std::str::from_utf8(bytes).map_err(|e| RagError::Parse {
            document: name.to_string(),
            message: e.to_string(),
        })?;
        Ok(Document::from_page_texts(
            name,
            text.split('\x0c').map(str::to_string).collect(),
        ))
    }

    fn name(&self) -> &'static str {
        "form-feed"
    }
}

fn small_chunks(mode: RetrievalMode) -> PipelineConfig {
    PipelineConfig {
        chunk_size: 40,
        chunk_overlap: 0,
        retrieval_mode: mode,
        ..Default::default()
    }
}

fn animals_pdf() -> UploadedDocument {
    UploadedDocument::new(
        "animals.pdf",
        "The cat sat on the mat.\x0cDogs bark loudly at night.",
    )
}

#[tokio::test]
async fn test_two_page_document_answers_from_page_one() {
    for mode in [RetrievalMode::Vector, RetrievalMode::Lexical] {
        let pipeline = Pipeline::new(small_chunks(mode))
            .unwrap()
            .with_parser(Arc::new(FormFeedParser));
        let outcome = pipeline
            .build(vec![animals_pdf()], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.report.chunks_indexed, 2);
        let pages: Vec<usize> = outcome
            .retriever
            .index()
            .chunks()
            .iter()
            .map(|c| c.page_number)
            .collect();
        assert_eq!(pages, vec![1, 2]);

        let result = outcome
            .retriever
            .retrieve("Where did the cat sit?", 5, mode)
            .await
            .unwrap();
        assert_eq!(result.hits[0].chunk.page_number, 1);

        let answer = pipeline
            .ask(&outcome.retriever, "Where did the cat sit?")
            .await
            .unwrap();
        assert!(answer
            .sources
            .iter()
            .any(|s| s.document_id == "animals.pdf" && s.page_number == 1));
        assert_eq!(answer.sources[0].page_number, 1);
    }
}

#[tokio::test]
async fn test_real_pdf_keeps_page_provenance() {
    let bytes = include_bytes!("fixtures/two_pages.pdf");

    for mode in [RetrievalMode::Vector, RetrievalMode::Lexical] {
        let pipeline = Pipeline::new(small_chunks(mode)).unwrap();
        let outcome = pipeline
            .build(
                vec![UploadedDocument::new("animals.pdf", bytes.to_vec())],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.report.status, BuildStatus::Completed);
        assert_eq!(outcome.report.pages_processed, 2);

        let chunks = outcome.retriever.index().chunks();
        let page_one: Vec<_> = chunks.iter().filter(|c| c.page_number == 1).collect();
        let page_two: Vec<_> = chunks.iter().filter(|c| c.page_number == 2).collect();
        assert!(page_one.iter().all(|c| !c.text.contains("Dogs")));
        assert!(page_two.iter().any(|c| c.text.contains("Dogs")));

        let answer = pipeline
            .ask(&outcome.retriever, "Where did the cat sit?")
            .await
            .unwrap();
        assert_eq!(answer.sources[0].document_id, "animals.pdf");
        assert_eq!(answer.sources[0].page_number, 1);
    }
}

#[tokio::test]
async fn test_zero_documents_build_succeeds() {
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let outcome = pipeline
        .build(vec![], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.report.status, BuildStatus::Completed);
    assert_eq!(outcome.report.chunks_indexed, 0);
    assert_eq!(outcome.report.documents_received, 0);

    let answer = pipeline
        .ask(&outcome.retriever, "What is the vacation policy?")
        .await
        .unwrap();
    assert!(answer.sources.is_empty());
    assert!(answer.answer.contains("No grounding material was found"));
}

#[tokio::test]
async fn test_unparseable_document_is_skipped_with_warning() {
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let outcome = pipeline
        .build(
            vec![UploadedDocument::new("broken.pdf", b"this is not a pdf".to_vec())],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let report = &outcome.report;
    assert_eq!(report.status, BuildStatus::CompletedWithWarnings);
    assert_eq!(report.documents_indexed, 0);
    assert_eq!(report.warnings.len(), 1);
    match &report.warnings[0] {
        BuildWarning::DocumentSkipped { document, .. } => assert_eq!(document, "broken.pdf"),
        other => panic!("unexpected warning {:?}", other),
    }
}

#[tokio::test]
async fn test_partial_success_keeps_good_documents() {
    let pipeline = Pipeline::new(small_chunks(RetrievalMode::Auto)).unwrap();
    let outcome = pipeline
        .build(
            vec![
                UploadedDocument::new("broken.pdf", b"garbage".to_vec()),
                UploadedDocument::new("notes.txt", "Remote work requires manager approval."),
            ],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.report.documents_received, 2);
    assert_eq!(outcome.report.documents_indexed, 1);
    assert_eq!(outcome.report.warnings.len(), 1);
    assert!(outcome.report.chunks_indexed > 0);
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let pipeline = Pipeline::new(PipelineConfig {
        chunk_size: 30,
        chunk_overlap: 5,
        ..Default::default()
    })
    .unwrap()
    .with_parser(Arc::new(FormFeedParser));

    let docs = || {
        vec![
            animals_pdf(),
            UploadedDocument::new(
                "handbook.pdf",
                "Employees receive twenty days of annual leave.\x0cRemote work requires approval.",
            ),
        ]
    };

    let first = pipeline
        .build(docs(), &CancellationToken::new())
        .await
        .unwrap();
    let second = pipeline
        .build(docs(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.retriever.index().chunks(), second.retriever.index().chunks());
    assert_ne!(first.report.build_id, second.report.build_id);

    for query in ["annual leave", "cat", "remote approval"] {
        let a = first
            .retriever
            .retrieve(query, 3, RetrievalMode::Vector)
            .await
            .unwrap();
        let b = second
            .retriever
            .retrieve(query, 3, RetrievalMode::Vector)
            .await
            .unwrap();
        assert_eq!(a, b);
    }
}

#[tokio::test]
async fn test_invalid_overlap_fails_before_processing() {
    let result = Pipeline::new(PipelineConfig {
        chunk_size: 100,
        chunk_overlap: 150,
        ..Default::default()
    });
    assert!(matches!(result, Err(RagError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_unsupported_gemini_dimension_fails_before_processing() {
    let result = Pipeline::new(PipelineConfig {
        embedder: docubot_rag::EmbedderKind::Gemini,
        embedding_dimension: Some(999),
        ..Default::default()
    });
    assert!(matches!(result, Err(RagError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_auto_mode_without_embeddings_degrades_to_lexical() {
    let pipeline = Pipeline::new(PipelineConfig {
        embedder: docubot_rag::EmbedderKind::Disabled,
        ..small_chunks(RetrievalMode::Auto)
    })
    .unwrap()
    .with_parser(Arc::new(FormFeedParser));

    let outcome = pipeline
        .build(vec![animals_pdf()], &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.report.status, BuildStatus::CompletedWithWarnings);

    let result = outcome
        .retriever
        .retrieve("dogs at night", 5, RetrievalMode::Auto)
        .await
        .unwrap();
    assert_eq!(result.method, SearchMethod::Lexical);
    assert!(result.degraded);
    assert_eq!(result.hits[0].chunk.page_number, 2);
}
