//! CLI 모듈
//!
//! docubot CLI 명령어 정의 및 구현
//!
//! 인덱스는 저장하지 않으므로 각 명령은 지정된 파일/폴더로 새로 빌드한 뒤 실행됩니다.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::collector::{CollectedFile, CollectionStats, CollectorConfig, FileCollector};
use crate::config::{get_data_dir, EmbedderKind, PipelineConfig, RetrievalMode};
use crate::embedding::has_api_key;
use crate::extractor::UploadedDocument;
use crate::knowledge::IndexBackend;
use crate::pipeline::{BuildOutcome, BuildReport, BuildStatus, Pipeline};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docubot")]
#[command(version, about = "PDF 문서 기반 RAG 파이프라인", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서를 처리하고 빌드 결과 출력
    Build {
        #[command(flatten)]
        source: SourceArgs,

        /// 빌드 결과를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 문서에 대해 질문
    Ask {
        #[command(flatten)]
        source: SourceArgs,

        /// 질문
        question: String,

        /// 외부 생성기(Gemini)로 답변 다듬기
        #[arg(long)]
        generate: bool,

        /// 답변을 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 검색된 청크만 출력
    Search {
        #[command(flatten)]
        source: SourceArgs,

        /// 검색 쿼리
        query: String,
    },

    /// 생성된 청크 목록
    Chunks {
        #[command(flatten)]
        source: SourceArgs,

        /// 출력할 최대 청크 수
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 설정 및 환경 상태 확인
    Status {
        /// 설정 파일 경로 (기본: ~/.docubot-rag/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// 문서 위치 + 파이프라인 설정 오버라이드
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// 처리할 PDF 파일 또는 폴더 (재귀)
    pub path: PathBuf,

    /// 설정 파일 경로 (기본: ~/.docubot-rag/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 청크 크기 (문자 수)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// 청크 간 오버랩 (문자 수)
    #[arg(long)]
    pub overlap: Option<usize>,

    /// 이 길이 이하의 청크 제거
    #[arg(long)]
    pub min_chunk_chars: Option<usize>,

    /// 검색 결과 개수
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// 검색 모드
    #[arg(short, long, value_enum)]
    pub mode: Option<RetrievalMode>,

    /// 임베딩 프로바이더
    #[arg(short, long, value_enum)]
    pub embedder: Option<EmbedderKind>,

    /// 벡터 인덱스 백엔드
    #[arg(long, value_enum)]
    pub backend: Option<IndexBackend>,

    /// 텍스트 파일(.txt, .md)도 포함
    #[arg(long)]
    pub include_text: bool,
}

impl SourceArgs {
    /// 설정 파일 + 환경변수 + CLI 플래그 순으로 적용
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = load_config(self.config.as_deref())?;

        if let Some(v) = self.chunk_size {
            config.chunk_size = v;
        }
        if let Some(v) = self.overlap {
            config.chunk_overlap = v;
        }
        if let Some(v) = self.min_chunk_chars {
            config.min_chunk_chars = v;
        }
        if let Some(v) = self.top_k {
            config.top_k = v;
        }
        if let Some(v) = self.mode {
            config.retrieval_mode = v;
        }
        if let Some(v) = self.embedder {
            config.embedder = v;
        }
        if let Some(v) = self.backend {
            config.index_backend = v;
        }

        config.validate().context("설정 검증 실패")?;
        Ok(config)
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build { source, json } => cmd_build(&source, json).await,
        Commands::Ask {
            source,
            question,
            generate,
            json,
        } => cmd_ask(&source, &question, generate, json).await,
        Commands::Search { source, query } => cmd_search(&source, &query).await,
        Commands::Chunks { source, limit } => cmd_chunks(&source, limit).await,
        Commands::Status { config } => cmd_status(config.as_deref()),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 빌드 명령어 (build)
async fn cmd_build(source: &SourceArgs, json: bool) -> Result<()> {
    let config = source.pipeline_config()?;
    let (_, outcome) = build_from_path(source, config).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome.report).context("빌드 결과 직렬화 실패")?
        );
    } else {
        print_report(&outcome.report);
    }
    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(source: &SourceArgs, question: &str, generate: bool, json: bool) -> Result<()> {
    if question.trim().is_empty() {
        bail!("질문이 비어 있습니다");
    }

    let mut config = source.pipeline_config()?;
    config.generate |= generate;
    if config.generate && !has_api_key() {
        eprintln!("[!] API 키가 없어 생성기 없이 답변합니다");
    }

    let (pipeline, outcome) = build_from_path(source, config).await?;
    if !json {
        print_report(&outcome.report);
        println!();
    }

    let answer = pipeline
        .ask(&outcome.retriever, question)
        .await
        .context("답변 생성 실패")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&answer).context("답변 직렬화 실패")?
        );
    } else {
        println!("{}", answer.render_markdown());
    }
    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(source: &SourceArgs, query: &str) -> Result<()> {
    let config = source.pipeline_config()?;
    let (top_k, mode) = (config.top_k, config.retrieval_mode);
    let (_, outcome) = build_from_path(source, config).await?;

    println!("[*] 검색 중: \"{}\"", query);

    let result = outcome
        .retriever
        .retrieve(query, top_k, mode)
        .await
        .context("검색 실패")?;

    if result.degraded {
        println!("[!] 벡터 검색을 사용할 수 없어 키워드 검색으로 대체했습니다");
    }

    if result.is_empty() {
        println!("[!] 검색 결과가 없습니다");
        return Ok(());
    }

    println!("[OK] {} 건 ({} 검색)", result.hits.len(), result.method);
    println!();

    for hit in &result.hits {
        println!(
            "  {}. [{:.4}] {} p.{} (idx={})",
            hit.rank, hit.score, hit.chunk.document_id, hit.chunk.page_number, hit.chunk.id
        );
        println!("     {}", truncate_text(&hit.chunk.text, 120));
        println!();
    }
    Ok(())
}

/// 청크 목록 명령어 (chunks)
async fn cmd_chunks(source: &SourceArgs, limit: usize) -> Result<()> {
    let config = source.pipeline_config()?;
    let (_, outcome) = build_from_path(source, config).await?;

    let chunks = outcome.retriever.index().chunks();
    println!("[*] 청크 {} 개 (최대 {} 개 표시)", chunks.len(), limit);
    println!();

    for chunk in chunks.iter().take(limit) {
        println!(
            "  #{:<4} {} p.{} [{}..{}]",
            chunk.id, chunk.document_id, chunk.page_number, chunk.start, chunk.end
        );
        println!("        {}", truncate_text(&chunk.text, 80));
    }
    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config_path: Option<&Path>) -> Result<()> {
    println!("docubot v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = get_data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정 (gemini 임베딩/생성기 사용 불가)");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    if IndexBackend::accelerated_available() {
        println!("[OK] 병렬 벡터 스캔: 사용 가능");
    } else {
        println!("[!] 병렬 벡터 스캔: 미포함 (brute-force 사용)");
    }

    let config = load_config(config_path)?;
    println!();
    println!("[*] 현재 설정:");
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("설정 직렬화 실패")?
    );

    match config.validate() {
        Ok(()) => println!("[OK] 설정 유효"),
        Err(e) => println!("[!] 설정 오류: {}", e),
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 설정 로드 (경로 미지정 시 기본 위치)
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => {
            if !p.exists() {
                bail!("설정 파일을 찾을 수 없습니다: {}", p.display());
            }
            PipelineConfig::load_from(Some(p)).context("설정 파일 로드 실패")
        }
        None => PipelineConfig::load().context("설정 로드 실패"),
    }
}

/// 경로에서 문서 수집
fn collect_files(source: &SourceArgs) -> Result<Vec<CollectedFile>> {
    let collector = FileCollector::new(CollectorConfig {
        pdf_only: !source.include_text,
        ..Default::default()
    });

    let path = &source.path;
    if !path.exists() {
        bail!("경로를 찾을 수 없습니다: {}", path.display());
    }

    if path.is_dir() {
        collector
            .collect_directory(path)
            .with_context(|| format!("폴더 탐색 실패: {}", path.display()))
    } else {
        match collector.collect_file(path)? {
            Some(f) => Ok(vec![f]),
            None => bail!("지원하지 않는 파일 형식: {}", path.display()),
        }
    }
}

/// 수집 + 빌드
///
/// Ctrl+C 시 진행 중인 빌드를 취소합니다.
async fn build_from_path(
    source: &SourceArgs,
    config: PipelineConfig,
) -> Result<(Pipeline, BuildOutcome)> {
    let files = collect_files(source)?;
    // 진행 메시지는 stderr로 (stdout은 --json 출력 전용)
    eprintln!("{}", collection_summary(&CollectionStats::from_files(&files)));

    let mut documents = Vec::with_capacity(files.len());
    for file in &files {
        let doc = UploadedDocument::from_path(&file.path)
            .await
            .with_context(|| format!("파일 읽기 실패: {}", file.path.display()))?;
        documents.push(doc);
    }

    let pipeline = Pipeline::new(config).context("파이프라인 생성 실패")?;

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = pipeline.build(documents, &cancel).await;
    ctrl_c.abort();

    let outcome = result.context("인덱스 빌드 실패")?;
    Ok((pipeline, outcome))
}

/// 수집 결과 한 줄 요약
fn collection_summary(stats: &CollectionStats) -> String {
    format!(
        "[*] 파일 {} 개 (PDF {}, 텍스트 {}, {})",
        stats.total_files,
        stats.pdf_files,
        stats.text_files,
        format_bytes(stats.total_size as usize)
    )
}

/// 빌드 결과 출력
fn print_report(report: &BuildReport) {
    let status = match report.status {
        BuildStatus::Completed => "[OK] 빌드 완료",
        BuildStatus::CompletedWithWarnings => "[!] 빌드 완료 (경고 있음)",
    };
    println!("{} ({})", status, report.built_at.format("%Y-%m-%d %H:%M:%S"));
    println!(
        "     문서: {}/{} | 페이지: {} | 청크: {} | 벡터: {}",
        report.documents_indexed,
        report.documents_received,
        report.pages_processed,
        report.chunks_indexed,
        report.vectors_indexed
    );

    for warning in &report.warnings {
        println!("     - {}", warning);
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.chars().count() <= max_chars {
        cleaned
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
