//! Google Gemini 임베딩 프로바이더
//!
//! `batchEmbedContents`로 최대 100개씩 묶어서 요청합니다.
//! 네트워크/인증 실패는 모두 `EmbeddingUnavailable`로 보고합니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{RagError, Result};

use super::EmbeddingProvider;

const PROVIDER: &str = "gemini-embedding-001";
const MODEL: &str = "models/gemini-embedding-001";

/// Gemini 배치 임베딩 API 엔드포인트
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_BATCH_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:batchEmbedContents";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// MRL로 지원되는 출력 차원
const SUPPORTED_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 지원 차원인지 확인 (아니면 `InvalidConfig`)
pub fn check_dimension(dimension: usize) -> Result<()> {
    if SUPPORTED_DIMENSIONS.contains(&dimension) {
        Ok(())
    } else {
        Err(RagError::InvalidConfig(format!(
            "Invalid Gemini embedding dimension: {}. Must be 768, 1536, or 3072",
            dimension
        )))
    }
}

/// 요청당 최대 텍스트 수
const MAX_BATCH: usize = 100;

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const MIN_DELAY_MS: u64 = 1000;
/// 429/전송 실패 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

// ============================================================================
// Rate Limiter
// ============================================================================

#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay: Duration::from_millis(MIN_DELAY_MS),
            last_request: None,
        }
    }

    /// 요청 가능할 때까지 대기
    async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }

        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

// ============================================================================
// Request / Response
// ============================================================================

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: &'static str,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: &'static str,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

// ============================================================================
// GeminiEmbedding
// ============================================================================

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GeminiEmbedding {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 차원을 지정하여 생성 (768, 1536, 3072 중 선택)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        check_dimension(dimension)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                RagError::embedding_unavailable(PROVIDER, format!("HTTP client: {}", e))
            })?;

        Ok(Self {
            api_key,
            client,
            dimension,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
                RATE_LIMIT_RPM,
                RATE_LIMIT_WINDOW,
            ))),
        })
    }

    /// 환경변수의 API 키로 생성
    pub fn from_env() -> Result<Self> {
        Self::new(get_api_key()?)
    }

    pub fn from_env_with_dimension(dimension: usize) -> Result<Self> {
        Self::with_dimension(get_api_key()?, dimension)
    }

    /// 비어 있지 않은 텍스트 묶음 하나를 요청 (재시도 포함)
    async fn request_batch(&self, texts: &[&str], task_type: &'static str) -> Result<Vec<Vec<f32>>> {
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: MODEL,
                    content: EmbedContent {
                        parts: vec![EmbedPart {
                            text: text.to_string(),
                        }],
                    },
                    task_type,
                    output_dimensionality: self.dimension,
                })
                .collect(),
        };

        let mut last_error = String::new();

        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));

            let response = match self
                .client
                .post(GEMINI_BATCH_EMBED_URL)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = format!("request failed: {}", e);
                    if attempt < MAX_RETRIES {
                        tracing::warn!(
                            "Embedding request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response.text().await.map_err(|e| {
                RagError::embedding_unavailable(PROVIDER, format!("reading response: {}", e))
            })?;

            if status.is_success() {
                let parsed: BatchEmbedResponse = serde_json::from_str(&body).map_err(|e| {
                    RagError::embedding_unavailable(PROVIDER, format!("invalid response: {}", e))
                })?;
                if parsed.embeddings.len() != texts.len() {
                    return Err(RagError::IndexInvariant(format!(
                        "{} returned {} embeddings for {} texts",
                        PROVIDER,
                        parsed.embeddings.len(),
                        texts.len()
                    )));
                }
                return Ok(parsed.embeddings.into_iter().map(|e| e.values).collect());
            }

            if status.as_u16() == 429 {
                last_error = "rate limit exceeded (429)".to_string();
                if attempt < MAX_RETRIES {
                    tracing::warn!(
                        "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                        backoff,
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                break;
            }

            let message = match serde_json::from_str::<GeminiError>(&body) {
                Ok(error) => format!("{}: {}", error.error.status, error.error.message),
                Err(_) => format!("{}: {}", status, body),
            };
            return Err(RagError::embedding_unavailable(PROVIDER, message));
        }

        Err(RagError::embedding_unavailable(
            PROVIDER,
            format!("giving up after {} retries: {}", MAX_RETRIES, last_error),
        ))
    }

    /// 빈 텍스트는 영벡터로 두고 나머지만 API로 보냄
    async fn embed_all(&self, texts: &[String], task_type: &'static str) -> Result<Vec<Vec<f32>>> {
        let mut results = vec![vec![0.0; self.dimension]; texts.len()];

        let pending: Vec<(usize, &str)> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, t.as_str()))
            .collect();

        for group in pending.chunks(MAX_BATCH) {
            let batch: Vec<&str> = group.iter().map(|(_, t)| *t).collect();
            let vectors = self.request_batch(&batch, task_type).await?;
            for ((i, _), vector) in group.iter().zip(vectors) {
                results[*i] = vector;
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .embed_all(&[text.to_string()], "RETRIEVAL_DOCUMENT")
            .await?;
        Ok(vectors.pop().unwrap_or_else(|| vec![0.0; self.dimension]))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_all(texts, "RETRIEVAL_DOCUMENT").await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self
            .embed_all(&[text.to_string()], "RETRIEVAL_QUERY")
            .await?;
        Ok(vectors.pop().unwrap_or_else(|| vec![0.0; self.dimension]))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

// ============================================================================
// API Key Management
// ============================================================================

const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];

/// API 키 로드
///
/// 우선순위: `GEMINI_API_KEY` > `GOOGLE_AI_API_KEY`
pub fn get_api_key() -> Result<String> {
    for var in API_KEY_VARS {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    Err(RagError::embedding_unavailable(
        PROVIDER,
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable",
    ))
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    API_KEY_VARS
        .iter()
        .any(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
}
