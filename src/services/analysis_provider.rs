use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MAX_RETRIES: usize = 2;
const BASE_BACKOFF_MS: u64 = 200;

/// Qualitative proficiency as reported by the analysis collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProficiencyLevel {
    Low,
    Medium,
    High,
}

/// One question the user answered incorrectly, in the shape the collaborator
/// receives.
#[derive(Debug, Clone, Serialize)]
pub struct IncorrectResponse {
    pub question: String,
    pub selected_answer: String,
    pub correct_answer: String,
}

/// The collaborator's analysis document. Strictly validated: a payload that
/// does not match this shape counts as a failure and triggers the analyzer's
/// fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub weak_concepts: Vec<ReportedConcept>,
    #[serde(default)]
    pub learning_path_order: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedConcept {
    pub concept: String,
    pub proficiency_level: ProficiencyLevel,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis disabled or not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed analysis payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
    #[error("mock failure")]
    MockFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Clone)]
struct ProviderConfig {
    api_key: Option<String>,
    model: String,
    api_endpoint: String,
}

/// Text-analysis collaborator. Live mode talks to an OpenAI-style chat
/// endpoint with a bounded timeout; mock mode serves a canned reply (or a
/// simulated failure) and exists for tests and offline runs.
#[derive(Clone)]
pub struct AnalysisService {
    mode: Mode,
}

#[derive(Clone)]
enum Mode {
    Live {
        config: ProviderConfig,
        client: reqwest::Client,
    },
    Mock(Option<String>),
}

impl AnalysisService {
    pub fn from_env() -> Self {
        if env_bool("LLM_MOCK") {
            return Self::mock(None);
        }

        let api_key = env_string("LLM_API_KEY");
        let model = env_string("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_endpoint = env_string("LLM_API_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string();
        let timeout =
            Duration::from_millis(env_u64("ANALYSIS_TIMEOUT_MS").unwrap_or(DEFAULT_TIMEOUT_MS));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            mode: Mode::Live {
                config: ProviderConfig {
                    api_key,
                    model,
                    api_endpoint,
                },
                client,
            },
        }
    }

    /// `reply = None` simulates an unreachable collaborator.
    pub fn mock(reply: Option<&str>) -> Self {
        Self {
            mode: Mode::Mock(reply.map(|s| s.to_string())),
        }
    }

    pub fn is_available(&self) -> bool {
        match &self.mode {
            Mode::Live { config, .. } => config
                .api_key
                .as_deref()
                .is_some_and(|v| !v.trim().is_empty()),
            Mode::Mock(reply) => reply.is_some(),
        }
    }

    /// Analyzes a batch of incorrect responses into a ranked weak-concept
    /// report.
    pub async fn analyze_responses(
        &self,
        responses: &[IncorrectResponse],
    ) -> Result<AnalysisReport, AnalysisError> {
        let prompt = analysis_prompt(responses)?;
        let raw = self
            .complete(
                "You are an education analyst. Respond with JSON only.",
                &prompt,
            )
            .await?;
        parse_analysis_report(&raw)
    }

    /// One chat round-trip; shared by analysis and content generation.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisError> {
        match &self.mode {
            Mode::Mock(Some(reply)) => Ok(reply.clone()),
            Mode::Mock(None) => Err(AnalysisError::MockFailure),
            Mode::Live { config, client } => {
                let api_key = config
                    .api_key
                    .as_deref()
                    .filter(|v| !v.trim().is_empty())
                    .ok_or(AnalysisError::NotConfigured("LLM_API_KEY"))?;

                let url = format!("{}/chat/completions", config.api_endpoint);
                let payload = serde_json::json!({
                    "model": config.model,
                    "messages": [
                        { "role": "system", "content": system },
                        { "role": "user", "content": user },
                    ],
                    "stream": false
                });

                let response = post_with_retry(client, &url, api_key, &payload).await?;
                response
                    .choices
                    .first()
                    .map(|c| c.message.content.clone())
                    .ok_or(AnalysisError::EmptyChoices)
            }
        }
    }
}

async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    payload: &serde_json::Value,
) -> Result<ChatResponse, AnalysisError> {
    let mut last_error: Option<AnalysisError> = None;

    for retry in 0..=MAX_RETRIES {
        match client
            .post(url)
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .await
        {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    let bytes = resp.bytes().await?;
                    return serde_json::from_slice(&bytes).map_err(AnalysisError::Malformed);
                }
                let body = resp.text().await.unwrap_or_default();
                let err = AnalysisError::HttpStatus { status, body };
                if retry < MAX_RETRIES && is_retryable(status) {
                    warn!(retry, ?status, "analysis request failed, retrying");
                    sleep(Duration::from_millis(BASE_BACKOFF_MS * (1 << retry))).await;
                    last_error = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                let err = AnalysisError::Request(e);
                if retry < MAX_RETRIES {
                    warn!(retry, "analysis request error, retrying");
                    sleep(Duration::from_millis(BASE_BACKOFF_MS * (1 << retry))).await;
                    last_error = Some(err);
                    continue;
                }
                return Err(err);
            }
        }
    }
    Err(last_error.unwrap_or(AnalysisError::NotConfigured("unknown")))
}

fn analysis_prompt(responses: &[IncorrectResponse]) -> Result<String, AnalysisError> {
    let body = serde_json::to_string_pretty(responses)?;
    Ok(format!(
        r#"Analyze these incorrect assessment responses and identify the weak concepts.
For each weak concept, provide:
1. The concept name
2. Proficiency level (low, medium, high)
3. Specific recommendations for improvement

Incorrect Responses:
{body}

Return the analysis in this JSON format:
{{
    "weak_concepts": [
        {{
            "concept": "concept name",
            "proficiency_level": "low/medium/high",
            "recommendations": ["recommendation 1", "recommendation 2"]
        }}
    ],
    "learning_path_order": ["concept 1", "concept 2"]
}}"#
    ))
}

/// Parses the collaborator reply, tolerating markdown code fences around the
/// JSON document but nothing else.
pub fn parse_analysis_report(raw: &str) -> Result<AnalysisReport, AnalysisError> {
    let cleaned = strip_code_fences(raw);
    Ok(serde_json::from_str(cleaned)?)
}

pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}
