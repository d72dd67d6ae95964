//! External analyzer abstraction and implementations.
//!
//! Defines the [`Analyzer`] trait and concrete implementations:
//! - **[`DisabledAnalyzer`]** — returns errors; used when no provider is configured.
//! - **[`OpenAiAnalyzer`]** — calls an OpenAI-compatible chat-completions API.
//! - **[`OllamaAnalyzer`]** — calls a local Ollama instance's `/api/chat` endpoint.
//!
//! A provider receives the whole miss-batch in one request — external calls
//! dominate cost and latency, so they are never issued per item. The response
//! is parsed into typed [`ItemAnalysis`] values at this boundary; malformed
//! payloads (wrong array length, missing fields, out-of-range confidence)
//! are rejected here rather than propagated as undefined fields.
//!
//! # Retry Strategy
//!
//! The HTTP providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AnalyzerConfig;
use crate::models::{AnalyzerResponse, ItemAnalysis, ThemeSummary};

/// Trait for sentiment analyzers.
///
/// `analyze` must return one entry per input text, in input order; callers
/// verify the length and treat a mismatch as a failed analysis.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Provider/model identifier for logs and diagnostics.
    fn name(&self) -> &str;

    /// Analyze a batch of texts in one call.
    async fn analyze(&self, texts: &[String]) -> Result<AnalyzerResponse>;
}

/// Create the appropriate [`Analyzer`] based on configuration.
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider cannot be
/// initialized (missing model or API key).
pub fn create_analyzer(config: &AnalyzerConfig) -> Result<Arc<dyn Analyzer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledAnalyzer)),
        "openai" => Ok(Arc::new(OpenAiAnalyzer::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaAnalyzer::new(config)?)),
        other => bail!("Unknown analyzer provider: {}", other),
    }
}

// ============ Disabled Analyzer ============

/// A no-op analyzer that always returns errors.
///
/// Used when `analyzer.provider = "disabled"` in the configuration; cached
/// lookups still work, but any batch containing a miss fails.
pub struct DisabledAnalyzer;

#[async_trait]
impl Analyzer for DisabledAnalyzer {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn analyze(&self, _texts: &[String]) -> Result<AnalyzerResponse> {
        bail!("Analyzer provider is disabled")
    }
}

// ============ OpenAI Analyzer ============

/// Analyzer backed by an OpenAI-compatible chat-completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable. The model is asked
/// for a strict-JSON object; the reply is parsed and validated before any
/// result leaves this module.
pub struct OpenAiAnalyzer {
    model: String,
    url: String,
    timeout: Duration,
    max_retries: u32,
}

impl OpenAiAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("analyzer.model required for OpenAI provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    fn name(&self) -> &str {
        &self.model
    }

    async fn analyze(&self, texts: &[String]) -> Result<AnalyzerResponse> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": instructions() },
                { "role": "user", "content": serde_json::to_string(texts)? },
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(format!("{}/chat/completions", self.url))
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let content = json
                            .pointer("/choices/0/message/content")
                            .and_then(|c| c.as_str())
                            .ok_or_else(|| {
                                anyhow::anyhow!("Invalid chat response: missing message content")
                            })?;
                        return parse_analyzer_payload(content, texts.len());
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Analyzer API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Analyzer API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Analysis failed after retries")))
    }
}

// ============ Ollama Analyzer ============

/// Analyzer backed by a local Ollama instance.
///
/// Calls `POST /api/chat` with `format: "json"` on the configured URL
/// (default: `http://localhost:11434`).
pub struct OllamaAnalyzer {
    model: String,
    url: String,
    timeout: Duration,
    max_retries: u32,
}

impl OllamaAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("analyzer.model required for Ollama provider"))?;

        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Analyzer for OllamaAnalyzer {
    fn name(&self) -> &str {
        &self.model
    }

    async fn analyze(&self, texts: &[String]) -> Result<AnalyzerResponse> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "format": "json",
            "messages": [
                { "role": "system", "content": instructions() },
                { "role": "user", "content": serde_json::to_string(texts)? },
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(format!("{}/api/chat", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let content = json
                            .pointer("/message/content")
                            .and_then(|c| c.as_str())
                            .ok_or_else(|| {
                                anyhow::anyhow!("Invalid Ollama response: missing message content")
                            })?;
                        return parse_analyzer_payload(content, texts.len());
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("Ollama API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Ollama API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url,
                        e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Ollama analysis failed after retries")))
    }
}

fn instructions() -> &'static str {
    "You are a sentiment analysis service. The user message is a JSON array of \
     free-text items. Reply with a single JSON object of the shape \
     {\"analyses\": [...], \"themes\": [...]}. `analyses` must contain exactly one \
     entry per input item, in input order, each with: sentiment (string label), \
     confidence (number in [0,1]), confidenceDistribution (label -> probability), \
     translation (English translation, or null), highlights (label -> list of \
     verbatim substrings), translatedHighlights (same over the translation), \
     reasoning, brief, replySuggestion. `themes` is a list of \
     {theme, count, sentiment} for topics recurring across the batch; it may be \
     empty. Output JSON only."
}

/// Wire shape of the model's JSON reply.
#[derive(Deserialize)]
struct AnalyzerPayload {
    #[serde(default)]
    analyses: Vec<ItemAnalysis>,
    #[serde(default)]
    themes: Option<Vec<ThemeSummary>>,
}

/// Parse and validate one analyzer reply.
///
/// The length check is the engine's defensive guarantee: every input text
/// must map to exactly one analysis, so a shorter or longer array fails the
/// whole batch rather than mis-assigning results.
fn parse_analyzer_payload(content: &str, expected: usize) -> Result<AnalyzerResponse> {
    let payload: AnalyzerPayload = serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Malformed analyzer payload: {}", e))?;

    if payload.analyses.len() != expected {
        bail!(
            "Analyzer returned {} analyses for {} texts",
            payload.analyses.len(),
            expected
        );
    }

    for (index, analysis) in payload.analyses.iter().enumerate() {
        if analysis.sentiment.trim().is_empty() {
            bail!("Analyzer returned an empty sentiment label for item {}", index);
        }
        if !(0.0..=1.0).contains(&analysis.confidence) {
            bail!(
                "Analyzer returned confidence {} for item {} (must be in [0,1])",
                analysis.confidence,
                index
            );
        }
    }

    Ok(AnalyzerResponse {
        analyses: payload.analyses,
        themes: payload.themes.filter(|t| !t.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_payload_parses() {
        let content = r#"{
            "analyses": [
                {
                    "sentiment": "positive",
                    "confidence": 0.92,
                    "confidenceDistribution": {"positive": 0.92, "negative": 0.08},
                    "translation": "Great product",
                    "highlights": {"positive": ["Great"]},
                    "translatedHighlights": {"positive": ["Great"]},
                    "reasoning": "enthusiastic wording",
                    "brief": "praise",
                    "replySuggestion": "Thank you!"
                }
            ],
            "themes": [{"theme": "quality", "count": 1, "sentiment": "positive"}]
        }"#;

        let parsed = parse_analyzer_payload(content, 1).unwrap();
        assert_eq!(parsed.analyses.len(), 1);
        assert_eq!(parsed.analyses[0].sentiment, "positive");
        assert_eq!(parsed.analyses[0].highlights["positive"], vec!["Great"]);
        assert_eq!(parsed.themes.unwrap()[0].theme, "quality");
    }

    #[test]
    fn sparse_payload_fills_defaults() {
        let content = r#"{"analyses": [{"sentiment": "neutral", "confidence": 0.5}]}"#;
        let parsed = parse_analyzer_payload(content, 1).unwrap();
        assert!(parsed.analyses[0].confidence_distribution.is_empty());
        assert!(parsed.analyses[0].translation.is_none());
        assert!(parsed.themes.is_none());
    }

    #[test]
    fn length_mismatch_rejected() {
        let content = r#"{"analyses": [{"sentiment": "positive", "confidence": 0.9}]}"#;
        let err = parse_analyzer_payload(content, 2).unwrap_err();
        assert!(err.to_string().contains("1 analyses for 2 texts"));
    }

    #[test]
    fn non_json_rejected() {
        assert!(parse_analyzer_payload("sure, here you go:", 1).is_err());
    }

    #[test]
    fn out_of_range_confidence_rejected() {
        let content = r#"{"analyses": [{"sentiment": "positive", "confidence": 1.7}]}"#;
        assert!(parse_analyzer_payload(content, 1).is_err());
    }

    #[test]
    fn empty_sentiment_rejected() {
        let content = r#"{"analyses": [{"sentiment": "  ", "confidence": 0.4}]}"#;
        assert!(parse_analyzer_payload(content, 1).is_err());
    }

    #[test]
    fn empty_theme_list_collapses_to_none() {
        let content = r#"{"analyses": [], "themes": []}"#;
        let parsed = parse_analyzer_payload(content, 0).unwrap();
        assert!(parsed.themes.is_none());
    }

    #[test]
    fn disabled_provider_errors() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let err = rt
            .block_on(DisabledAnalyzer.analyze(&["text".to_string()]))
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
