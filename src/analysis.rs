//! External idea analysis over an OpenAI-compatible chat-completions API.
//!
//! One invocation makes one request, or two when the first reply does not
//! decode as an [`AnalysisReport`]. The retry uses a stricter system
//! instruction and the same user prompt. A single wall-clock timeout
//! covers both requests.
//!
//! | Outcome | Error |
//! |---------|-------|
//! | Budget exceeded | [`AnalysisError::Timeout`] |
//! | No content in the first reply | [`AnalysisError::EmptyResponse`] |
//! | Retry reply missing or undecodable | [`AnalysisError::InvalidResponse`] |
//! | Transport failure or non-2xx status | [`AnalysisError::Http`] |

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use idea_pipeline_core::models::AnalysisReport;

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;

pub const SYSTEM_PROMPT: &str =
    "You are a rigorous startup idea validator. Be concise, factual, and structured.";

pub const STRICT_SYSTEM_PROMPT: &str =
    "You are a rigorous startup idea validator. Respond JSON only, no prose.";

const REPORT_TEMPLATE: &str = r#"{
  "one_sentence": "...",
  "market_signals": ["...","..."],
  "competitors": [{"name":"...", "brief_note":"..."}],
  "moat_risks": ["...","..."],
  "go_to_market": ["...","..."],
  "monetization": ["...","..."],
  "feasibility_factors": ["...","..."],
  "rubric_inputs": {
    "market_size": 0-5,
    "competition_intensity": 0-5,
    "novelty": 0-5,
    "execution_complexity": 0-5,
    "monetization_clarity": 0-5
  }
}"#;

/// Something that turns idea text into a structured report.
#[async_trait]
pub trait IdeaAnalyzer: Send + Sync {
    async fn analyze(&self, idea_text: &str) -> Result<AnalysisReport, AnalysisError>;
}

/// The user message sent for `idea_text`.
pub fn build_prompt(idea_text: &str) -> String {
    format!(
        "System: {}\n\nUser: Analyze this startup idea and return ONLY a strict JSON object:\n{}\nIdea: \"\"\"{}\"\"\"\nReturn ONLY JSON with the exact keys above.",
        SYSTEM_PROMPT, REPORT_TEMPLATE, idea_text
    )
}

/// Decode a reply payload into a report. Fails on any missing or
/// mistyped field.
pub fn parse_report(content: &str) -> Result<AnalysisReport, serde_json::Error> {
    serde_json::from_str(content.trim())
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty())
    }
}

/// Chat-completions client. Credentials and endpoint are fixed at
/// construction.
pub struct ChatAnalysisClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl ChatAnalysisClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let defaults = AnalysisConfig::default();
        Self {
            client: reqwest::Client::new(),
            endpoint: defaults.endpoint,
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(defaults.timeout_secs),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a client from `[analysis]`, reading the API key from the
    /// environment variable it names.
    ///
    /// # Errors
    ///
    /// Returns an error if the model is unset or the key variable is missing.
    pub fn from_config(config: &AnalysisConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("analysis.model required for provider '{}'", config.provider))?;
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} environment variable not set", config.api_key_env))?;

        Ok(Self::new(api_key, model)
            .with_endpoint(config.endpoint.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<Option<String>, AnalysisError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Http(format!("status {}: {}", status, text)));
        }

        let parsed: ChatResponse = response.json().await?;
        Ok(parsed.into_content())
    }

    async fn analyze_with_retry(&self, idea_text: &str) -> Result<AnalysisReport, AnalysisError> {
        let prompt = build_prompt(idea_text);

        let first = self
            .complete(SYSTEM_PROMPT, &prompt)
            .await?
            .ok_or(AnalysisError::EmptyResponse)?;

        match parse_report(&first) {
            Ok(report) => return Ok(report),
            Err(e) => warn!(attempt = 1, error = %e, "analysis reply did not decode, retrying"),
        }

        let second = self
            .complete(STRICT_SYSTEM_PROMPT, &prompt)
            .await?
            .ok_or_else(|| AnalysisError::InvalidResponse("no content on retry".to_string()))?;

        let report =
            parse_report(&second).map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;
        debug!(attempt = 2, "analysis reply decoded on retry");
        Ok(report)
    }
}

#[async_trait]
impl IdeaAnalyzer for ChatAnalysisClient {
    async fn analyze(&self, idea_text: &str) -> Result<AnalysisReport, AnalysisError> {
        tokio::time::timeout(self.timeout, self.analyze_with_retry(idea_text))
            .await
            .map_err(|_| AnalysisError::Timeout(self.timeout))?
    }
}

/// Used when `[analysis].provider = "disabled"`. Every call fails, so
/// queued ideas end up `failed` instead of waiting forever.
pub struct DisabledAnalyzer;

#[async_trait]
impl IdeaAnalyzer for DisabledAnalyzer {
    async fn analyze(&self, _idea_text: &str) -> Result<AnalysisReport, AnalysisError> {
        Err(AnalysisError::Disabled)
    }
}

/// Pick the analyzer `[analysis]` asks for.
pub fn create_analyzer(config: &AnalysisConfig) -> anyhow::Result<Box<dyn IdeaAnalyzer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledAnalyzer)),
        "perplexity" => Ok(Box::new(ChatAnalysisClient::from_config(config)?)),
        other => anyhow::bail!("Unknown analysis provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn report_json() -> serde_json::Value {
        serde_json::json!({
            "one_sentence": "Rent tools to neighbours.",
            "market_signals": ["DIY is growing"],
            "competitors": [{"name": "Toolshare", "brief_note": "regional"}],
            "moat_risks": ["low switching cost"],
            "go_to_market": ["hardware stores"],
            "monetization": ["rental fee"],
            "feasibility_factors": ["insurance"],
            "rubric_inputs": {
                "market_size": 3,
                "competition_intensity": 2,
                "novelty": 4,
                "execution_complexity": 1,
                "monetization_clarity": 3
            }
        })
    }

    fn chat_reply(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    fn test_client(server: &MockServer) -> ChatAnalysisClient {
        ChatAnalysisClient::new("test-key", "sonar")
            .with_endpoint(format!("{}/chat/completions", server.uri()))
            .with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn test_prompt_embeds_idea_text() {
        let prompt = build_prompt("tool library\n\nshare drills");
        assert!(prompt.contains("Idea: \"\"\"tool library\n\nshare drills\"\"\""));
        assert!(prompt.ends_with("Return ONLY JSON with the exact keys above."));
        assert!(prompt.contains("\"rubric_inputs\""));
    }

    #[test]
    fn test_parse_report_rejects_fractional_rubric() {
        let mut value = report_json();
        value["rubric_inputs"]["novelty"] = serde_json::json!(3.5);
        assert!(parse_report(&value.to_string()).is_err());
    }

    #[tokio::test]
    async fn test_first_reply_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_string_contains("Be concise, factual, and structured."))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_reply(&report_json().to_string())),
            )
            .expect(1)
            .mount(&server)
            .await;

        let report = test_client(&server).analyze("idea").await.unwrap();
        assert_eq!(report.one_sentence, "Rent tools to neighbours.");
        assert_eq!(report.rubric_inputs.novelty, 4);
    }

    #[tokio::test]
    async fn test_prose_reply_retries_with_strict_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Respond JSON only, no prose."))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_reply(&report_json().to_string())),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("Be concise, factual, and structured."))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
                "Sure! Here is my analysis of your idea...",
            )))
            .expect(1)
            .mount(&server)
            .await;

        let report = test_client(&server).analyze("idea").await.unwrap();
        assert_eq!(report.competitors[0].name, "Toolshare");
    }

    #[tokio::test]
    async fn test_whitespace_reply_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Respond JSON only, no prose."))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_reply(&report_json().to_string())),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("  \n ")))
            .expect(1)
            .mount(&server)
            .await;

        let report = test_client(&server).analyze("idea").await.unwrap();
        assert_eq!(report.rubric_inputs.novelty, 4);
    }

    #[tokio::test]
    async fn test_missing_content_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server).analyze("idea").await.unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyResponse), "got: {err}");
    }

    #[tokio::test]
    async fn test_two_bad_replies_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("{\"one_sentence\": 1}")))
            .expect(2)
            .mount(&server)
            .await;

        let err = test_client(&server).analyze("idea").await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidResponse(_)), "got: {err}");
    }

    #[tokio::test]
    async fn test_slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_reply(&report_json().to_string()))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = test_client(&server).with_timeout(Duration::from_millis(100));
        let err = client.analyze("idea").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Timeout(_)), "got: {err}");
    }

    #[tokio::test]
    async fn test_server_error_is_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = test_client(&server).analyze("idea").await.unwrap_err();
        match err {
            AnalysisError::Http(msg) => assert!(msg.contains("overloaded"), "got: {msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_disabled_analyzer_fails() {
        let err = DisabledAnalyzer.analyze("idea").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Disabled));
    }
}
