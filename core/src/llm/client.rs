//! LLM client implementation
//!
//! Supports two providers:
//! - Google Generative AI (Gemini) - the default
//! - OpenAI-compatible API (OpenAI, Ollama, LM Studio, proxies)
//!
//! Without an API key the client runs in mock mode and returns a canned
//! minimal scene, so the rest of the pipeline stays exercisable offline.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};

use super::{GenerateOptions, TextGenerator};
use crate::config::LlmSection;
use crate::error::{NeosceneError, Result};
use crate::{error_log, warn_log};

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Google Generative AI (Gemini)
    GoogleGenerativeAi,
    /// OpenAI-compatible API (works with OpenAI, Ollama, LM Studio)
    OpenAiCompatible,
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" | "gemini" | "google-ai" | "google-generativeai" => {
                Ok(LlmProvider::GoogleGenerativeAi)
            }
            "openai" | "ollama" | "lmstudio" | "local" | "openrouter" | "custom" => {
                Ok(LlmProvider::OpenAiCompatible)
            }
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::GoogleGenerativeAi => write!(f, "gemini"),
            LlmProvider::OpenAiCompatible => write!(f, "openai-compatible"),
        }
    }
}

const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Main LLM client
pub struct LlmClient {
    provider: LlmProvider,
    model: String,
    api_key: Option<String>,
    base_url: String,
    temperature: f32,
    max_output_tokens: u32,
    http_client: HttpClient,
}

impl LlmClient {
    /// Create a client from the `[llm]` config section
    pub fn from_config(config: &LlmSection) -> Result<Self> {
        let provider: LlmProvider =
            config
                .provider
                .parse()
                .map_err(|e: String| NeosceneError::InvalidConfig {
                    message: e,
                })?;

        let base_url = config.base_url.clone().unwrap_or_else(|| {
            match provider {
                LlmProvider::GoogleGenerativeAi => GEMINI_DEFAULT_BASE_URL,
                LlmProvider::OpenAiCompatible => OPENAI_DEFAULT_BASE_URL,
            }
            .to_string()
        });

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("neoscene/0.1")
            .build()
            .map_err(|e| NeosceneError::InvalidConfig {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(LlmClient {
            provider,
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            base_url,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            http_client,
        })
    }

    /// Get the model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the provider type
    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    fn llm_error(&self, message: impl Into<String>) -> NeosceneError {
        NeosceneError::Llm {
            provider: self.provider.to_string(),
            message: message.into(),
        }
    }

    /// Retry transient failures (429/5xx/network) with doubling backoff
    async fn send_with_backoff<F, Fut>(&self, operation: F) -> Result<reqwest::Response>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
    {
        let max_retries = 3;
        let mut attempt = 0;
        let mut delay = Duration::from_secs(2);

        loop {
            match operation().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS && attempt < max_retries {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .map(Duration::from_secs);
                        let wait = retry_after.unwrap_or(delay);
                        warn_log!(
                            "Rate limited (429), waiting {:?} before retry (attempt {}/{})",
                            wait,
                            attempt + 1,
                            max_retries
                        );
                        sleep(wait).await;
                    } else if status.is_server_error() && attempt < max_retries {
                        warn_log!("Provider error {}, retrying in {:?}", status, delay);
                        sleep(delay).await;
                    } else {
                        return Ok(response);
                    }
                }
                Err(e) => {
                    if attempt >= max_retries {
                        return Err(self.llm_error(format!("request failed: {}", e)));
                    }
                    warn_log!("Network error ({}), retrying in {:?}", e, delay);
                    sleep(delay).await;
                }
            }

            attempt += 1;
            delay *= 2;
        }
    }

    async fn generate_gemini(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let api_key = self.api_key.as_deref().unwrap_or("");
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            api_key
        );

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: Some(GeminiGenerationConfig {
                max_output_tokens: Some(self.max_output_tokens),
                temperature: Some(options.temperature.unwrap_or(self.temperature)),
                response_mime_type: if options.json_output {
                    Some("application/json".to_string())
                } else {
                    None
                },
            }),
        };

        let response = self
            .send_with_backoff(|| async {
                self.http_client
                    .post(&url)
                    .header(CONTENT_TYPE, "application/json")
                    .json(&body)
                    .send()
                    .await
            })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| self.llm_error(format!("failed to read response: {}", e)))?;
                let parsed: GeminiResponse = serde_json::from_str(&text).map_err(|e| {
                    error_log!("Failed to parse Gemini response: {}. Raw body: {}", e, text);
                    self.llm_error(format!("failed to parse response: {}", e))
                })?;

                parsed
                    .candidates
                    .into_iter()
                    .next()
                    .and_then(|c| c.content.parts.into_iter().next())
                    .map(|p| p.text)
                    .ok_or_else(|| self.llm_error("response contained no candidates"))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(self.llm_error("authentication failed, check your API key"))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(self.llm_error("rate limit exceeded")),
            status => {
                let error_body: Option<serde_json::Value> = response.json().await.ok();
                let message = error_body
                    .as_ref()
                    .and_then(|v| v.get("error").and_then(|e| e.get("message")))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                Err(self.llm_error(format!("API request failed ({}): {}", status, message)))
            }
        }
    }

    async fn generate_openai(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );

        let body = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![OpenAiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_completion_tokens: Some(self.max_output_tokens),
            temperature: Some(options.temperature.unwrap_or(self.temperature)),
        };

        let response = self
            .send_with_backoff(|| async {
                let mut request = self
                    .http_client
                    .post(&url)
                    .header(CONTENT_TYPE, "application/json")
                    .json(&body);
                if let Some(key) = &self.api_key {
                    request = request.bearer_auth(key);
                }
                request.send().await
            })
            .await?;

        match response.status() {
            StatusCode::OK => {
                let text = response
                    .text()
                    .await
                    .map_err(|e| self.llm_error(format!("failed to read response: {}", e)))?;
                let parsed: OpenAiResponse = serde_json::from_str(&text).map_err(|e| {
                    error_log!("Failed to parse OpenAI response: {}. Raw body: {}", e, text);
                    self.llm_error(format!("failed to parse response: {}", e))
                })?;

                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| self.llm_error("response contained no choices"))
            }
            StatusCode::UNAUTHORIZED => {
                Err(self.llm_error("authentication failed, check your API key"))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(self.llm_error("rate limit exceeded")),
            status => {
                let error_body: Option<serde_json::Value> = response.json().await.ok();
                let message = error_body
                    .as_ref()
                    .and_then(|v| v.get("error").and_then(|e| e.get("message")))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                Err(self.llm_error(format!("API request failed ({}): {}", status, message)))
            }
        }
    }

    /// Canned response used when no API key is configured, shaped like a
    /// minimal valid scene so the pipeline stays exercisable.
    fn mock_generate(&self, prompt: &str) -> String {
        if prompt.to_lowercase().contains("scene") || prompt.to_lowercase().contains("json") {
            return r#"{
  "name": "mock_scene",
  "environment": {"asset_id": "orchard"},
  "objects": [],
  "cameras": []
}"#
            .to_string();
        }
        format!(
            "[MOCK RESPONSE] Received prompt of {} characters. API key not configured.",
            prompt.len()
        )
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<String> {
        if !self.is_configured() {
            return Ok(self.mock_generate(prompt));
        }

        match self.provider {
            LlmProvider::GoogleGenerativeAi => self.generate_gemini(prompt, &options).await,
            LlmProvider::OpenAiCompatible => self.generate_openai(prompt, &options).await,
        }
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn provider_name(&self) -> String {
        self.provider.to_string()
    }
}

// Gemini API types
#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "generationConfig")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

// OpenAI-compatible API types
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmSection;

    fn unconfigured_client() -> LlmClient {
        let section = LlmSection {
            api_key: None,
            ..LlmSection::default()
        };
        LlmClient::from_config(&section).unwrap()
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(
            "gemini".parse::<LlmProvider>().unwrap(),
            LlmProvider::GoogleGenerativeAi
        );
        assert_eq!(
            "ollama".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAiCompatible
        );
        assert!("carrier-pigeon".parse::<LlmProvider>().is_err());
    }

    #[tokio::test]
    async fn test_mock_mode_without_api_key() {
        let client = unconfigured_client();
        assert!(!client.is_configured());

        let response = client
            .generate("Create a scene JSON", GenerateOptions::default())
            .await
            .unwrap();
        assert!(response.contains("mock_scene"));
    }

    #[tokio::test]
    async fn test_mock_mode_non_scene_prompt() {
        let client = unconfigured_client();
        let response = client
            .generate("hello there", GenerateOptions::default())
            .await
            .unwrap();
        assert!(response.contains("MOCK RESPONSE"));
    }
}
