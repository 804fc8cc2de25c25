use crate::domain::ports::{InferenceClient, InferenceClientRef, InferenceRequest};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_MAX_OUTPUT_TOKENS: u32 = 2048;

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EngineError::Configuration(format!("failed to build HTTP client: {}", e)))
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EngineError::ExternalService("chat completion had no content".to_string()))
    }
}

/// Client for any endpoint speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl InferenceClient for OpenAiCompatibleClient {
    async fn complete(&self, request: &InferenceRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            response_format: request.json.then_some(ResponseFormat { kind: "json_object" }),
        };

        let response: ChatResponse = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.into_text()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'a str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(EngineError::ExternalService("Gemini returned no candidates".to_string()));
        }
        Ok(text)
    }
}

/// Client for Google's Gemini `generateContent` endpoint. Gemini has no
/// system role here, so the system text is prepended to the prompt.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: GEMINI_API_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    async fn complete(&self, request: &InferenceRequest) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: format!("{}\n\n{}", request.system, request.prompt),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: GEMINI_MAX_OUTPUT_TOKENS,
                response_mime_type: request.json.then_some("application/json"),
            },
        };

        let response: GenerateResponse = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.into_text()
    }
}

/// Tries each provider in order and returns the first successful reply.
pub struct ChainedInference {
    providers: Vec<(String, InferenceClientRef)>,
}

impl ChainedInference {
    pub fn new(providers: Vec<(String, InferenceClientRef)>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl InferenceClient for ChainedInference {
    async fn complete(&self, request: &InferenceRequest) -> Result<String> {
        let mut failures = Vec::new();
        for (name, provider) in &self.providers {
            match provider.complete(request).await {
                Ok(reply) => {
                    debug!(provider = %name, len = reply.len(), "inference reply");
                    return Ok(reply);
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "inference provider failed");
                    failures.push(format!("{}: {}", name, e));
                }
            }
        }
        Err(EngineError::ExternalService(if failures.is_empty() {
            "no inference providers".to_string()
        } else {
            format!("all inference providers failed ({})", failures.join("; "))
        }))
    }
}
