//! Generation backend implementations.
//!
//! The [`Backend`] trait decouples the generation adapter from the actual
//! model API. One implementation exists per backend family; selection is a
//! runtime branch on the active provider in settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{Configuration, Generation};
use crate::io::settings::{ProviderId, ProviderSettings, Settings};

/// Process-wide sampling temperature: one tunable constant, never re-derived
/// per call.
pub const GENERATION_TEMPERATURE: f32 = 0.7;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// One backend call: a fully rendered prompt and an optional output schema.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub temperature: f32,
    /// When set, the backend must return a single JSON object for this schema.
    pub json_schema: Option<&'a Value>,
}

/// Abstraction over text-generation backends.
pub trait Backend: std::fmt::Debug {
    /// Produce the raw completion text for a request.
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Resolve the active backend from a settings snapshot.
///
/// Fails with a configuration error naming the remediation when the provider
/// requires an API key and none is stored. Ollama is local and keyless.
pub fn backend_for(settings: &Settings) -> Result<Box<dyn Backend>> {
    let provider = settings.active();
    match settings.provider {
        ProviderId::OpenAi => Ok(Box::new(OpenAiBackend::new(require_key(
            settings.provider,
            provider,
        )?)?)),
        ProviderId::Anthropic => Ok(Box::new(AnthropicBackend::new(require_key(
            settings.provider,
            provider,
        )?)?)),
        ProviderId::Ollama => Ok(Box::new(OllamaBackend::new(provider.base_url.clone())?)),
    }
}

fn require_key(id: ProviderId, provider: &ProviderSettings) -> Result<Keyed> {
    let api_key = provider
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            Configuration::new(
                format!("no API key configured for {}", id.label()),
                "run `scribe set-api-key`",
            )
        })?;
    Ok(Keyed {
        api_key,
        base_url: provider.base_url.clone(),
    })
}

struct Keyed {
    api_key: String,
    base_url: Option<String>,
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent("scribe/0.1.0")
        .build()
        .context("build HTTP client")
}

/// Send a JSON request and return the parsed body, mapping transport and
/// non-success status failures to [`Generation`].
fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
    builder: reqwest::blocking::RequestBuilder,
    body: &Req,
    label: &str,
) -> Result<Resp> {
    let response = builder
        .json(body)
        .send()
        .map_err(|err| Generation(format!("{label} request failed: {err}")))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().unwrap_or_default();
        return Err(Generation(format!("{label} API error: {status} - {text}")).into());
    }
    response
        .json()
        .map_err(|err| Generation(format!("parse {label} response: {err}")).into())
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct OpenAiBackend {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAiBackend {
    fn new(keyed: Keyed) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key: keyed.api_key,
            base_url: keyed.base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
        })
    }
}

impl Backend for OpenAiBackend {
    #[instrument(skip_all, fields(model = request.model, structured = request.json_schema.is_some()))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        // Native structured output: strict json_schema response format.
        let response_format = request.json_schema.map(|schema| {
            serde_json::json!({
                "type": "json_schema",
                "json_schema": { "name": "scribe_output", "strict": true, "schema": schema },
            })
        });
        let body = ChatRequest {
            model: request.model,
            temperature: request.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: request.prompt,
            }],
            response_format,
        };

        let reply: ChatResponse = post_json(
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key)),
            &body,
            "OpenAI",
        )?;
        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Generation("OpenAI response contained no choices".to_string()))?;
        debug!(bytes = content.len(), "completion received");
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// Anthropic
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AnthropicBackend {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

impl AnthropicBackend {
    fn new(keyed: Keyed) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key: keyed.api_key,
            base_url: keyed
                .base_url
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
        })
    }
}

impl Backend for AnthropicBackend {
    #[instrument(skip_all, fields(model = request.model, structured = request.json_schema.is_some()))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        // No native schema channel: the schema rides in the prompt and the
        // adapter validates the reply.
        let prompt = match request.json_schema {
            Some(schema) => format!(
                "{}\n\nRespond with a single JSON object (no prose, no code fences) conforming to this JSON Schema:\n{}",
                request.prompt, schema
            ),
            None => request.prompt.to_string(),
        };
        let body = MessagesRequest {
            model: request.model,
            max_tokens: 4096,
            temperature: request.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        let reply: MessagesResponse = post_json(
            self.client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01"),
            &body,
            "Anthropic",
        )?;
        let content = reply
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<String>();
        if content.is_empty() {
            return Err(Generation("Anthropic response contained no text".to_string()).into());
        }
        debug!(bytes = content.len(), "completion received");
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct OllamaBackend {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a Value>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaBackend {
    fn new(base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
        })
    }
}

impl Backend for OllamaBackend {
    #[instrument(skip_all, fields(model = request.model, structured = request.json_schema.is_some()))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = OllamaRequest {
            model: request.model,
            prompt: request.prompt,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
            },
            // Ollama accepts a JSON Schema as the structured-output format.
            format: request.json_schema,
        };

        let reply: OllamaResponse = post_json(
            self.client.post(format!("{}/api/generate", self.base_url)),
            &body,
            "Ollama",
        )?;
        debug!(bytes = reply.response.len(), "completion received");
        Ok(reply.response)
    }
}
