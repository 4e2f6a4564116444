use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("API error: {0}")]
    Api(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Schema violation: {0}")]
    SchemaViolation(String),
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "inlineData")]
    pub inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part {
                text: Some(text.into()),
                inline_data: None,
            }],
        }
    }

    /// Vision message: a text instruction plus one inline image.
    pub fn user_with_image(text: impl Into<String>, mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![
                Part {
                    text: Some(text.into()),
                    inline_data: None,
                },
                Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: mime_type.to_string(),
                        data: BASE64.encode(bytes),
                    }),
                },
            ],
        }
    }
}

/// Completion backend seam. The planner, the research pipeline and every
/// prompt tool talk to the model through this trait; tests substitute mocks.
/// Neither operation retries internally: retry or fallback policy belongs to
/// the caller.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Free-form text completion over one or more messages. Messages may
    /// carry an inline image part for vision-capable requests.
    async fn complete(&self, messages: Vec<Message>, max_tokens: u32) -> Result<String, LlmError>;

    /// Completion constrained to a JSON value matching `schema` (already
    /// normalized for the backend's schema dialect).
    async fn complete_structured(
        &self,
        prompt: &str,
        schema: Value,
        max_tokens: u32,
    ) -> Result<Value, LlmError>;
}

/// Typed structured completion: derives the schema for `T`, normalizes it,
/// and validates the model output by deserializing into `T`.
pub async fn structured<T>(
    backend: &dyn CompletionBackend,
    prompt: &str,
    max_tokens: u32,
) -> Result<T, LlmError>
where
    T: schemars::JsonSchema + DeserializeOwned,
{
    let root = schemars::gen::SchemaGenerator::default().into_root_schema_for::<T>();
    let mut schema = serde_json::to_value(root)?;
    normalize_schema_for_gemini(&mut schema);
    let raw = backend.complete_structured(prompt, schema, max_tokens).await?;
    serde_json::from_value(raw).map_err(|e| LlmError::SchemaViolation(e.to_string()))
}

/// The Gemini schema parser is strict: strip schemars metadata, collapse
/// nullable type arrays, and simplify composition constructs.
pub fn normalize_schema_for_gemini(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("$schema");
            map.remove("definitions");
            map.remove("$defs");
            map.remove("title");

            if let Some(type_val) = map.get_mut("type") {
                if let Value::Array(type_arr) = type_val {
                    let chosen = type_arr
                        .iter()
                        .filter_map(|v| v.as_str())
                        .find(|t| *t != "null")
                        .unwrap_or("string")
                        .to_string();
                    *type_val = Value::String(chosen);
                }
            }

            for combiner in ["anyOf", "oneOf", "allOf"] {
                if let Some(Value::Array(options)) = map.remove(combiner) {
                    let mut replacement = options
                        .into_iter()
                        .find(|candidate| candidate.get("$ref").is_none())
                        .unwrap_or(Value::Null);
                    normalize_schema_for_gemini(&mut replacement);
                    if let Value::Object(repl_map) = replacement {
                        for (k, v) in repl_map {
                            map.insert(k, v);
                        }
                    }
                }
            }

            if map.remove("$ref").is_some() {
                map.clear();
                map.insert("type".to_string(), Value::String("string".to_string()));
            }

            for nested in map.values_mut() {
                normalize_schema_for_gemini(nested);
            }
        }
        Value::Array(arr) => {
            for nested in arr {
                normalize_schema_for_gemini(nested);
            }
        }
        _ => {}
    }
}

#[derive(Serialize, Clone)]
struct GenerateRequest {
    contents: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "generationConfig")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Clone, Default)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none", rename = "maxOutputTokens")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "responseMimeType")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "responseSchema")]
    response_schema: Option<Value>,
}

/// First candidate text out of a generateContent response body.
fn response_text(body: &Value) -> String {
    body.get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .and_then(|p| p.first())
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .to_string()
}

pub struct GeminiClient {
    api_key: String,
    client: Client,
    model: String,
    request_timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, request_timeout: Duration) -> Self {
        Self {
            api_key,
            client: Client::new(),
            model,
            request_timeout,
        }
    }

    async fn generate(&self, request: GenerateRequest) -> Result<Value, LlmError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let send = async {
            let response = self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .json(&request)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api(format!("status={} body={}", status, body)));
            }

            let body: Value = response.json().await?;
            Ok(body)
        };

        match tokio::time::timeout(self.request_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout),
        }
    }
}

#[async_trait]
impl CompletionBackend for GeminiClient {
    async fn complete(&self, messages: Vec<Message>, max_tokens: u32) -> Result<String, LlmError> {
        let request = GenerateRequest {
            contents: messages,
            generation_config: Some(GenerationConfig {
                max_output_tokens: Some(max_tokens),
                ..Default::default()
            }),
        };
        let body = self.generate(request).await?;
        Ok(response_text(&body))
    }

    async fn complete_structured(
        &self,
        prompt: &str,
        schema: Value,
        max_tokens: u32,
    ) -> Result<Value, LlmError> {
        let request = GenerateRequest {
            contents: vec![Message::user_text(prompt)],
            generation_config: Some(GenerationConfig {
                max_output_tokens: Some(max_tokens),
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(schema),
            }),
        };
        let body = self.generate(request).await?;
        let text = response_text(&body);
        serde_json::from_str(&text)
            .map_err(|e| LlmError::SchemaViolation(format!("unparsable model output: {}", e)))
    }
}
