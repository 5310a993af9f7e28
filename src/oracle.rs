//! The decision oracle boundary. The loop treats the oracle as an
//! opaque `invoke(prompt) -> text` service; payload encoding and
//! reply decoding are picked from an explicit per-model strategy
//! table, with no silent fallback for unknown models.

use crate::error::AgentError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

pub const CLAUDE_SONNET: &str = "anthropic.claude-3-sonnet-20240229-v1:0";
pub const CLAUDE_SONNET_3_5: &str = "anthropic.claude-3-5-sonnet-20240620-v1:0";
pub const CLAUDE_SONNET_3_5_V2: &str = "anthropic.claude-3-5-sonnet-20241022-v2:0";
pub const CLAUDE_HAIKU: &str = "anthropic.claude-3-haiku-20240307-v1:0";
pub const NOVA_PRO: &str = "amazon.nova-pro-v1:0";

pub const DEFAULT_MODEL: &str = CLAUDE_SONNET_3_5;

const DEFAULT_MAX_TOKENS: u32 = 200_000;
const NOVA_MAX_NEW_TOKENS: u32 = 1_000;

/// Stateless decision function over the loop's grounding context.
#[async_trait]
pub trait ActionOracle: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, AgentError>;
    async fn invoke_with_image(&self, prompt: &str, image_png: &[u8]) -> Result<String, AgentError>;
}

/// Payload-encoding and reply-decoding strategy, keyed by model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Claude,
    Nova,
}

impl ModelFamily {
    /// Pure lookup. Unknown ids are an explicit error, never a fallback.
    pub fn resolve(model_id: &str) -> Result<Self, AgentError> {
        match model_id {
            CLAUDE_SONNET | CLAUDE_SONNET_3_5 | CLAUDE_SONNET_3_5_V2 | CLAUDE_HAIKU => {
                Ok(ModelFamily::Claude)
            }
            NOVA_PRO => Ok(ModelFamily::Nova),
            other => Err(AgentError::UnsupportedModel(other.to_string())),
        }
    }
}

/// Connection settings for the HTTP-backed oracle. Read once at
/// startup and passed down; never consulted again mid-run.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub endpoint: String,
    pub model_id: String,
    pub max_tokens: u32,
    pub api_key: Option<String>,
}

impl OracleConfig {
    pub fn from_env() -> Result<Self, AgentError> {
        let endpoint = std::env::var("UIPROBE_ORACLE_ENDPOINT").map_err(|_| {
            AgentError::Config("UIPROBE_ORACLE_ENDPOINT not set in environment".into())
        })?;
        Ok(Self {
            endpoint,
            model_id: std::env::var("UIPROBE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key: std::env::var("UIPROBE_API_KEY").ok(),
        })
    }
}

/// Oracle over a Bedrock-style `invoke` HTTP endpoint. The transport
/// is async internally; callers always wait for full completion.
pub struct HttpOracle {
    client: reqwest::Client,
    config: OracleConfig,
    family: ModelFamily,
    temperature: f64,
}

impl HttpOracle {
    pub fn new(config: OracleConfig) -> Result<Self, AgentError> {
        let family = ModelFamily::resolve(&config.model_id)?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()?;
        info!("Using LLM: {}", config.model_id);
        Ok(Self {
            temperature: default_temperature(&config.model_id),
            client,
            config,
            family,
        })
    }

    async fn invoke_inner(&self, prompt: &str, image_b64: Option<&str>) -> Result<String, AgentError> {
        let payload = encode_payload(
            self.family,
            prompt,
            image_b64,
            self.config.max_tokens,
            self.temperature,
        );
        let url = format!("{}/model/{}/invoke", self.config.endpoint, self.config.model_id);
        debug!("Invoking LLM {} ({} prompt chars)", self.config.model_id, prompt.len());

        let mut request = self.client.post(&url).json(&payload);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }
        let response = request.send().await?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = body["message"]
                .as_str()
                .or_else(|| body["error"]["message"].as_str())
                .unwrap_or("unknown oracle error")
                .to_string();
            return Err(AgentError::OracleRejected { status: status.as_u16(), message });
        }
        decode_text(self.family, &body)
    }
}

#[async_trait]
impl ActionOracle for HttpOracle {
    async fn invoke(&self, prompt: &str) -> Result<String, AgentError> {
        self.invoke_inner(prompt, None).await
    }

    async fn invoke_with_image(&self, prompt: &str, image_png: &[u8]) -> Result<String, AgentError> {
        let encoded = BASE64.encode(image_png);
        self.invoke_inner(prompt, Some(&encoded)).await
    }
}

fn default_temperature(model_id: &str) -> f64 {
    if model_id.contains("3-5") { 0.15 } else { 0.25 }
}

/// Build the model-specific request body.
fn encode_payload(
    family: ModelFamily,
    prompt: &str,
    image_b64: Option<&str>,
    max_tokens: u32,
    temperature: f64,
) -> Value {
    match family {
        ModelFamily::Claude => {
            let mut content = vec![json!({"type": "text", "text": prompt})];
            if let Some(data) = image_b64 {
                content.push(json!({
                    "type": "image",
                    "source": {"type": "base64", "media_type": "image/png", "data": data},
                }));
            }
            json!({
                "anthropic_version": "bedrock-2023-05-31",
                "max_tokens": max_tokens,
                "temperature": temperature,
                "messages": [{"role": "user", "content": content}],
            })
        }
        ModelFamily::Nova => {
            let mut content = vec![json!({"text": prompt})];
            if let Some(data) = image_b64 {
                content.push(json!({
                    "image": {"format": "png", "source": {"bytes": data}},
                }));
            }
            json!({
                "schemaVersion": "messages-v1",
                "inferenceConfig": {"max_new_tokens": NOVA_MAX_NEW_TOKENS, "temperature": temperature},
                "messages": [{"role": "user", "content": content}],
            })
        }
    }
}

/// Pull the reply text out of the model-specific response envelope.
fn decode_text(family: ModelFamily, body: &Value) -> Result<String, AgentError> {
    let text = match family {
        ModelFamily::Claude => body["content"][0]["text"].as_str(),
        ModelFamily::Nova => body["output"]["message"]["content"][0]["text"].as_str(),
    };
    text.map(String::from).ok_or_else(|| {
        AgentError::MalformedResponse(format!("no text content in oracle envelope: {body}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_table_resolves_known_models() {
        assert_eq!(ModelFamily::resolve(CLAUDE_SONNET_3_5).unwrap(), ModelFamily::Claude);
        assert_eq!(ModelFamily::resolve(CLAUDE_HAIKU).unwrap(), ModelFamily::Claude);
        assert_eq!(ModelFamily::resolve(NOVA_PRO).unwrap(), ModelFamily::Nova);
    }

    #[test]
    fn unknown_model_is_an_explicit_error() {
        let err = ModelFamily::resolve("acme.frontier-v9").unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedModel(id) if id == "acme.frontier-v9"));
    }

    #[test]
    fn claude_payload_shape() {
        let payload = encode_payload(ModelFamily::Claude, "do the thing", Some("QUJD"), 1000, 0.15);
        assert_eq!(payload["anthropic_version"], "bedrock-2023-05-31");
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["messages"][0]["content"][0]["text"], "do the thing");
        assert_eq!(payload["messages"][0]["content"][1]["source"]["media_type"], "image/png");
        assert_eq!(payload["messages"][0]["content"][1]["source"]["data"], "QUJD");
    }

    #[test]
    fn claude_payload_without_image_has_single_block() {
        let payload = encode_payload(ModelFamily::Claude, "p", None, 10, 0.25);
        assert_eq!(payload["messages"][0]["content"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn nova_payload_shape() {
        let payload = encode_payload(ModelFamily::Nova, "p", Some("QUJD"), 10, 0.25);
        assert_eq!(payload["schemaVersion"], "messages-v1");
        assert_eq!(payload["inferenceConfig"]["max_new_tokens"], NOVA_MAX_NEW_TOKENS);
        assert_eq!(payload["messages"][0]["content"][1]["image"]["format"], "png");
    }

    #[test]
    fn decodes_claude_envelope() {
        let body = json!({"content": [{"type": "text", "text": "the reply"}]});
        assert_eq!(decode_text(ModelFamily::Claude, &body).unwrap(), "the reply");
    }

    #[test]
    fn decodes_nova_envelope() {
        let body = json!({"output": {"message": {"content": [{"text": "the reply"}]}}});
        assert_eq!(decode_text(ModelFamily::Nova, &body).unwrap(), "the reply");
    }

    #[test]
    fn empty_envelope_is_malformed() {
        let err = decode_text(ModelFamily::Claude, &json!({})).unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse(_)));
    }

    #[test]
    fn sonnet_3_5_runs_cooler() {
        assert_eq!(default_temperature(CLAUDE_SONNET_3_5), 0.15);
        assert_eq!(default_temperature(CLAUDE_SONNET), 0.25);
    }
}
