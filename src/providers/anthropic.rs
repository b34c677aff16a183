//! Anthropic messages streaming client
//!
//! System messages go in the top-level `system` field; token text arrives
//! as `content_block_delta` events.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{sse, ChatMessage, ChatProvider, GenerationParams, ProviderKind, TokenStream};
use crate::error::ProviderError;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct StreamRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: BlockDelta },
    #[serde(rename = "error")]
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct BlockDelta {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.map(|s| s.to_string()),
        }
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<TokenStream, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::Construction("ANTHROPIC_API_KEY not set".to_string()))?;

        let system = messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.clone());
        let turns: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.role != "system")
            .cloned()
            .collect();

        let request = StreamRequest {
            model,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: true,
            system,
            messages: turns,
        };

        debug!("anthropic stream: model={}", model);

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Call(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Call(format!(
                "anthropic API error {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let tokens = sse::data_lines(response).filter_map(|line| async move {
            match line {
                Ok(data) => match serde_json::from_str::<StreamEvent>(&data) {
                    Ok(StreamEvent::ContentBlockDelta { delta }) => {
                        delta.text.filter(|t| !t.is_empty()).map(Ok)
                    }
                    Ok(StreamEvent::Error { error }) => {
                        Some(Err(ProviderError::MidStream(error.message)))
                    }
                    Ok(StreamEvent::Other) | Err(_) => None,
                },
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(tokens))
    }
}
