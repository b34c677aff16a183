//! OpenAI chat completions streaming client

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{sse, ChatMessage, ChatProvider, GenerationParams, ProviderKind, TokenStream};
use crate::error::ProviderError;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct StreamRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.map(|s| s.to_string()),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
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
            .ok_or_else(|| ProviderError::Construction("OPENAI_API_KEY not set".to_string()))?;

        let request = StreamRequest {
            model,
            messages,
            stream: true,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        debug!("openai stream: model={}, messages={}", model, messages.len());

        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Call(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Call(format!(
                "openai API error {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let tokens = sse::data_lines(response).filter_map(|line| async move {
            match line {
                Ok(data) if data == "[DONE]" => None,
                Ok(data) => match serde_json::from_str::<StreamChunk>(&data) {
                    Ok(chunk) => chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta.content)
                        .filter(|t| !t.is_empty())
                        .map(Ok),
                    // Non-delta frames (role preludes, usage) are skipped
                    Err(_) => None,
                },
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(tokens))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
