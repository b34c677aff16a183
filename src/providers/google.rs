//! Google Gemini streaming client
//!
//! Uses `streamGenerateContent` with `alt=sse`. System messages map to
//! `systemInstruction`; assistant turns use the `model` role.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{sse, ChatMessage, ChatProvider, GenerationParams, ProviderKind, TokenStream};
use crate::error::ProviderError;

const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Clone)]
pub struct GoogleProvider {
    client: Client,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GoogleProvider {
    pub fn new(api_key: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.map(|s| s.to_string()),
        }
    }

    fn build_request(messages: &[ChatMessage], params: &GenerationParams) -> StreamRequest {
        let mut system_instruction = None;
        let mut contents = Vec::new();

        for msg in messages {
            match msg.role.as_str() {
                "system" => {
                    system_instruction = Some(Content {
                        role: None,
                        parts: vec![Part {
                            text: msg.content.clone(),
                        }],
                    });
                }
                role => {
                    let gemini_role = if role == "assistant" { "model" } else { "user" };
                    contents.push(Content {
                        role: Some(gemini_role.to_string()),
                        parts: vec![Part {
                            text: msg.content.clone(),
                        }],
                    });
                }
            }
        }

        StreamRequest {
            system_instruction,
            contents,
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
            },
        }
    }
}

#[async_trait]
impl ChatProvider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<TokenStream, ProviderError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ProviderError::Construction("GOOGLE_GENERATIVE_AI_API_KEY not set".to_string())
        })?;

        let url = format!("{GOOGLE_API_BASE}/{model}:streamGenerateContent?alt=sse");
        let request = Self::build_request(messages, params);

        debug!("google stream: model={}, contents={}", model, request.contents.len());

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Call(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Call(format!(
                "google API error {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let tokens = sse::data_lines(response).filter_map(|line| async move {
            match line {
                Ok(data) => match serde_json::from_str::<StreamChunk>(&data) {
                    Ok(chunk) => chunk
                        .candidates
                        .and_then(|c| c.into_iter().next())
                        .and_then(|c| c.content)
                        .and_then(|c| c.parts)
                        .and_then(|p| p.into_iter().next())
                        .and_then(|p| p.text)
                        .filter(|t| !t.is_empty())
                        .map(Ok),
                    Err(_) => None,
                },
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(tokens))
    }
}
