//! Request and response bodies of `/chat/completions`.

use aistudy_core::llm::{ChatError, ChatResult, Message, ResponseFormat};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ChatRequest {
    /// Empty assistant placeholders are left out; the API rejects blank turns.
    pub fn new(
        model: &str,
        msgs: &[Message],
        stream: bool,
        response_format: Option<ResponseFormat>,
    ) -> Self {
        Self {
            model: model.to_string(),
            messages: msgs.iter().filter(|m| !m.is_placeholder()).cloned().collect(),
            stream,
            response_format,
        }
    }
}

/// One `data:` payload of a streaming response.
#[derive(Debug, Deserialize)]
pub struct DeltaPayload {
    pub choices: Option<Vec<DeltaChoice>>,
}

#[derive(Debug, Deserialize)]
pub struct DeltaChoice {
    pub delta: Option<DeltaContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeltaContent {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub choices: Option<Vec<CompletionChoice>>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionChoice {
    pub message: Option<CompletionMessage>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

pub fn parse_completion(body: &[u8]) -> Result<ChatResult, ChatError> {
    let resp: CompletionResponse =
        serde_json::from_slice(body).map_err(|e| ChatError::Decode(e.to_string()))?;
    let choice = resp
        .choices
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| ChatError::ResponseShape("missing choices[0]".into()))?;
    let text = choice
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| ChatError::ResponseShape("missing choices[0].message.content".into()))?;
    Ok(ChatResult {
        text,
        finish_reason: choice.finish_reason,
        prompt_tokens: resp.usage.as_ref().and_then(|u| u.prompt_tokens),
        completion_tokens: resp.usage.as_ref().and_then(|u| u.completion_tokens),
    })
}
