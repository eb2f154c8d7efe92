use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{encode_image, error_for_response};
use crate::gateway::{ChatGateway, GatewayError};
use crate::message::{Message, Part, Role};

#[derive(Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Serialize)]
struct ClaudeMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ClaudeMessage>,
}

#[derive(Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
    stop_reason: Option<String>,
}

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    model: String,
    system: Option<String>,
}

impl ClaudeClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            system: None,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system = instruction;
        self
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "claude-sonnet-4-20250514".to_string(),
            "claude-3-5-sonnet-20241022".to_string(),
            "claude-3-5-haiku-20241022".to_string(),
            "claude-3-opus-20240229".to_string(),
        ]
    }

    fn build_request(&self, message: &Message, history: &[Message]) -> ClaudeRequest {
        let messages = history
            .iter()
            .chain(std::iter::once(message))
            .map(|msg| ClaudeMessage {
                role: match msg.role() {
                    Role::User => "user",
                    Role::Model => "assistant",
                },
                content: msg
                    .parts()
                    .iter()
                    .map(|part| match part {
                        Part::Text(text) => ContentBlock::Text { text: text.clone() },
                        Part::Image { mime_type, data } => ContentBlock::Image {
                            source: ImageSource {
                                kind: "base64",
                                media_type: mime_type.clone(),
                                data: encode_image(data),
                            },
                        },
                    })
                    .collect(),
            })
            .collect();

        ClaudeRequest {
            model: self.model.clone(),
            max_tokens: 4096,
            system: self.system.clone(),
            messages,
        }
    }
}

fn parse_response(response: ClaudeResponse) -> Result<Message, GatewayError> {
    if response.stop_reason.as_deref() == Some("refusal") {
        return Err(GatewayError::Policy("Claude declined to answer".to_string()));
    }

    let parts: Vec<Part> = response
        .content
        .into_iter()
        .filter(|c| c.kind == "text")
        .map(|c| Part::Text(c.text))
        .collect();

    if parts.is_empty() {
        return Err(GatewayError::EmptyReply);
    }
    Ok(Message::model(parts))
}

#[async_trait]
impl ChatGateway for ClaudeClient {
    async fn send(&self, message: &Message, history: &[Message]) -> Result<Message, GatewayError> {
        let request = self.build_request(message, history);

        let response = self.client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response("claude", response).await);
        }

        let claude_response: ClaudeResponse = response.json().await?;
        parse_response(claude_response)
    }

    fn name(&self) -> &str {
        "claude"
    }
}
