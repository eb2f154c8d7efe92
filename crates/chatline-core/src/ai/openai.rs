use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{encode_image, error_for_response};
use crate::gateway::{ChatGateway, GatewayError};
use crate::message::{Message, Part, Role};

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAIContent {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: Vec<OpenAIContent>,
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    model: String,
    system: Option<String>,
}

impl OpenAIClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: "gpt-4o".to_string(),
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
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4-turbo".to_string(),
        ]
    }

    fn build_request(&self, message: &Message, history: &[Message]) -> OpenAIRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);

        if let Some(system) = &self.system {
            messages.push(OpenAIMessage {
                role: "system",
                content: vec![OpenAIContent::Text { text: system.clone() }],
            });
        }

        for msg in history.iter().chain(std::iter::once(message)) {
            messages.push(OpenAIMessage {
                role: match msg.role() {
                    Role::User => "user",
                    Role::Model => "assistant",
                },
                content: msg
                    .parts()
                    .iter()
                    .map(|part| match part {
                        Part::Text(text) => OpenAIContent::Text { text: text.clone() },
                        Part::Image { mime_type, data } => OpenAIContent::ImageUrl {
                            image_url: ImageUrl {
                                url: format!("data:{};base64,{}", mime_type, encode_image(data)),
                            },
                        },
                    })
                    .collect(),
            });
        }

        OpenAIRequest {
            model: self.model.clone(),
            messages,
        }
    }
}

fn parse_response(response: OpenAIResponse) -> Result<Message, GatewayError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(GatewayError::EmptyReply)?;

    if let Some(refusal) = choice.message.refusal {
        return Err(GatewayError::Policy(refusal));
    }
    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(GatewayError::Policy("response removed by content filter".to_string()));
    }

    match choice.message.content {
        Some(content) if !content.is_empty() => Ok(Message::model(vec![Part::Text(content)])),
        _ => Err(GatewayError::EmptyReply),
    }
}

#[async_trait]
impl ChatGateway for OpenAIClient {
    async fn send(&self, message: &Message, history: &[Message]) -> Result<Message, GatewayError> {
        let request = self.build_request(message, history);

        let response = self.client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response("openai", response).await);
        }

        let openai_response: OpenAIResponse = response.json().await?;
        parse_response(openai_response)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
