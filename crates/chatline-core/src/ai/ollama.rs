use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use anyhow::{Result, anyhow};

use super::{encode_image, error_for_response};
use crate::gateway::{ChatGateway, GatewayError};
use crate::message::{Message, Part, Role};

pub const DEFAULT_URL: &str = "http://localhost:11434";

#[derive(Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaResponseMessage,
    #[allow(dead_code)]
    done: bool,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    system: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: "gemma3:latest".to_string(),
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

    fn build_request(&self, message: &Message, history: &[Message]) -> OllamaRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);

        if let Some(system) = &self.system {
            messages.push(OllamaMessage {
                role: "system",
                content: system.clone(),
                images: Vec::new(),
            });
        }

        for msg in history.iter().chain(std::iter::once(message)) {
            let images = msg
                .parts()
                .iter()
                .filter_map(|part| match part {
                    Part::Image { data, .. } => Some(encode_image(data)),
                    Part::Text(_) => None,
                })
                .collect();

            messages.push(OllamaMessage {
                role: match msg.role() {
                    Role::User => "user",
                    Role::Model => "assistant",
                },
                content: msg.text(),
                images,
            });
        }

        OllamaRequest {
            model: self.model.clone(),
            messages,
            stream: false,
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }

    pub async fn has_model(&self, name: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m == name))
    }
}

#[async_trait]
impl ChatGateway for OllamaClient {
    async fn send(&self, message: &Message, history: &[Message]) -> Result<Message, GatewayError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = self.build_request(message, history);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                GatewayError::Transport(format!(
                    "{}. Make sure Ollama is running with: ollama serve",
                    e
                ))
            })?;

        if !response.status().is_success() {
            return Err(error_for_response("ollama", response).await);
        }

        let ollama_response: OllamaResponse = response.json().await?;
        if ollama_response.message.content.is_empty() {
            return Err(GatewayError::EmptyReply);
        }
        Ok(Message::model(vec![Part::Text(ollama_response.message.content)]))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_images_are_attached_to_their_turn() {
        let client = OllamaClient::new("http://localhost:11434/").with_model("llava");
        let history = vec![Message::user(vec![Part::text("hi")])];
        let message = Message::user(vec![
            Part::text("look"),
            Part::image("image/png", vec![1u8, 2, 3]),
        ]);

        let body = serde_json::to_value(client.build_request(&message, &history)).unwrap();
        assert_eq!(body["model"], "llava");
        assert_eq!(body["stream"], false);
        assert!(body["messages"][0].get("images").is_none());
        assert_eq!(body["messages"][1]["content"], "look");
        assert_eq!(body["messages"][1]["images"][0], "AQID");
        assert_eq!(client.base_url, "http://localhost:11434");
    }
}
