use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{decode_image, encode_image, error_for_response};
use crate::gateway::{ChatGateway, GatewayError};
use crate::message::{Message, Part, Role};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are a chatbot who can answer questions asked by users.";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    system_instruction: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_system_instruction(mut self, instruction: Option<String>) -> Self {
        self.system_instruction = instruction;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gemini-2.5-flash".to_string(),
            "gemini-2.5-pro".to_string(),
            "gemini-2.0-flash".to_string(),
        ]
    }

    fn build_request(&self, message: &Message, history: &[Message]) -> GeminiRequest {
        let contents = history
            .iter()
            .chain(std::iter::once(message))
            .map(to_content)
            .collect();

        GeminiRequest {
            contents,
            system_instruction: self.system_instruction.as_ref().map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(text.clone()),
                    inline_data: None,
                }],
            }),
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT".to_string()],
            },
        }
    }
}

fn to_content(message: &Message) -> GeminiContent {
    let parts = message
        .parts()
        .iter()
        .map(|part| match part {
            Part::Text(text) => GeminiPart {
                text: Some(text.clone()),
                inline_data: None,
            },
            Part::Image { mime_type, data } => GeminiPart {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: mime_type.clone(),
                    data: encode_image(data),
                }),
            },
        })
        .collect();

    GeminiContent {
        role: Some(message.role().as_str().to_string()),
        parts,
    }
}

fn parse_response(response: GeminiResponse) -> Result<Message, GatewayError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GatewayError::Policy(format!("prompt blocked ({})", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(GatewayError::EmptyReply)?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if matches!(reason, "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" | "SPII") {
            return Err(GatewayError::Policy(format!("response blocked ({})", reason)));
        }
    }

    let mut parts = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(text) = part.text {
            parts.push(Part::Text(text));
        }
        if let Some(inline) = part.inline_data {
            parts.push(Part::image(inline.mime_type, decode_image(&inline.data)?));
        }
    }

    if parts.is_empty() {
        return Err(GatewayError::EmptyReply);
    }
    Ok(Message::new(Role::Model, parts))
}

#[async_trait]
impl ChatGateway for GeminiClient {
    async fn send(&self, message: &Message, history: &[Message]) -> Result<Message, GatewayError> {
        let request = self.build_request(message, history);
        let url = format!("{}/models/{}:generateContent", BASE_URL, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response("gemini", response).await);
        }

        let gemini_response: GeminiResponse = response.json().await?;
        parse_response(gemini_response)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_includes_history_images_and_system_instruction() {
        let client = GeminiClient::new("key");
        let history = vec![
            Message::user(vec![Part::text("hello")]),
            Message::model(vec![Part::text("hi there")]),
        ];
        let message = Message::user(vec![
            Part::text("Describe this"),
            Part::image("image/png", vec![1u8, 2, 3]),
        ]);

        let body = serde_json::to_value(client.build_request(&message, &history)).unwrap();

        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "Describe this");
        assert_eq!(body["contents"][2]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(body["contents"][2]["parts"][1]["inlineData"]["data"], "AQID");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            DEFAULT_SYSTEM_INSTRUCTION
        );
        assert_eq!(body["generationConfig"]["responseModalities"], json!(["TEXT"]));
    }

    #[test]
    fn test_parse_text_reply() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "A red square."}]},
                "finishReason": "STOP"
            }]
        });
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        let reply = parse_response(response).unwrap();
        assert_eq!(reply.role(), Role::Model);
        assert_eq!(reply.text(), "A red square.");
    }

    #[test]
    fn test_parse_blocked_prompt_is_policy_error() {
        let raw = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        assert!(matches!(parse_response(response), Err(GatewayError::Policy(_))));
    }

    #[test]
    fn test_parse_safety_finish_is_policy_error() {
        let raw = json!({"candidates": [{"finishReason": "SAFETY"}]});
        let response: GeminiResponse = serde_json::from_value(raw).unwrap();
        assert!(matches!(parse_response(response), Err(GatewayError::Policy(_))));
    }

    #[test]
    fn test_parse_no_candidates_is_empty_reply() {
        let response: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(parse_response(response), Err(GatewayError::EmptyReply)));
    }
}
