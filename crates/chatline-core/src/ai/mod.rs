pub mod claude;
pub mod gemini;
pub mod ollama;
pub mod openai;

pub use claude::ClaudeClient;
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::gateway::GatewayError;

pub(crate) fn encode_image(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub(crate) fn decode_image(data: &str) -> Result<Vec<u8>, GatewayError> {
    STANDARD
        .decode(data)
        .map_err(|e| GatewayError::Decode(format!("invalid inline image: {}", e)))
}

/// Turn a non-success response into a classified error, keeping the body for the user
pub(crate) async fn error_for_response(provider: &str, response: reqwest::Response) -> GatewayError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    tracing::warn!(provider, %status, "chat request rejected");
    GatewayError::from_status(provider, status, text)
}
