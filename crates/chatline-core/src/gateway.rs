//! Narrow boundary to a hosted chat model

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::message::Message;

/// Failures surfaced to the user verbatim through `Display`
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Quota exceeded: {0}")]
    Quota(String),
    #[error("Blocked by content policy: {0}")]
    Policy(String),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Could not read model response: {0}")]
    Decode(String),
    #[error("The model returned an empty reply")]
    EmptyReply,
}

impl GatewayError {
    /// Classify a non-success HTTP response
    pub fn from_status(provider: &str, status: StatusCode, body: String) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            GatewayError::Quota(format!("{} returned {}: {}", provider, status, body))
        } else {
            GatewayError::Api {
                status: status.as_u16(),
                body,
            }
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GatewayError::Decode(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

/// Send one message with the turns that preceded it, get the model's reply back.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send(&self, message: &Message, history: &[Message]) -> Result<Message, GatewayError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_many_requests_is_quota() {
        let err = GatewayError::from_status("gemini", StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        assert!(matches!(err, GatewayError::Quota(_)));
        assert!(err.to_string().contains("slow down"));
    }

    #[test]
    fn test_other_status_is_api_error() {
        let err = GatewayError::from_status("openai", StatusCode::UNAUTHORIZED, "bad key".into());
        assert_eq!(err.to_string(), "API error 401: bad key");
    }
}
