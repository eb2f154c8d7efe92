pub mod ai;
pub mod attachment;
pub mod config;
pub mod conversation;
pub mod gateway;
pub mod message;
pub mod provider;
pub mod session;
pub mod source;

// Re-export main types for convenience
pub use ai::{ClaudeClient, GeminiClient, OllamaClient, OpenAIClient};
pub use attachment::{Attachment, AttachmentStager, DecodedImage};
pub use config::Config;
pub use conversation::{ChatState, ConversationStore};
pub use gateway::{ChatGateway, GatewayError};
pub use message::{Message, MessageId, Part, Role};
pub use provider::Provider;
pub use session::{ChatSession, Outcome, RequestHandle, SubmitError};
pub use source::{FileMeta, FileSource, LocalFileSource, OpenedFile};
