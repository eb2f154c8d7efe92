//! Conversation store and the state published to front ends

use crate::attachment::AttachmentStager;
use crate::message::Message;

/// Append-only, ordered list of turns
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    messages: Vec<Message>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Everything a front end needs to render one chat screen
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub conversation: ConversationStore,
    pub attachments: AttachmentStager,
    /// True only while exactly one request is in flight.
    pub loading: bool,
    pub error: Option<String>,
}

impl ChatState {
    pub fn messages(&self) -> &[Message] {
        self.conversation.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Part, Role};

    #[test]
    fn test_append_preserves_order() {
        let mut store = ConversationStore::new();
        store.append(Message::user(vec![Part::text("one")]));
        store.append(Message::model(vec![Part::text("two")]));
        store.append(Message::user(vec![Part::text("three")]));

        let texts: Vec<String> = store.snapshot().iter().map(Message::text).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(store.last().map(Message::role), Some(Role::User));
    }

    #[test]
    fn test_default_state_is_idle() {
        let state = ChatState::default();
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert!(state.messages().is_empty());
    }
}
