//! Request orchestration for a single conversation
//!
//! A [`ChatSession`] is the only writer of its [`ChatState`]. Front ends
//! subscribe to a `watch` channel and render whatever snapshot is current.
//! At most one request is in flight; a second submission while one is
//! outstanding is rejected with [`SubmitError::Busy`] rather than queued.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use crate::attachment::Attachment;
use crate::conversation::ChatState;
use crate::gateway::ChatGateway;
use crate::message::{Message, MessageId, Part};
use crate::source::FileSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("message is empty")]
    EmptyInput,
    #[error("a request is already in flight")]
    Busy,
}

/// How a completed request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Replied(MessageId),
    Failed(String),
}

struct Shared {
    state: watch::Sender<ChatState>,
    gateway: Arc<dyn ChatGateway>,
}

/// Resets the request lifecycle even if the request future is dropped mid-flight
struct InFlight {
    shared: Arc<Shared>,
    armed: bool,
}

impl InFlight {
    fn complete(mut self, apply: impl FnOnce(&mut ChatState)) {
        self.armed = false;
        self.shared.state.send_modify(|state| {
            apply(state);
            finish(state);
        });
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.armed {
            tracing::info!(gateway = self.shared.gateway.name(), "chat request cancelled");
            self.shared.state.send_modify(finish);
        }
    }
}

fn finish(state: &mut ChatState) {
    state.loading = false;
    if !state.attachments.is_empty() {
        tracing::debug!(
            count = state.attachments.len(),
            "discarding attachments staged during the request"
        );
    }
    state.attachments.clear();
}

struct Pending {
    message: Message,
    history: Vec<Message>,
    guard: InFlight,
}

async fn run(pending: Pending) -> Outcome {
    let Pending {
        message,
        history,
        guard,
    } = pending;
    let gateway = Arc::clone(&guard.shared.gateway);

    match gateway.send(&message, &history).await {
        Ok(reply) => {
            let id = reply.id();
            tracing::info!(
                gateway = gateway.name(),
                reply_parts = reply.parts().len(),
                "chat reply received"
            );
            guard.complete(|state| {
                state.conversation.append(reply);
                state.error = None;
            });
            Outcome::Replied(id)
        }
        Err(e) => {
            let text = e.to_string();
            tracing::warn!(gateway = gateway.name(), error = %text, "chat request failed");
            let error = text.clone();
            guard.complete(|state| state.error = Some(error));
            Outcome::Failed(text)
        }
    }
}

/// A spawned request
pub struct RequestHandle {
    handle: JoinHandle<Outcome>,
}

impl RequestHandle {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// `None` when the request was cancelled
    pub async fn wait(self) -> Option<Outcome> {
        self.handle.await.ok()
    }
}

pub struct ChatSession {
    shared: Arc<Shared>,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl ChatSession {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        let (state, _) = watch::channel(ChatState::default());
        Self {
            shared: Arc::new(Shared { state, gateway }),
            in_flight: Mutex::new(None),
        }
    }

    pub fn gateway_name(&self) -> &str {
        self.shared.gateway.name()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> ChatState {
        self.shared.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.state.borrow().loading
    }

    /// Queue a file for the next message. Never fails; undecodable images keep metadata only.
    pub fn stage_attachment(&self, bytes: Vec<u8>, mime_type: Option<&str>, display_name: Option<&str>) {
        self.shared.state.send_modify(|state| {
            let attachment = state.attachments.stage(bytes, mime_type, display_name);
            tracing::debug!(
                name = attachment.display_name(),
                size = attachment.size(),
                decoded = attachment.image.is_some(),
                "attachment staged"
            );
        });
    }

    /// Read a picked file fully, then stage it
    pub async fn attach_from(&self, source: &dyn FileSource, reference: &str) -> anyhow::Result<()> {
        let (meta, bytes) = source.open(reference).await?.read_all().await?;
        self.stage_attachment(bytes, meta.mime_type.as_deref(), meta.display_name.as_deref());
        Ok(())
    }

    pub fn dismiss_error(&self) {
        self.shared.state.send_if_modified(|state| state.error.take().is_some());
    }

    /// Optimistically append the user turn and mark the session busy, atomically.
    fn begin(&self, text: &str) -> Result<Pending, SubmitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyInput);
        }

        let mut started = None;
        self.shared.state.send_if_modified(|state| {
            if state.loading {
                return false;
            }

            let attachments = state.attachments.drain();
            let mut parts = vec![Part::text(text)];
            parts.extend(attachments.iter().filter_map(Attachment::to_part));
            let message = Message::user(parts);

            tracing::info!(
                attachments = attachments.len(),
                images = message.image_count(),
                "submitting chat message"
            );

            started = Some((message.clone(), state.conversation.snapshot().to_vec()));
            state.conversation.append(message);
            state.loading = true;
            true
        });

        let (message, history) = started.ok_or(SubmitError::Busy)?;
        Ok(Pending {
            message,
            history,
            guard: InFlight {
                shared: Arc::clone(&self.shared),
                armed: true,
            },
        })
    }

    /// Send a message and wait for the outcome in the caller's task.
    /// Dropping the returned future cancels the request.
    pub async fn send(&self, text: &str) -> Result<Outcome, SubmitError> {
        let pending = self.begin(text)?;
        Ok(run(pending).await)
    }

    /// Send a message on a background task. Must be called inside a Tokio runtime.
    pub fn submit(&self, text: &str) -> Result<RequestHandle, SubmitError> {
        let pending = self.begin(text)?;
        let handle = tokio::spawn(run(pending));
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.abort_handle());
        Ok(RequestHandle { handle })
    }

    /// Abort the background request, if any
    pub fn cancel(&self) {
        if let Some(handle) = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.cancel();
    }
}
