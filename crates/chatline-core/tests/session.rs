use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatline_core::{
    ChatGateway, ChatSession, GatewayError, LocalFileSource, Message, Outcome, Part, Role,
    SubmitError,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tokio::sync::Notify;

/// Replays scripted results and records what it was sent
#[derive(Default)]
struct ScriptedGateway {
    replies: Mutex<VecDeque<Result<Message, GatewayError>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(Message, usize)>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedGateway {
    fn replying(replies: Vec<Result<Message, GatewayError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    fn gated(replies: Vec<Result<Message, GatewayError>>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::replying(replies)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn send(&self, message: &Message, history: &[Message]) -> Result<Message, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((message.clone(), history.len()));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GatewayError::EmptyReply))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn reply(text: &str) -> Result<Message, GatewayError> {
    Ok(Message::model(vec![Part::text(text)]))
}

fn png_bytes() -> Vec<u8> {
    let img = RgbaImage::from_pixel(4, 4, Rgba([0, 128, 255, 255]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[tokio::test]
async fn test_each_successful_send_adds_two_turns() {
    let gateway = Arc::new(ScriptedGateway::replying(vec![
        reply("first answer"),
        reply("second answer"),
        reply("third answer"),
    ]));
    let session = ChatSession::new(gateway.clone());

    for (i, question) in ["one", "two", "three"].iter().enumerate() {
        let outcome = session.send(question).await.unwrap();
        assert!(matches!(outcome, Outcome::Replied(_)));
        assert_eq!(session.snapshot().messages().len(), (i + 1) * 2);
    }

    let state = session.snapshot();
    assert!(!state.loading);
    assert!(state.error.is_none());
    let roles: Vec<Role> = state.messages().iter().map(Message::role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Model, Role::User, Role::Model, Role::User, Role::Model]
    );
    assert_eq!(state.messages()[5].text(), "third answer");
}

#[tokio::test]
async fn test_history_excludes_the_outgoing_turn() {
    let gateway = Arc::new(ScriptedGateway::replying(vec![reply("a"), reply("b")]));
    let session = ChatSession::new(gateway.clone());

    session.send("first").await.unwrap();
    session.send("second").await.unwrap();

    let seen = gateway.seen.lock().unwrap();
    assert_eq!(seen[0].1, 0);
    assert_eq!(seen[1].1, 2);
    assert_eq!(seen[1].0.text(), "second");
}

#[tokio::test]
async fn test_failed_send_keeps_user_turn_and_records_error() {
    let gateway = Arc::new(ScriptedGateway::replying(vec![
        reply("hello"),
        Err(GatewayError::Quota("daily limit reached".into())),
    ]));
    let session = ChatSession::new(gateway.clone());

    session.send("hi").await.unwrap();
    let outcome = session.send("again").await.unwrap();

    let state = session.snapshot();
    assert_eq!(state.messages().len(), 3);
    assert_eq!(state.messages()[2].text(), "again");
    assert_eq!(state.error.as_deref(), Some("Quota exceeded: daily limit reached"));
    assert_eq!(outcome, Outcome::Failed("Quota exceeded: daily limit reached".into()));
    assert!(!state.loading);
}

#[tokio::test]
async fn test_success_clears_previous_error() {
    let gateway = Arc::new(ScriptedGateway::replying(vec![
        Err(GatewayError::Transport("connection reset".into())),
        reply("recovered"),
    ]));
    let session = ChatSession::new(gateway);

    session.send("try").await.unwrap();
    assert!(session.snapshot().error.is_some());

    session.send("retry").await.unwrap();
    let state = session.snapshot();
    assert!(state.error.is_none());
    assert_eq!(state.messages().len(), 3);
}

#[tokio::test]
async fn test_blank_input_never_reaches_gateway() {
    let gateway = Arc::new(ScriptedGateway::replying(vec![reply("unused")]));
    let session = ChatSession::new(gateway.clone());
    session.stage_attachment(png_bytes(), Some("image/png"), Some("kept.png"));

    for text in ["", "   ", "\n\t "] {
        assert_eq!(session.send(text).await, Err(SubmitError::EmptyInput));
        assert!(matches!(session.submit(text), Err(SubmitError::EmptyInput)));
    }

    assert_eq!(gateway.calls(), 0);
    let state = session.snapshot();
    assert!(state.messages().is_empty());
    assert!(!state.loading);
    assert_eq!(state.attachments.len(), 1);
}

#[tokio::test]
async fn test_image_attachment_goes_out_with_text() {
    let gateway = Arc::new(ScriptedGateway::replying(vec![reply("A blue square.")]));
    let session = ChatSession::new(gateway.clone());

    session.stage_attachment(png_bytes(), Some("image/png"), Some("square.png"));
    assert_eq!(session.snapshot().attachments.len(), 1);

    session.send("Describe this").await.unwrap();

    let state = session.snapshot();
    let user = &state.messages()[0];
    assert_eq!(user.role(), Role::User);
    assert_eq!(user.parts().len(), 2);
    assert_eq!(user.parts()[0], Part::text("Describe this"));
    assert!(matches!(&user.parts()[1], Part::Image { mime_type, .. } if mime_type == "image/png"));
    assert_eq!(state.messages()[1].text(), "A blue square.");
    assert!(state.attachments.is_empty());
}

#[tokio::test]
async fn test_attachments_cleared_after_failure() {
    let gateway = Arc::new(ScriptedGateway::replying(vec![Err(GatewayError::Policy(
        "unsafe".into(),
    ))]));
    let session = ChatSession::new(gateway);

    session.stage_attachment(png_bytes(), Some("image/png"), None);
    session.stage_attachment(b"%PDF-1.4".to_vec(), Some("application/pdf"), Some("doc.pdf"));
    session.send("check these").await.unwrap();

    let state = session.snapshot();
    assert!(state.attachments.is_empty());
    // the pdf is listed but only the decoded image becomes a part
    assert_eq!(state.messages()[0].parts().len(), 2);
    assert_eq!(state.messages()[0].image_count(), 1);
}

#[tokio::test]
async fn test_undecodable_image_is_not_sent() {
    let gateway = Arc::new(ScriptedGateway::replying(vec![reply("ok")]));
    let session = ChatSession::new(gateway);

    session.stage_attachment(vec![1, 2, 3, 4], Some("image/png"), Some("broken.png"));
    let staged = session.snapshot();
    assert_eq!(staged.attachments.pending()[0].display_name(), "broken.png");
    assert!(staged.attachments.pending()[0].image.is_none());

    session.send("what about this").await.unwrap();
    assert_eq!(session.snapshot().messages()[0].image_count(), 0);
}

#[tokio::test]
async fn test_loading_only_while_request_in_flight() {
    let gate = Arc::new(Notify::new());
    let gateway = Arc::new(ScriptedGateway::gated(vec![reply("done")], gate.clone()));
    let session = ChatSession::new(gateway.clone());
    let mut rx = session.subscribe();

    assert!(!session.is_loading());
    let handle = session.submit("slow question").unwrap();

    // the optimistic user turn and the loading flag land together
    let state = rx.borrow_and_update().clone();
    assert!(state.loading);
    assert_eq!(state.messages().len(), 1);

    assert!(matches!(session.submit("impatient"), Err(SubmitError::Busy)));
    assert_eq!(session.send("impatient").await, Err(SubmitError::Busy));
    assert_eq!(session.snapshot().messages().len(), 1);

    gate.notify_one();
    let outcome = handle.wait().await;
    assert!(matches!(outcome, Some(Outcome::Replied(_))));

    let state = session.snapshot();
    assert!(!state.loading);
    assert_eq!(state.messages().len(), 2);
    assert_eq!(gateway.calls(), 1);
}

#[tokio::test]
async fn test_cancel_resets_loading_without_error() {
    let gate = Arc::new(Notify::new());
    let gateway = Arc::new(ScriptedGateway::gated(vec![reply("never")], gate));
    let session = ChatSession::new(gateway);

    session.stage_attachment(png_bytes(), Some("image/png"), None);
    let handle = session.submit("abandon me").unwrap();
    session.stage_attachment(png_bytes(), Some("image/png"), Some("late.png"));

    handle.cancel();
    assert_eq!(handle.wait().await, None);

    let state = session.snapshot();
    assert!(!state.loading);
    assert!(state.error.is_none());
    assert_eq!(state.messages().len(), 1);
    assert!(state.attachments.is_empty());

    // session is usable again
    assert!(matches!(session.send("  ").await, Err(SubmitError::EmptyInput)));
}

#[tokio::test]
async fn test_dropping_session_cancels_request() {
    let gate = Arc::new(Notify::new());
    let gateway = Arc::new(ScriptedGateway::gated(vec![reply("never")], gate));
    let session = ChatSession::new(gateway.clone());
    let mut rx = session.subscribe();

    let _handle = session.submit("goodbye").unwrap();
    assert!(rx.borrow_and_update().loading);
    drop(session);

    while rx.borrow_and_update().loading {
        if rx.changed().await.is_err() {
            break;
        }
    }
    let state = rx.borrow().clone();
    assert!(!state.loading);
    assert_eq!(state.messages().len(), 1);
}

#[tokio::test]
async fn test_attach_from_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.png");
    std::fs::write(&path, png_bytes()).unwrap();

    let gateway = Arc::new(ScriptedGateway::replying(vec![reply("nice photo")]));
    let session = ChatSession::new(gateway);

    session
        .attach_from(&LocalFileSource, path.to_str().unwrap())
        .await
        .unwrap();

    let state = session.snapshot();
    let attachment = &state.attachments.pending()[0];
    assert_eq!(attachment.display_name(), "photo.png");
    assert_eq!(attachment.mime_type.as_deref(), Some("image/png"));
    assert_eq!(attachment.image.as_ref().map(|i| i.width()), Some(4));

    assert!(session.attach_from(&LocalFileSource, "/no/such/file.png").await.is_err());
    assert_eq!(session.snapshot().attachments.len(), 1);
}

#[tokio::test]
async fn test_dismiss_error() {
    let gateway = Arc::new(ScriptedGateway::replying(vec![Err(GatewayError::EmptyReply)]));
    let session = ChatSession::new(gateway);

    session.send("hello?").await.unwrap();
    assert_eq!(
        session.snapshot().error.as_deref(),
        Some("The model returned an empty reply")
    );
    session.dismiss_error();
    assert!(session.snapshot().error.is_none());
}
