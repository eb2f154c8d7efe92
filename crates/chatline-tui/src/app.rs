use chatline_core::{ChatSession, ChatState, Part, Provider, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// A single-line text field with a char-based cursor
#[derive(Debug, Clone, Default)]
pub struct LineInput {
    pub text: String,
    pub cursor: usize,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl LineInput {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, s: &str) {
        for c in s.chars().filter(|c| *c != '\n' && *c != '\r') {
            self.insert(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.text)
    }
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub input: LineInput,

    // Attach-file popup, open when Some
    pub attach_input: Option<LineInput>,

    // Local notices that aren't part of the conversation (busy, attach failures)
    pub notice: Option<String>,

    pub session: ChatSession,
    pub state: ChatState,
    pub provider: Provider,
    pub model: String,

    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub follow_bottom: bool,

    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(session: ChatSession, provider: Provider, model: String) -> Self {
        let state = session.snapshot();
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            input: LineInput::default(),
            attach_input: None,
            notice: None,
            session,
            state,
            provider,
            model,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_bottom: true,
            animation_frame: 0,
        }
    }

    /// Take the latest published session state
    pub fn sync_state(&mut self, state: ChatState) {
        let grew = state.messages().len() != self.state.messages().len()
            || state.loading != self.state.loading;
        if self.state.loading && !state.loading {
            self.notice = None;
        }
        self.state = state;
        if grew && self.follow_bottom {
            self.scroll_chat_to_bottom();
        }
    }

    pub fn submit_input(&mut self) {
        match self.session.submit(&self.input.text) {
            Ok(_handle) => {
                self.input.take();
                self.notice = None;
                self.follow_bottom = true;
            }
            Err(chatline_core::SubmitError::Busy) => {
                self.notice = Some("Still waiting for the last reply".to_string());
            }
            Err(chatline_core::SubmitError::EmptyInput) => {}
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.state.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        let max = self.max_chat_scroll();
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
        self.follow_bottom = self.chat_scroll >= max;
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_bottom = false;
    }

    pub fn scroll_chat_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll();
        self.follow_bottom = true;
    }

    fn max_chat_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.chat_line_count().saturating_sub(visible_height)
    }

    /// Rendered height of the chat pane, accounting for wrapping
    pub fn chat_line_count(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let wrapped = |line: &str| -> usize {
            // Use character count, not byte length, for proper UTF-8 handling
            let char_count = line.chars().count();
            if char_count == 0 {
                1
            } else {
                char_count.div_ceil(wrap_width)
            }
        };

        let mut total_lines: usize = 0;
        for msg in self.state.messages() {
            total_lines += 1; // Role line ("You:" or "AI:")
            for part in msg.parts() {
                match part {
                    Part::Text(text) => {
                        total_lines += text.lines().map(wrapped).sum::<usize>().max(1);
                    }
                    Part::Image { .. } => total_lines += 1,
                }
            }
            total_lines += 1; // Blank line after message
        }

        if self.state.loading {
            total_lines += 2; // "AI:" + "Thinking..."
        }
        u16::try_from(total_lines).unwrap_or(u16::MAX)
    }

    pub fn role_label(role: Role) -> &'static str {
        match role {
            Role::User => "You:",
            Role::Model => "AI:",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_core::{Config, Message};

    fn test_app() -> App {
        let mut config = Config::new();
        config.provider = Some("ollama".to_string());
        let session = ChatSession::new(config.build_gateway().unwrap());
        App::new(session, Provider::Ollama, "gemma3:latest".to_string())
    }

    #[test]
    fn test_line_count_saturates_on_long_sessions() {
        let mut app = test_app();
        let mut state = ChatState::default();
        for i in 0..30_000 {
            state.conversation.append(Message::user(vec![Part::text(format!("turn {}", i))]));
        }
        app.sync_state(state);
        assert_eq!(app.chat_line_count(), u16::MAX);
        app.scroll_chat_down(10);
        assert!(app.chat_scroll > 0);
    }

    #[test]
    fn test_busy_notice_clears_when_reply_lands() {
        let mut app = test_app();
        app.sync_state(ChatState {
            loading: true,
            ..ChatState::default()
        });
        app.notice = Some("Still waiting for the last reply".to_string());

        app.sync_state(ChatState {
            loading: true,
            ..ChatState::default()
        });
        assert!(app.notice.is_some());

        app.sync_state(ChatState::default());
        assert!(app.notice.is_none());
    }

    #[test]
    fn test_line_input_handles_multibyte_chars() {
        let mut input = LineInput::default();
        input.insert_str("héllo");
        input.left();
        input.left();
        input.backspace();
        assert_eq!(input.text, "hélo");
        input.home();
        input.delete();
        assert_eq!(input.text, "élo");
        input.end();
        input.insert('!');
        assert_eq!(input.take(), "élo!");
        assert_eq!(input.cursor, 0);
    }

    #[test]
    fn test_paste_drops_newlines() {
        let mut input = LineInput::default();
        input.insert_str("/tmp/cat.png\n");
        assert_eq!(input.text, "/tmp/cat.png");
    }
}
