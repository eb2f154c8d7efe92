use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use chatline_core::{Attachment, Part, Role};
use crate::app::{App, InputMode};

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let error_height = if app.state.error.is_some() || app.notice.is_some() { 3 } else { 0 };
    let attachments_height = if app.state.attachments.is_empty() {
        0
    } else {
        (app.state.attachments.len().min(4) + 2) as u16 // +2 for borders
    };

    // Main layout: header, chat, error, attachments, input, footer
    let [header_area, chat_area, error_area, attachments_area, input_area, footer_area] =
        Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(error_height),
            Constraint::Length(attachments_height),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    if error_height > 0 {
        render_error(app, frame, error_area);
    }
    if attachments_height > 0 {
        render_attachments(app, frame, attachments_area);
    }
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if app.attach_input.is_some() {
        render_attach_popup(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" chatline ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{}: {} ", app.provider.display_name(), app.model),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn part_lines(part: &Part) -> Vec<Line<'_>> {
    match part {
        Part::Text(text) => text.lines().map(Line::from).collect(),
        Part::Image { mime_type, data } => vec![Line::from(Span::styled(
            format!("[image {}, {}]", mime_type, format_size(data.len())),
            Style::default().fg(Color::Magenta).add_modifier(Modifier::ITALIC),
        ))],
    }
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);
    if app.follow_bottom {
        app.scroll_chat_to_bottom();
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} ", app.session.gateway_name()));

    let messages = app.state.messages();
    let chat_text = if messages.is_empty() && !app.state.loading {
        Text::from(Span::styled(
            "Ask anything. Ctrl-O attaches a file.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in messages {
            let color = match msg.role() {
                Role::User => Color::Cyan,
                Role::Model => Color::Yellow,
            };
            lines.push(Line::from(Span::styled(
                App::role_label(msg.role()),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )));
            for part in msg.parts() {
                lines.extend(part_lines(part));
            }
            lines.push(Line::default());
        }

        if app.state.loading {
            lines.push(Line::from(Span::styled(
                App::role_label(Role::Model),
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_error(app: &App, frame: &mut Frame, area: Rect) {
    let (text, color) = match (&app.state.error, &app.notice) {
        (Some(error), _) => (error.as_str(), Color::Red),
        (None, Some(notice)) => (notice.as_str(), Color::Yellow),
        (None, None) => return,
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(" x to dismiss ");

    let paragraph = Paragraph::new(text)
        .style(Style::default().fg(color))
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn attachment_label(attachment: &Attachment) -> String {
    match &attachment.image {
        Some(image) => format!(
            " {} ({}x{}, {}) ",
            attachment.display_name(),
            image.width(),
            image.height(),
            format_size(attachment.size())
        ),
        None => format!(
            " {} ({}, {}) ",
            attachment.display_name(),
            attachment.mime_type.as_deref().unwrap_or("unknown type"),
            format_size(attachment.size())
        ),
    }
}

fn render_attachments(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(format!(" Attachments ({}) ", app.state.attachments.len()));

    let items: Vec<ListItem> = app
        .state
        .attachments
        .pending()
        .iter()
        .map(|a| ListItem::new(attachment_label(a)))
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing && app.attach_input.is_none();
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Message ");

    let input = Paragraph::new(app.input.text.as_str()).block(block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = (app.input.cursor as u16).min(area.width.saturating_sub(3));
        frame.set_cursor_position((area.x + 1 + cursor_x, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };
    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " INSERT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().fg(Color::White);

    let hints: &[(&str, &str)] = match app.input_mode {
        InputMode::Editing => &[("Enter", "send"), ("Esc", "normal"), ("^O", "attach"), ("^C", "quit")],
        InputMode::Normal => &[
            ("i", "type"),
            ("a", "attach"),
            ("j/k", "scroll"),
            ("c", "cancel"),
            ("x", "dismiss"),
            ("q", "quit"),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_attach_popup(app: &App, frame: &mut Frame, area: Rect) {
    let Some(input) = &app.attach_input else {
        return;
    };

    // Calculate popup size and position (centered)
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 5;

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Attach file ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Path to file. Enter to attach, Esc to cancel.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    frame.render_widget(
        Paragraph::new(input.text.as_str()).style(Style::default().fg(Color::Cyan)),
        input_area,
    );

    let cursor_x = input.cursor.min(input_area.width as usize) as u16;
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
