//! UI rendering for the TUI.

use colloquy_core::format::{chat_list_label, clock_time};
use colloquy_core::render::{Accent, EntryBody, RenderedEntry, Segment};
use colloquy_core::session::{AuthFormMode, Screen};
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, AuthField, Focus};

/// User turn accent
const ACCENT_USER: Color = Color::Rgb(0, 180, 180);
/// Assistant turn accent
const ACCENT_ASSISTANT: Color = Color::Rgb(80, 160, 80);
/// Border for the transcript block
const BORDER_TRANSCRIPT: Color = Color::Rgb(80, 160, 80);
/// Border for the chat list
const BORDER_SIDEBAR: Color = Color::Rgb(100, 180, 180);
/// Border for the focused pane
const BORDER_FOCUS: Color = Color::Rgb(255, 180, 100);
/// Inline code spans
const MD_CODE: Color = Color::Rgb(150, 150, 150);
/// Search note and timestamps
const DIM: Color = Color::Rgb(128, 128, 128);
/// Auth form errors
const ERROR: Color = Color::Rgb(255, 100, 100);

/// Render the application UI.
pub fn render(frame: &mut Frame, app: &mut App) {
    match app.screen() {
        Screen::Auth => render_auth_view(frame, app),
        Screen::Chat => render_chat_view(frame, app),
    }
}

/// Render the login / sign-up form.
fn render_auth_view(frame: &mut Frame, app: &App) {
    let area = centered(frame.area(), 50, 14);
    let forms = app.gate.forms();
    let signing_up = forms.mode == AuthFormMode::SignUp;

    let title = if signing_up { " Create account " } else { " Sign in " };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_SIDEBAR))
        .title(title)
        .title_style(Style::default().fg(BORDER_SIDEBAR).bold());

    let mut lines = vec![Line::raw("")];
    if signing_up {
        lines.push(field_line("Name", &forms.name, app.auth_field == AuthField::Name));
    }
    lines.push(field_line("Email", &forms.email, app.auth_field == AuthField::Email));
    let masked = "*".repeat(forms.password.chars().count());
    lines.push(field_line("Password", &masked, app.auth_field == AuthField::Password));
    lines.push(Line::raw(""));

    if let Some(error) = &forms.error {
        lines.push(Line::from(Span::styled(error.clone(), Style::default().fg(ERROR))));
        lines.push(Line::raw(""));
    }

    let switch = if signing_up {
        "have an account? sign in"
    } else {
        "new here? sign up"
    };
    lines.push(Line::from(vec![
        Span::styled("Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" submit  "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" next field  "),
        Span::styled("F2", Style::default().fg(Color::Yellow)),
        Span::raw(format!(" {}  ", switch)),
        Span::styled("Esc", Style::default().fg(Color::Yellow)),
        Span::raw(" quit"),
    ]));

    let form = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(form, area);
}

fn field_line(label: &str, value: &str, active: bool) -> Line<'static> {
    let label_style = if active {
        Style::default().fg(BORDER_FOCUS).bold()
    } else {
        Style::default().fg(DIM)
    };
    let cursor = if active { "_" } else { "" };
    Line::from(vec![
        Span::styled(format!(" {:>9}: ", label), label_style),
        Span::raw(format!("{}{}", value, cursor)),
    ])
}

/// Rect of at most `width` x `height` centered in `area`
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

/// Render the chat view: sidebar, header, transcript, input, footer.
fn render_chat_view(frame: &mut Frame, app: &mut App) {
    let columns = Layout::horizontal([
        Constraint::Length(32), // Chat list
        Constraint::Min(20),    // Conversation
    ])
    .split(frame.area());

    render_sidebar(frame, app, columns[0]);

    let chunks = Layout::vertical([
        Constraint::Length(2), // Header
        Constraint::Min(5),    // Transcript
        Constraint::Length(3), // Input
        Constraint::Length(1), // Footer
    ])
    .split(columns[1]);

    render_header(frame, app, chunks[0]);
    render_transcript(frame, app, chunks[1]);
    render_input(frame, app, chunks[2]);
    render_footer(frame, app, chunks[3]);
}

fn render_sidebar(frame: &mut Frame, app: &mut App, area: Rect) {
    let border = if app.focus == Focus::Sidebar {
        BORDER_FOCUS
    } else {
        BORDER_SIDEBAR
    };

    let items: Vec<ListItem> = if app.chats.is_empty() {
        vec![ListItem::new(Span::styled(
            "No chats yet",
            Style::default().fg(DIM),
        ))]
    } else {
        app.chats
            .iter()
            .map(|chat| ListItem::new(chat_list_label(chat)))
            .collect()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(border))
                .title(" Chats ")
                .title_style(Style::default().fg(border).bold()),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.sidebar_state);
}

/// Render the header: chat title, model and search flag.
fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let Some(ctx) = app.ctx.as_ref() else {
        return;
    };
    let model = app.chat.models().current_model(ctx.selected_model.as_deref());
    let search = if ctx.web_search_enabled {
        Span::styled("search on", Style::default().fg(Color::Green))
    } else {
        Span::styled("search off", Style::default().fg(DIM))
    };

    let header = Line::from(vec![
        Span::styled(format!(" {}", ctx.title), Style::default().fg(Color::Cyan).bold()),
        Span::raw("  │ "),
        Span::styled(model.name, Style::default().fg(Color::Yellow)),
        Span::raw(" │ "),
        search,
    ]);
    let widget = Paragraph::new(header).block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(widget, area);
}

fn render_transcript(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines: Vec<Line> = Vec::new();
    if let Some(ctx) = app.ctx.as_ref() {
        for entry in ctx.transcript.entries() {
            lines.extend(format_entry(entry, app.tick));
            lines.push(Line::raw(""));
        }
    }

    // Keep the newest lines in view unless scrolled back
    let inner_height = area.height.saturating_sub(2) as usize;
    let bottom = lines.len().saturating_sub(inner_height);
    let offset = bottom.saturating_sub(app.scroll_back as usize);

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(BORDER_TRANSCRIPT)),
        )
        .wrap(Wrap { trim: false })
        .scroll((offset.min(u16::MAX as usize) as u16, 0));
    frame.render_widget(paragraph, area);
}

/// Format one transcript entry into display lines.
fn format_entry(entry: &RenderedEntry, tick: u64) -> Vec<Line<'static>> {
    let accent = match entry.accent {
        Accent::User => ACCENT_USER,
        Accent::Assistant => ACCENT_ASSISTANT,
    };

    let mut lines = vec![Line::from(vec![
        Span::styled(
            format!("[{}] {}", entry.avatar, entry.label),
            Style::default().fg(accent).bold(),
        ),
        Span::styled(
            format!("  {}", clock_time(entry.timestamp)),
            Style::default().fg(DIM),
        ),
    ])];

    match &entry.body {
        EntryBody::Text(body) => {
            for segments in body {
                lines.push(Line::from(
                    segments.iter().map(segment_span).collect::<Vec<_>>(),
                ));
            }
        }
        EntryBody::Image { source } => {
            let shown = if source.starts_with("data:") {
                "[uploaded image]".to_string()
            } else {
                format!("[image] {}", source)
            };
            lines.push(Line::from(Span::styled(
                shown,
                Style::default().fg(accent).add_modifier(Modifier::UNDERLINED),
            )));
        }
        EntryBody::Typing { label } => {
            let dots = ".".repeat((tick / 5 % 4) as usize);
            lines.push(Line::from(Span::styled(
                format!("{}{}", label, dots),
                Style::default().fg(DIM).italic(),
            )));
        }
    }

    if let Some(note) = &entry.note {
        lines.push(Line::from(Span::styled(
            format!("(i) {}", note),
            Style::default().fg(DIM).italic(),
        )));
    }
    lines
}

fn segment_span(segment: &Segment) -> Span<'static> {
    match segment {
        Segment::Plain(text) => Span::raw(text.clone()),
        Segment::Bold(text) => Span::styled(text.clone(), Style::default().bold()),
        Segment::Italic(text) => Span::styled(text.clone(), Style::default().italic()),
        Segment::Code(text) => Span::styled(text.clone(), Style::default().fg(MD_CODE)),
    }
}

fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let generating = app.ctx.as_ref().is_some_and(|c| c.is_generating);
    let (title, border) = if generating {
        (" Waiting for reply ", DIM)
    } else if app.focus == Focus::Input {
        (" Message ", BORDER_FOCUS)
    } else {
        (" Message ", BORDER_SIDEBAR)
    };

    let input = Paragraph::new(format!("{}_", app.input)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border))
            .title(title),
    );
    frame.render_widget(input, area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(" Enter", Style::default().fg(Color::Yellow)),
        Span::raw(" send  "),
        Span::styled("^N", Style::default().fg(Color::Yellow)),
        Span::raw(" new  "),
        Span::styled("^W", Style::default().fg(Color::Yellow)),
        Span::raw(" search  "),
        Span::styled("^O", Style::default().fg(Color::Yellow)),
        Span::raw(" model  "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" chats  "),
        Span::styled("^L", Style::default().fg(Color::Yellow)),
        Span::raw(" sign out  "),
        Span::styled("/image", Style::default().fg(Color::Yellow)),
        Span::raw(" <path>"),
    ];

    if let Some(status) = &app.status {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(status.clone(), Style::default().fg(DIM)));
    }

    let footer = Paragraph::new(Line::from(spans)).alignment(Alignment::Left);
    frame.render_widget(footer, area);
}
