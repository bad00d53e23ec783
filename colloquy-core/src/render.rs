//! Message rendering model
//!
//! Front ends draw a [`Transcript`]: an ordered list of [`RenderedEntry`]
//! values produced by one pure function, [`render_message`], from a message
//! and a role → style table. The transcript also holds transient typing
//! placeholders, removed by handle once a reply (or error) arrives.

use chrono::{DateTime, Utc};

use crate::types::{Chat, Message, Role};

/// Note attached to replies that used web search snippets
pub const SEARCH_NOTE: &str = "Answer includes real-time web search results";

/// Colour family a front end should use for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accent {
    User,
    Assistant,
}

/// How one role is presented
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleStyle {
    pub label: String,
    pub avatar: &'static str,
    pub accent: Accent,
}

/// Role → style lookup table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleStyles {
    user: RoleStyle,
    assistant: RoleStyle,
}

impl RoleStyles {
    pub fn new(assistant_name: &str) -> Self {
        Self {
            user: RoleStyle {
                label: "You".to_string(),
                avatar: "U",
                accent: Accent::User,
            },
            assistant: RoleStyle {
                label: assistant_name.to_string(),
                avatar: "AI",
                accent: Accent::Assistant,
            },
        }
    }

    pub fn get(&self, role: Role) -> &RoleStyle {
        match role {
            Role::User => &self.user,
            Role::Assistant => &self.assistant,
        }
    }

    /// Label used while the assistant is generating
    pub fn typing_label(&self) -> String {
        format!("{} is thinking", self.assistant.label)
    }
}

impl Default for RoleStyles {
    fn default() -> Self {
        Self::new("Assistant")
    }
}

/// A run of text with one inline style
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Plain(String),
    Bold(String),
    Italic(String),
    Code(String),
}

/// What an entry shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryBody {
    /// Formatted lines of text
    Text(Vec<Vec<Segment>>),
    /// An image by URL or data URL
    Image { source: String },
    /// Transient "thinking" placeholder
    Typing { label: String },
}

/// One rendered row of the transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEntry {
    pub role: Role,
    pub label: String,
    pub avatar: &'static str,
    pub accent: Accent,
    pub timestamp: DateTime<Utc>,
    pub body: EntryBody,
    /// Footer such as the web search note
    pub note: Option<String>,
    typing: Option<TypingHandle>,
}

impl RenderedEntry {
    pub fn is_typing(&self) -> bool {
        self.typing.is_some()
    }
}

/// Identifies a typing placeholder in a [`Transcript`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypingHandle(u64);

/// Render a completed message
pub fn render_message(message: &Message, used_search: bool, styles: &RoleStyles) -> RenderedEntry {
    let style = styles.get(message.role);
    RenderedEntry {
        role: message.role,
        label: style.label.clone(),
        avatar: style.avatar,
        accent: style.accent,
        timestamp: message.timestamp,
        body: EntryBody::Text(format_content(&message.content)),
        note: (used_search && message.role == Role::Assistant).then(|| SEARCH_NOTE.to_string()),
        typing: None,
    }
}

/// Render an image posted by `role`
pub fn render_image(role: Role, source: &str, styles: &RoleStyles) -> RenderedEntry {
    let style = styles.get(role);
    RenderedEntry {
        role,
        label: style.label.clone(),
        avatar: style.avatar,
        accent: style.accent,
        timestamp: Utc::now(),
        body: EntryBody::Image {
            source: source.to_string(),
        },
        note: None,
        typing: None,
    }
}

/// Split content into lines of styled segments.
///
/// Understands `**bold**`, `*italic*` and `` `code` ``; unmatched markers
/// stay as plain text.
pub fn format_content(content: &str) -> Vec<Vec<Segment>> {
    content.split('\n').map(format_line).collect()
}

fn format_line(line: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut plain = String::new();
    let mut rest = line;

    while let Some(ch) = rest.chars().next() {
        let styled = if let Some(after) = rest.strip_prefix("**") {
            after
                .find("**")
                .map(|end| (Segment::Bold(after[..end].to_string()), &after[end + 2..]))
        } else if let Some(after) = rest.strip_prefix('*') {
            after
                .find('*')
                .map(|end| (Segment::Italic(after[..end].to_string()), &after[end + 1..]))
        } else if let Some(after) = rest.strip_prefix('`') {
            after
                .find('`')
                .map(|end| (Segment::Code(after[..end].to_string()), &after[end + 1..]))
        } else {
            None
        };

        match styled {
            Some((segment, remaining)) => {
                if !plain.is_empty() {
                    segments.push(Segment::Plain(std::mem::take(&mut plain)));
                }
                if !segment_is_empty(&segment) {
                    segments.push(segment);
                }
                rest = remaining;
            }
            None => {
                plain.push(ch);
                rest = &rest[ch.len_utf8()..];
            }
        }
    }

    if !plain.is_empty() {
        segments.push(Segment::Plain(plain));
    }
    segments
}

fn segment_is_empty(segment: &Segment) -> bool {
    match segment {
        Segment::Plain(s) | Segment::Bold(s) | Segment::Italic(s) | Segment::Code(s) => {
            s.is_empty()
        }
    }
}

/// In-memory transcript for one chat view
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    styles: RoleStyles,
    entries: Vec<RenderedEntry>,
    next_typing: u64,
}

impl Transcript {
    pub fn new(styles: RoleStyles) -> Self {
        Self {
            styles,
            entries: Vec::new(),
            next_typing: 0,
        }
    }

    pub fn styles(&self) -> &RoleStyles {
        &self.styles
    }

    pub fn render(&mut self, entry: RenderedEntry) {
        self.entries.push(entry);
    }

    /// Render a message with this transcript's styles
    pub fn render_message(&mut self, message: &Message, used_search: bool) {
        let entry = render_message(message, used_search, &self.styles);
        self.render(entry);
    }

    pub fn render_image(&mut self, role: Role, source: &str) {
        let entry = render_image(role, source, &self.styles);
        self.render(entry);
    }

    /// Replace everything with a stored chat's messages
    pub fn load_chat(&mut self, chat: &Chat) {
        self.clear();
        for message in &chat.messages {
            self.render_message(message, false);
        }
    }

    /// Add a typing placeholder and return its handle
    pub fn show_typing(&mut self, label: &str) -> TypingHandle {
        let handle = TypingHandle(self.next_typing);
        self.next_typing += 1;

        let style = self.styles.get(Role::Assistant);
        self.entries.push(RenderedEntry {
            role: Role::Assistant,
            label: style.label.clone(),
            avatar: style.avatar,
            accent: style.accent,
            timestamp: Utc::now(),
            body: EntryBody::Typing {
                label: label.to_string(),
            },
            note: None,
            typing: Some(handle),
        });
        handle
    }

    /// Remove a typing placeholder; unknown handles are ignored.
    pub fn remove_typing(&mut self, handle: TypingHandle) {
        self.entries.retain(|e| e.typing != Some(handle));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[RenderedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(s: &str) -> Segment {
        Segment::Plain(s.to_string())
    }

    #[test]
    fn test_format_content_inline_styles() {
        let lines = format_content("a **b** *c* `d`\nnext");
        assert_eq!(
            lines,
            vec![
                vec![
                    plain("a "),
                    Segment::Bold("b".to_string()),
                    plain(" "),
                    Segment::Italic("c".to_string()),
                    plain(" "),
                    Segment::Code("d".to_string()),
                ],
                vec![plain("next")],
            ]
        );
    }

    #[test]
    fn test_format_content_unmatched_markers() {
        assert_eq!(format_content("2 * 3 = 6"), vec![vec![plain("2 * 3 = 6")]]);
        assert_eq!(format_content("**open"), vec![vec![plain("**open")]]);
        assert_eq!(format_content(""), vec![Vec::<Segment>::new()]);
    }

    #[test]
    fn test_render_message_uses_style_table() {
        let styles = RoleStyles::new("Pri");
        let reply = Message::new(Role::Assistant, "hi");
        let entry = render_message(&reply, true, &styles);
        assert_eq!(entry.label, "Pri");
        assert_eq!(entry.accent, Accent::Assistant);
        assert_eq!(entry.note.as_deref(), Some(SEARCH_NOTE));

        let question = Message::new(Role::User, "q");
        let entry = render_message(&question, true, &styles);
        assert_eq!(entry.label, "You");
        assert!(entry.note.is_none());
    }

    #[test]
    fn test_typing_placeholder_lifecycle() {
        let mut transcript = Transcript::new(RoleStyles::new("Pri"));
        transcript.render_message(&Message::new(Role::User, "q"), false);

        let first = transcript.show_typing(&transcript.styles().typing_label());
        let second = transcript.show_typing("Analyzing image...");
        assert_eq!(transcript.len(), 3);
        assert!(matches!(
            &transcript.entries()[1].body,
            EntryBody::Typing { label } if label == "Pri is thinking"
        ));

        transcript.remove_typing(first);
        assert_eq!(transcript.len(), 2);

        // Removing twice is a no-op
        transcript.remove_typing(first);
        assert_eq!(transcript.len(), 2);

        transcript.remove_typing(second);
        assert_eq!(transcript.len(), 1);
        assert!(!transcript.entries()[0].is_typing());
    }

    #[test]
    fn test_load_chat_replaces_entries() {
        let mut chat = Chat::new(Utc::now());
        chat.push_message(Message::new(Role::User, "Hello"));
        chat.push_message(Message::new(Role::Assistant, "Hi"));

        let mut transcript = Transcript::default();
        transcript.render_image(Role::User, "data:image/png;base64,AA");
        transcript.load_chat(&chat);

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.entries()[1].role, Role::Assistant);
    }
}
