//! List rendering for prompts and action replies
//!
//! Text output carries two platform-neutral markers that the webhook expands
//! per chat platform: `<bold>` around emphasized words and `<o>` as a bullet.
//! Speech output is plain, comma-joined prose.

/// How list items are prefixed in the text rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStyle {
    /// `1. item`
    Numbered,
    /// `<o> item`
    Bulleted,
}

/// Bullet marker expanded per platform
pub const BULLET: &str = "<o>";

/// Bold marker expanded per platform
pub const BOLD: &str = "<bold>";

pub fn numbered_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

pub fn bulleted_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("{BULLET} {}", item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Wrap a value in bold markers
pub fn bold(value: &str) -> String {
    format!("{BOLD}{value}{BOLD}")
}

/// Text and speech renderings of one reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub speech: String,
}

impl Message {
    pub fn new(text: impl Into<String>, speech: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speech: speech.into(),
        }
    }

    /// Same wording for text and speech
    pub fn plain(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        Self {
            text: msg.clone(),
            speech: msg,
        }
    }
}

/// Framing around a truncated list
#[derive(Debug, Clone)]
pub struct ListTemplate<'a> {
    pub text: &'a str,
    pub speech: &'a str,
    pub end_text: &'a str,
    pub end_speech: &'a str,
    /// Used for both renderings when the list is empty
    pub fallback: &'a str,
    /// Plural noun in the "and N other ..." suffix
    pub plural: &'a str,
    pub style: ListStyle,
}

impl<'a> ListTemplate<'a> {
    pub fn new(text: &'a str, speech: &'a str, fallback: &'a str, plural: &'a str) -> Self {
        Self {
            text,
            speech,
            end_text: "",
            end_speech: "",
            fallback,
            plural,
            style: ListStyle::Numbered,
        }
    }

    pub fn ending(mut self, end_text: &'a str, end_speech: &'a str) -> Self {
        self.end_text = end_text;
        self.end_speech = end_speech;
        self
    }

    pub fn style(mut self, style: ListStyle) -> Self {
        self.style = style;
        self
    }
}

/// Render `items` under `template`, showing at most `limit` entries and
/// summarizing the rest as "and N other ...".
///
/// Returns `None` when `items` is empty so callers can decide whether the
/// fallback is a prompt or a terminal error.
pub fn truncate_list<S: AsRef<str>>(
    template: &ListTemplate<'_>,
    items: &[S],
    limit: usize,
) -> Option<Message> {
    truncate_double_list(template, items, items, limit)
}

/// Like [`truncate_list`] with separate text and speech entries.
///
/// Both slices must describe the same items; the shorter length wins.
pub fn truncate_double_list<S: AsRef<str>, T: AsRef<str>>(
    template: &ListTemplate<'_>,
    text_items: &[S],
    speech_items: &[T],
    limit: usize,
) -> Option<Message> {
    let total = text_items.len().min(speech_items.len());
    if total == 0 {
        return None;
    }
    let shown = total.min(limit.max(1));

    let mut text = template.text.to_string();
    text.push_str(&match template.style {
        ListStyle::Numbered => numbered_list(&text_items[..shown]),
        ListStyle::Bulleted => bulleted_list(&text_items[..shown]),
    });

    let mut speech = template.speech.to_string();
    let spoken: Vec<&str> = speech_items[..shown].iter().map(|s| s.as_ref()).collect();
    speech.push_str(spoken.join(", ").trim());

    if total > shown {
        let rest = total - shown;
        text.push_str(&format!("\n\n and {rest} other {}.", template.plural));
        speech.push_str(&format!(" and {rest} other {}.", template.plural));
    }

    text.push_str(template.end_text);
    speech.push_str(template.end_speech);

    Some(Message { text, speech })
}

/// Render a list, or the template's fallback when it is empty
pub fn list_or_fallback<S: AsRef<str>>(
    template: &ListTemplate<'_>,
    items: &[S],
    limit: usize,
) -> Message {
    truncate_list(template, items, limit).unwrap_or_else(|| Message::plain(template.fallback))
}
