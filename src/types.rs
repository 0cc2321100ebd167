use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Host command that injects literal text into the active terminal.
pub const TERMINAL_SEND_COMMAND: &str = "workbench.action.terminal.sendSequence";

/// A contiguous byte range within a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextSpan {
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {} after end {}", start, end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns `true` if `offset` lies inside the span.
    ///
    /// The end is inclusive so a cursor placed just after the last character
    /// still counts as "on" the token, the way editors resolve word ranges.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    /// Returns the text covered by this span, or `None` if it is out of
    /// bounds or not on character boundaries.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end)
    }
}

/// A clickable link from an `@reference` to an existing file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkAnnotation {
    /// Span of the full `@token` text.
    pub span: TextSpan,
    /// Resolved filesystem target.
    pub target: PathBuf,
    /// Tooltip naming the reference as written.
    pub tooltip: String,
}

/// Commit metadata returned by a revision lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    /// Subject line, blank line, then body; trimmed.
    pub message: String,
    /// Human-relative commit age, e.g. `3 days ago`.
    pub relative_time: String,
}

impl RevisionInfo {
    /// First line of the commit message.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Which branch of hash resolution produced a hover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoverKind {
    /// The hash named a commit in the workspace repository.
    Revision,
    /// The hash was not found; offered as a possible session identifier.
    Fallback,
}

impl HoverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoverKind::Revision => "revision",
            HoverKind::Fallback => "fallback",
        }
    }
}

/// An actionable link shown inside a hover card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HoverAction {
    /// Run a named host command with JSON arguments.
    Command {
        title: String,
        command: String,
        arguments: Vec<Value>,
    },
    /// Send literal text to an interactive terminal.
    Terminal { title: String, text: String },
}

impl HoverAction {
    /// Renders the action as a Markdown `command:` link.
    ///
    /// Terminal actions are dispatched through the host's send-sequence
    /// command with a trailing newline so the text is submitted.
    pub fn to_markdown(&self) -> String {
        let (title, command, arguments) = match self {
            HoverAction::Command {
                title,
                command,
                arguments,
            } => (title, command.as_str(), Value::Array(arguments.clone())),
            HoverAction::Terminal { title, text } => (
                title,
                TERMINAL_SEND_COMMAND,
                json!({ "text": format!("{}\n", text) }),
            ),
        };
        format!(
            "[{}](command:{}?{})",
            title,
            command,
            encode_uri_component(&arguments.to_string())
        )
    }
}

/// Structured hover card anchored to a hex token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoverContent {
    pub span: TextSpan,
    pub kind: HoverKind,
    /// The full hex token that was hovered.
    pub hash: String,
    /// Markdown headline (hash and age, or a not-found note).
    pub title: String,
    /// Commit message or explanatory text.
    pub body: String,
    pub actions: Vec<HoverAction>,
}

impl HoverContent {
    /// Renders the hover as a single Markdown document.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.title);
        out.push_str("\n\n");
        out.push_str(&self.body);
        for action in &self.actions {
            out.push_str("\n\n");
            out.push_str(&action.to_markdown());
        }
        out
    }
}

/// Percent-encodes `s` the way `encodeURIComponent` does, leaving only
/// `A-Z a-z 0-9 - _ . ! ~ * ' ( )` unescaped.
pub fn encode_uri_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
