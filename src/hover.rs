//! Hash hovers.
//!
//! A lowercase hex word under the cursor is first looked up as a git
//! revision. If that fails for any reason the hover falls back to treating it
//! as an opaque session identifier with a terminal action to resume it.
//! Nothing is cached; every hover asks the repository again.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::config::ReflensConfig;
use crate::errors::{ReflensError, Result};
use crate::revision::RevisionLookup;
use crate::types::{HoverAction, HoverContent, HoverKind, RevisionInfo, TextSpan};

/// Compiled matcher for lowercase hex words within a length range.
///
/// Word boundaries are ASCII-only, so a hash glued to non-ASCII text such as
/// `提交a1b2c3d4修复` still counts as a word.
#[derive(Debug, Clone)]
pub struct HashMatcher {
    min_len: usize,
    max_len: usize,
    re: Regex,
}

impl HashMatcher {
    pub fn new(min_len: usize, max_len: usize) -> Result<Self> {
        let pattern = format!(r"(?-u:\b)[a-f0-9]{{{},{}}}(?-u:\b)", min_len, max_len);
        let re = Regex::new(&pattern).map_err(|e| ReflensError::Config {
            message: format!("invalid hash length bounds {}..={}: {}", min_len, max_len, e),
        })?;
        Ok(Self {
            min_len,
            max_len,
            re,
        })
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Finds the hex hash whose span contains `offset`.
    ///
    /// Only the line holding `offset` is searched. Runs longer than the upper
    /// bound never yield a partial match.
    pub fn find_at(&self, text: &str, offset: usize) -> Option<TextSpan> {
        if offset > text.len() || !text.is_char_boundary(offset) {
            return None;
        }
        let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = text[offset..]
            .find('\n')
            .map(|i| offset + i)
            .unwrap_or(text.len());
        let line = &text[line_start..line_end];

        let found = self
            .re
            .find_iter(line)
            .map(|m| TextSpan::new(line_start + m.start(), line_start + m.end()))
            .take_while(|span| span.start <= offset)
            .find(|span| span.contains(offset));
        found
    }
}

impl PartialEq for HashMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.min_len == other.min_len && self.max_len == other.max_len
    }
}

impl Eq for HashMatcher {}

impl Default for HashMatcher {
    fn default() -> Self {
        let config = ReflensConfig::default();
        Self {
            min_len: config.min_hash_len,
            max_len: config.max_hash_len,
            re: default_hash_regex().clone(),
        }
    }
}

fn default_hash_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?-u:\b)[a-f0-9]{7,40}(?-u:\b)").expect("default hash regex is valid")
    })
}

/// Settings for hash detection and hover rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverOptions {
    pub matcher: HashMatcher,
    pub short_hash_len: usize,
    pub fallback_hash_len: usize,
    pub view_command: String,
    pub terminal_verb: String,
}

impl Default for HoverOptions {
    fn default() -> Self {
        Self::from(&ReflensConfig::default())
    }
}

impl From<&ReflensConfig> for HoverOptions {
    fn from(config: &ReflensConfig) -> Self {
        let matcher = HashMatcher::new(config.min_hash_len, config.max_hash_len)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "using default hash lengths");
                HashMatcher::default()
            });
        Self {
            matcher,
            short_hash_len: config.short_hash_len,
            fallback_hash_len: config.fallback_hash_len,
            view_command: config.view_command.clone(),
            terminal_verb: config.terminal_verb.clone(),
        }
    }
}

/// Finds the hex hash whose span contains `offset`.
///
/// The hash must be a whole word of lowercase hex digits with a length inside
/// the configured bounds; longer runs never yield a partial match.
pub fn find_hash_at(text: &str, offset: usize, options: &HoverOptions) -> Option<TextSpan> {
    options.matcher.find_at(text, offset)
}

/// Resolves the hover for the hex hash at `offset`, if any.
///
/// Returns `None` when there is no hash under the cursor or no workspace to
/// look it up in. Lookup failures produce fallback content, never an error.
pub fn resolve_hover(
    text: &str,
    offset: usize,
    workspace: Option<&Path>,
    lookup: &dyn RevisionLookup,
    options: &HoverOptions,
) -> Option<HoverContent> {
    let span = find_hash_at(text, offset, options)?;
    let hash = span.slice(text)?;
    let workspace = workspace?;

    match lookup.lookup(workspace, hash) {
        Ok(info) => {
            tracing::debug!(hash, "resolved hash as revision");
            Some(revision_hover(span, hash, &info, options))
        }
        Err(e) => {
            tracing::debug!(hash, error = %e, "hash is not a revision, using fallback");
            Some(fallback_hover(span, hash, options))
        }
    }
}

/// Hover for a hash that names a commit.
pub fn revision_hover(
    span: TextSpan,
    hash: &str,
    info: &RevisionInfo,
    options: &HoverOptions,
) -> HoverContent {
    HoverContent {
        span,
        kind: HoverKind::Revision,
        hash: hash.to_string(),
        title: format!(
            "**Git Commit:** `{}` · {}",
            prefix(hash, options.short_hash_len),
            info.relative_time
        ),
        body: info.message.clone(),
        actions: vec![HoverAction::Command {
            title: "View Full Commit".to_string(),
            command: options.view_command.clone(),
            arguments: vec![Value::String(hash.to_string())],
        }],
    }
}

/// Hover for a hash that is not in the repository's history.
pub fn fallback_hover(span: TextSpan, hash: &str, options: &HoverOptions) -> HoverContent {
    HoverContent {
        span,
        kind: HoverKind::Fallback,
        hash: hash.to_string(),
        title: format!(
            "**Hash:** `{}` · not found in git history",
            prefix(hash, options.fallback_hash_len)
        ),
        body: format!(
            "`{}` is not a commit in this repository. It may be an external session identifier.",
            hash
        ),
        actions: vec![HoverAction::Terminal {
            title: "Resume Session".to_string(),
            text: format!("{} {}", options.terminal_verb, hash),
        }],
    }
}

fn prefix(hash: &str, len: usize) -> &str {
    hash.get(..len).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> HoverOptions {
        HoverOptions::default()
    }

    #[test]
    fn test_find_hash_inside_word() {
        let text = "fixed in a1b2c3d yesterday";
        let start = text.find("a1b2c3d").unwrap();
        for offset in start..=start + 7 {
            let span = find_hash_at(text, offset, &opts()).unwrap();
            assert_eq!(span.slice(text), Some("a1b2c3d"));
        }
        assert!(find_hash_at(text, start - 2, &opts()).is_none());
    }

    #[test]
    fn test_length_bounds() {
        let six = "abcdef";
        let forty = "a".repeat(40);
        let forty_one = "b".repeat(41);
        assert!(find_hash_at(six, 2, &opts()).is_none());
        assert!(find_hash_at(&forty, 2, &opts()).is_some());
        assert!(find_hash_at(&forty_one, 2, &opts()).is_none());
        assert!(find_hash_at(&forty_one, 40, &opts()).is_none());
    }

    #[test]
    fn test_uppercase_and_embedded_hex_rejected() {
        assert!(find_hash_at("A1B2C3D4", 2, &opts()).is_none());
        assert!(find_hash_at("xa1b2c3d4", 3, &opts()).is_none());
        assert!(find_hash_at("a1b2c3d4_x", 3, &opts()).is_none());
    }

    #[test]
    fn test_hyphenated_segments_match_individually() {
        let text = "session 0f8fad5b-d9cb-469f-a165-70867728950e";
        let offset = text.find("0f8f").unwrap() + 1;
        let span = find_hash_at(text, offset, &opts()).unwrap();
        assert_eq!(span.slice(text), Some("0f8fad5b"));
    }

    #[test]
    fn test_hash_on_later_line() {
        let text = "first line\nsee deadbeef here\n";
        let offset = text.find("deadbeef").unwrap() + 3;
        let span = find_hash_at(text, offset, &opts()).unwrap();
        assert_eq!(span.slice(text), Some("deadbeef"));
    }

    #[test]
    fn test_ascii_word_boundaries() {
        let text = "提交a1b2c3d4修复";
        let offset = text.find("a1b2").unwrap() + 2;
        let span = find_hash_at(text, offset, &opts()).unwrap();
        assert_eq!(span.slice(text), Some("a1b2c3d4"));

        let text = "a1b2c3d4é";
        assert_eq!(
            find_hash_at(text, 0, &opts()).and_then(|s| s.slice(text)),
            Some("a1b2c3d4")
        );
    }

    #[test]
    fn test_matcher_bounds() {
        let matcher = HashMatcher::new(4, 6).unwrap();
        assert_eq!((matcher.min_len(), matcher.max_len()), (4, 6));
        assert!(matcher.find_at("beef", 0).is_some());
        assert!(matcher.find_at("beefbee", 0).is_none());
        assert!(HashMatcher::new(9, 3).is_err());
        assert_eq!(HashMatcher::default(), HashMatcher::new(7, 40).unwrap());
    }

    #[test]
    fn test_offset_out_of_range() {
        assert!(find_hash_at("a1b2c3d", 99, &opts()).is_none());
    }

    #[test]
    fn test_prefix_shorter_than_len() {
        assert_eq!(prefix("abc", 8), "abc");
        assert_eq!(prefix("a1b2c3d4e5", 7), "a1b2c3d");
    }

    #[test]
    fn test_fallback_content() {
        let hash = "a1b2c3d4e5f6";
        let hover = fallback_hover(TextSpan::new(0, hash.len()), hash, &opts());
        assert_eq!(hover.kind, HoverKind::Fallback);
        assert!(hover.title.contains("`a1b2c3d4`"));
        assert!(!hover.title.contains(hash));
        assert_eq!(
            hover.actions,
            vec![HoverAction::Terminal {
                title: "Resume Session".to_string(),
                text: "resume a1b2c3d4e5f6".to_string(),
            }]
        );
    }
}
