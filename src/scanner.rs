//! `@reference` scanning.
//!
//! Finds every `@token` in a document, treats the token as a path relative to
//! the workspace root (or absolute), and keeps only those that exist.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::types::{LinkAnnotation, TextSpan};

/// `@` followed by a greedy run of non-whitespace.
const REFERENCE_PATTERN: &str = r"@(\S+)";

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(REFERENCE_PATTERN).expect("reference pattern is valid"))
}

/// Read-only filesystem probe used to filter references.
pub trait PathProbe {
    fn exists(&self, path: &Path) -> bool;
}

/// `PathProbe` backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl PathProbe for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Resolves a reference token against `base_dir` unless it is already absolute.
pub fn resolve_reference(token: &str, base_dir: &Path) -> PathBuf {
    let path = Path::new(token);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Scans `text` for `@references` that point at existing paths.
///
/// Returns annotations in document order. Without a base directory nothing is
/// produced. Missing paths are dropped silently.
pub fn scan_references(
    text: &str,
    base_dir: Option<&Path>,
    fs: &dyn PathProbe,
) -> Vec<LinkAnnotation> {
    let Some(base_dir) = base_dir else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for caps in reference_regex().captures_iter(text) {
        let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let target = resolve_reference(token.as_str(), base_dir);
        if !fs.exists(&target) {
            tracing::trace!(token = token.as_str(), "reference target missing");
            continue;
        }
        links.push(LinkAnnotation {
            span: TextSpan::new(whole.start(), whole.end()),
            target,
            tooltip: format!("Open {}", token.as_str()),
        });
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct FakeFs(HashSet<PathBuf>);

    impl FakeFs {
        fn with(paths: &[&str]) -> Self {
            Self(paths.iter().map(PathBuf::from).collect())
        }
    }

    impl PathProbe for FakeFs {
        fn exists(&self, path: &Path) -> bool {
            self.0.contains(path)
        }
    }

    #[test]
    fn test_existing_reference_is_linked() {
        let fs = FakeFs::with(&["/ws/docs/readme.md"]);
        let text = "See @docs/readme.md for details";
        let links = scan_references(text, Some(Path::new("/ws")), &fs);

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].span.slice(text), Some("@docs/readme.md"));
        assert_eq!(links[0].target, PathBuf::from("/ws/docs/readme.md"));
        assert_eq!(links[0].tooltip, "Open docs/readme.md");
    }

    #[test]
    fn test_missing_reference_is_dropped() {
        let fs = FakeFs::with(&[]);
        let links = scan_references("@missing/file.md", Some(Path::new("/ws")), &fs);
        assert!(links.is_empty());
    }

    #[test]
    fn test_no_base_dir_yields_nothing() {
        let fs = FakeFs::with(&["/ws/a.md"]);
        assert!(scan_references("@a.md", None, &fs).is_empty());
    }

    #[test]
    fn test_absolute_reference_used_as_is() {
        let fs = FakeFs::with(&["/etc/hosts"]);
        let links = scan_references("@/etc/hosts", Some(Path::new("/ws")), &fs);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_reference_is_greedy_to_whitespace() {
        let fs = FakeFs::with(&["/ws/a.md,"]);
        let links = scan_references("read @a.md, then stop", Some(Path::new("/ws")), &fs);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].tooltip, "Open a.md,");
    }

    #[test]
    fn test_links_in_document_order() {
        let fs = FakeFs::with(&["/ws/a", "/ws/b", "/ws/c"]);
        let text = "@c @missing @a\n@b";
        let links = scan_references(text, Some(Path::new("/ws")), &fs);
        let tooltips: Vec<&str> = links.iter().map(|l| l.tooltip.as_str()).collect();
        assert_eq!(tooltips, vec!["Open c", "Open a", "Open b"]);
        assert!(links.windows(2).all(|w| w[0].span.end <= w[1].span.start));
    }

    #[test]
    fn test_bare_at_sign_is_ignored() {
        let fs = FakeFs::with(&["/ws"]);
        assert!(scan_references("email me @ home", Some(Path::new("/ws")), &fs).is_empty());
    }
}
