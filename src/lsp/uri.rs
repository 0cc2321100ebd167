use std::path::{Path, PathBuf};

use lsp_types::Uri;
use url::Url;

/// Converts a `file://` URI to a local path. Other schemes yield `None`.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let url = Url::parse(uri).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

/// Converts an absolute path to a `file://` URI.
pub fn path_to_uri(path: &Path) -> Option<Uri> {
    let Ok(url) = Url::from_file_path(path) else {
        tracing::debug!(path = %path.display(), "cannot convert path to file URI");
        return None;
    };
    match url.as_str().parse::<Uri>() {
        Ok(uri) => Some(uri),
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "file URL is not a valid LSP URI");
            None
        }
    }
}
