//! HTML document assembly and the shared stylesheet.

use base64::Engine;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry stylesheet, loaded once and shared read-only.
#[derive(Debug, Clone)]
pub struct Stylesheet {
    css: Arc<str>,
    etag: Arc<str>,
}

impl Stylesheet {
    pub fn new(css: impl Into<Arc<str>>) -> Self {
        let css = css.into();
        let digest = Sha256::digest(css.as_bytes());
        let etag = format!(
            "\"{}\"",
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
        );
        Self {
            css,
            etag: etag.into(),
        }
    }

    /// Read the stylesheet at `path`. A missing or unreadable file degrades to
    /// an empty stylesheet.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(css) => {
                info!(path = %path.display(), bytes = css.len(), "loaded registry stylesheet");
                Self::new(css)
            }
            Err(error) => {
                warn!(
                    path = %path.display(),
                    %error,
                    "registry stylesheet unavailable, rendering without styles"
                );
                Self::new("")
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.css
    }

    /// Strong entity tag for the stylesheet route.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn is_empty(&self) -> bool {
        self.css.is_empty()
    }
}

impl Default for Stylesheet {
    fn default() -> Self {
        Self::new("")
    }
}

const DOCUMENT_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Component Preview</title>
<style>"#;

const DOCUMENT_BODY: &str = r#"</style>
</head>
<body>
<div id="root">"#;

const DOCUMENT_TAIL: &str = r#"</div>
</body>
</html>
"#;

/// Wrap a rendered fragment in a complete document with the stylesheet inlined.
pub fn assemble(fragment: &str, stylesheet: &Stylesheet) -> String {
    let css = stylesheet.as_str();
    let mut document = String::with_capacity(
        DOCUMENT_HEAD.len() + css.len() + DOCUMENT_BODY.len() + fragment.len() + DOCUMENT_TAIL.len(),
    );
    document.push_str(DOCUMENT_HEAD);
    document.push_str(css);
    document.push_str(DOCUMENT_BODY);
    document.push_str(fragment);
    document.push_str(DOCUMENT_TAIL);
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn wraps_fragment_in_root_container() {
        let stylesheet = Stylesheet::new(".card{padding:1rem}");
        let document = assemble("<h1>Hi</h1>", &stylesheet);

        assert!(document.starts_with("<!DOCTYPE html>"));
        assert!(document.contains("<style>.card{padding:1rem}</style>"));
        assert!(document.contains(r#"<div id="root"><h1>Hi</h1></div>"#));
        assert!(document.trim_end().ends_with("</html>"));
    }

    #[test]
    fn missing_stylesheet_degrades_to_empty_style_block() {
        let dir = tempdir().unwrap();
        let stylesheet = Stylesheet::load(&dir.path().join("styles.css"));

        assert!(stylesheet.is_empty());
        assert!(assemble("<p>x</p>", &stylesheet).contains("<style></style>"));
    }

    #[test]
    fn etag_tracks_content() {
        let a = Stylesheet::new("body{}");
        let b = Stylesheet::new("body{}");
        let c = Stylesheet::new("body{color:red}");

        assert_eq!(a.etag(), b.etag());
        assert_ne!(a.etag(), c.etag());
        assert!(a.etag().starts_with('"') && a.etag().ends_with('"'));
    }
}
