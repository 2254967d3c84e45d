//! Conversion of the author's text into the HTML served to clients.
//!
//! Full Markdown rendering lives outside the core and plugs in through
//! `TextConverter`. The built-in `ParagraphConverter` escapes the text and
//! wraps blank-line separated blocks into paragraphs.

/// Renders the original comment text into sanitized HTML.
pub trait TextConverter: Send + Sync {
    /// Converts `orig` into HTML safe to embed into a page.
    fn convert(&self, orig: &str) -> String;
}

/// Escapes HTML and wraps each paragraph into `<p>..</p>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParagraphConverter;

impl TextConverter for ParagraphConverter {
    fn convert(&self, orig: &str) -> String {
        let normalized = orig.replace("\r\n", "\n");
        let mut html = String::with_capacity(normalized.len() + 8);
        for paragraph in normalized.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            html.push_str("<p>");
            html.push_str(&html_escape::encode_text(paragraph));
            html.push_str("</p>\n");
        }
        html
    }
}

impl<F> TextConverter for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn convert(&self, orig: &str) -> String {
        self(orig)
    }
}
