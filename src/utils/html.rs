//! Escaping for text injected into the overlay page.

use std::borrow::Cow;

/// Escape HTML special characters in text content.
///
/// Borrows when nothing needs escaping.
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['<', '>', '&', '"', '\'']) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Make user CSS safe to place inside a `<style>` element.
///
/// Only `</` can end a raw text element early, so it becomes `<\/`, which
/// CSS treats the same inside strings and never needs elsewhere.
pub fn style_text(css: &str) -> Cow<'_, str> {
    if css.contains("</") {
        Cow::Owned(css.replace("</", "<\\/"))
    } else {
        Cow::Borrowed(css)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_plain_borrows() {
        assert!(matches!(escape("Black Lotus"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_escape_special_chars() {
        assert_eq!(escape("<b>\"R&D\"</b>"), "&lt;b&gt;&quot;R&amp;D&quot;&lt;/b&gt;");
        assert_eq!(escape("Urza's"), "Urza&#39;s");
    }

    #[test]
    fn test_style_text_neutralizes_close_tag() {
        let css = ".card{color:red}</style><script>alert(1)</script>";
        let safe = style_text(css);
        assert!(!safe.contains("</"));
        assert!(safe.starts_with(".card{color:red}"));
        assert!(matches!(style_text(".a{}"), Cow::Borrowed(_)));
    }
}
