//! Embedded static resources.
//!
//! # Module Structure
//!
//! - `template` - Typed page templates
//! - `overlay` - The overlay page served at `/overlay` and `/overlay-webcam`

mod template;

pub use template::{Template, TemplateVars};

pub mod overlay {
    use super::{Template, TemplateVars};
    use crate::overlay::{CardData, OverlayConfig};
    use crate::utils::html;

    /// Which overlay page variant to render.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum PageKind {
        /// Transparent background, card only.
        Plain,
        /// Black background with a live video element behind the card.
        Webcam,
    }

    /// Variables for overlay.html.
    pub struct OverlayVars<'a> {
        pub kind: PageKind,
        pub card: &'a CardData,
        pub config: &'a OverlayConfig,
    }

    impl TemplateVars for OverlayVars<'_> {
        fn apply(&self, content: &str) -> String {
            let (body_class, webcam_img) = match self.kind {
                PageKind::Plain => ("plain", ""),
                PageKind::Webcam => ("webcam", r#"<img id="webcam-feed" alt="">"#),
            };

            // User CSS goes in last so placeholders inside it stay literal.
            content
                .replace("__BODY_CLASS__", body_class)
                .replace("__WEBCAM_IMG__", webcam_img)
                .replace("__ANCHOR__", self.config.anchor.as_str())
                .replace("__OFFSET_X__", &self.config.offset_x.to_string())
                .replace("__OFFSET_Y__", &self.config.offset_y.to_string())
                .replace("__CARD_NAME__", &html::escape(&self.card.name))
                .replace("__CARD_PRICE__", &html::escape(&self.card.price))
                .replace("__CARD_SET__", &or_dash(self.card.set.as_deref()))
                .replace("__CARD_RARITY__", &or_dash(self.card.rarity.as_deref()))
                .replace("__CUSTOM_CSS__", &html::style_text(&self.config.custom_css))
        }
    }

    fn or_dash(value: Option<&str>) -> std::borrow::Cow<'_, str> {
        value.map_or("-".into(), html::escape)
    }

    /// Overlay page template.
    pub const OVERLAY_HTML: Template<OverlayVars<'static>> =
        Template::new(include_str!("overlay.html"));

    /// Render the page for the current state.
    pub fn render(kind: PageKind, card: &CardData, config: &OverlayConfig) -> String {
        let template: Template<OverlayVars<'_>> = OVERLAY_HTML;
        template.render(&OverlayVars { kind, card, config })
    }
}

#[cfg(test)]
mod tests {
    use super::overlay::{OVERLAY_HTML, PageKind, render};
    use crate::overlay::{Anchor, CardData, OverlayConfig};

    #[test]
    fn test_template_has_all_placeholders() {
        for placeholder in [
            "__BODY_CLASS__",
            "__WEBCAM_IMG__",
            "__ANCHOR__",
            "__OFFSET_X__",
            "__CARD_NAME__",
            "__CUSTOM_CSS__",
        ] {
            assert!(OVERLAY_HTML.content().contains(placeholder), "{placeholder}");
        }
    }

    #[test]
    fn test_plain_page() {
        let html = render(PageKind::Plain, &CardData::default(), &OverlayConfig::default());
        assert!(html.contains("Black Lotus"));
        assert!(html.contains(r#"class="top-left""#));
        assert!(html.contains("--offset-x: 50px"));
        assert!(!html.contains("webcam-feed\" alt"));
        assert!(!html.contains("__"));
    }

    #[test]
    fn test_webcam_page() {
        let html = render(PageKind::Webcam, &CardData::default(), &OverlayConfig::default());
        assert!(html.contains(r#"<img id="webcam-feed" alt="">"#));
        assert!(html.contains(r#"<body class="webcam">"#));
    }

    #[test]
    fn test_anchor_and_offsets() {
        let config = OverlayConfig {
            anchor: Anchor::BottomRight,
            offset_x: -12,
            offset_y: 7,
            ..OverlayConfig::default()
        };
        let html = render(PageKind::Plain, &CardData::default(), &config);
        assert!(html.contains(r#"class="bottom-right""#));
        assert!(html.contains("--offset-x: -12px; --offset-y: 7px"));
    }

    #[test]
    fn test_custom_css_cannot_close_style() {
        let config = OverlayConfig {
            custom_css: ".card-name{color:gold}</style><script>x()</script>".into(),
            ..OverlayConfig::default()
        };
        let html = render(PageKind::Plain, &CardData::default(), &config);
        assert!(html.contains(".card-name{color:gold}"));
        assert!(!html.contains("<script>x()"));
    }

    #[test]
    fn test_card_text_is_escaped() {
        let card = CardData {
            name: "<b>Fake</b>".into(),
            set: None,
            ..CardData::default()
        };
        let html = render(PageKind::Plain, &card, &OverlayConfig::default());
        assert!(html.contains("&lt;b&gt;Fake&lt;/b&gt;"));
        assert!(html.contains(r#"<span id="card-set">-</span>"#));
    }
}
