//! `[overlay]` section configuration.
//!
//! Seeds the overlay layout before any operator update arrives.
//!
//! # Example
//!
//! ```toml
//! [overlay]
//! anchor = "bottom-right"     # top-left, top-right, bottom-left, bottom-right, center
//! offset_x = 40
//! offset_y = 40
//! custom_css = ".card-name { font-size: 48px; }"
//! ```

use serde::{Deserialize, Serialize};

use crate::overlay::{Anchor, OverlayConfig};

/// Initial overlay layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySection {
    pub anchor: Anchor,
    pub offset_x: i32,
    pub offset_y: i32,
    pub custom_css: String,
}

impl Default for OverlaySection {
    fn default() -> Self {
        let defaults = OverlayConfig::default();
        Self {
            anchor: defaults.anchor,
            offset_x: defaults.offset_x,
            offset_y: defaults.offset_y,
            custom_css: defaults.custom_css,
        }
    }
}

impl OverlaySection {
    /// The initial `OverlayConfig`, with the port taken from `[serve]`.
    pub fn to_overlay_config(&self, port: u16) -> OverlayConfig {
        OverlayConfig {
            anchor: self.anchor,
            offset_x: self.offset_x,
            offset_y: self.offset_y,
            custom_css: self.custom_css.clone(),
            port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_overlay_section() {
        let config = test_parse_config(
            "[overlay]\nanchor = \"bottom-right\"\noffset_x = -10\ncustom_css = \"body{}\"",
        );
        let overlay = config.overlay.to_overlay_config(4000);

        assert_eq!(overlay.anchor, Anchor::BottomRight);
        assert_eq!(overlay.offset_x, -10);
        assert_eq!(overlay.offset_y, 50);
        assert_eq!(overlay.custom_css, "body{}");
        assert_eq!(overlay.port, 4000);
    }

    #[test]
    fn test_overlay_section_defaults_match_state() {
        let config = test_parse_config("");
        assert_eq!(config.overlay.to_overlay_config(3030), OverlayConfig::default());
    }

    #[test]
    fn test_overlay_section_bad_anchor() {
        let result = crate::config::CardcastConfig::from_str("[overlay]\nanchor = \"middle\"");
        assert!(result.is_err());
    }
}
