//! Overlay layout configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::StateError;

/// Screen corner (or center) the overlay is positioned against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl Anchor {
    pub const ALL: [Anchor; 5] = [
        Anchor::TopLeft,
        Anchor::TopRight,
        Anchor::BottomLeft,
        Anchor::BottomRight,
        Anchor::Center,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopRight => "top-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomRight => "bottom-right",
            Self::Center => "center",
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Anchor {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|anchor| anchor.as_str() == s)
            .ok_or_else(|| {
                StateError::invalid(
                    "anchor",
                    format!(
                        "`{s}` is not one of top-left, top-right, bottom-left, bottom-right, center"
                    ),
                )
            })
    }
}

/// How and where the overlay is drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayConfig {
    pub anchor: Anchor,
    pub offset_x: i32,
    pub offset_y: i32,
    pub custom_css: String,
    /// Port the host starts the server on when none is given.
    pub port: u16,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            anchor: Anchor::TopLeft,
            offset_x: 50,
            offset_y: 50,
            custom_css: String::new(),
            port: 3030,
        }
    }
}

impl OverlayConfig {
    /// Merge `patch` onto `self`.
    ///
    /// Validation happens before anything is copied, so an error leaves no
    /// partially merged value behind.
    pub fn merged(&self, patch: &OverlayConfigPatch) -> Result<Self, StateError> {
        let anchor = match patch.anchor.as_deref() {
            Some(raw) => raw.parse()?,
            None => self.anchor,
        };
        if patch.port == Some(0) {
            return Err(StateError::invalid("port", "port must be non-zero"));
        }

        Ok(Self {
            anchor,
            offset_x: patch.offset_x.unwrap_or(self.offset_x),
            offset_y: patch.offset_y.unwrap_or(self.offset_y),
            custom_css: patch
                .custom_css
                .clone()
                .unwrap_or_else(|| self.custom_css.clone()),
            port: patch.port.unwrap_or(self.port),
        })
    }
}

/// Partial config update.
///
/// `anchor` stays a raw string here so that an unknown value surfaces as an
/// `InvalidConfig` rejection instead of a transport-level parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayConfigPatch {
    #[serde(default)]
    pub anchor: Option<String>,
    #[serde(default)]
    pub offset_x: Option<i32>,
    #[serde(default)]
    pub offset_y: Option<i32>,
    #[serde(default)]
    pub custom_css: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}
