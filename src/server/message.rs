//! Server events and their wire format.

use std::sync::Arc;

use serde::Serialize;

use crate::overlay::{CardData, OverlayConfig};
use crate::producer::Frame;

/// Something every connected client should learn about.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    CardDataChanged(Arc<CardData>),
    ConfigChanged(Arc<OverlayConfig>),
    FrameReady(Frame),
}

impl ServerEvent {
    pub fn to_wire(&self) -> WireMessage<'_> {
        match self {
            Self::CardDataChanged(card) => WireMessage::CardData(card),
            Self::ConfigChanged(config) => WireMessage::Config(config),
            Self::FrameReady(frame) => WireMessage::VideoFrame(frame.to_data_url()),
        }
    }
}

/// Server-to-client JSON message: `{"type": ..., "payload": ...}`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum WireMessage<'a> {
    CardData(&'a CardData),
    Config(&'a OverlayConfig),
    /// `data:<mime>;base64,<bytes>`
    VideoFrame(String),
}

impl WireMessage<'_> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
