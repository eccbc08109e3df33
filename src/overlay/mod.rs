//! Overlay state: the card being shown and how the overlay is laid out.
//!
//! # Module Structure
//!
//! - `card` - `CardData` and its partial update
//! - `config` - `OverlayConfig`, `Anchor` and the partial update
//! - `store` - `OverlayState`, the atomic snapshot store shared with the server
//! - `error` - update rejection errors

mod card;
mod config;
mod error;
mod store;

pub use card::{CardData, CardDataPatch};
pub use config::{Anchor, OverlayConfig, OverlayConfigPatch};
pub use error::StateError;
pub use store::OverlayState;
