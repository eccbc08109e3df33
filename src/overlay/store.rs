//! Snapshot store for overlay state.
//!
//! Uses `arc-swap` for lock-free reads and atomic replacement. Writers are
//! serialized so that read-merge-store sequences never interleave.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use super::{CardData, CardDataPatch, OverlayConfig, OverlayConfigPatch, StateError};

/// Last-known card data and overlay config.
pub struct OverlayState {
    card: ArcSwap<CardData>,
    config: ArcSwap<OverlayConfig>,
    writer: Mutex<()>,
}

impl Default for OverlayState {
    fn default() -> Self {
        Self::new(CardData::default(), OverlayConfig::default())
    }
}

impl OverlayState {
    pub fn new(card: CardData, config: OverlayConfig) -> Self {
        Self {
            card: ArcSwap::from_pointee(card),
            config: ArcSwap::from_pointee(config),
            writer: Mutex::new(()),
        }
    }

    /// Current card data snapshot.
    #[inline]
    pub fn card_data(&self) -> Arc<CardData> {
        self.card.load_full()
    }

    /// Current config snapshot.
    #[inline]
    pub fn config(&self) -> Arc<OverlayConfig> {
        self.config.load_full()
    }

    /// Merge a partial card update and return the new full value.
    pub fn apply_card_data(&self, patch: &CardDataPatch) -> Arc<CardData> {
        let _guard = self.writer.lock();
        let next = Arc::new(self.card.load().merged(patch, now_millis()));
        self.card.store(Arc::clone(&next));
        next
    }

    /// Merge a partial config update and return the new full value.
    ///
    /// On error the stored config is left exactly as it was.
    pub fn apply_config(&self, patch: &OverlayConfigPatch) -> Result<Arc<OverlayConfig>, StateError> {
        let _guard = self.writer.lock();
        let next = Arc::new(self.config.load().merged(patch)?);
        self.config.store(Arc::clone(&next));
        Ok(next)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
