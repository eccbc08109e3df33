//! Card identity and price shown by the overlay.

use serde::{Deserialize, Deserializer, Serialize};

/// The card currently on screen.
///
/// Published values are never mutated in place: every update produces a new
/// `CardData` merged from the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    pub name: String,
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
    /// Milliseconds since the UNIX epoch, stamped by the store on write.
    pub updated_at: u64,
}

impl Default for CardData {
    fn default() -> Self {
        Self {
            name: "Black Lotus".to_string(),
            price: "$25,000".to_string(),
            set: Some("Alpha".to_string()),
            rarity: Some("Rare".to_string()),
            updated_at: 0,
        }
    }
}

impl CardData {
    /// Merge `patch` onto `self`, stamping `updated_at`.
    ///
    /// The stamp is strictly greater than the previous one even if the wall
    /// clock has not moved (or moved backwards).
    pub fn merged(&self, patch: &CardDataPatch, now_millis: u64) -> Self {
        Self {
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            price: patch.price.clone().unwrap_or_else(|| self.price.clone()),
            set: merge_optional(&self.set, &patch.set),
            rarity: merge_optional(&self.rarity, &patch.rarity),
            updated_at: now_millis.max(self.updated_at.saturating_add(1)),
        }
    }
}

/// Partial card update.
///
/// Absent fields keep their previous value. For the optional fields an
/// explicit `null` clears the value. Any `updatedAt` sent by a caller is
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDataPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub set: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub rarity: Option<Option<String>>,
}

fn merge_optional(current: &Option<String>, update: &Option<Option<String>>) -> Option<String> {
    match update {
        Some(value) => value.clone(),
        None => current.clone(),
    }
}

/// Distinguish a present `null` (`Some(None)`) from an absent field (`None`).
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
