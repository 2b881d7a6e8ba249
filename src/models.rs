//! Core data models used throughout Stockroom.
//!
//! These types represent the catalog items, color variants, history entries,
//! and alerts that flow between the store, the REST API, and the CLI. All
//! wire-facing structs serialize as camelCase JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque optimistic-concurrency token attached to every stored item.
///
/// The value changes on every successful write and is only ever compared
/// for equality; nothing outside the store's SQL interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(pub(crate) i64);

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One color option of an item, with its own stock level and reorder threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorVariant {
    pub color_name: String,
    pub stock: i64,
    pub min_stock: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_image_ref: Option<String>,
}

/// A catalog item as stored, including the store-assigned id and version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub catalog_number: String,
    pub display_name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    pub color_variants: Vec<ColorVariant>,
    pub version: VersionToken,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Item fields after validation: strings trimmed, numbers coerced.
///
/// This is what gets sent to the store on add/update; the store supplies
/// id, version, and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedItem {
    pub catalog_number: String,
    pub display_name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    pub color_variants: Vec<ColorVariant>,
}

/// An item as edited in a form: every numeric field is free-form text.
///
/// Draft files may write numbers or strings for `price`/`stock`/`minStock`;
/// both deserialize to the form-string representation validation expects.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    #[serde(default)]
    pub catalog_number: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, deserialize_with = "stringly")]
    pub price: String,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub color_variants: Vec<ColorDraft>,
}

/// One color variant as edited in a form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorDraft {
    #[serde(default)]
    pub color_name: String,
    #[serde(default, deserialize_with = "stringly")]
    pub stock: String,
    #[serde(default, deserialize_with = "stringly")]
    pub min_stock: String,
    #[serde(default)]
    pub color_image_ref: Option<String>,
}

impl ItemDraft {
    /// Builds a draft mirroring a stored item, for flows that edit a single
    /// field of an existing record (e.g. `stk set-stock`).
    pub fn from_item(item: &Item) -> Self {
        Self {
            catalog_number: item.catalog_number.clone(),
            display_name: item.display_name.clone(),
            price: item.price.to_string(),
            image_ref: item.image_ref.clone(),
            color_variants: item
                .color_variants
                .iter()
                .map(|c| ColorDraft {
                    color_name: c.color_name.clone(),
                    stock: c.stock.to_string(),
                    min_stock: c.min_stock.to_string(),
                    color_image_ref: c.color_image_ref.clone(),
                })
                .collect(),
        }
    }
}

/// Accepts either a JSON string or a JSON number, yielding the form-string
/// representation.
fn stringly<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// One per-color stock movement recorded in the audit history.
///
/// When an existing variant changed, the minStock pair rides along with the
/// stock pair even if only one of them moved. Removal records carry only
/// the stock pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorChange {
    pub color_name: String,
    pub old_stock: i64,
    pub new_stock: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_min_stock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_min_stock: Option<i64>,
}

/// What kind of event a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Add,
    Update,
    Delete,
    StockUpdate,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Add => "add",
            HistoryAction::Update => "update",
            HistoryAction::Delete => "delete",
            HistoryAction::StockUpdate => "stock_update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(HistoryAction::Add),
            "update" => Some(HistoryAction::Update),
            "delete" => Some(HistoryAction::Delete),
            "stock_update" => Some(HistoryAction::StockUpdate),
            _ => None,
        }
    }
}

/// Minimal item identification captured with each history entry, so entries
/// stay displayable after the live item is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSnapshot {
    pub item_id: String,
    pub catalog_number: String,
    pub display_name: String,
}

/// One append-only entry in the local change-history ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub item_id: String,
    pub action: HistoryAction,
    pub snapshot: ItemSnapshot,
    /// Present only for `stock_update` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ColorChange>,
    pub timestamp: DateTime<Utc>,
}

/// A low-stock alert for one (item, color) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAlert {
    pub item_id: String,
    pub color_name: String,
    pub catalog_number: String,
    pub display_name: String,
    pub current_stock: i64,
    pub minimum_stock: i64,
}
