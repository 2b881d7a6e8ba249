//! Reconciliation of edited items against stored records.
//!
//! Three pieces live here, all pure:
//!
//! - [`validate_draft`] coerces a form-edited draft into a typed
//!   [`ValidatedItem`], accumulating every field failure instead of stopping
//!   at the first.
//! - [`diff_colors`] computes the per-color stock movements between two
//!   variant lists, in the order the audit history records them.
//! - [`EditSet`] captures which fields a user actually touched relative to
//!   the record they loaded, so a conflict retry can re-apply their intent
//!   on top of a fresher server copy.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::models::{ColorChange, ColorVariant, Item, ItemDraft, ValidatedItem};

/// Per-field validation failures, keyed by the JSON field path
/// (`catalogNumber`, `price`, `colorVariants[2].stock`, ...).
///
/// Validation failure is an expected outcome, not an exceptional one: this
/// type is returned, rendered field-by-field, and never panicked over.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    pub fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.insert(field.into(), message.into());
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Validates a form-edited draft, returning a fully typed item on success.
///
/// All checks run; a draft with an empty catalog number and a negative
/// price reports both. Strings are trimmed, empty image references become
/// `None`, and numeric fields are coerced from their form-string values.
pub fn validate_draft(draft: &ItemDraft) -> Result<ValidatedItem, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let catalog_number = draft.catalog_number.trim().to_string();
    if catalog_number.is_empty() {
        errors.add("catalogNumber", "required");
    }

    let display_name = draft.display_name.trim().to_string();
    if display_name.is_empty() {
        errors.add("displayName", "required");
    }

    let price = parse_price(draft.price.trim(), "price", &mut errors);

    if draft.color_variants.is_empty() {
        errors.add("colorVariants", "at least one color variant is required");
    }

    let mut seen_names: HashSet<String> = HashSet::new();
    let mut color_variants = Vec::with_capacity(draft.color_variants.len());

    for (i, variant) in draft.color_variants.iter().enumerate() {
        let color_name = variant.color_name.trim().to_string();
        if color_name.is_empty() {
            errors.add(format!("colorVariants[{}].colorName", i), "required");
        } else if !seen_names.insert(color_name.clone()) {
            errors.add(
                format!("colorVariants[{}].colorName", i),
                "duplicate color name",
            );
        }

        let stock = parse_count(
            variant.stock.trim(),
            format!("colorVariants[{}].stock", i),
            &mut errors,
        );
        let min_stock = parse_count(
            variant.min_stock.trim(),
            format!("colorVariants[{}].minStock", i),
            &mut errors,
        );

        color_variants.push(ColorVariant {
            color_name,
            stock: stock.unwrap_or_default(),
            min_stock: min_stock.unwrap_or_default(),
            color_image_ref: normalize_ref(&variant.color_image_ref),
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ValidatedItem {
        catalog_number,
        display_name,
        price: price.unwrap_or_default(),
        image_ref: normalize_ref(&draft.image_ref),
        color_variants,
    })
}

/// Semantic checks for already-typed payloads, as received by the REST API.
///
/// Same rules as [`validate_draft`] minus the string-coercion step; an empty
/// result means the payload is acceptable.
pub fn check_fields(fields: &ValidatedItem) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    if fields.catalog_number.trim().is_empty() {
        errors.add("catalogNumber", "required");
    }
    if fields.display_name.trim().is_empty() {
        errors.add("displayName", "required");
    }
    if !fields.price.is_finite() || fields.price < 0.0 {
        errors.add("price", "must be a non-negative number");
    }
    if fields.color_variants.is_empty() {
        errors.add("colorVariants", "at least one color variant is required");
    }

    let mut seen_names: HashSet<&str> = HashSet::new();
    for (i, variant) in fields.color_variants.iter().enumerate() {
        let name = variant.color_name.trim();
        if name.is_empty() {
            errors.add(format!("colorVariants[{}].colorName", i), "required");
        } else if !seen_names.insert(name) {
            errors.add(
                format!("colorVariants[{}].colorName", i),
                "duplicate color name",
            );
        }
        if variant.stock < 0 {
            errors.add(
                format!("colorVariants[{}].stock", i),
                "must be non-negative",
            );
        }
        if variant.min_stock < 0 {
            errors.add(
                format!("colorVariants[{}].minStock", i),
                "must be non-negative",
            );
        }
    }

    errors
}

fn parse_price(raw: &str, field: &str, errors: &mut ValidationErrors) -> Option<f64> {
    if raw.is_empty() {
        errors.add(field, "required");
        return None;
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Some(v),
        Ok(_) => {
            errors.add(field, "must be non-negative");
            None
        }
        Err(_) => {
            errors.add(field, "must be a number");
            None
        }
    }
}

fn parse_count(raw: &str, field: String, errors: &mut ValidationErrors) -> Option<i64> {
    if raw.is_empty() {
        errors.add(field, "required");
        return None;
    }
    match raw.parse::<i64>() {
        Ok(v) if v >= 0 => Some(v),
        Ok(_) => {
            errors.add(field, "must be non-negative");
            None
        }
        Err(_) => {
            errors.add(field, "must be an integer");
            None
        }
    }
}

fn normalize_ref(raw: &Option<String>) -> Option<String> {
    match raw {
        Some(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Computes the per-color stock movements between two variant lists.
///
/// Variants new to `new` are recorded as additions from zero; variants whose
/// stock or minStock moved are recorded with both pairs; variants dropped
/// from `new` are recorded as zeroed-out, but only when they still had stock
/// left. Emission order is `new`'s order for additions and changes, then
/// `old`'s order for removals, which keeps the audit log deterministic.
pub fn diff_colors(old: &[ColorVariant], new: &[ColorVariant]) -> Vec<ColorChange> {
    let mut changes = Vec::new();

    for nv in new {
        match old.iter().find(|ov| ov.color_name == nv.color_name) {
            None => changes.push(ColorChange {
                color_name: nv.color_name.clone(),
                old_stock: 0,
                new_stock: nv.stock,
                old_min_stock: Some(0),
                new_min_stock: Some(nv.min_stock),
            }),
            Some(ov) => {
                if ov.stock != nv.stock || ov.min_stock != nv.min_stock {
                    changes.push(ColorChange {
                        color_name: nv.color_name.clone(),
                        old_stock: ov.stock,
                        new_stock: nv.stock,
                        old_min_stock: Some(ov.min_stock),
                        new_min_stock: Some(nv.min_stock),
                    });
                }
            }
        }
    }

    for ov in old {
        let still_present = new.iter().any(|nv| nv.color_name == ov.color_name);
        if !still_present && ov.stock > 0 {
            changes.push(ColorChange {
                color_name: ov.color_name.clone(),
                old_stock: ov.stock,
                new_stock: 0,
                old_min_stock: None,
                new_min_stock: None,
            });
        }
    }

    changes
}

/// The fields a user changed relative to the record they loaded.
///
/// During a conflict retry, the authoritative record is refetched and the
/// edit set is re-applied on top of it: touched fields keep the user's
/// values, untouched fields adopt whatever a concurrent writer left behind,
/// and the fresh version token is carried forward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditSet {
    pub catalog_number: Option<String>,
    pub display_name: Option<String>,
    pub price: Option<f64>,
    pub image_ref: Option<Option<String>>,
    pub color_variants: Option<Vec<ColorVariant>>,
}

impl EditSet {
    /// Captures the difference between the record the user loaded and the
    /// validated result of their editing.
    pub fn between(base: &Item, edited: &ValidatedItem) -> Self {
        Self {
            catalog_number: (base.catalog_number != edited.catalog_number)
                .then(|| edited.catalog_number.clone()),
            display_name: (base.display_name != edited.display_name)
                .then(|| edited.display_name.clone()),
            price: (base.price != edited.price).then_some(edited.price),
            image_ref: (base.image_ref != edited.image_ref).then(|| edited.image_ref.clone()),
            color_variants: (base.color_variants != edited.color_variants)
                .then(|| edited.color_variants.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.catalog_number.is_none()
            && self.display_name.is_none()
            && self.price.is_none()
            && self.image_ref.is_none()
            && self.color_variants.is_none()
    }

    /// Re-applies the captured edits on top of the latest server record,
    /// producing the candidate to submit. The candidate carries the latest
    /// record's version token, which is the expected value for the write.
    pub fn apply(&self, latest: &Item) -> Item {
        Item {
            id: latest.id.clone(),
            catalog_number: self
                .catalog_number
                .clone()
                .unwrap_or_else(|| latest.catalog_number.clone()),
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| latest.display_name.clone()),
            price: self.price.unwrap_or(latest.price),
            image_ref: self
                .image_ref
                .clone()
                .unwrap_or_else(|| latest.image_ref.clone()),
            color_variants: self
                .color_variants
                .clone()
                .unwrap_or_else(|| latest.color_variants.clone()),
            version: latest.version,
            created_at: latest.created_at,
            updated_at: latest.updated_at,
        }
    }
}

/// Extracts the submit-ready fields from a candidate record.
pub fn item_fields(item: &Item) -> ValidatedItem {
    ValidatedItem {
        catalog_number: item.catalog_number.clone(),
        display_name: item.display_name.clone(),
        price: item.price,
        image_ref: item.image_ref.clone(),
        color_variants: item.color_variants.clone(),
    }
}

#[cfg(test)]
pub(crate) fn test_item(catalog: &str, variants: Vec<ColorVariant>) -> Item {
    use chrono::TimeZone;

    let ts = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Item {
        id: format!("item-{}", catalog),
        catalog_number: catalog.to_string(),
        display_name: "Kanchipuram Silk".to_string(),
        price: 2500.0,
        image_ref: None,
        color_variants: variants,
        version: crate::models::VersionToken(0),
        created_at: ts,
        updated_at: ts,
    }
}
