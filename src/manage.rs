//! Inventory management commands.
//!
//! The CLI counterpart of the original browser flows: list/show for the
//! grid and detail views, add/update/set-stock/delete for editing. All of
//! them talk to the REST API through [`ApiClient`]; writes run through the
//! conflict-retry save and record their outcome in the history ledger.

use anyhow::{Context, Result};
use base64::Engine as _;
use std::path::Path;

use crate::api::ApiClient;
use crate::config::Config;
use crate::history::{self, HistoryLedger};
use crate::models::{ColorChange, HistoryAction, Item, ItemDraft};
use crate::reconcile::{validate_draft, ValidationErrors};
use crate::retry::{save_item, GatewayError, RetryPolicy, SaveError};

/// `stk list`: all items, optionally filtered like the grid's search box.
pub async fn run_list(config: &Config, search: Option<&str>) -> Result<()> {
    let client = ApiClient::new(&config.api)?;
    let mut items = client.list_items().await?;

    if let Some(term) = search {
        let term = term.to_lowercase();
        items.retain(|item| {
            item.display_name.to_lowercase().contains(&term)
                || item.catalog_number.to_lowercase().contains(&term)
        });
    }

    println!(
        "{:<36} {:<12} {:<24} {:>10} {:>7} {:>7}",
        "ID", "CATALOG", "NAME", "PRICE", "COLORS", "STOCK"
    );
    for item in &items {
        let total_stock: i64 = item.color_variants.iter().map(|c| c.stock).sum();
        println!(
            "{:<36} {:<12} {:<24} {:>10.2} {:>7} {:>7}",
            item.id,
            item.catalog_number,
            item.display_name,
            item.price,
            item.color_variants.len(),
            total_stock
        );
    }
    println!("{} item(s)", items.len());

    Ok(())
}

/// `stk show <id>`: full detail for one item.
pub async fn run_show(config: &Config, id: &str) -> Result<()> {
    let client = ApiClient::new(&config.api)?;
    let item = match client.get_item(id).await {
        Ok(item) => item,
        Err(GatewayError::NotFound) => {
            eprintln!("Item not found: {}", id);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    print_item(&item);
    Ok(())
}

/// `stk add`: create an item from a draft file.
pub async fn run_add(config: &Config, draft_path: &Path, image: Option<&Path>) -> Result<()> {
    let mut draft = read_draft(draft_path)?;
    if let Some(image_path) = image {
        draft.image_ref = Some(data_url(image_path)?);
    }

    let fields = match validate_draft(&draft) {
        Ok(fields) => fields,
        Err(errors) => {
            print_validation_errors(&errors);
            std::process::exit(1);
        }
    };

    let client = ApiClient::new(&config.api)?;
    let item = client.add_item(&fields).await?;

    let ledger = HistoryLedger::open(&config.history.path).await?;
    ledger
        .append(&history::new_entry(HistoryAction::Add, &item, vec![]))
        .await?;

    // Initial stock levels are themselves a stock movement worth auditing.
    let initial: Vec<ColorChange> = item
        .color_variants
        .iter()
        .filter(|c| c.stock > 0 || c.min_stock > 0)
        .map(|c| ColorChange {
            color_name: c.color_name.clone(),
            old_stock: 0,
            new_stock: c.stock,
            old_min_stock: Some(0),
            new_min_stock: Some(c.min_stock),
        })
        .collect();
    if !initial.is_empty() {
        ledger
            .append(&history::new_entry(HistoryAction::StockUpdate, &item, initial))
            .await?;
    }
    ledger.close().await;

    println!("Added item {} ({})", item.catalog_number, item.id);
    Ok(())
}

/// `stk update <id>`: replace an item's fields from a draft file, riding
/// the conflict-retry save.
pub async fn run_update(
    config: &Config,
    id: &str,
    draft_path: &Path,
    image: Option<&Path>,
) -> Result<()> {
    let mut draft = read_draft(draft_path)?;
    if let Some(image_path) = image {
        draft.image_ref = Some(data_url(image_path)?);
    }

    let client = ApiClient::new(&config.api)?;
    let base = match client.get_item(id).await {
        Ok(item) => item,
        Err(GatewayError::NotFound) => {
            eprintln!("Item not found: {}", id);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    save_and_record(config, &client, &base, &draft).await
}

/// `stk set-stock <id>`: adjust one color's stock level in place.
pub async fn run_set_stock(
    config: &Config,
    id: &str,
    color: &str,
    stock: i64,
    min_stock: Option<i64>,
) -> Result<()> {
    let client = ApiClient::new(&config.api)?;
    let base = match client.get_item(id).await {
        Ok(item) => item,
        Err(GatewayError::NotFound) => {
            eprintln!("Item not found: {}", id);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let mut draft = ItemDraft::from_item(&base);
    let Some(variant) = draft
        .color_variants
        .iter_mut()
        .find(|c| c.color_name == color)
    else {
        eprintln!("Item {} has no color '{}'", base.catalog_number, color);
        std::process::exit(1);
    };
    variant.stock = stock.to_string();
    if let Some(min) = min_stock {
        variant.min_stock = min.to_string();
    }

    save_and_record(config, &client, &base, &draft).await
}

/// `stk delete <id>`: remove an item, keeping its snapshot in the ledger.
pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let client = ApiClient::new(&config.api)?;
    let outcome = match client.delete_item(id).await {
        Ok(outcome) => outcome,
        Err(GatewayError::NotFound) => {
            eprintln!("Item not found: {}", id);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    let ledger = HistoryLedger::open(&config.history.path).await?;
    ledger
        .append(&history::new_entry(
            HistoryAction::Delete,
            &outcome.deleted_item,
            vec![],
        ))
        .await?;
    ledger.close().await;

    println!("{}", outcome.message);
    Ok(())
}

/// `stk history list`: the ledger, newest first.
pub async fn run_history_list(config: &Config, search: Option<&str>) -> Result<()> {
    let ledger = HistoryLedger::open(&config.history.path).await?;
    let entries = ledger.list_all(search).await?;

    println!("--- History ({} entries) ---", entries.len());
    for entry in &entries {
        println!(
            "{}  {:<12} {:<12} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.action.as_str(),
            entry.snapshot.catalog_number,
            entry.snapshot.display_name
        );
        println!("    id: {}", entry.id);
        for change in &entry.changes {
            match (change.old_min_stock, change.new_min_stock) {
                (Some(old_min), Some(new_min)) => println!(
                    "    {}: stock {} -> {} (min {} -> {})",
                    change.color_name, change.old_stock, change.new_stock, old_min, new_min
                ),
                _ => println!(
                    "    {}: stock {} -> {}",
                    change.color_name, change.old_stock, change.new_stock
                ),
            }
        }
    }

    ledger.close().await;
    Ok(())
}

/// `stk history remove <id>`: drop one ledger entry.
pub async fn run_history_remove(config: &Config, id: &str) -> Result<()> {
    let ledger = HistoryLedger::open(&config.history.path).await?;
    let removed = ledger.remove(id).await?;
    ledger.close().await;

    if removed {
        println!("Removed history entry {}", id);
    } else {
        println!("No history entry with id {}", id);
    }
    Ok(())
}

/// Runs the retry save and appends the matching ledger entry: a
/// `stock_update` carrying the diff when stock moved, a plain `update`
/// otherwise.
async fn save_and_record(
    config: &Config,
    client: &ApiClient,
    base: &Item,
    draft: &ItemDraft,
) -> Result<()> {
    let policy = RetryPolicy::from_config(&config.api);

    let outcome = match save_item(client, base, draft, &policy).await {
        Ok(outcome) => outcome,
        Err(SaveError::Validation(errors)) => {
            print_validation_errors(&errors);
            std::process::exit(1);
        }
        Err(SaveError::ConflictExhausted { attempts }) => {
            eprintln!(
                "Failed to update after {} attempts due to a conflict. Please try again.",
                attempts
            );
            std::process::exit(1);
        }
        Err(SaveError::NotFound) => {
            eprintln!("Item not found: {}", base.id);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let ledger = HistoryLedger::open(&config.history.path).await?;
    let action = if outcome.changes.is_empty() {
        HistoryAction::Update
    } else {
        HistoryAction::StockUpdate
    };
    ledger
        .append(&history::new_entry(
            action,
            &outcome.item,
            outcome.changes.clone(),
        ))
        .await?;
    ledger.close().await;

    println!(
        "Updated item {} ({} attempt{})",
        outcome.item.catalog_number,
        outcome.attempts,
        if outcome.attempts == 1 { "" } else { "s" }
    );
    for change in &outcome.changes {
        println!(
            "  {}: stock {} -> {}",
            change.color_name, change.old_stock, change.new_stock
        );
    }
    Ok(())
}

fn print_item(item: &Item) {
    println!("--- Item ---");
    println!("id:             {}", item.id);
    println!("catalog_number: {}", item.catalog_number);
    println!("display_name:   {}", item.display_name);
    println!("price:          {:.2}", item.price);
    println!("version:        {}", item.version);
    println!("created_at:     {}", item.created_at.to_rfc3339());
    println!("updated_at:     {}", item.updated_at.to_rfc3339());
    if let Some(ref image) = item.image_ref {
        println!("image:          {}", describe_ref(image));
    }
    println!();

    println!("--- Colors ({}) ---", item.color_variants.len());
    for variant in &item.color_variants {
        let marker = if variant.stock < variant.min_stock {
            "  [low]"
        } else {
            ""
        };
        println!(
            "{:<16} stock {:>5}   min {:>5}{}",
            variant.color_name, variant.stock, variant.min_stock, marker
        );
    }
}

fn describe_ref(image_ref: &str) -> String {
    if image_ref.starts_with("data:") {
        format!("(inline image, {} bytes encoded)", image_ref.len())
    } else {
        image_ref.to_string()
    }
}

fn print_validation_errors(errors: &ValidationErrors) {
    eprintln!("Draft validation failed:");
    for (field, message) in &errors.fields {
        eprintln!("  {}: {}", field, message);
    }
}

fn read_draft(path: &Path) -> Result<ItemDraft> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read draft file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse draft file: {}", path.display()))
}

fn data_url(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read image file: {}", path.display()))?;
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime, encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_draft_accepts_numbers_and_strings() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("draft.json");
        std::fs::write(
            &path,
            r#"{
                "catalogNumber": "SR-100",
                "displayName": "Banarasi Silk",
                "price": 1499.5,
                "colorVariants": [
                    {"colorName": "Red", "stock": 5, "minStock": "2"}
                ]
            }"#,
        )
        .unwrap();

        let draft = read_draft(&path).unwrap();
        assert_eq!(draft.price, "1499.5");
        assert_eq!(draft.color_variants[0].stock, "5");
        assert_eq!(draft.color_variants[0].min_stock, "2");
    }

    #[test]
    fn test_data_url_prefixes_mime_type() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("swatch.png");
        std::fs::write(&path, [0x89, 0x50, 0x4e, 0x47]).unwrap();

        let url = data_url(&path).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }
}
