//! Low-stock alert derivation.
//!
//! One alert per color variant sitting below its reorder threshold. The
//! derivation is a pure pass over the full item list and produces a fresh
//! list every time: no suppression, no transition tracking. Callers that
//! want "newly crossed" semantics must diff successive runs themselves.

use anyhow::Result;
use std::time::Duration;

use crate::api::ApiClient;
use crate::config::Config;
use crate::models::{Item, StockAlert};

/// Emits an alert for every variant where `stock < minStock`, in
/// item-then-variant order.
pub fn derive_alerts(items: &[Item]) -> Vec<StockAlert> {
    let mut alerts = Vec::new();
    for item in items {
        for variant in &item.color_variants {
            if variant.stock < variant.min_stock {
                alerts.push(StockAlert {
                    item_id: item.id.clone(),
                    color_name: variant.color_name.clone(),
                    catalog_number: item.catalog_number.clone(),
                    display_name: item.display_name.clone(),
                    current_stock: variant.stock,
                    minimum_stock: variant.min_stock,
                });
            }
        }
    }
    alerts
}

/// CLI entry point: prints the alert feed, optionally re-polling.
pub async fn run_alerts(config: &Config, watch: bool) -> Result<()> {
    let client = ApiClient::new(&config.api)?;

    loop {
        match client.list_items().await {
            Ok(items) => print_alerts(&derive_alerts(&items)),
            Err(e) if watch => eprintln!("Error fetching items: {}", e),
            Err(e) => return Err(e.into()),
        }

        if !watch {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(config.alerts.poll_secs)).await;
    }
}

fn print_alerts(alerts: &[StockAlert]) {
    println!("--- Low Stock Alerts ({}) ---", alerts.len());
    if alerts.is_empty() {
        println!("All variants are at or above their minimum stock.");
        return;
    }
    for alert in alerts {
        println!(
            "{:<12} {:<24} {:<12} stock {} / min {}",
            alert.catalog_number,
            alert.display_name,
            alert.color_name,
            alert.current_stock,
            alert.minimum_stock
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColorVariant;
    use crate::reconcile::test_item;

    fn variant(name: &str, stock: i64, min_stock: i64) -> ColorVariant {
        ColorVariant {
            color_name: name.to_string(),
            stock,
            min_stock,
            color_image_ref: None,
        }
    }

    #[test]
    fn test_low_variant_produces_one_alert() {
        let items = vec![test_item("SR-100", vec![variant("Red", 1, 5)])];
        let alerts = derive_alerts(&items);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].color_name, "Red");
        assert_eq!(alerts[0].catalog_number, "SR-100");
        assert_eq!(alerts[0].current_stock, 1);
        assert_eq!(alerts[0].minimum_stock, 5);
    }

    #[test]
    fn test_healthy_stock_produces_no_alert() {
        let items = vec![test_item("SR-100", vec![variant("Red", 10, 5)])];
        assert!(derive_alerts(&items).is_empty());
    }

    #[test]
    fn test_stock_equal_to_minimum_is_not_low() {
        let items = vec![test_item("SR-100", vec![variant("Red", 5, 5)])];
        assert!(derive_alerts(&items).is_empty());
    }

    #[test]
    fn test_alerts_follow_item_then_variant_order() {
        let items = vec![
            test_item("SR-100", vec![variant("Red", 0, 2), variant("Blue", 9, 1)]),
            test_item("SR-200", vec![variant("Green", 1, 3)]),
        ];
        let alerts = derive_alerts(&items);
        let pairs: Vec<(&str, &str)> = alerts
            .iter()
            .map(|a| (a.catalog_number.as_str(), a.color_name.as_str()))
            .collect();
        assert_eq!(pairs, vec![("SR-100", "Red"), ("SR-200", "Green")]);
    }

    #[test]
    fn test_rerun_is_stateless() {
        let items = vec![test_item("SR-100", vec![variant("Red", 1, 5)])];
        let first = derive_alerts(&items);
        let second = derive_alerts(&items);
        assert_eq!(first, second);
    }
}
