//! Record Store: versioned CRUD over the item collection.
//!
//! Each item is stored as a single row with its color-variant list embedded
//! as a JSON column, one document per catalog item. Every successful write
//! bumps the `version` column in SQL; [`replace_item`] only applies when the
//! caller's expected token still matches, which is the sole coordination
//! mechanism between concurrent writers.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ColorVariant, Item, ValidatedItem, VersionToken};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("version conflict on item {0}: record changed since last read")]
    VersionConflict(String),
    #[error("catalog number already in use: {0}")]
    CatalogNumberTaken(String),
    #[error("corrupt variant data for item {id}: {source}")]
    Corrupt {
        id: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Returns all items, oldest first.
pub async fn list_items(pool: &SqlitePool) -> Result<Vec<Item>, StoreError> {
    let rows = sqlx::query(
        "SELECT id, catalog_number, display_name, price, image_ref, color_variants_json, \
         version, created_at, updated_at FROM items ORDER BY created_at ASC, id ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_item).collect()
}

pub async fn get_item(pool: &SqlitePool, id: &str) -> Result<Item, StoreError> {
    let row = sqlx::query(
        "SELECT id, catalog_number, display_name, price, image_ref, color_variants_json, \
         version, created_at, updated_at FROM items WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => row_to_item(&row),
        None => Err(StoreError::NotFound(id.to_string())),
    }
}

/// Inserts a new item, assigning its id, initial version, and timestamps.
pub async fn insert_item(pool: &SqlitePool, fields: &ValidatedItem) -> Result<Item, StoreError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();
    let variants_json = variants_to_json(&id, &fields.color_variants)?;

    let result = sqlx::query(
        "INSERT INTO items (id, catalog_number, display_name, price, image_ref, \
         color_variants_json, version, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
    )
    .bind(&id)
    .bind(&fields.catalog_number)
    .bind(&fields.display_name)
    .bind(fields.price)
    .bind(&fields.image_ref)
    .bind(&variants_json)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    match result {
        Ok(_) => get_item(pool, &id).await,
        Err(e) if is_unique_violation(&e) => {
            Err(StoreError::CatalogNumberTaken(fields.catalog_number.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Replaces an item's fields if `expected` still matches the stored version.
///
/// The version bump happens inside the UPDATE, so the compare-and-swap is a
/// single statement. A zero-row update is disambiguated by probing for the
/// row: present means another writer advanced the version, absent means the
/// item is gone.
pub async fn replace_item(
    pool: &SqlitePool,
    id: &str,
    fields: &ValidatedItem,
    expected: VersionToken,
) -> Result<Item, StoreError> {
    let now = Utc::now().timestamp();
    let variants_json = variants_to_json(id, &fields.color_variants)?;

    let result = sqlx::query(
        "UPDATE items SET catalog_number = ?, display_name = ?, price = ?, image_ref = ?, \
         color_variants_json = ?, version = version + 1, updated_at = ? \
         WHERE id = ? AND version = ?",
    )
    .bind(&fields.catalog_number)
    .bind(&fields.display_name)
    .bind(fields.price)
    .bind(&fields.image_ref)
    .bind(&variants_json)
    .bind(now)
    .bind(id)
    .bind(expected.0)
    .execute(pool)
    .await;

    let result = match result {
        Ok(r) => r,
        Err(e) if is_unique_violation(&e) => {
            return Err(StoreError::CatalogNumberTaken(fields.catalog_number.clone()))
        }
        Err(e) => return Err(e.into()),
    };

    if result.rows_affected() == 0 {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM items WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await?;
        return if exists {
            Err(StoreError::VersionConflict(id.to_string()))
        } else {
            Err(StoreError::NotFound(id.to_string()))
        };
    }

    get_item(pool, id).await
}

/// Deletes an item and returns the record as it was before deletion.
pub async fn delete_item(pool: &SqlitePool, id: &str) -> Result<Item, StoreError> {
    let item = get_item(pool, id).await?;

    sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(item)
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<Item, StoreError> {
    let id: String = row.get("id");
    let variants_json: String = row.get("color_variants_json");
    let color_variants: Vec<ColorVariant> =
        serde_json::from_str(&variants_json).map_err(|source| StoreError::Corrupt {
            id: id.clone(),
            source,
        })?;

    let created_at: i64 = row.get("created_at");
    let updated_at: i64 = row.get("updated_at");

    Ok(Item {
        id,
        catalog_number: row.get("catalog_number"),
        display_name: row.get("display_name"),
        price: row.get("price"),
        image_ref: row.get("image_ref"),
        color_variants,
        version: VersionToken(row.get("version")),
        created_at: ts_to_datetime(created_at),
        updated_at: ts_to_datetime(updated_at),
    })
}

fn variants_to_json(id: &str, variants: &[ColorVariant]) -> Result<String, StoreError> {
    serde_json::to_string(variants).map_err(|source| StoreError::Corrupt {
        id: id.to_string(),
        source,
    })
}

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlertsConfig, ApiConfig, Config, DbConfig, HistoryConfig, ServerConfig};
    use crate::db;
    use tempfile::TempDir;

    fn test_config(root: &std::path::Path) -> Config {
        Config {
            db: DbConfig {
                path: root.join("items.sqlite"),
            },
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
                max_body_mb: 10,
            },
            api: ApiConfig::default(),
            history: HistoryConfig {
                path: root.join("history.sqlite"),
            },
            alerts: AlertsConfig::default(),
        }
    }

    async fn setup() -> (TempDir, SqlitePool) {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(tmp.path());
        crate::migrate::run_migrations(&cfg).await.unwrap();
        let pool = db::connect(&cfg).await.unwrap();
        (tmp, pool)
    }

    fn fields(catalog: &str) -> ValidatedItem {
        ValidatedItem {
            catalog_number: catalog.to_string(),
            display_name: "Banarasi Silk".to_string(),
            price: 1499.0,
            image_ref: None,
            color_variants: vec![
                ColorVariant {
                    color_name: "Red".to_string(),
                    stock: 5,
                    min_stock: 2,
                    color_image_ref: None,
                },
                ColorVariant {
                    color_name: "Blue".to_string(),
                    stock: 3,
                    min_stock: 1,
                    color_image_ref: None,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let (_tmp, pool) = setup().await;

        let item = insert_item(&pool, &fields("SR-100")).await.unwrap();
        assert!(!item.id.is_empty());
        assert_eq!(item.version, VersionToken(0));
        assert_eq!(item.color_variants.len(), 2);

        let fetched = get_item(&pool, &item.id).await.unwrap();
        assert_eq!(fetched.catalog_number, "SR-100");
        assert_eq!(fetched.color_variants, item.color_variants);
    }

    #[tokio::test]
    async fn test_duplicate_catalog_number_rejected() {
        let (_tmp, pool) = setup().await;

        insert_item(&pool, &fields("SR-100")).await.unwrap();
        let err = insert_item(&pool, &fields("SR-100")).await.unwrap_err();
        assert!(matches!(err, StoreError::CatalogNumberTaken(_)));
    }

    #[tokio::test]
    async fn test_replace_bumps_version() {
        let (_tmp, pool) = setup().await;

        let item = insert_item(&pool, &fields("SR-100")).await.unwrap();
        let mut next = fields("SR-100");
        next.price = 1599.0;

        let updated = replace_item(&pool, &item.id, &next, item.version)
            .await
            .unwrap();
        assert_eq!(updated.version, VersionToken(1));
        assert!((updated.price - 1599.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_replace_with_stale_version_conflicts() {
        let (_tmp, pool) = setup().await;

        let item = insert_item(&pool, &fields("SR-100")).await.unwrap();
        let stale = item.version;

        // First writer wins
        replace_item(&pool, &item.id, &fields("SR-100"), stale)
            .await
            .unwrap();

        // Second writer with the stale token loses, row is untouched
        let mut losing = fields("SR-100");
        losing.price = 99.0;
        let err = replace_item(&pool, &item.id, &losing, stale)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict(_)));

        let current = get_item(&pool, &item.id).await.unwrap();
        assert_eq!(current.version, VersionToken(1));
        assert!((current.price - 1499.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_replace_missing_item_not_found() {
        let (_tmp, pool) = setup().await;

        let err = replace_item(&pool, "no-such-id", &fields("SR-100"), VersionToken(0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_returns_record_then_not_found() {
        let (_tmp, pool) = setup().await;

        let item = insert_item(&pool, &fields("SR-100")).await.unwrap();
        let deleted = delete_item(&pool, &item.id).await.unwrap();
        assert_eq!(deleted.id, item.id);

        let err = delete_item(&pool, &item.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_returns_all() {
        let (_tmp, pool) = setup().await;

        insert_item(&pool, &fields("SR-100")).await.unwrap();
        insert_item(&pool, &fields("SR-200")).await.unwrap();

        let items = list_items(&pool).await.unwrap();
        assert_eq!(items.len(), 2);
    }
}
