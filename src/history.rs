//! Local change-history ledger.
//!
//! An append-only audit log kept in its own SQLite file, independent of the
//! item store: entries outlive the items they reference, and deleting an
//! item never touches the ledger. The handle is constructed explicitly and
//! passed to whoever needs it (there is no process-global database state),
//! which also makes it trivial to point tests at a throwaway file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;
use uuid::Uuid;

use crate::db;
use crate::models::{ColorChange, HistoryAction, HistoryEntry, Item, ItemSnapshot};

/// Handle to the ledger database, with an explicit open/close lifecycle.
pub struct HistoryLedger {
    pool: SqlitePool,
}

impl HistoryLedger {
    /// Opens (and if necessary creates) the ledger at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::open_pool(path).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history_entries (
                id TEXT PRIMARY KEY,
                item_id TEXT NOT NULL,
                action TEXT NOT NULL,
                catalog_number TEXT NOT NULL,
                display_name TEXT NOT NULL,
                changes_json TEXT,
                timestamp INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_timestamp \
             ON history_entries(timestamp DESC)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Appends one entry. Entries are never mutated afterwards.
    pub async fn append(&self, entry: &HistoryEntry) -> Result<()> {
        let changes_json = if entry.changes.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&entry.changes)?)
        };

        sqlx::query(
            "INSERT INTO history_entries \
             (id, item_id, action, catalog_number, display_name, changes_json, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.item_id)
        .bind(entry.action.as_str())
        .bind(&entry.snapshot.catalog_number)
        .bind(&entry.snapshot.display_name)
        .bind(&changes_json)
        .bind(entry.timestamp.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes one entry by id; returns whether anything was deleted.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM history_entries WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns entries newest-first, optionally filtered by a
    /// case-insensitive match on the snapshot's catalog number or name.
    pub async fn list_all(&self, search: Option<&str>) -> Result<Vec<HistoryEntry>> {
        let rows = match search {
            Some(term) => {
                let pattern = format!("%{}%", term.to_lowercase());
                sqlx::query(
                    "SELECT id, item_id, action, catalog_number, display_name, changes_json, \
                     timestamp FROM history_entries \
                     WHERE lower(catalog_number) LIKE ? OR lower(display_name) LIKE ? \
                     ORDER BY timestamp DESC, rowid DESC",
                )
                .bind(pattern.clone())
                .bind(pattern)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, item_id, action, catalog_number, display_name, changes_json, \
                     timestamp FROM history_entries ORDER BY timestamp DESC, rowid DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_entry).collect()
    }

    /// Shuts the underlying pool down.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Builds a new ledger entry for an item event, stamping the id and time.
pub fn new_entry(action: HistoryAction, item: &Item, changes: Vec<ColorChange>) -> HistoryEntry {
    HistoryEntry {
        id: Uuid::new_v4().to_string(),
        item_id: item.id.clone(),
        action,
        snapshot: ItemSnapshot {
            item_id: item.id.clone(),
            catalog_number: item.catalog_number.clone(),
            display_name: item.display_name.clone(),
        },
        changes,
        timestamp: Utc::now(),
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryEntry> {
    let id: String = row.get("id");
    let action_raw: String = row.get("action");
    let action = HistoryAction::parse(&action_raw)
        .with_context(|| format!("unknown history action '{}' in entry {}", action_raw, id))?;

    let changes_json: Option<String> = row.get("changes_json");
    let changes: Vec<ColorChange> = match changes_json {
        Some(json) => serde_json::from_str(&json)
            .with_context(|| format!("corrupt change list in entry {}", id))?,
        None => Vec::new(),
    };

    let item_id: String = row.get("item_id");
    let ts: i64 = row.get("timestamp");

    Ok(HistoryEntry {
        id,
        item_id: item_id.clone(),
        action,
        snapshot: ItemSnapshot {
            item_id,
            catalog_number: row.get("catalog_number"),
            display_name: row.get("display_name"),
        },
        changes,
        timestamp: DateTime::from_timestamp(ts, 0).unwrap_or(DateTime::UNIX_EPOCH),
    })
}
