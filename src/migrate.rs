use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // Items table: one row per catalog item, variant list embedded as JSON.
    // `version` starts at 0 and is incremented in SQL on every replace.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            catalog_number TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            price REAL NOT NULL,
            image_ref TEXT,
            color_variants_json TEXT NOT NULL DEFAULT '[]',
            version INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_catalog_number ON items(catalog_number)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_created_at ON items(created_at ASC)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
