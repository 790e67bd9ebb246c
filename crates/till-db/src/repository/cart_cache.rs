//! # Cart Cache Repository
//!
//! The local half of cart persistence: one JSON item list per terminal.
//!
//! ## Where It Sits
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CartStore mutation                                                     │
//! │       │                                                                 │
//! │       ▼  (debounced)                                                    │
//! │  CartPersister ──► cart_cache.save()  ← always, even offline           │
//! │       │                                                                 │
//! │       └──────────► remote PUT /carts/{terminal} (retried)              │
//! │                                                                         │
//! │  Startup: remote GET ── empty / unreachable? ──► cart_cache.load()     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Saves replace the whole list, like the remote `PUT`.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use till_core::LineItem;

/// A cart as last written to the local cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCart {
    pub terminal: String,
    pub items: Vec<LineItem>,
    pub updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct CartCacheRow {
    terminal_key: String,
    items: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartCacheRow> for CachedCart {
    type Error = DbError;

    fn try_from(row: CartCacheRow) -> Result<Self, Self::Error> {
        let items = serde_json::from_str(&row.items).map_err(|e| DbError::payload("items", e))?;
        Ok(CachedCart {
            terminal: row.terminal_key,
            items,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for the `cart_cache` table.
#[derive(Debug, Clone)]
pub struct CartCacheRepository {
    pool: SqlitePool,
}

impl CartCacheRepository {
    /// Creates a new CartCacheRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CartCacheRepository { pool }
    }

    /// Replaces the cached item list of a terminal.
    pub async fn save(&self, terminal: &str, items: &[LineItem]) -> DbResult<()> {
        let payload = serde_json::to_string(items).map_err(|e| DbError::payload("items", e))?;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO cart_cache (terminal_key, items, item_count, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (terminal_key) DO UPDATE SET
                items = excluded.items,
                item_count = excluded.item_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(terminal)
        .bind(&payload)
        .bind(items.len() as i64)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(terminal = %terminal, items = items.len(), "Cart cached locally");
        Ok(())
    }

    /// Loads the cached cart of a terminal, if one was ever saved.
    pub async fn load(&self, terminal: &str) -> DbResult<Option<CachedCart>> {
        let row = sqlx::query_as::<_, CartCacheRow>(
            r#"
            SELECT terminal_key, items, updated_at
            FROM cart_cache
            WHERE terminal_key = ?1
            "#,
        )
        .bind(terminal)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CachedCart::try_from).transpose()
    }

    /// Drops the cached cart of a terminal.
    pub async fn clear(&self, terminal: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM cart_cache WHERE terminal_key = ?1")
            .bind(terminal)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
