//! # Reconciliation Repository
//!
//! Journal of stock decrements that failed after their sale was recorded.
//!
//! ## Lifecycle of a Discrepancy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CheckoutFinalizer                                                      │
//! │  ├── 1. POST /transactions      ✓ recorded (receipt R-1042)            │
//! │  └── 2. POST /stock/decrement   ✗ timeout                              │
//! │              │                                                          │
//! │              ▼                                                          │
//! │  record()  → row with resolved_at = NULL  (open)                        │
//! │              │                                                          │
//! │              ▼                                                          │
//! │  `reconcile list`     staff sees R-1042 and its deltas                  │
//! │  (inventory corrected by hand)                                          │
//! │  `reconcile resolve <id>` → resolved_at = now                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The sale itself is never touched: this table only tracks inventory.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use till_core::StockDelta;

/// One unreconciled (or reconciled) inventory discrepancy.
#[derive(Debug, Clone, PartialEq)]
pub struct Discrepancy {
    pub id: String,
    pub terminal: String,
    pub transaction_id: String,
    pub receipt_id: Option<String>,
    pub deltas: Vec<StockDelta>,
    pub error: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_note: Option<String>,
}

impl Discrepancy {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// What the finalizer knows when a decrement fails.
#[derive(Debug, Clone)]
pub struct NewDiscrepancy<'a> {
    pub terminal: &'a str,
    pub transaction_id: &'a str,
    pub receipt_id: Option<&'a str>,
    pub deltas: &'a [StockDelta],
    pub error: &'a str,
}

#[derive(FromRow)]
struct DiscrepancyRow {
    id: String,
    terminal_key: String,
    transaction_id: String,
    receipt_id: Option<String>,
    deltas: String,
    error: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolution_note: Option<String>,
}

impl TryFrom<DiscrepancyRow> for Discrepancy {
    type Error = DbError;

    fn try_from(row: DiscrepancyRow) -> Result<Self, Self::Error> {
        let deltas =
            serde_json::from_str(&row.deltas).map_err(|e| DbError::payload("deltas", e))?;
        Ok(Discrepancy {
            id: row.id,
            terminal: row.terminal_key,
            transaction_id: row.transaction_id,
            receipt_id: row.receipt_id,
            deltas,
            error: row.error,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
            resolution_note: row.resolution_note,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, terminal_key, transaction_id, receipt_id, deltas, error,
           created_at, resolved_at, resolution_note
    FROM reconciliation_log
"#;

/// Repository for the `reconciliation_log` table.
#[derive(Debug, Clone)]
pub struct ReconciliationRepository {
    pool: SqlitePool,
}

impl ReconciliationRepository {
    /// Creates a new ReconciliationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReconciliationRepository { pool }
    }

    /// Journals a failed stock decrement.
    pub async fn record(&self, entry: NewDiscrepancy<'_>) -> DbResult<Discrepancy> {
        let payload =
            serde_json::to_string(entry.deltas).map_err(|e| DbError::payload("deltas", e))?;

        let discrepancy = Discrepancy {
            id: Uuid::new_v4().to_string(),
            terminal: entry.terminal.to_string(),
            transaction_id: entry.transaction_id.to_string(),
            receipt_id: entry.receipt_id.map(str::to_string),
            deltas: entry.deltas.to_vec(),
            error: entry.error.to_string(),
            created_at: Utc::now(),
            resolved_at: None,
            resolution_note: None,
        };

        sqlx::query(
            r#"
            INSERT INTO reconciliation_log (
                id, terminal_key, transaction_id, receipt_id, deltas, error, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&discrepancy.id)
        .bind(&discrepancy.terminal)
        .bind(&discrepancy.transaction_id)
        .bind(&discrepancy.receipt_id)
        .bind(&payload)
        .bind(&discrepancy.error)
        .bind(discrepancy.created_at)
        .execute(&self.pool)
        .await?;

        warn!(
            id = %discrepancy.id,
            transaction_id = %discrepancy.transaction_id,
            lines = discrepancy.deltas.len(),
            "Inventory discrepancy journaled"
        );

        Ok(discrepancy)
    }

    /// Open discrepancies, oldest first.
    pub async fn list_open(&self, limit: u32) -> DbResult<Vec<Discrepancy>> {
        let sql = format!(
            "{} WHERE resolved_at IS NULL ORDER BY created_at ASC LIMIT ?1",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, DiscrepancyRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Discrepancy::try_from).collect()
    }

    /// Looks a discrepancy up by id.
    pub async fn get(&self, id: &str) -> DbResult<Discrepancy> {
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, DiscrepancyRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Discrepancy", id))?;

        Discrepancy::try_from(row)
    }

    /// Marks an open discrepancy as corrected.
    ///
    /// ## Errors
    /// `NotFound` if the id is unknown or already resolved.
    pub async fn mark_resolved(&self, id: &str, note: Option<&str>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE reconciliation_log SET
                resolved_at = ?2,
                resolution_note = ?3
            WHERE id = ?1 AND resolved_at IS NULL
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(note)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Open discrepancy", id));
        }

        info!(id = %id, "Discrepancy resolved");
        Ok(())
    }

    /// Number of open discrepancies.
    pub async fn count_open(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reconciliation_log WHERE resolved_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
