//! # Repository Module
//!
//! Repositories for the terminal's local SQLite cache.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  till-engine                                                            │
//! │       │                                                                 │
//! │       │  db.carts().save("till-1", &items)                              │
//! │       ▼                                                                 │
//! │  CartCacheRepository          ReconciliationRepository                  │
//! │  ├── save(terminal, items)    ├── record(entry)                         │
//! │  ├── load(terminal)           ├── list_open(limit)                      │
//! │  └── clear(terminal)          ├── get(id)                               │
//! │                               └── mark_resolved(id, note)               │
//! │       │                                                                 │
//! │       ▼  SQL Query                                                      │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`cart_cache::CartCacheRepository`] - Per-terminal cart mirror
//! - [`reconciliation::ReconciliationRepository`] - Inventory discrepancy journal

pub mod cart_cache;
pub mod reconciliation;
