//! # Stockroom
//!
//! A small inventory system for catalog items with per-color stock levels:
//! a REST API over a versioned SQLite-backed item collection, and the
//! client-side machinery to edit it safely: draft validation, an
//! optimistic-concurrency save with bounded conflict retries, low-stock
//! alert derivation, and a local change-history ledger.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │  CLI (stk)   │──▶│  ApiClient    │──▶│  REST API     │
//! │ list/update/ │   │ retry + merge │   │ (axum)        │
//! │ alerts/...   │   └──────┬────────┘   └──────┬───────┘
//! └──────┬───────┘          │                   ▼
//!        ▼                  │            ┌──────────────┐
//! ┌──────────────┐          │            │ Item store    │
//! │ History      │◀─────────┘            │ SQLite, CAS   │
//! │ ledger       │  diffs on success     │ on version    │
//! └──────────────┘                       └──────────────┘
//! ```
//!
//! Writes are never locked: the store's version token is the only
//! coordination between concurrent editors, and the losing writer refetches,
//! re-applies its edits, and tries again up to a fixed ceiling.
//!
//! ## Quick Start
//!
//! ```bash
//! stk init                        # create database
//! stk serve                       # start the REST API
//! stk add --draft new-item.json   # create an item
//! stk list --search silk          # grid view
//! stk set-stock <id> --color Red --stock 3
//! stk alerts --watch              # low-stock feed, re-polled
//! stk history list                # local audit log
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Versioned item CRUD over SQLite |
//! | [`reconcile`] | Draft validation, color diffing, edit merge |
//! | [`retry`] | Conflict-retry save state machine |
//! | [`alerts`] | Low-stock alert derivation |
//! | [`history`] | Local change-history ledger |
//! | [`server`] | REST API server |
//! | [`api`] | HTTP client / record gateway |
//! | [`manage`] | CLI inventory commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod alerts;
pub mod api;
pub mod config;
pub mod db;
pub mod history;
pub mod manage;
pub mod migrate;
pub mod models;
pub mod reconcile;
pub mod retry;
pub mod server;
pub mod store;
