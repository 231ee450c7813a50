//! Storage layer for Registrar.
//!
//! This module provides a sled-based table store: one tree per table, rows
//! encoded as JSON, and atomic multi-table transactions that also maintain
//! the unique index.

mod config;
mod engine;
mod record;
mod transaction;

pub use config::StorageConfig;
pub use engine::StorageEngine;
pub use record::{decode_row, encode_row, field_str};
pub use transaction::{Transaction, TransactionOp};

pub(crate) use transaction::key_label;
