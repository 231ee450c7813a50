//! Transaction support for atomic multi-table operations.

use std::collections::HashMap;

use parking_lot::MutexGuard;
use serde_json::Value;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Transactional, Tree};
use uuid::Uuid;

use super::record::{encode_row, to_bytes};
use super::StorageEngine;
use crate::catalog::{Table, UniqueConstraint};
use crate::constraint::UniqueIndex;
use crate::error::{ConstraintError, Error};
use crate::model::Row;

/// A pending operation in a transaction.
#[derive(Debug, Clone)]
pub enum TransactionOp {
    /// Insert a new row; fails if the key is taken.
    Insert {
        /// Target table.
        table: Table,
        /// Row key.
        key: Vec<u8>,
        /// Encoded row.
        bytes: Vec<u8>,
    },
    /// Overwrite an existing row.
    Put {
        /// Target table.
        table: Table,
        /// Row key.
        key: Vec<u8>,
        /// Encoded row.
        bytes: Vec<u8>,
    },
    /// Remove a row.
    Delete {
        /// Target table.
        table: Table,
        /// Row key.
        key: Vec<u8>,
    },
    /// Claim a unique value for a row.
    Claim {
        /// Constraint being claimed.
        constraint: &'static UniqueConstraint,
        /// Unique value.
        value: String,
        /// Key of the claiming row.
        owner: Vec<u8>,
    },
    /// Release a unique value held by a row.
    Release {
        /// Constraint being released.
        constraint: &'static UniqueConstraint,
        /// Unique value.
        value: String,
        /// Key of the row holding the value.
        owner: Vec<u8>,
    },
}

/// A transaction for atomic multi-table operations.
///
/// Operations are collected and executed atomically on commit: row writes,
/// deletes and unique index updates all succeed or none do.
///
/// A transaction holds the engine's write lock from creation until it is
/// committed or dropped. Reads made while staging (foreign keys, cascade
/// scans, role counts) therefore still hold when the writes land.
pub struct Transaction<'a> {
    engine: &'a StorageEngine,
    ops: Vec<TransactionOp>,
    /// Local cache for uncommitted writes ((table, key) -> row, None when deleted).
    write_cache: HashMap<(Table, Vec<u8>), Option<Value>>,
    _writer: MutexGuard<'a, ()>,
}

impl<'a> Transaction<'a> {
    /// Create a new transaction.
    pub(crate) fn new(engine: &'a StorageEngine, writer: MutexGuard<'a, ()>) -> Self {
        Self {
            engine,
            ops: Vec::new(),
            write_cache: HashMap::new(),
            _writer: writer,
        }
    }

    /// Queue an insert of an already encoded row.
    pub fn insert(
        &mut self,
        table: Table,
        key: Vec<u8>,
        value: Value,
    ) -> Result<&mut Self, Error> {
        let bytes = to_bytes(&value)?;
        self.write_cache.insert((table, key.clone()), Some(value));
        self.ops.push(TransactionOp::Insert { table, key, bytes });
        Ok(self)
    }

    /// Queue an insert of a typed row.
    pub fn insert_row<T: Row>(&mut self, row: &T) -> Result<&mut Self, Error> {
        let value = encode_row(row)?;
        self.insert(T::TABLE, row.key(), value)
    }

    /// Queue an overwrite of a row.
    pub fn put(&mut self, table: Table, key: Vec<u8>, value: Value) -> Result<&mut Self, Error> {
        let bytes = to_bytes(&value)?;
        self.write_cache.insert((table, key.clone()), Some(value));
        self.ops.push(TransactionOp::Put { table, key, bytes });
        Ok(self)
    }

    /// Queue a delete.
    pub fn delete(&mut self, table: Table, key: Vec<u8>) -> &mut Self {
        self.write_cache.insert((table, key.clone()), None);
        self.ops.push(TransactionOp::Delete { table, key });
        self
    }

    /// Queue a unique value claim.
    pub fn claim(
        &mut self,
        constraint: &'static UniqueConstraint,
        value: String,
        owner: Vec<u8>,
    ) -> &mut Self {
        self.ops.push(TransactionOp::Claim {
            constraint,
            value,
            owner,
        });
        self
    }

    /// Queue a unique value release.
    pub fn release(
        &mut self,
        constraint: &'static UniqueConstraint,
        value: String,
        owner: Vec<u8>,
    ) -> &mut Self {
        self.ops.push(TransactionOp::Release {
            constraint,
            value,
            owner,
        });
        self
    }

    /// Read a row, seeing this transaction's uncommitted writes.
    pub fn read(&self, table: Table, key: &[u8]) -> Result<Option<Value>, Error> {
        if let Some(cached) = self.write_cache.get(&(table, key.to_vec())) {
            return Ok(cached.clone());
        }
        self.engine.get(table, key)
    }

    /// Check if a row exists, seeing this transaction's uncommitted writes.
    pub fn exists(&self, table: Table, key: &[u8]) -> Result<bool, Error> {
        if let Some(cached) = self.write_cache.get(&(table, key.to_vec())) {
            return Ok(cached.is_some());
        }
        self.engine.contains(table, key)
    }

    /// Check if a row is deleted by this transaction.
    pub fn is_deleting(&self, table: Table, key: &[u8]) -> bool {
        matches!(self.write_cache.get(&(table, key.to_vec())), Some(None))
    }

    /// The storage engine this transaction writes to.
    pub fn engine(&self) -> &'a StorageEngine {
        self.engine
    }

    /// Get the pending operations.
    pub fn operations(&self) -> &[TransactionOp] {
        &self.ops
    }

    /// Get the number of pending operations.
    pub fn operation_count(&self) -> usize {
        self.ops.len()
    }

    /// Commit the transaction atomically.
    ///
    /// All operations succeed or none do.
    pub fn commit(self) -> Result<(), Error> {
        if self.ops.is_empty() {
            return Ok(());
        }

        let trees: &[Tree] = self.engine.trees();
        let unique_slot = self.engine.unique_slot();

        let result: Result<(), TransactionError<Error>> = trees.transaction(|views| {
            let unique = &views[unique_slot];
            for op in &self.ops {
                Self::execute(views, unique, op)?;
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                tracing::trace!(operations = self.ops.len(), "transaction committed");
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(Error::Storage(e)),
        }
    }

    /// Execute one operation within a sled transaction.
    fn execute(
        views: &[TransactionalTree],
        unique: &TransactionalTree,
        op: &TransactionOp,
    ) -> Result<(), ConflictableTransactionError<Error>> {
        match op {
            TransactionOp::Insert { table, key, bytes } => {
                let view = &views[table.slot()];
                if view.get(key.as_slice())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        primary_key_violation(*table, key).into(),
                    ));
                }
                view.insert(key.as_slice(), bytes.as_slice())?;
            }
            TransactionOp::Put { table, key, bytes } => {
                views[table.slot()].insert(key.as_slice(), bytes.as_slice())?;
            }
            TransactionOp::Delete { table, key } => {
                views[table.slot()].remove(key.as_slice())?;
            }
            TransactionOp::Claim {
                constraint,
                value,
                owner,
            } => UniqueIndex::claim(unique, constraint, value, owner)?,
            TransactionOp::Release {
                constraint,
                value,
                owner,
            } => UniqueIndex::release(unique, constraint, value, owner)?,
        }
        Ok(())
    }
}

/// Human-readable form of a row key: the UUID, followed by any suffix.
pub(crate) fn key_label(key: &[u8]) -> String {
    if key.len() < 16 {
        return String::from_utf8_lossy(key).into_owned();
    }
    let id = Uuid::from_slice(&key[..16])
        .map(|id| id.to_string())
        .unwrap_or_default();
    if key.len() == 16 {
        id
    } else {
        format!("{}, {}", id, String::from_utf8_lossy(&key[16..]))
    }
}

fn primary_key_violation(table: Table, key: &[u8]) -> ConstraintError {
    let field = match table {
        Table::UserRoles => "user_id, role",
        _ => "id",
    };
    ConstraintError::UniqueViolation {
        constraint: table.primary_key().to_string(),
        table,
        field: field.to_string(),
        value: key_label(key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::UNIQUE_CONSTRAINTS;
    use crate::model::{role_key, uuid_key, Role};
    use crate::storage::StorageConfig;
    use serde_json::json;

    fn engine() -> StorageEngine {
        StorageEngine::open(StorageConfig::temporary()).unwrap()
    }

    #[test]
    fn test_empty_commit() {
        let engine = engine();
        let tx = engine.transaction();
        assert_eq!(tx.operation_count(), 0);
        tx.commit().unwrap();
    }

    #[test]
    fn test_insert_existing_key_aborts_everything() {
        let engine = engine();
        let id = Uuid::new_v4();

        let mut tx = engine.transaction();
        tx.insert(Table::Profiles, uuid_key(&id), json!({"id": id}))
            .unwrap();
        tx.commit().unwrap();

        let other = Uuid::new_v4();
        let mut tx = engine.transaction();
        tx.insert(Table::Identities, uuid_key(&other), json!({"id": other}))
            .unwrap();
        tx.insert(Table::Profiles, uuid_key(&id), json!({"id": id}))
            .unwrap();
        let err = tx.commit().unwrap_err();

        assert!(err.is_duplicate());
        assert!(err.to_string().contains("profiles_pkey"));
        // The first insert was rolled back with the failing one.
        assert!(!engine.contains(Table::Identities, &uuid_key(&other)).unwrap());
    }

    #[test]
    fn test_read_sees_uncommitted_writes() {
        let engine = engine();
        let id = Uuid::new_v4();
        let key = uuid_key(&id);

        let mut tx = engine.transaction();
        assert!(!tx.exists(Table::Courses, &key).unwrap());
        tx.insert(Table::Courses, key.clone(), json!({"id": id, "code": "CS"}))
            .unwrap();
        assert!(tx.exists(Table::Courses, &key).unwrap());
        assert_eq!(tx.read(Table::Courses, &key).unwrap().unwrap()["code"], "CS");

        tx.delete(Table::Courses, key.clone());
        assert!(tx.is_deleting(Table::Courses, &key));
        assert!(tx.read(Table::Courses, &key).unwrap().is_none());
    }

    #[test]
    fn test_unique_claim_conflict_rolls_back_rows() {
        let engine = engine();
        let constraint = &UNIQUE_CONSTRAINTS[0];
        let first = uuid_key(&Uuid::new_v4());
        let second = uuid_key(&Uuid::new_v4());

        let mut tx = engine.transaction();
        tx.insert(Table::Courses, first.clone(), json!({"code": "CS101"}))
            .unwrap();
        tx.claim(constraint, "CS101".to_string(), first.clone());
        tx.commit().unwrap();

        let mut tx = engine.transaction();
        tx.insert(Table::Courses, second.clone(), json!({"code": "CS101"}))
            .unwrap();
        tx.claim(constraint, "CS101".to_string(), second.clone());
        assert!(tx.commit().unwrap_err().is_duplicate());

        assert_eq!(engine.count(Table::Courses), 1);
        assert_eq!(
            engine.unique_index().lookup(constraint, "CS101").unwrap(),
            Some(first)
        );
    }

    #[test]
    fn test_key_label() {
        let id = Uuid::new_v4();
        assert_eq!(key_label(&uuid_key(&id)), id.to_string());
        assert_eq!(
            key_label(&role_key(&id, Role::Admin)),
            format!("{}, admin", id)
        );
    }
}
