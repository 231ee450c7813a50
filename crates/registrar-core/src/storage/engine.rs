//! Storage engine implementation.

use parking_lot::Mutex;
use serde_json::Value;
use sled::{Db, Tree};

use super::record::{decode_row, from_bytes};
use super::{StorageConfig, Transaction};
use crate::catalog::Table;
use crate::constraint::{UniqueIndex, UNIQUE_INDEX_TREE};
use crate::error::Error;
use crate::model::Row;

/// Prefix for table tree names.
const TABLE_PREFIX: &str = "table:";

/// The main storage engine wrapping sled.
pub struct StorageEngine {
    /// The underlying sled database.
    db: Db,

    /// One tree per table in `Table::slot` order, followed by the unique index tree.
    trees: Vec<Tree>,

    /// Unique constraint index (shares the last tree in `trees`).
    unique: UniqueIndex,

    /// Serializes writers; held by every open `Transaction`.
    write_lock: Mutex<()>,
}

impl StorageEngine {
    /// Open or create a storage engine with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;

        let mut trees = Vec::with_capacity(Table::ALL.len() + 1);
        for table in Table::ALL {
            debug_assert_eq!(trees.len(), table.slot());
            trees.push(db.open_tree(format!("{}{}", TABLE_PREFIX, table.name()))?);
        }
        let unique_tree = db.open_tree(UNIQUE_INDEX_TREE)?;
        trees.push(unique_tree.clone());

        tracing::debug!(
            path = %config.path.display(),
            temporary = config.temporary,
            recovered = db.was_recovered(),
            "storage engine opened"
        );

        Ok(Self {
            db,
            trees,
            unique: UniqueIndex::new(unique_tree),
            write_lock: Mutex::new(()),
        })
    }

    /// Check if the database was recovered from a previous crash.
    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    /// Get a row as raw JSON.
    pub fn get(&self, table: Table, key: &[u8]) -> Result<Option<Value>, Error> {
        match self.tree(table).get(key)? {
            Some(bytes) => Ok(Some(from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get a typed row.
    pub fn get_row<T: Row>(&self, key: &[u8]) -> Result<Option<T>, Error> {
        match self.get(T::TABLE, key)? {
            Some(value) => Ok(Some(decode_row(value)?)),
            None => Ok(None),
        }
    }

    /// Check whether a row exists.
    pub fn contains(&self, table: Table, key: &[u8]) -> Result<bool, Error> {
        Ok(self.tree(table).contains_key(key)?)
    }

    /// Scan every row of a table in key order.
    pub fn scan(&self, table: Table) -> Result<Vec<(Vec<u8>, Value)>, Error> {
        self.tree(table)
            .iter()
            .map(|entry| {
                let (key, bytes) = entry?;
                Ok((key.to_vec(), from_bytes(&bytes)?))
            })
            .collect()
    }

    /// Scan rows whose key starts with `prefix`.
    pub fn scan_prefix(
        &self,
        table: Table,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Value)>, Error> {
        self.tree(table)
            .scan_prefix(prefix)
            .map(|entry| {
                let (key, bytes) = entry?;
                Ok((key.to_vec(), from_bytes(&bytes)?))
            })
            .collect()
    }

    /// Scan every row of a table as typed rows.
    pub fn scan_rows<T: Row>(&self) -> Result<Vec<T>, Error> {
        self.scan(T::TABLE)?
            .into_iter()
            .map(|(_, value)| decode_row(value))
            .collect()
    }

    /// Number of rows in a table.
    pub fn count(&self, table: Table) -> usize {
        self.tree(table).len()
    }

    /// The unique constraint index.
    pub fn unique_index(&self) -> &UniqueIndex {
        &self.unique
    }

    /// Begin a new transaction, waiting for any other open transaction to finish.
    ///
    /// Do not open a second transaction on the same thread while one is held.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(self, self.write_lock.lock())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    /// Get a reference to the underlying sled database.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Every tree, tables first then the unique index (for transactions).
    pub(crate) fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Slot of the unique index tree within `trees()`.
    pub(crate) fn unique_slot(&self) -> usize {
        Table::ALL.len()
    }

    fn tree(&self, table: Table) -> &Tree {
        &self.trees[table.slot()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{uuid_key, Identity};
    use chrono::Utc;
    use uuid::Uuid;

    fn identity() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: Some("user@example.com".to_string()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_open_temporary() {
        let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
        for table in Table::ALL {
            assert_eq!(engine.count(table), 0);
        }
        assert!(engine.unique_index().is_empty());
    }

    #[test]
    fn test_put_and_get_row() {
        let engine = StorageEngine::open(StorageConfig::temporary()).unwrap();
        let row = identity();

        let mut tx = engine.transaction();
        tx.insert_row(&row).unwrap();
        tx.commit().unwrap();

        let loaded: Identity = engine.get_row(&uuid_key(&row.id)).unwrap().unwrap();
        assert_eq!(loaded, row);
        assert!(engine.contains(Table::Identities, &uuid_key(&row.id)).unwrap());
        assert_eq!(engine.scan_rows::<Identity>().unwrap().len(), 1);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let row = identity();

        {
            let engine = StorageEngine::open(StorageConfig::new(dir.path())).unwrap();
            let mut tx = engine.transaction();
            tx.insert_row(&row).unwrap();
            tx.commit().unwrap();
            engine.flush().unwrap();
        }

        let engine = StorageEngine::open(StorageConfig::new(dir.path())).unwrap();
        let loaded: Option<Identity> = engine.get_row(&uuid_key(&row.id)).unwrap();
        assert_eq!(loaded, Some(row));
    }
}
