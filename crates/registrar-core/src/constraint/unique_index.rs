//! Secondary index for enforcing unique constraints.
//!
//! The UniqueIndex maintains a separate sled tree that maps unique field values
//! to the storage key of the row holding them. Claims and releases happen
//! inside the same sled transaction as the row write.

use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::Tree;

use crate::catalog::UniqueConstraint;
use crate::error::{ConstraintError, Error};

/// Tree name for unique constraint index.
pub const UNIQUE_INDEX_TREE: &str = "index:unique";

/// Secondary index for enforcing unique constraints.
///
/// Key format: `table\0constraint\0value` -> `row key`
pub struct UniqueIndex {
    tree: Tree,
}

impl UniqueIndex {
    /// Create a new unique index backed by the given tree.
    pub fn new(tree: Tree) -> Self {
        Self { tree }
    }

    /// Open or create the unique index from a sled database.
    pub fn open(db: &sled::Db) -> Result<Self, Error> {
        let tree = db.open_tree(UNIQUE_INDEX_TREE)?;
        Ok(Self { tree })
    }

    /// Build the index key for a unique value.
    fn build_key(constraint: &UniqueConstraint, value: &str) -> Vec<u8> {
        let table = constraint.table.name();
        let mut key = Vec::with_capacity(table.len() + constraint.name.len() + value.len() + 2);
        key.extend_from_slice(table.as_bytes());
        key.push(0);
        key.extend_from_slice(constraint.name.as_bytes());
        key.push(0);
        key.extend_from_slice(value.as_bytes());
        key
    }

    /// Look up the row key holding a unique value.
    pub fn lookup(
        &self,
        constraint: &UniqueConstraint,
        value: &str,
    ) -> Result<Option<Vec<u8>>, Error> {
        let key = Self::build_key(constraint, value);
        Ok(self.tree.get(key)?.map(|owner| owner.to_vec()))
    }

    /// Check if a unique value is available (doesn't exist or belongs to `owner`).
    pub fn is_available(
        &self,
        constraint: &UniqueConstraint,
        value: &str,
        owner: &[u8],
    ) -> Result<bool, Error> {
        Ok(match self.lookup(constraint, value)? {
            Some(existing) => existing == owner,
            None => true,
        })
    }

    /// Claim a unique value for a row inside a transaction.
    ///
    /// Aborts with a unique violation if another row holds the value.
    pub(crate) fn claim(
        view: &TransactionalTree,
        constraint: &UniqueConstraint,
        value: &str,
        owner: &[u8],
    ) -> Result<(), ConflictableTransactionError<Error>> {
        let key = Self::build_key(constraint, value);
        if let Some(existing) = view.get(&key)? {
            if existing.as_ref() != owner {
                return Err(ConflictableTransactionError::Abort(
                    ConstraintError::UniqueViolation {
                        constraint: constraint.name.to_string(),
                        table: constraint.table,
                        field: constraint.field.to_string(),
                        value: value.to_string(),
                    }
                    .into(),
                ));
            }
        }
        view.insert(key, owner)?;
        Ok(())
    }

    /// Release a unique value held by a row inside a transaction.
    ///
    /// Values held by other rows are left untouched.
    pub(crate) fn release(
        view: &TransactionalTree,
        constraint: &UniqueConstraint,
        value: &str,
        owner: &[u8],
    ) -> Result<(), ConflictableTransactionError<Error>> {
        let key = Self::build_key(constraint, value);
        if let Some(existing) = view.get(&key)? {
            if existing.as_ref() == owner {
                view.remove(key)?;
            }
        }
        Ok(())
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}
