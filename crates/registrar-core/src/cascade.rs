//! Cascade executor for handling referential integrity on deletes.
//!
//! This module implements the cascade behavior for delete operations:
//! - CASCADE: Delete referencing rows recursively
//! - SET NULL: Set the referencing field to null (this is an update, so the
//!   `updated_at` stamp is refreshed as well)

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::catalog::{foreign_keys_to, DeleteBehavior, ForeignKey, Table};
use crate::database::Database;
use crate::error::Error;
use crate::storage::{field_str, key_label, Transaction};

/// Maximum cascade depth to prevent infinite recursion.
const MAX_CASCADE_DEPTH: usize = 16;

/// Result of a cascade operation.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeResult {
    /// Rows that were deleted, as (table, key).
    pub deleted: Vec<(Table, String)>,
    /// Fields that were set to null, as (table, key, field).
    pub nullified: Vec<(Table, String, String)>,
}

impl CascadeResult {
    /// Create an empty cascade result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the total number of affected rows.
    pub fn affected_count(&self) -> usize {
        self.deleted.len() + self.nullified.len()
    }

    /// Rows deleted from a table.
    pub fn deleted_from(&self, table: Table) -> usize {
        self.deleted.iter().filter(|(t, _)| *t == table).count()
    }

    /// Rows of a table that had a field nulled.
    pub fn nullified_in(&self, table: Table) -> usize {
        self.nullified.iter().filter(|(t, _, _)| *t == table).count()
    }
}

/// Executes cascade operations for delete.
pub struct CascadeExecutor<'a> {
    db: &'a Database,
}

impl<'a> CascadeExecutor<'a> {
    /// Create a new cascade executor.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Queue the cascades triggered by deleting `row` from `table`.
    ///
    /// The deleted row itself is not removed here.
    pub fn process_delete(
        &self,
        tx: &mut Transaction<'_>,
        table: Table,
        key: &[u8],
        row: &Value,
    ) -> Result<CascadeResult, Error> {
        let mut result = CascadeResult::new();
        let mut visited = HashSet::new();
        visited.insert((table, key.to_vec()));

        self.process_delete_recursive(tx, table, row, &mut result, &mut visited, 0)?;

        Ok(result)
    }

    fn process_delete_recursive(
        &self,
        tx: &mut Transaction<'_>,
        table: Table,
        row: &Value,
        result: &mut CascadeResult,
        visited: &mut HashSet<(Table, Vec<u8>)>,
        depth: usize,
    ) -> Result<(), Error> {
        if depth > MAX_CASCADE_DEPTH {
            return Err(Error::CascadeDepthExceeded { depth });
        }

        // Only rows with an id can be referenced.
        let Some(target_id) = field_str(row, "id") else {
            return Ok(());
        };

        for fk in foreign_keys_to(table) {
            let referencing = self.find_referencing(tx, fk, &target_id)?;

            match fk.on_delete {
                DeleteBehavior::Cascade => {
                    for (key, value) in referencing {
                        if !visited.insert((fk.table, key.clone())) {
                            continue;
                        }
                        self.process_delete_recursive(
                            tx,
                            fk.table,
                            &value,
                            result,
                            visited,
                            depth + 1,
                        )?;
                        self.db.stage_remove(tx, fk.table, &key, &value);
                        result
                            .deleted
                            .push((fk.table, key_label(&key)));
                    }
                }
                DeleteBehavior::SetNull => {
                    for (key, value) in referencing {
                        let mut cleared = value.clone();
                        cleared[fk.field] = Value::Null;
                        let label = key_label(&key);
                        self.db.stage_replace(tx, fk.table, key, &value, cleared)?;
                        result
                            .nullified
                            .push((fk.table, label, fk.field.to_string()));
                    }
                }
            }
        }

        Ok(())
    }

    /// Find rows referencing `target_id` through a foreign key, as seen by the transaction.
    fn find_referencing(
        &self,
        tx: &Transaction<'_>,
        fk: &ForeignKey,
        target_id: &str,
    ) -> Result<Vec<(Vec<u8>, Value)>, Error> {
        let mut referencing = Vec::new();

        for (key, _) in tx.engine().scan(fk.table)? {
            let Some(current) = tx.read(fk.table, &key)? else {
                continue;
            };
            if field_str(&current, fk.field).as_deref() == Some(target_id) {
                referencing.push((key, current));
            }
        }

        Ok(referencing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Course, Identity, Profile, Role, RoleAssignment, Student};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn course(code: &str) -> Course {
        let now = Utc::now();
        Course {
            id: Uuid::new_v4(),
            name: format!("Course {}", code),
            code: code.to_string(),
            duration: 12,
            created_at: now,
            updated_at: now,
        }
    }

    fn student(email: &str, course_id: Option<Uuid>, user_id: Option<Uuid>) -> Student {
        let now = Utc::now();
        Student {
            id: Uuid::new_v4(),
            name: "Student".to_string(),
            email: email.to_string(),
            course_id,
            user_id,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_course_delete_nulls_students() {
        let db = Database::temporary().unwrap();
        let c = course("CS101");
        db.insert_course(&c).unwrap();

        let mut enrolled = student("a@example.com", Some(c.id), None);
        enrolled.updated_at = Utc::now() - Duration::days(3);
        db.insert_student(&enrolled).unwrap();
        db.insert_student(&student("b@example.com", Some(c.id), None))
            .unwrap();
        db.insert_student(&student("c@example.com", None, None))
            .unwrap();

        let result = db.delete_course(c.id).unwrap();
        assert_eq!(result.nullified_in(Table::Students), 2);
        assert_eq!(result.deleted.len(), 0);

        let students = db.list_students().unwrap();
        assert_eq!(students.len(), 3);
        assert!(students.iter().all(|s| s.course_id.is_none()));

        let reloaded = db.get_student(enrolled.id).unwrap().unwrap();
        assert!(reloaded.updated_at > enrolled.updated_at);
    }

    #[test]
    fn test_identity_delete_cascades() {
        let db = Database::temporary().unwrap();
        let user = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = db.storage().transaction();
        db.stage_insert(
            &mut tx,
            &Identity {
                id: user,
                email: None,
                created_at: now,
            },
        )
        .unwrap();
        db.stage_insert(
            &mut tx,
            &Profile {
                id: user,
                username: Some("alice".to_string()),
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
        db.stage_insert(&mut tx, &RoleAssignment::new(user, Role::Student))
            .unwrap();
        tx.commit().unwrap();

        let owned = student("alice@example.com", None, Some(user));
        db.insert_student(&owned).unwrap();
        let unrelated = student("bob@example.com", None, None);
        db.insert_student(&unrelated).unwrap();

        let result = db.delete_identity(user).unwrap();
        assert_eq!(result.deleted_from(Table::Students), 1);
        assert_eq!(result.deleted_from(Table::UserRoles), 1);
        assert_eq!(result.deleted_from(Table::Profiles), 1);

        assert!(db.get_student(owned.id).unwrap().is_none());
        assert!(db.get_student(unrelated.id).unwrap().is_some());
        assert!(db.get_profile(user).unwrap().is_none());
        assert!(db.roles_for(user).unwrap().is_empty());

        // The email and owner claims were released with the row.
        db.insert_student(&student("alice@example.com", None, None))
            .unwrap();
    }
}
