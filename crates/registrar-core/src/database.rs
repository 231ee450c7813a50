//! Data-access layer.
//!
//! Every method here reads and writes unfiltered. Authorization happens in
//! [`crate::security::Session`], which is the only caller meant for
//! untrusted requests.

use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::cascade::{CascadeExecutor, CascadeResult};
use crate::catalog::{foreign_keys_from, unique_constraints, Table, UNIQUE_CONSTRAINTS};
use crate::error::{ConstraintError, Error};
use crate::model::{
    role_key, uuid_key, Course, Identity, Profile, Role, RoleAssignment, Row, Student,
};
use crate::storage::{
    decode_row, encode_row, field_str, key_label, StorageConfig, StorageEngine, Transaction,
};

/// Table store with constraint, cascade and timestamp maintenance.
pub struct Database {
    storage: StorageEngine,
}

impl Database {
    /// Open a database with the given storage configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let storage = StorageEngine::open(config)?;
        Ok(Self { storage })
    }

    /// Open (or create) a database at a path.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open(StorageConfig::new(path.as_ref()))
    }

    /// Open a throwaway in-memory database.
    pub fn temporary() -> Result<Self, Error> {
        Self::open(StorageConfig::temporary())
    }

    /// Get the storage engine.
    pub fn storage(&self) -> &StorageEngine {
        &self.storage
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.storage.flush()
    }

    // ------------------------------------------------------------------
    // Staging
    // ------------------------------------------------------------------

    /// Stage an insert: check references, claim unique values, write the row.
    pub fn stage_insert<T: Row>(&self, tx: &mut Transaction<'_>, row: &T) -> Result<(), Error> {
        let value = encode_row(row)?;
        let key = row.key();

        self.check_references(tx, T::TABLE, &value)?;
        for constraint in unique_constraints(T::TABLE) {
            if let Some(unique) = field_str(&value, constraint.field) {
                tx.claim(constraint, unique, key.clone());
            }
        }
        tx.insert(T::TABLE, key, value)?;
        Ok(())
    }

    /// Stage an update of an existing row and return the row as it will be stored.
    pub fn stage_update<T: Row>(&self, tx: &mut Transaction<'_>, row: &T) -> Result<T, Error> {
        let key = row.key();
        let current = tx
            .read(T::TABLE, &key)?
            .ok_or_else(|| Error::not_found(T::TABLE, key_label(&key)))?;
        let stored = self.stage_replace(tx, T::TABLE, key, &current, encode_row(row)?)?;
        decode_row(stored)
    }

    /// Stage a delete together with its cascades.
    pub fn stage_delete(
        &self,
        tx: &mut Transaction<'_>,
        table: Table,
        key: &[u8],
    ) -> Result<CascadeResult, Error> {
        let current = tx
            .read(table, key)?
            .ok_or_else(|| Error::not_found(table, key_label(key)))?;

        let result = CascadeExecutor::new(self).process_delete(tx, table, key, &current)?;
        self.stage_remove(tx, table, key, &current);
        Ok(result)
    }

    /// Replace `current` with `next`, stamping `updated_at` where the table keeps one.
    pub(crate) fn stage_replace(
        &self,
        tx: &mut Transaction<'_>,
        table: Table,
        key: Vec<u8>,
        current: &Value,
        mut next: Value,
    ) -> Result<Value, Error> {
        if table.maintains_updated_at() {
            next["updated_at"] = encode_timestamp()?;
        }

        self.check_references(tx, table, &next)?;
        for constraint in unique_constraints(table) {
            let before = field_str(current, constraint.field);
            let after = field_str(&next, constraint.field);
            if before == after {
                continue;
            }
            if let Some(old) = before {
                tx.release(constraint, old, key.clone());
            }
            if let Some(new) = after {
                tx.claim(constraint, new, key.clone());
            }
        }

        tx.put(table, key, next.clone())?;
        Ok(next)
    }

    /// Remove a row and release its unique values, without cascading.
    pub(crate) fn stage_remove(
        &self,
        tx: &mut Transaction<'_>,
        table: Table,
        key: &[u8],
        current: &Value,
    ) {
        for constraint in unique_constraints(table) {
            if let Some(value) = field_str(current, constraint.field) {
                tx.release(constraint, value, key.to_vec());
            }
        }
        tx.delete(table, key.to_vec());
    }

    /// Check that every non-null foreign key of a row points at an existing row.
    fn check_references(
        &self,
        tx: &Transaction<'_>,
        table: Table,
        value: &Value,
    ) -> Result<(), Error> {
        for fk in foreign_keys_from(table) {
            let Some(target) = field_str(value, fk.field) else {
                continue;
            };
            let present = match Uuid::parse_str(&target) {
                Ok(id) => tx.exists(fk.references, &uuid_key(&id))?,
                Err(_) => false,
            };
            if !present {
                return Err(ConstraintError::ForeignKeyViolation {
                    constraint: fk.name.to_string(),
                    table,
                    field: fk.field.to_string(),
                    value: target,
                }
                .into());
            }
        }
        Ok(())
    }

    fn insert<T: Row>(&self, row: &T) -> Result<(), Error> {
        let mut tx = self.storage.transaction();
        self.stage_insert(&mut tx, row)?;
        tx.commit()?;
        tracing::debug!(table = %T::TABLE, key = %key_label(&row.key()), "row inserted");
        Ok(())
    }

    fn update<T: Row>(&self, row: &T) -> Result<T, Error> {
        let mut tx = self.storage.transaction();
        let stored = self.stage_update(&mut tx, row)?;
        tx.commit()?;
        tracing::debug!(table = %T::TABLE, key = %key_label(&row.key()), "row updated");
        Ok(stored)
    }

    fn delete(&self, table: Table, key: &[u8]) -> Result<CascadeResult, Error> {
        let mut tx = self.storage.transaction();
        let result = self.stage_delete(&mut tx, table, key)?;
        tx.commit()?;
        tracing::debug!(
            table = %table,
            key = %key_label(key),
            cascaded = result.affected_count(),
            "row deleted"
        );
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Identities
    // ------------------------------------------------------------------

    /// Get an identity by id.
    pub fn get_identity(&self, id: Uuid) -> Result<Option<Identity>, Error> {
        self.storage.get_row(&uuid_key(&id))
    }

    /// Every identity, oldest first.
    pub fn list_identities(&self) -> Result<Vec<Identity>, Error> {
        let mut identities: Vec<Identity> = self.storage.scan_rows()?;
        identities.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(identities)
    }

    /// Delete an identity. Roles, the profile and any owned student record go with it.
    pub fn delete_identity(&self, id: Uuid) -> Result<CascadeResult, Error> {
        self.delete(Table::Identities, &uuid_key(&id))
    }

    // ------------------------------------------------------------------
    // Courses
    // ------------------------------------------------------------------

    pub fn insert_course(&self, course: &Course) -> Result<(), Error> {
        self.insert(course)
    }

    pub fn update_course(&self, course: &Course) -> Result<Course, Error> {
        self.update(course)
    }

    /// Delete a course; enrolled students keep their record with `course_id` cleared.
    pub fn delete_course(&self, id: Uuid) -> Result<CascadeResult, Error> {
        self.delete(Table::Courses, &uuid_key(&id))
    }

    pub fn get_course(&self, id: Uuid) -> Result<Option<Course>, Error> {
        self.storage.get_row(&uuid_key(&id))
    }

    /// Every course, ordered by code.
    pub fn list_courses(&self) -> Result<Vec<Course>, Error> {
        let mut courses: Vec<Course> = self.storage.scan_rows()?;
        courses.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(courses)
    }

    // ------------------------------------------------------------------
    // Students
    // ------------------------------------------------------------------

    pub fn insert_student(&self, student: &Student) -> Result<(), Error> {
        self.insert(student)
    }

    pub fn update_student(&self, student: &Student) -> Result<Student, Error> {
        self.update(student)
    }

    pub fn delete_student(&self, id: Uuid) -> Result<CascadeResult, Error> {
        self.delete(Table::Students, &uuid_key(&id))
    }

    pub fn get_student(&self, id: Uuid) -> Result<Option<Student>, Error> {
        self.storage.get_row(&uuid_key(&id))
    }

    /// Every student, ordered by name then email.
    pub fn list_students(&self) -> Result<Vec<Student>, Error> {
        let mut students: Vec<Student> = self.storage.scan_rows()?;
        students.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.email.cmp(&b.email)));
        Ok(students)
    }

    /// The student record owned by an identity, found through the `user_id` unique index.
    pub fn find_student_by_user(&self, user_id: Uuid) -> Result<Option<Student>, Error> {
        let Some(constraint) = UNIQUE_CONSTRAINTS
            .iter()
            .find(|c| c.table == Table::Students && c.field == "user_id")
        else {
            return Ok(None);
        };

        match self
            .storage
            .unique_index()
            .lookup(constraint, &user_id.to_string())?
        {
            Some(key) => self.storage.get_row(&key),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// Grant a role. Granting a role the identity already holds is a duplicate.
    pub fn insert_role(&self, assignment: &RoleAssignment) -> Result<(), Error> {
        self.insert(assignment)
    }

    /// Revoke a role. The last role of an existing identity cannot be revoked.
    pub fn delete_role(&self, user_id: Uuid, role: Role) -> Result<(), Error> {
        let key = role_key(&user_id, role);
        let mut tx = self.storage.transaction();
        if !tx.exists(Table::UserRoles, &key)? {
            return Err(Error::not_found(Table::UserRoles, key_label(&key)));
        }

        let remaining = self
            .storage
            .scan_prefix(Table::UserRoles, user_id.as_bytes())?
            .len();
        if remaining <= 1 && tx.exists(Table::Identities, &uuid_key(&user_id))? {
            return Err(ConstraintError::RoleRequired {
                identity: user_id.to_string(),
            }
            .into());
        }

        self.stage_delete(&mut tx, Table::UserRoles, &key)?;
        tx.commit()?;
        tracing::debug!(identity = %user_id, role = %role, "role revoked");
        Ok(())
    }

    /// Whether an identity holds a role.
    pub fn has_role(&self, user_id: Uuid, role: Role) -> Result<bool, Error> {
        self.storage
            .contains(Table::UserRoles, &role_key(&user_id, role))
    }

    /// Every role held by an identity.
    pub fn roles_for(&self, user_id: Uuid) -> Result<Vec<RoleAssignment>, Error> {
        self.storage
            .scan_prefix(Table::UserRoles, user_id.as_bytes())?
            .into_iter()
            .map(|(_, value)| decode_row(value))
            .collect()
    }

    /// Every role assignment, grouped by identity.
    pub fn list_roles(&self) -> Result<Vec<RoleAssignment>, Error> {
        self.storage.scan_rows()
    }

    /// Grant a role outside of any session.
    ///
    /// Used to bootstrap the first administrator of an already provisioned
    /// identity. Returns false when the role was already held.
    pub fn bootstrap_role(&self, user_id: Uuid, role: Role) -> Result<bool, Error> {
        let mut tx = self.storage.transaction();
        if !tx.exists(Table::Identities, &uuid_key(&user_id))? {
            return Err(Error::not_found(Table::Identities, user_id));
        }
        if tx.exists(Table::UserRoles, &role_key(&user_id, role))? {
            return Ok(false);
        }

        self.stage_insert(&mut tx, &RoleAssignment::new(user_id, role))?;
        tx.commit()?;
        tracing::info!(identity = %user_id, role = %role, "role bootstrapped");
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    pub fn insert_profile(&self, profile: &Profile) -> Result<(), Error> {
        self.insert(profile)
    }

    pub fn update_profile(&self, profile: &Profile) -> Result<Profile, Error> {
        self.update(profile)
    }

    pub fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, Error> {
        self.storage.get_row(&uuid_key(&id))
    }

    /// Every profile, oldest first.
    pub fn list_profiles(&self) -> Result<Vec<Profile>, Error> {
        let mut profiles: Vec<Profile> = self.storage.scan_rows()?;
        profiles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(profiles)
    }

    /// Number of rows in a table.
    pub fn count(&self, table: Table) -> usize {
        self.storage.count(table)
    }
}

fn encode_timestamp() -> Result<Value, Error> {
    serde_json::to_value(Utc::now()).map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Duration;
    use std::sync::Barrier;
    use std::thread;

    fn course(code: &str) -> Course {
        let now = Utc::now();
        Course {
            id: Uuid::new_v4(),
            name: "Databases".to_string(),
            code: code.to_string(),
            duration: 6,
            created_at: now,
            updated_at: now,
        }
    }

    fn identity(db: &Database) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut tx = db.storage().transaction();
        db.stage_insert(
            &mut tx,
            &Identity {
                id,
                email: None,
                created_at: now,
            },
        )
        .unwrap();
        db.stage_insert(&mut tx, &RoleAssignment::new(id, Role::Student))
            .unwrap();
        tx.commit().unwrap();
        id
    }

    fn student(email: &str) -> Student {
        let now = Utc::now();
        Student {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: email.to_string(),
            course_id: None,
            user_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_course_code_unique() {
        let db = Database::temporary().unwrap();
        db.insert_course(&course("DB1")).unwrap();

        let err = db.insert_course(&course("DB1")).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(db.list_courses().unwrap().len(), 1);
    }

    #[test]
    fn test_update_stamps_updated_at() {
        let db = Database::temporary().unwrap();
        let mut c = course("DB1");
        c.updated_at = Utc::now() - Duration::hours(1);
        c.created_at = c.updated_at;
        db.insert_course(&c).unwrap();

        let mut changed = c.clone();
        changed.name = "Advanced Databases".to_string();
        // A client-supplied stamp is overwritten.
        changed.updated_at = Utc::now() - Duration::days(30);
        let stored = db.update_course(&changed).unwrap();

        assert!(stored.updated_at > c.updated_at);
        assert_eq!(stored.created_at, c.created_at);
        assert_eq!(db.get_course(c.id).unwrap().unwrap(), stored);
    }

    #[test]
    fn test_update_moves_unique_claim() {
        let db = Database::temporary().unwrap();
        let mut c = course("DB1");
        db.insert_course(&c).unwrap();

        c.code = "DB2".to_string();
        db.update_course(&c).unwrap();

        // The old code is free again, the new one is taken.
        db.insert_course(&course("DB1")).unwrap();
        assert!(db.insert_course(&course("DB2")).unwrap_err().is_duplicate());
    }

    #[test]
    fn test_update_missing_row() {
        let db = Database::temporary().unwrap();
        let err = db.update_course(&course("DB1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_student_foreign_keys() {
        let db = Database::temporary().unwrap();

        let mut s = student("ada@example.com");
        s.course_id = Some(Uuid::new_v4());
        let err = db.insert_student(&s).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        let mut s = student("ada@example.com");
        s.user_id = Some(Uuid::new_v4());
        assert!(db.insert_student(&s).is_err());
        assert!(db.list_students().unwrap().is_empty());
    }

    #[test]
    fn test_student_user_id_unique() {
        let db = Database::temporary().unwrap();
        let user = identity(&db);

        let mut first = student("a@example.com");
        first.user_id = Some(user);
        db.insert_student(&first).unwrap();

        let mut second = student("b@example.com");
        second.user_id = Some(user);
        assert!(db.insert_student(&second).unwrap_err().is_duplicate());

        assert_eq!(db.find_student_by_user(user).unwrap(), Some(first));
        assert_eq!(db.find_student_by_user(Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn test_roles() {
        let db = Database::temporary().unwrap();
        let user = identity(&db);

        assert!(!db.bootstrap_role(user, Role::Student).unwrap());
        assert_eq!(
            db.bootstrap_role(Uuid::new_v4(), Role::Admin)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );

        db.insert_role(&RoleAssignment::new(user, Role::Admin))
            .unwrap();
        assert!(db
            .insert_role(&RoleAssignment::new(user, Role::Admin))
            .unwrap_err()
            .is_duplicate());

        assert!(db.has_role(user, Role::Admin).unwrap());
        assert_eq!(db.roles_for(user).unwrap().len(), 2);

        db.delete_role(user, Role::Admin).unwrap();
        assert!(!db.has_role(user, Role::Admin).unwrap());

        let err = db.delete_role(user, Role::Student).unwrap_err();
        assert!(matches!(
            err,
            Error::ConstraintViolation(ConstraintError::RoleRequired { .. })
        ));
        assert_eq!(
            db.delete_role(user, Role::Admin).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_role_requires_identity() {
        let db = Database::temporary().unwrap();
        let err = db
            .insert_role(&RoleAssignment::new(Uuid::new_v4(), Role::Admin))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn test_concurrent_revokes_keep_one_role() {
        for _ in 0..50 {
            let db = Database::temporary().unwrap();
            let user = identity(&db);
            db.insert_role(&RoleAssignment::new(user, Role::Admin))
                .unwrap();

            let barrier = Barrier::new(2);
            thread::scope(|s| {
                for role in [Role::Admin, Role::Student] {
                    let (db, barrier) = (&db, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        let _ = db.delete_role(user, role);
                    });
                }
            });

            assert_eq!(db.roles_for(user).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_enrollment_racing_course_delete_never_dangles() {
        for i in 0..50 {
            let db = Database::temporary().unwrap();
            let c = course("DB1");
            db.insert_course(&c).unwrap();
            let enrolled = Student {
                course_id: Some(c.id),
                ..student(&format!("ada{}@example.com", i))
            };

            let barrier = Barrier::new(2);
            thread::scope(|s| {
                s.spawn(|| {
                    barrier.wait();
                    db.delete_course(c.id).unwrap();
                });
                s.spawn(|| {
                    barrier.wait();
                    let _ = db.insert_student(&enrolled);
                });
            });

            assert!(db.get_course(c.id).unwrap().is_none());
            for student in db.list_students().unwrap() {
                assert_eq!(student.course_id, None);
            }
        }
    }
}
