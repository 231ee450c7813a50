//! Role and ownership resolvers.
//!
//! Both read storage directly, bypassing every policy, so that policies on a
//! table can consult that same table without recursing. Nothing outside the
//! security layer can reach them.

use uuid::Uuid;

use crate::database::Database;
use crate::model::Role;

/// Privileged lookups used by policy predicates.
#[derive(Clone, Copy)]
pub(crate) struct Resolver<'a> {
    db: &'a Database,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Whether `identity` holds `role`.
    ///
    /// Anonymous callers and storage failures both resolve to false.
    pub(crate) fn has_role(&self, identity: Option<Uuid>, role: Role) -> bool {
        let Some(identity) = identity else {
            return false;
        };
        match self.db.has_role(identity, role) {
            Ok(held) => held,
            Err(e) => {
                tracing::warn!(
                    identity = %identity,
                    role = %role,
                    error = %e,
                    "role lookup failed"
                );
                false
            }
        }
    }

    /// Id of the student row owned by `identity`, if any.
    pub(crate) fn student_id_for(&self, identity: Option<Uuid>) -> Option<Uuid> {
        let identity = identity?;
        match self.db.find_student_by_user(identity) {
            Ok(student) => student.map(|s| s.id),
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "ownership lookup failed");
                None
            }
        }
    }
}
