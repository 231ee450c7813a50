//! Row-Level Security (RLS) policy definitions and evaluation.
//!
//! Every policy is permissive: an operation on a table is granted when ANY
//! applicable policy's predicate holds for the caller and row. A table and
//! operation with no applicable policy is denied.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::SecurityContext;
use super::resolver::Resolver;
use crate::catalog::Table;
use crate::database::Database;
use crate::model::{Course, Profile, Role, RoleAssignment, Student};

/// Operations that RLS policies can apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RlsOperation {
    /// Read operations (SELECT).
    Select,
    /// Insert operations.
    Insert,
    /// Update operations.
    Update,
    /// Delete operations.
    Delete,
}

impl RlsOperation {
    /// Every operation.
    pub const ALL: [RlsOperation; 4] = [
        RlsOperation::Select,
        RlsOperation::Insert,
        RlsOperation::Update,
        RlsOperation::Delete,
    ];

    /// Insert, update and delete.
    pub const WRITES: [RlsOperation; 3] =
        [RlsOperation::Insert, RlsOperation::Update, RlsOperation::Delete];

    /// Operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RlsOperation::Select => "select",
            RlsOperation::Insert => "insert",
            RlsOperation::Update => "update",
            RlsOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for RlsOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a predicate may know about the row being accessed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowView {
    /// Primary id of the row, when it has one.
    pub id: Option<Uuid>,
    /// Identity the row belongs to, when it belongs to one.
    pub identity: Option<Uuid>,
}

/// Rows that policies can be evaluated against.
pub trait PolicyRow {
    /// Table the row lives in.
    const TABLE: Table;

    /// The fields of the row predicates look at.
    fn row_view(&self) -> RowView;
}

impl PolicyRow for Course {
    const TABLE: Table = Table::Courses;

    fn row_view(&self) -> RowView {
        RowView {
            id: Some(self.id),
            identity: None,
        }
    }
}

impl PolicyRow for Student {
    const TABLE: Table = Table::Students;

    fn row_view(&self) -> RowView {
        RowView {
            id: Some(self.id),
            identity: self.user_id,
        }
    }
}

impl PolicyRow for RoleAssignment {
    const TABLE: Table = Table::UserRoles;

    fn row_view(&self) -> RowView {
        RowView {
            id: None,
            identity: Some(self.user_id),
        }
    }
}

impl PolicyRow for Profile {
    const TABLE: Table = Table::Profiles;

    fn row_view(&self) -> RowView {
        RowView {
            id: Some(self.id),
            identity: Some(self.id),
        }
    }
}

/// A policy predicate: a pure function of the caller, the row and the resolvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlsPredicate {
    /// Any authenticated identity.
    Authenticated,
    /// The caller holds a role.
    HasRole(Role),
    /// The row belongs to the caller.
    RowIdentityIsCaller,
    /// The row is the student record the caller owns.
    OwnsStudentRow,
}

impl RlsPredicate {
    /// Whether the predicate can be decided without looking at a row.
    pub fn is_row_independent(&self) -> bool {
        matches!(self, RlsPredicate::Authenticated | RlsPredicate::HasRole(_))
    }

    pub(crate) fn evaluate(
        &self,
        context: &SecurityContext,
        row: Option<&RowView>,
        resolver: &Resolver<'_>,
    ) -> bool {
        let Some(identity) = context.identity else {
            return false;
        };

        match self {
            RlsPredicate::Authenticated => true,
            RlsPredicate::HasRole(role) => resolver.has_role(Some(identity), *role),
            RlsPredicate::RowIdentityIsCaller => {
                row.and_then(|r| r.identity) == Some(identity)
            }
            RlsPredicate::OwnsStudentRow => match row.and_then(|r| r.id) {
                Some(row_id) => resolver.student_id_for(Some(identity)) == Some(row_id),
                None => false,
            },
        }
    }
}

/// RLS policy definition for a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RlsPolicy {
    /// Policy name (unique identifier).
    pub name: &'static str,
    /// Target table.
    pub table: Table,
    /// Operations this policy applies to.
    pub operations: Vec<RlsOperation>,
    /// Predicate that grants access.
    pub predicate: RlsPredicate,
}

impl RlsPolicy {
    /// Create a policy covering every operation.
    pub fn new(name: &'static str, table: Table, predicate: RlsPredicate) -> Self {
        Self {
            name,
            table,
            operations: RlsOperation::ALL.to_vec(),
            predicate,
        }
    }

    /// Set the operations this policy applies to.
    pub fn with_operations(mut self, operations: &[RlsOperation]) -> Self {
        self.operations = operations.to_vec();
        self
    }

    /// Check if this policy applies to the given table and operation.
    pub fn applies_to(&self, table: Table, operation: RlsOperation) -> bool {
        self.table == table && self.operations.contains(&operation)
    }
}

/// Outcome of evaluating a policy set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Granted by the named policy.
    Granted(&'static str),
    /// No applicable policy granted the operation.
    Denied,
}

impl Decision {
    /// Check if the operation was granted.
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted(_))
    }
}

/// The full set of policies, evaluated fresh on every operation.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: Vec<RlsPolicy>,
}

impl PolicySet {
    /// Create an empty policy set, which denies everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// The policies guarding the registrar tables.
    ///
    /// Profiles have no delete policy: they only disappear with their identity.
    pub fn standard() -> Self {
        use RlsOperation::{Insert, Select, Update};
        use RlsPredicate::{Authenticated, OwnsStudentRow, RowIdentityIsCaller};

        let admin = RlsPredicate::HasRole(Role::Admin);
        Self::new()
            .with_policy(
                RlsPolicy::new("courses_read_authenticated", Table::Courses, Authenticated)
                    .with_operations(&[Select]),
            )
            .with_policy(
                RlsPolicy::new("courses_write_admin", Table::Courses, admin)
                    .with_operations(&RlsOperation::WRITES),
            )
            .with_policy(
                RlsPolicy::new("students_read_admin", Table::Students, admin)
                    .with_operations(&[Select]),
            )
            .with_policy(
                RlsPolicy::new("students_read_own", Table::Students, OwnsStudentRow)
                    .with_operations(&[Select]),
            )
            .with_policy(
                RlsPolicy::new("students_write_admin", Table::Students, admin)
                    .with_operations(&RlsOperation::WRITES),
            )
            .with_policy(
                RlsPolicy::new("user_roles_read_own", Table::UserRoles, RowIdentityIsCaller)
                    .with_operations(&[Select]),
            )
            .with_policy(
                RlsPolicy::new("user_roles_read_admin", Table::UserRoles, admin)
                    .with_operations(&[Select]),
            )
            .with_policy(
                RlsPolicy::new("user_roles_write_admin", Table::UserRoles, admin)
                    .with_operations(&RlsOperation::WRITES),
            )
            .with_policy(
                RlsPolicy::new("profiles_read_own", Table::Profiles, RowIdentityIsCaller)
                    .with_operations(&[Select]),
            )
            .with_policy(
                RlsPolicy::new("profiles_read_admin", Table::Profiles, admin)
                    .with_operations(&[Select]),
            )
            .with_policy(
                RlsPolicy::new("profiles_write_own", Table::Profiles, RowIdentityIsCaller)
                    .with_operations(&[Insert, Update]),
            )
    }

    /// Add a policy.
    pub fn with_policy(mut self, policy: RlsPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Every policy in the set.
    pub fn policies(&self) -> &[RlsPolicy] {
        &self.policies
    }

    /// Policies applicable to a table and operation.
    pub fn applicable(
        &self,
        table: Table,
        operation: RlsOperation,
    ) -> impl Iterator<Item = &RlsPolicy> {
        self.policies
            .iter()
            .filter(move |p| p.applies_to(table, operation))
    }

    /// Whether the decision for a table and operation never depends on the row.
    pub fn is_row_independent(&self, table: Table, operation: RlsOperation) -> bool {
        self.applicable(table, operation)
            .all(|p| p.predicate.is_row_independent())
    }

    /// Evaluate the policies for a caller, using `db` for role and ownership lookups.
    pub fn check(
        &self,
        db: &Database,
        context: &SecurityContext,
        table: Table,
        operation: RlsOperation,
        row: Option<&RowView>,
    ) -> Decision {
        self.decide(&Resolver::new(db), context, table, operation, row)
    }

    pub(crate) fn decide(
        &self,
        resolver: &Resolver<'_>,
        context: &SecurityContext,
        table: Table,
        operation: RlsOperation,
        row: Option<&RowView>,
    ) -> Decision {
        self.applicable(table, operation)
            .find(|p| p.predicate.evaluate(context, row, resolver))
            .map_or(Decision::Denied, |p| Decision::Granted(p.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioning::{Provisioner, SignupMetadata};
    use chrono::Utc;

    fn provision(db: &Database) -> Uuid {
        let id = Uuid::new_v4();
        Provisioner::new(db)
            .provision(id, None, &SignupMetadata::default())
            .unwrap();
        id
    }

    fn admin(db: &Database) -> Uuid {
        let id = provision(db);
        db.insert_role(&RoleAssignment::new(id, Role::Admin))
            .unwrap();
        id
    }

    #[test]
    fn test_empty_set_denies() {
        let db = Database::temporary().unwrap();
        let ctx = SecurityContext::authenticated(admin(&db));
        let decision =
            PolicySet::new().check(&db, &ctx, Table::Courses, RlsOperation::Select, None);
        assert_eq!(decision, Decision::Denied);
    }

    #[test]
    fn test_course_policies() {
        let db = Database::temporary().unwrap();
        let policies = PolicySet::standard();
        let student = SecurityContext::authenticated(provision(&db));
        let admin = SecurityContext::authenticated(admin(&db));
        let anonymous = SecurityContext::anonymous();

        assert!(policies
            .check(&db, &student, Table::Courses, RlsOperation::Select, None)
            .is_granted());
        assert!(!policies
            .check(&db, &anonymous, Table::Courses, RlsOperation::Select, None)
            .is_granted());

        for op in RlsOperation::WRITES {
            assert!(!policies.check(&db, &student, Table::Courses, op, None).is_granted());
            assert_eq!(
                policies.check(&db, &admin, Table::Courses, op, None),
                Decision::Granted("courses_write_admin")
            );
        }
    }

    #[test]
    fn test_student_read_is_own_row_or_admin() {
        let db = Database::temporary().unwrap();
        let policies = PolicySet::standard();
        let owner = provision(&db);
        let now = Utc::now();
        let row = Student {
            id: Uuid::new_v4(),
            name: "Owner".to_string(),
            email: "owner@example.com".to_string(),
            course_id: None,
            user_id: Some(owner),
            created_at: now,
            updated_at: now,
        };
        db.insert_student(&row).unwrap();
        let view = row.row_view();

        let owner_ctx = SecurityContext::authenticated(owner);
        let other_ctx = SecurityContext::authenticated(provision(&db));
        let admin_ctx = SecurityContext::authenticated(admin(&db));

        assert_eq!(
            policies.check(&db, &owner_ctx, Table::Students, RlsOperation::Select, Some(&view)),
            Decision::Granted("students_read_own")
        );
        assert!(!policies
            .check(&db, &other_ctx, Table::Students, RlsOperation::Select, Some(&view))
            .is_granted());
        assert_eq!(
            policies.check(&db, &admin_ctx, Table::Students, RlsOperation::Select, Some(&view)),
            Decision::Granted("students_read_admin")
        );

        // Owning a row grants no write access to it.
        assert!(!policies
            .check(&db, &owner_ctx, Table::Students, RlsOperation::Update, Some(&view))
            .is_granted());
    }

    #[test]
    fn test_profile_policies() {
        let db = Database::temporary().unwrap();
        let policies = PolicySet::standard();
        let owner = provision(&db);
        let own = RowView {
            id: Some(owner),
            identity: Some(owner),
        };
        let owner_ctx = SecurityContext::authenticated(owner);
        let admin_ctx = SecurityContext::authenticated(admin(&db));

        assert!(policies
            .check(&db, &owner_ctx, Table::Profiles, RlsOperation::Update, Some(&own))
            .is_granted());
        assert!(policies
            .check(&db, &admin_ctx, Table::Profiles, RlsOperation::Select, Some(&own))
            .is_granted());
        assert!(!policies
            .check(&db, &admin_ctx, Table::Profiles, RlsOperation::Update, Some(&own))
            .is_granted());

        // No policy covers profile deletes.
        assert_eq!(policies.applicable(Table::Profiles, RlsOperation::Delete).count(), 0);
        assert!(!policies
            .check(&db, &owner_ctx, Table::Profiles, RlsOperation::Delete, Some(&own))
            .is_granted());
    }

    #[test]
    fn test_row_independence() {
        let policies = PolicySet::standard();
        assert!(policies.is_row_independent(Table::Courses, RlsOperation::Select));
        assert!(policies.is_row_independent(Table::Students, RlsOperation::Insert));
        assert!(!policies.is_row_independent(Table::Students, RlsOperation::Select));
        assert!(!policies.is_row_independent(Table::Profiles, RlsOperation::Update));
    }

    #[test]
    fn test_row_predicates_without_row() {
        let db = Database::temporary().unwrap();
        let resolver = Resolver::new(&db);
        let ctx = SecurityContext::authenticated(provision(&db));
        assert!(!RlsPredicate::RowIdentityIsCaller.evaluate(&ctx, None, &resolver));
        assert!(!RlsPredicate::OwnsStudentRow.evaluate(&ctx, None, &resolver));
        assert!(RlsPredicate::Authenticated.evaluate(&ctx, None, &resolver));
    }
}
