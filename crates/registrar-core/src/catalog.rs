//! Static schema: tables, unique constraints and foreign keys.
//!
//! The schema is fixed at compile time. Storage, cascades and the
//! `updated_at` trigger are all driven by the definitions in this module.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A relation stored by the data-access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Mirror of the auth provider's users.
    Identities,
    /// Courses offered.
    Courses,
    /// Student records.
    Students,
    /// Role assignments per identity.
    UserRoles,
    /// One display profile per identity.
    Profiles,
}

impl Table {
    /// Every table, in storage slot order.
    pub const ALL: [Table; 5] = [
        Table::Identities,
        Table::Courses,
        Table::Students,
        Table::UserRoles,
        Table::Profiles,
    ];

    /// Table name.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Identities => "identities",
            Table::Courses => "courses",
            Table::Students => "students",
            Table::UserRoles => "user_roles",
            Table::Profiles => "profiles",
        }
    }

    /// Slot of the table's tree in the storage engine.
    pub(crate) fn slot(&self) -> usize {
        match self {
            Table::Identities => 0,
            Table::Courses => 1,
            Table::Students => 2,
            Table::UserRoles => 3,
            Table::Profiles => 4,
        }
    }

    /// Name of the primary key constraint.
    pub fn primary_key(&self) -> &'static str {
        match self {
            Table::Identities => "identities_pkey",
            Table::Courses => "courses_pkey",
            Table::Students => "students_pkey",
            Table::UserRoles => "user_roles_user_id_role_key",
            Table::Profiles => "profiles_pkey",
        }
    }

    /// Whether updates to this table overwrite `updated_at`.
    pub fn maintains_updated_at(&self) -> bool {
        matches!(self, Table::Courses | Table::Students | Table::Profiles)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Behavior when a referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteBehavior {
    /// Delete referencing rows.
    Cascade,
    /// Set the referencing field to null.
    SetNull,
}

/// Single-field uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueConstraint {
    /// Constraint name.
    pub name: &'static str,
    /// Constrained table.
    pub table: Table,
    /// Constrained field.
    pub field: &'static str,
}

/// Foreign key from a field to another table's `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: &'static str,
    /// Referencing table.
    pub table: Table,
    /// Referencing field.
    pub field: &'static str,
    /// Referenced table.
    pub references: Table,
    /// What happens to referencing rows on delete.
    pub on_delete: DeleteBehavior,
}

/// Unique constraints across the schema. Null values are never indexed.
pub const UNIQUE_CONSTRAINTS: &[UniqueConstraint] = &[
    UniqueConstraint {
        name: "courses_code_key",
        table: Table::Courses,
        field: "code",
    },
    UniqueConstraint {
        name: "students_email_key",
        table: Table::Students,
        field: "email",
    },
    UniqueConstraint {
        name: "students_user_id_key",
        table: Table::Students,
        field: "user_id",
    },
];

/// Foreign keys across the schema.
pub const FOREIGN_KEYS: &[ForeignKey] = &[
    ForeignKey {
        name: "students_course_id_fkey",
        table: Table::Students,
        field: "course_id",
        references: Table::Courses,
        on_delete: DeleteBehavior::SetNull,
    },
    ForeignKey {
        name: "students_user_id_fkey",
        table: Table::Students,
        field: "user_id",
        references: Table::Identities,
        on_delete: DeleteBehavior::Cascade,
    },
    ForeignKey {
        name: "user_roles_user_id_fkey",
        table: Table::UserRoles,
        field: "user_id",
        references: Table::Identities,
        on_delete: DeleteBehavior::Cascade,
    },
    ForeignKey {
        name: "profiles_id_fkey",
        table: Table::Profiles,
        field: "id",
        references: Table::Identities,
        on_delete: DeleteBehavior::Cascade,
    },
];

/// Unique constraints declared on a table.
pub fn unique_constraints(table: Table) -> impl Iterator<Item = &'static UniqueConstraint> {
    UNIQUE_CONSTRAINTS.iter().filter(move |c| c.table == table)
}

/// Foreign keys declared on a table.
pub fn foreign_keys_from(table: Table) -> impl Iterator<Item = &'static ForeignKey> {
    FOREIGN_KEYS.iter().filter(move |fk| fk.table == table)
}

/// Foreign keys pointing at a table.
pub fn foreign_keys_to(table: Table) -> impl Iterator<Item = &'static ForeignKey> {
    FOREIGN_KEYS.iter().filter(move |fk| fk.references == table)
}
