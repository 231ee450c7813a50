//! Row types for every relation, plus the input payloads accepted from clients.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::Table;

/// A typed row stored in one table.
pub trait Row: Serialize + DeserializeOwned {
    /// Table the row lives in.
    const TABLE: Table;

    /// Storage key of the row.
    fn key(&self) -> Vec<u8>;
}

/// Storage key for rows keyed by a single UUID.
pub fn uuid_key(id: &Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

/// Storage key for a role assignment: `user_id (16 bytes) || role name`.
pub fn role_key(user_id: &Uuid, role: Role) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + 7);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(role.as_str().as_bytes());
    key
}

/// Role attached to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrator.
    Admin,
    /// Student (default at signup).
    Student,
}

impl Role {
    /// Role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "student" => Ok(Role::Student),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Identity issued by the external auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Identity id (the token subject).
    pub id: Uuid,
    /// Email known to the auth provider.
    pub email: Option<String>,
    /// When the identity was provisioned.
    pub created_at: DateTime<Utc>,
}

impl Row for Identity {
    const TABLE: Table = Table::Identities;

    fn key(&self) -> Vec<u8> {
        uuid_key(&self.id)
    }
}

/// A course students can enroll in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub name: String,
    /// Uppercased, globally unique code.
    pub code: String,
    /// Duration in months.
    pub duration: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Row for Course {
    const TABLE: Table = Table::Courses;

    fn key(&self) -> Vec<u8> {
        uuid_key(&self.id)
    }
}

/// A student record, optionally claimed by one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    /// Globally unique email.
    pub email: String,
    /// Enrolled course; cleared when the course is deleted.
    pub course_id: Option<Uuid>,
    /// Identity that owns this record; at most one record per identity.
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Row for Student {
    const TABLE: Table = Table::Students;

    fn key(&self) -> Vec<u8> {
        uuid_key(&self.id)
    }
}

/// An (identity, role) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl RoleAssignment {
    /// Create an assignment stamped now.
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            role,
            created_at: Utc::now(),
        }
    }
}

impl Row for RoleAssignment {
    const TABLE: Table = Table::UserRoles;

    fn key(&self) -> Vec<u8> {
        role_key(&self.user_id, self.role)
    }
}

/// Display profile, keyed by the identity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Identity id.
    pub id: Uuid,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Row for Profile {
    const TABLE: Table = Table::Profiles;

    fn key(&self) -> Vec<u8> {
        uuid_key(&self.id)
    }
}

/// Course payload from clients.
///
/// `duration` is optional on the wire so that an omitted value can be
/// reported as a validation error instead of a decoding failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseInput {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub duration: Option<i64>,
}

/// Student payload from clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub course_id: Option<Uuid>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

/// Profile payload from clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileInput {
    #[serde(default)]
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_names() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("student".parse::<Role>().unwrap(), Role::Student);
        assert!("professor".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }

    #[test]
    fn test_role_keys_share_identity_prefix() {
        let user = Uuid::new_v4();
        let admin = role_key(&user, Role::Admin);
        let student = role_key(&user, Role::Student);
        assert_ne!(admin, student);
        assert!(admin.starts_with(user.as_bytes()));
        assert!(student.starts_with(user.as_bytes()));
    }

    #[test]
    fn test_course_input_duration_optional() {
        let input: CourseInput =
            serde_json::from_str(r#"{"name":"Algebra","code":"alg"}"#).unwrap();
        assert_eq!(input.duration, None);
    }
}
