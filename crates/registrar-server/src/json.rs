//! JSON request and response types for the HTTP API.

use registrar_core::{CascadeResult, Profile, Role, Student};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status.
    pub status: String,
    /// Server version.
    pub version: String,
}

/// Result of a delete, with the rows its cascades touched.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Key of the deleted row.
    pub id: Uuid,
    /// Rows deleted or nulled as a consequence.
    pub cascade: CascadeResult,
}

/// Request body for granting a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRoleRequest {
    /// Identity receiving the role.
    pub user_id: Uuid,
    /// Role to grant.
    pub role: Role,
}

/// Everything the caller's dashboard needs about themselves.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    /// Caller's identity id.
    pub identity: Uuid,
    /// Roles the caller holds.
    pub roles: Vec<Role>,
    /// Role that picks the caller's view.
    pub effective_role: Role,
    /// Caller's profile, if provisioned.
    pub profile: Option<Profile>,
    /// Student row linked to the caller, if any.
    pub student: Option<Student>,
}
