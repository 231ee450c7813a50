//! Identity provisioning.
//!
//! The auth provider reports identity lifecycle events. A created identity
//! gets its identity row, a profile and the default `student` role in one
//! transaction; a deleted identity takes its profile, roles and owned
//! student record with it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::cascade::CascadeResult;
use crate::catalog::Table;
use crate::database::Database;
use crate::error::{ConstraintError, Error};
use crate::model::{uuid_key, Identity, Profile, Role, RoleAssignment};

/// Role every new identity receives.
pub const DEFAULT_ROLE: Role = Role::Student;

/// Provisioning failures. Any of these aborts the signup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisioningError {
    /// The identity (or its profile) already exists.
    #[error("identity {0} is already provisioned")]
    AlreadyProvisioned(Uuid),

    /// The identity to deprovision does not exist.
    #[error("identity {0} is not provisioned")]
    UnknownIdentity(Uuid),

    /// Provisioning could not complete.
    #[error("provisioning identity {identity} failed: {reason}")]
    Failed {
        /// Identity being provisioned.
        identity: Uuid,
        /// Underlying cause.
        reason: String,
    },
}

/// Metadata the user supplied at signup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupMetadata {
    #[serde(default)]
    pub username: Option<String>,
}

impl SignupMetadata {
    /// Username to store on the profile: trimmed, blank meaning none.
    pub fn username(&self) -> Option<String> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

/// Identity lifecycle event from the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentityEvent {
    /// A user signed up.
    Created {
        identity_id: Uuid,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        metadata: SignupMetadata,
    },
    /// A user was removed from the auth provider.
    Deleted { identity_id: Uuid },
}

impl IdentityEvent {
    /// Identity the event is about.
    pub fn identity_id(&self) -> Uuid {
        match self {
            IdentityEvent::Created { identity_id, .. } | IdentityEvent::Deleted { identity_id } => {
                *identity_id
            }
        }
    }
}

/// What handling an event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvisioningOutcome {
    /// Identity, profile and default role were created.
    Provisioned {
        identity: Identity,
        profile: Profile,
        role: Role,
    },
    /// Identity was removed along with its dependents.
    Deprovisioned {
        identity_id: Uuid,
        cascade: CascadeResult,
    },
}

/// Handles identity lifecycle events against the data-access layer.
pub struct Provisioner<'a> {
    db: &'a Database,
}

impl<'a> Provisioner<'a> {
    /// Create a provisioner.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Handle one event.
    pub fn handle(&self, event: &IdentityEvent) -> Result<ProvisioningOutcome, Error> {
        match event {
            IdentityEvent::Created {
                identity_id,
                email,
                metadata,
            } => self.provision(*identity_id, email.clone(), metadata),
            IdentityEvent::Deleted { identity_id } => self.deprovision(*identity_id),
        }
    }

    /// Create the identity, its profile and the default role atomically.
    pub fn provision(
        &self,
        identity_id: Uuid,
        email: Option<String>,
        metadata: &SignupMetadata,
    ) -> Result<ProvisioningOutcome, Error> {
        let username = metadata.username();

        let now = Utc::now();
        let identity = Identity {
            id: identity_id,
            email,
            created_at: now,
        };
        let profile = Profile {
            id: identity_id,
            username,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.db.storage().transaction();
        self.db.stage_insert(&mut tx, &identity)?;
        self.db.stage_insert(&mut tx, &profile)?;
        self.db
            .stage_insert(&mut tx, &RoleAssignment::new(identity_id, DEFAULT_ROLE))?;
        tx.commit()
            .map_err(|e| provisioning_failure(identity_id, e))?;

        tracing::info!(identity = %identity_id, role = %DEFAULT_ROLE, "identity provisioned");

        Ok(ProvisioningOutcome::Provisioned {
            identity,
            profile,
            role: DEFAULT_ROLE,
        })
    }

    /// Delete the identity together with everything that references it.
    pub fn deprovision(&self, identity_id: Uuid) -> Result<ProvisioningOutcome, Error> {
        let mut tx = self.db.storage().transaction();
        let cascade = self
            .db
            .stage_delete(&mut tx, Table::Identities, &uuid_key(&identity_id))
            .map_err(|e| match e {
                Error::NotFound { .. } => ProvisioningError::UnknownIdentity(identity_id).into(),
                other => other,
            })?;
        tx.commit()?;

        tracing::info!(
            identity = %identity_id,
            cascaded = cascade.affected_count(),
            "identity deprovisioned"
        );

        Ok(ProvisioningOutcome::Deprovisioned {
            identity_id,
            cascade,
        })
    }
}

/// Map a failed signup transaction onto a provisioning error.
fn provisioning_failure(identity: Uuid, error: Error) -> Error {
    let provisioning = match error {
        Error::ConstraintViolation(ConstraintError::UniqueViolation { table, .. })
            if matches!(table, Table::Identities | Table::Profiles) =>
        {
            ProvisioningError::AlreadyProvisioned(identity)
        }
        other => ProvisioningError::Failed {
            identity,
            reason: other.to_string(),
        },
    };
    tracing::error!(identity = %identity, error = %provisioning, "identity provisioning failed");
    provisioning.into()
}
