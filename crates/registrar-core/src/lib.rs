//! Registrar Core - storage, row-level security and identity provisioning.
//!
//! The crate is split in two layers:
//! - the data-access layer ([`Database`]) which reads and writes every
//!   relation unfiltered, maintains unique constraints, cascades and
//!   `updated_at` stamps;
//! - the authorization layer ([`security`]) which wraps the data-access
//!   layer in a per-request [`Session`] and evaluates row-level policies
//!   before anything reaches storage.
//!
//! The data-access layer never calls into the authorization layer.

pub mod cascade;
pub mod catalog;
pub mod constraint;
pub mod database;
pub mod error;
pub mod model;
pub mod provisioning;
pub mod security;
pub mod storage;

pub use catalog::{DeleteBehavior, ForeignKey, Table, UniqueConstraint};
pub use cascade::{CascadeExecutor, CascadeResult};
pub use constraint::{UniqueIndex, ValidationError};
pub use database::Database;
pub use error::{ConstraintError, Error, ErrorKind};
pub use model::{
    Course, CourseInput, Identity, Profile, ProfileInput, Role, RoleAssignment, Student,
    StudentInput,
};
pub use provisioning::{
    IdentityEvent, ProvisioningError, ProvisioningOutcome, Provisioner, SignupMetadata,
};
pub use storage::{StorageConfig, StorageEngine, Transaction};

// Security exports
pub use security::{
    AuditEvent, AuditEventType, AuditLogger, MemoryAuditLogger, MutationOp, NullAuditLogger,
    PolicySet, RlsOperation, RlsPolicy, RlsPredicate, RowView, SecurityContext, SecurityError,
    SecurityResult, Session, Summary, TracingAuditLogger,
};
