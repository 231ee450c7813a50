//! Authorization layer for Registrar.
//!
//! This module sits above the data-access layer and is the only way
//! untrusted requests reach it:
//! - a `SecurityContext` carries the verified identity of each request
//! - row-level security (RLS) policies decide every read and write
//! - role and ownership resolvers give policies privileged, unfiltered lookups
//! - audit logging records denials and mutations
//!
//! # Example
//!
//! ```ignore
//! use registrar_core::{Database, PolicySet, SecurityContext, Session, TracingAuditLogger};
//!
//! let db = Database::temporary()?;
//! let policies = PolicySet::standard();
//! let context = SecurityContext::authenticated(id);
//! let session = Session::new(&db, &policies, context, &TracingAuditLogger);
//!
//! // Rows the caller may not see are simply absent.
//! let students = session.list_students()?;
//! ```

pub mod audit;
pub mod context;
pub mod error;
mod resolver;
pub mod rls;
pub mod session;

// Error types
pub use error::{SecurityError, SecurityResult};

// Context types
pub use context::SecurityContext;

// RLS types
pub use rls::{Decision, PolicyRow, PolicySet, RlsOperation, RlsPolicy, RlsPredicate, RowView};

// Audit types
pub use audit::{
    AuditEvent, AuditEventType, AuditLogger, MemoryAuditLogger, MutationOp, NullAuditLogger,
    TracingAuditLogger,
};

// Session
pub use session::{Session, Summary};
