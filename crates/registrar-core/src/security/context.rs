//! Security context that flows through every session operation.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::error::{SecurityError, SecurityResult};

/// Request-scoped security context.
///
/// Carries the identity verified by the transport layer, or none for an
/// anonymous caller. Policies are evaluated against it on every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    /// Request identifier, used to correlate audit events.
    pub request_id: String,
    /// Authenticated identity, if any.
    pub identity: Option<Uuid>,
    /// When the context was created.
    pub created_at: DateTime<Utc>,
}

impl SecurityContext {
    /// Create a context for an optional identity.
    pub fn new(identity: Option<Uuid>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            identity,
            created_at: Utc::now(),
        }
    }

    /// Create a context for an authenticated identity.
    pub fn authenticated(identity: Uuid) -> Self {
        Self::new(Some(identity))
    }

    /// Create an anonymous context.
    pub fn anonymous() -> Self {
        Self::new(None)
    }

    /// Set the request identifier.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Check whether the caller is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// The caller's identity, or an error for anonymous callers.
    pub fn require_identity(&self) -> SecurityResult<Uuid> {
        self.identity.ok_or(SecurityError::AuthenticationRequired)
    }
}
