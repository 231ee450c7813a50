//! Audit logging infrastructure.
//!
//! Denied policy decisions and successful mutations are reported as
//! structured audit events.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::context::SecurityContext;
use super::rls::RlsOperation;
use crate::catalog::Table;

/// Types of audit events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEventType {
    /// Mutation performed.
    Mutation {
        /// Table affected.
        table: Table,
        /// Type of mutation.
        operation: MutationOp,
        /// Key of the affected row.
        key: String,
        /// Rows touched by cascades.
        cascaded: usize,
    },
    /// Access was denied.
    AccessDenied {
        /// Table the operation targeted.
        table: Table,
        /// Operation that was attempted.
        operation: RlsOperation,
        /// Reason for denial.
        reason: String,
    },
}

/// Mutation operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    /// Insert new row.
    Insert,
    /// Update existing row.
    Update,
    /// Delete row.
    Delete,
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationOp::Insert => write!(f, "insert"),
            MutationOp::Update => write!(f, "update"),
            MutationOp::Delete => write!(f, "delete"),
        }
    }
}

/// An audit event with metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Unique event ID.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Request that triggered the event.
    pub request_id: String,
    /// Identity that triggered the event, if any.
    pub identity: Option<Uuid>,
    /// Event details.
    pub event_type: AuditEventType,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(context: &SecurityContext, event_type: AuditEventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request_id: context.request_id.clone(),
            identity: context.identity,
            event_type,
        }
    }

    /// Create a mutation event.
    pub fn mutation(
        context: &SecurityContext,
        table: Table,
        operation: MutationOp,
        key: impl Into<String>,
        cascaded: usize,
    ) -> Self {
        Self::new(
            context,
            AuditEventType::Mutation {
                table,
                operation,
                key: key.into(),
                cascaded,
            },
        )
    }

    /// Create an access denied event.
    pub fn access_denied(
        context: &SecurityContext,
        table: Table,
        operation: RlsOperation,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(
            context,
            AuditEventType::AccessDenied {
                table,
                operation,
                reason: reason.into(),
            },
        )
    }

    /// Check if this is a denial.
    pub fn is_denial(&self) -> bool {
        matches!(self.event_type, AuditEventType::AccessDenied { .. })
    }

    /// Format the event as a log line.
    pub fn to_log_line(&self) -> String {
        let identity = self
            .identity
            .map_or_else(|| "anonymous".to_string(), |id| id.to_string());
        let event_desc = match &self.event_type {
            AuditEventType::Mutation {
                table,
                operation,
                key,
                cascaded,
            } => format!(
                "MUTATION table={} op={} key={} cascaded={}",
                table, operation, key, cascaded
            ),
            AuditEventType::AccessDenied {
                table,
                operation,
                reason,
            } => format!(
                "ACCESS_DENIED table={} op={} reason={}",
                table, operation, reason
            ),
        };

        format!(
            "{} id={} request={} identity={} {}",
            self.timestamp.to_rfc3339(),
            self.id,
            self.request_id,
            identity,
            event_desc
        )
    }
}

/// Trait for audit log backends.
pub trait AuditLogger: Send + Sync {
    /// Log an audit event.
    fn log(&self, event: AuditEvent);
}

/// Audit logger that emits `tracing` events under the `registrar::audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log(&self, event: AuditEvent) {
        let identity = event.identity.map(|id| id.to_string());
        match &event.event_type {
            AuditEventType::Mutation {
                table,
                operation,
                key,
                cascaded,
            } => tracing::info!(
                target: "registrar::audit",
                request_id = %event.request_id,
                identity = identity.as_deref().unwrap_or("anonymous"),
                table = %table,
                operation = %operation,
                key = %key,
                cascaded = *cascaded,
                "mutation"
            ),
            AuditEventType::AccessDenied {
                table,
                operation,
                reason,
            } => tracing::warn!(
                target: "registrar::audit",
                request_id = %event.request_id,
                identity = identity.as_deref().unwrap_or("anonymous"),
                table = %table,
                operation = %operation,
                reason = %reason,
                "access denied"
            ),
        }
    }
}

/// In-memory audit logger for testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditLogger {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditLogger {
    /// Create a new memory logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all logged events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Get logged denials.
    pub fn denials(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.is_denial())
            .cloned()
            .collect()
    }

    /// Clear all events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditLogger for MemoryAuditLogger {
    fn log(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// No-op audit logger that discards all events.
#[derive(Debug, Default)]
pub struct NullAuditLogger;

impl AuditLogger for NullAuditLogger {
    fn log(&self, _event: AuditEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> SecurityContext {
        SecurityContext::authenticated(Uuid::new_v4()).with_request_id("req-123")
    }

    #[test]
    fn test_mutation_event() {
        let ctx = test_context();
        let event = AuditEvent::mutation(&ctx, Table::Courses, MutationOp::Insert, "abc", 0);

        assert_eq!(event.request_id, "req-123");
        assert_eq!(event.identity, ctx.identity);
        assert!(!event.is_denial());

        match event.event_type {
            AuditEventType::Mutation {
                table, operation, ..
            } => {
                assert_eq!(table, Table::Courses);
                assert_eq!(operation, MutationOp::Insert);
            }
            _ => panic!("Expected Mutation event"),
        }
    }

    #[test]
    fn test_access_denied_event() {
        let ctx = SecurityContext::anonymous();
        let event = AuditEvent::access_denied(
            &ctx,
            Table::Students,
            RlsOperation::Delete,
            "no policy granted",
        );
        assert!(event.is_denial());

        let line = event.to_log_line();
        assert!(line.contains("ACCESS_DENIED"));
        assert!(line.contains("table=students"));
        assert!(line.contains("op=delete"));
        assert!(line.contains("identity=anonymous"));
    }

    #[test]
    fn test_memory_logger() {
        let logger = MemoryAuditLogger::new();
        let ctx = test_context();

        logger.log(AuditEvent::mutation(&ctx, Table::Courses, MutationOp::Insert, "a", 0));
        logger.log(AuditEvent::access_denied(&ctx, Table::Courses, RlsOperation::Delete, "no"));

        assert_eq!(logger.len(), 2);
        assert_eq!(logger.denials().len(), 1);

        logger.clear();
        assert!(logger.is_empty());
    }

    #[test]
    fn test_null_and_tracing_loggers() {
        let ctx = test_context();
        let mutation = AuditEvent::mutation(&ctx, Table::Profiles, MutationOp::Update, "p", 0);
        let denial = AuditEvent::access_denied(&ctx, Table::Profiles, RlsOperation::Delete, "no");
        NullAuditLogger.log(mutation);
        TracingAuditLogger.log(denial);
    }
}
