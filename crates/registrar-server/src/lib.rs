//! Registrar HTTP/JSON API.
//!
//! Exposes the course and student registry over REST. Every request is
//! resolved to a [`SecurityContext`] from its bearer token and served through
//! a row-level-security [`Session`], so callers only ever see and change the
//! rows their policies allow.

pub mod auth;
pub mod config;
pub mod error;
pub mod json;
pub mod routes;

pub use auth::{Caller, JwtAuthenticator};
pub use config::{Args, ServerConfig};
pub use error::{AppError, AppResult};

use std::sync::Arc;

use axum::Router;
use registrar_core::{
    AuditLogger, Database, Error, PolicySet, SecurityContext, Session, TracingAuditLogger,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Data-access layer.
    pub db: Arc<Database>,
    policies: Arc<PolicySet>,
    audit: Arc<dyn AuditLogger>,
    authenticator: Arc<JwtAuthenticator>,
    hook_secret: Option<Arc<str>>,
}

impl AppState {
    /// Create new application state with the standard policies.
    pub fn new(db: Arc<Database>, authenticator: JwtAuthenticator) -> Self {
        Self {
            db,
            policies: Arc::new(PolicySet::standard()),
            audit: Arc::new(TracingAuditLogger),
            authenticator: Arc::new(authenticator),
            hook_secret: None,
        }
    }

    /// Build state from the server configuration.
    pub fn from_config(db: Arc<Database>, config: &ServerConfig) -> Option<Self> {
        let secret = config.jwt_secret.as_deref()?;

        let mut authenticator = JwtAuthenticator::with_secret_str(secret);
        if let Some(issuer) = &config.jwt_issuer {
            authenticator = authenticator.with_issuer(issuer.clone());
        }
        if let Some(audience) = &config.jwt_audience {
            authenticator = authenticator.with_audience(audience.clone());
        }

        let state = Self::new(db, authenticator);
        Some(match &config.hook_secret {
            Some(secret) => state.with_hook_secret(secret.as_str()),
            None => state,
        })
    }

    /// Enable the identity hook with a shared secret.
    pub fn with_hook_secret(mut self, secret: &str) -> Self {
        self.hook_secret = Some(Arc::from(secret));
        self
    }

    /// Replace the audit logger.
    pub fn with_audit_logger(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// Token verifier.
    pub fn authenticator(&self) -> &JwtAuthenticator {
        &self.authenticator
    }

    /// Identity hook secret, if the hook is enabled.
    pub fn hook_secret(&self) -> Option<&str> {
        self.hook_secret.as_deref()
    }

    /// Open an authorized session for a request.
    pub fn session(&self, context: SecurityContext) -> Session<'_> {
        Session::new(&self.db, &self.policies, context, self.audit.as_ref())
    }

    /// Run a session operation on the blocking pool.
    pub async fn run<T, F>(&self, context: SecurityContext, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Session<'_>) -> Result<T, Error> + Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || op(&state.session(context)))
            .await
            .map_err(|e| AppError::Internal(format!("request task failed: {}", e)))?
            .map_err(AppError::from)
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::routes())
        .merge(routes::courses::routes())
        .merge(routes::students::routes())
        .merge(routes::roles::routes())
        .merge(routes::profiles::routes())
        .merge(routes::me::routes())
        .merge(routes::hooks::routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_config() {
        let db = Arc::new(Database::temporary().unwrap());
        let config = ServerConfig::default().temporary();
        assert!(AppState::from_config(db.clone(), &config).is_none());

        let mut config = config.with_jwt_secret("secret").with_hook_secret("hook");
        config.jwt_audience = Some("authenticated".to_string());
        let state = AppState::from_config(db, &config).unwrap();
        assert_eq!(state.hook_secret(), Some("hook"));
        assert_eq!(state.authenticator().authenticate(None).unwrap(), None);
        assert!(state.authenticator().authenticate(Some("Bearer junk")).is_err());
    }
}
