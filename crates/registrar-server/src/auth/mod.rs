//! Request authentication.
//!
//! - **JWT**: bearer tokens issued by the identity provider name the caller
//! - **Hook secret**: identity events from the provider carry a shared secret

mod hook;
mod jwt;

pub use hook::{secrets_match, HookCaller, HOOK_SECRET_HEADER};
pub use jwt::{Audience, JwtAuthenticator, JwtClaims, JwtConfig};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use registrar_core::SecurityContext;

use crate::error::AppError;
use crate::AppState;

/// Header a client may send to correlate audit events with its own logs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Security context of the calling client.
///
/// A request without credentials is anonymous. A request with a bad token
/// is rejected outright.
#[derive(Debug, Clone)]
pub struct Caller(pub SecurityContext);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(AUTHORIZATION)
            .map(|value| {
                value.to_str().map_err(|_| {
                    AppError::Unauthenticated("malformed authorization header".to_string())
                })
            })
            .transpose()?;

        let identity = state
            .authenticator()
            .authenticate(authorization)
            .map_err(|e| AppError::Unauthenticated(e.to_string()))?;

        let mut context = SecurityContext::new(identity);
        if let Some(request_id) = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
        {
            context = context.with_request_id(request_id);
        }

        Ok(Caller(context))
    }
}
