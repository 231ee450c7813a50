//! Shared-secret check for identity events sent by the auth provider.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::AppState;

/// Header carrying the hook secret.
pub const HOOK_SECRET_HEADER: &str = "x-registrar-hook-secret";

/// Proof that a request came from the auth provider.
#[derive(Debug, Clone, Copy)]
pub struct HookCaller;

/// Compare two secrets without short-circuiting on the first mismatch.
pub fn secrets_match(expected: &[u8], presented: &[u8]) -> bool {
    if expected.len() != presented.len() {
        return false;
    }
    expected
        .iter()
        .zip(presented)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[async_trait]
impl FromRequestParts<AppState> for HookCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.hook_secret() else {
            return Err(AppError::NotFound("identity hook is disabled".to_string()));
        };

        let presented = parts
            .headers
            .get(HOOK_SECRET_HEADER)
            .map(|value| value.as_bytes())
            .unwrap_or_default();

        if secrets_match(expected.as_bytes(), presented) {
            Ok(HookCaller)
        } else {
            tracing::warn!("identity hook called with a bad secret");
            Err(AppError::Unauthenticated("invalid hook secret".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match(b"s3cret", b"s3cret"));
        assert!(!secrets_match(b"s3cret", b"s3cre7"));
        assert!(!secrets_match(b"s3cret", b"s3cret!"));
        assert!(!secrets_match(b"s3cret", b""));
    }
}
