//! JWT (JSON Web Token) based authentication.
//!
//! The identity provider signs access tokens with a shared HMAC secret. The
//! `sub` claim carries the identity id that row-level policies match against.
//!
//! # Example JWT Payload
//!
//! ```json
//! {
//!   "sub": "5b0c1d9e-5f3a-4f53-9f2e-3a6f1f0c2b7d",
//!   "email": "neo@example.com",
//!   "exp": 1735689600,
//!   "iat": 1735603200,
//!   "iss": "registrar-auth"
//! }
//! ```

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use registrar_core::{SecurityError, SecurityResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (identity id).
    pub sub: String,

    /// Expiration time (Unix timestamp).
    pub exp: u64,

    /// Issued at time (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    /// Email of the identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// The `aud` claim, which issuers send either as one string or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    /// Whether the audience names `aud`.
    pub fn contains(&self, aud: &str) -> bool {
        match self {
            Audience::One(one) => one == aud,
            Audience::Many(many) => many.iter().any(|a| a == aud),
        }
    }
}

/// JWT authenticator configuration.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Algorithm to use for verification.
    pub algorithm: Algorithm,

    /// Whether to validate expiration.
    pub validate_exp: bool,

    /// Required issuer (if any).
    pub required_issuer: Option<String>,

    /// Required audience (if any).
    pub required_audience: Option<String>,

    /// Leeway in seconds for expiration check.
    pub leeway_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            validate_exp: true,
            required_issuer: None,
            required_audience: None,
            leeway_secs: 60,
        }
    }
}

/// Verifies bearer tokens and resolves the identity they carry.
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    config: JwtConfig,
}

impl JwtAuthenticator {
    /// Create a new JWT authenticator with HMAC secret.
    pub fn with_secret(secret: &[u8]) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            config: JwtConfig::default(),
        }
    }

    /// Create a new JWT authenticator with HMAC secret string.
    pub fn with_secret_str(secret: &str) -> Self {
        Self::with_secret(secret.as_bytes())
    }

    /// Set the required issuer for validation.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.required_issuer = Some(issuer.into());
        self
    }

    /// Set the required audience for validation.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.config.required_audience = Some(audience.into());
        self
    }

    /// Disable expiration validation (not recommended for production).
    pub fn without_exp_validation(mut self) -> Self {
        self.config.validate_exp = false;
        self
    }

    /// Verify a JWT token and extract claims.
    pub fn verify_token(&self, token: &str) -> SecurityResult<JwtClaims> {
        let mut validation = Validation::new(self.config.algorithm);
        validation.leeway = self.config.leeway_secs;
        validation.validate_exp = self.config.validate_exp;
        if !self.config.validate_exp {
            validation.required_spec_claims.remove("exp");
        }

        if let Some(ref iss) = self.config.required_issuer {
            validation.set_issuer(&[iss]);
        }

        match self.config.required_audience {
            Some(ref aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<JwtClaims>(token, &self.decoding_key, &validation).map_err(
            |e| SecurityError::AuthenticationFailed(format!("JWT verification failed: {}", e)),
        )?;

        Ok(token_data.claims)
    }

    /// Get the identity id from a token.
    pub fn identity(&self, token: &str) -> SecurityResult<Uuid> {
        let claims = self.verify_token(token)?;
        Uuid::parse_str(&claims.sub).map_err(|_| {
            SecurityError::AuthenticationFailed(format!(
                "token subject is not an identity id: {}",
                claims.sub
            ))
        })
    }

    /// Resolve the identity behind an `Authorization` header value.
    ///
    /// No header means an anonymous caller. A header that is present but
    /// malformed or unverifiable is an authentication failure.
    pub fn authenticate(&self, authorization: Option<&str>) -> SecurityResult<Option<Uuid>> {
        let Some(header) = authorization else {
            return Ok(None);
        };

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| {
                SecurityError::AuthenticationFailed("expected a bearer token".to_string())
            })?
            .trim();

        self.identity(token).map(Some)
    }
}
