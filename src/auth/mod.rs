//! Identity-token verification.
//!
//! Token issuance is delegated to the external identity provider; this
//! module only validates the bearer token and extracts the verified user
//! id. Handlers never trust a client-supplied user id.

use axum::http::HeaderMap;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub aud: String,
    pub exp: i64,
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
}

#[derive(Clone)]
pub struct IdentityVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl IdentityVerifier {
    pub fn new(shared_secret: &str, project_id: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_audience(&[project_id]);
        Self {
            decoding: DecodingKey::from_secret(shared_secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Identity, ApiError> {
        let data = jsonwebtoken::decode::<IdentityClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "identity token rejected");
                ApiError::Authentication
            })?;
        Ok(Identity {
            user_id: data.claims.sub,
        })
    }
}

/// Pull the bearer token out of the Authorization header and verify it.
pub fn require_identity(
    headers: &HeaderMap,
    verifier: &IdentityVerifier,
) -> Result<Identity, ApiError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Authentication)?;
    verifier.verify(token)
}
