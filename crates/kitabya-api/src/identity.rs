use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use thiserror::Error;

use kitabya_types::api::IdentityClaims;

/// Who the identity provider says the caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid credential: {0}")]
    Invalid(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Maps an opaque bearer credential to a verified identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<VerifiedIdentity, IdentityError>;
}

/// Verifies HS256 tokens signed with a shared secret.
pub struct JwtIdentityResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn verify(&self, credential: &str) -> Result<VerifiedIdentity, IdentityError> {
        let token_data = decode::<IdentityClaims>(credential, &self.key, &self.validation)
            .map_err(|e| IdentityError::Invalid(e.to_string()))?;
        let claims = token_data.claims;

        if claims.sub.trim().is_empty() || !claims.email.contains('@') {
            return Err(IdentityError::Invalid("token lacks subject or email".into()));
        }

        Ok(VerifiedIdentity {
            subject: claims.sub,
            email: claims.email.to_lowercase(),
            name: claims.name,
            picture: claims.picture,
        })
    }
}
