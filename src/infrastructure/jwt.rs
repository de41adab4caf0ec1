//! HS256 bearer-token verification.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::ports::{CredentialVerifier, VerifiedUser};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: i64,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation: Validation::new(Algorithm::HS256) }
    }
}

#[async_trait]
impl CredentialVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Option<VerifiedUser> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Some(VerifiedUser {
                user_id: data.claims.sub,
                email: data.claims.email,
                name: data.claims.name,
                roles: data.claims.roles,
            }),
            Err(e) => {
                tracing::debug!(error = %e, "credential rejected, treating request as anonymous");
                None
            }
        }
    }
}
