//! Identity resolution: a valid credential wins, otherwise the caller's guest session.

use std::sync::Arc;

use crate::domain::Identity;
use crate::ports::{CredentialVerifier, VerifiedUser};
use crate::{EcommerceError, Result};

const MAX_SESSION_ID_LEN: usize = 128;

/// Raw identity material carried by a request.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub bearer: Option<String>,
    pub session_id: Option<String>,
}

impl Credentials {
    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref().map(str::trim).filter(|s| !s.is_empty() && s.len() <= MAX_SESSION_ID_LEN)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub identity: Identity,
    /// Present when a credential verified.
    pub user: Option<VerifiedUser>,
    /// The guest session was minted for this request and must be handed back to the client.
    pub minted: bool,
}

impl ResolvedIdentity {
    pub fn email(&self) -> Option<&str> { self.user.as_ref().and_then(|u| u.email.as_deref()) }
    pub fn is_admin(&self) -> bool { self.user.as_ref().is_some_and(VerifiedUser::is_admin) }
}

#[derive(Clone)]
pub struct IdentityResolver {
    verifier: Arc<dyn CredentialVerifier>,
}

impl IdentityResolver {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self { Self { verifier } }

    /// Never fails: an invalid or expired credential falls back to the guest session,
    /// and a request with no session gets a freshly minted one.
    pub async fn resolve(&self, creds: &Credentials) -> ResolvedIdentity {
        if let Some(user) = self.verify(creds).await {
            return ResolvedIdentity { identity: Identity::user(user.user_id.clone()), user: Some(user), minted: false };
        }
        match creds.session_id() {
            Some(session) => ResolvedIdentity { identity: Identity::guest(session), user: None, minted: false },
            None => ResolvedIdentity { identity: Identity::mint_guest(), user: None, minted: true },
        }
    }

    /// Like `resolve`, but a mutation must name an existing owner.
    pub async fn resolve_for_mutation(&self, creds: &Credentials) -> Result<ResolvedIdentity> {
        let resolved = self.resolve(creds).await;
        if resolved.minted {
            return Err(EcommerceError::MissingSessionIdentity);
        }
        Ok(resolved)
    }

    /// Both identities at the sign-in boundary: the verified user and the guest session they came from.
    pub async fn resolve_transfer(&self, creds: &Credentials) -> Result<(Identity, Identity)> {
        let user = self.verify(creds).await.ok_or(EcommerceError::Forbidden)?;
        let session = creds.session_id().ok_or(EcommerceError::MissingSessionIdentity)?;
        Ok((Identity::guest(session), Identity::user(user.user_id)))
    }

    async fn verify(&self, creds: &Credentials) -> Option<VerifiedUser> {
        match creds.bearer.as_deref() {
            Some(token) if !token.is_empty() => self.verifier.verify(token).await,
            _ => None,
        }
    }
}
