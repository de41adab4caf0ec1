//! Request identity: an authenticated user or a guest session.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Resolved owner of a cart or order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Identity {
    User(String),
    Guest(String),
}

impl Identity {
    pub fn user(id: impl Into<String>) -> Self { Self::User(id.into()) }
    pub fn guest(id: impl Into<String>) -> Self { Self::Guest(id.into()) }

    /// Mints a fresh opaque guest session.
    pub fn mint_guest() -> Self { Self::Guest(Uuid::new_v4().simple().to_string()) }

    pub fn kind(&self) -> &'static str {
        match self { Self::User(_) => "user", Self::Guest(_) => "guest" }
    }

    pub fn id(&self) -> &str {
        match self { Self::User(id) | Self::Guest(id) => id }
    }

    pub fn is_user(&self) -> bool { matches!(self, Self::User(_)) }

    /// Rebuilds an identity from its stored `(kind, id)` pair.
    pub fn from_parts(kind: &str, id: impl Into<String>) -> Option<Self> {
        match kind {
            "user" => Some(Self::User(id.into())),
            "guest" => Some(Self::Guest(id.into())),
            _ => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}:{}", self.kind(), self.id()) }
}
