//! # Peer Identities
//!
//! Every endpoint on the bus is addressed by an application `uuid` and a
//! window `name`. Subscriptions filter on the *source* identity and accept
//! the `*` wildcard in either position.

use serde::Deserialize;
use serde::Serialize;

/// Wildcard accepted by [`IdentityFilter`] fields.
pub const WILDCARD: &str = "*";

/// The address of one endpoint on the bus.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub uuid: String,
    pub name: String,
}

impl Identity {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self { uuid: uuid.into(), name: name.into() }
    }

    /// An identity whose window name equals its application uuid.
    pub fn app(uuid: impl Into<String>) -> Self {
        let uuid = uuid.into();
        Self { name: uuid.clone(), uuid }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.uuid, self.name)
    }
}

/// Selects which sources a subscription accepts messages from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityFilter {
    pub uuid: String,
    pub name: String,
}

impl IdentityFilter {
    /// Accepts every source.
    pub fn any() -> Self {
        Self { uuid: WILDCARD.into(), name: WILDCARD.into() }
    }

    /// Accepts every window of one application.
    pub fn app(uuid: impl Into<String>) -> Self {
        Self { uuid: uuid.into(), name: WILDCARD.into() }
    }

    /// Accepts exactly one source.
    pub fn exact(identity: &Identity) -> Self {
        Self { uuid: identity.uuid.clone(), name: identity.name.clone() }
    }

    pub fn matches(&self, source: &Identity) -> bool {
        field_matches(&self.uuid, &source.uuid) && field_matches(&self.name, &source.name)
    }
}

impl Default for IdentityFilter {
    fn default() -> Self {
        Self::any()
    }
}

impl From<&Identity> for IdentityFilter {
    fn from(identity: &Identity) -> Self {
        Self::exact(identity)
    }
}

fn field_matches(pattern: &str, value: &str) -> bool {
    pattern == WILDCARD || pattern == value
}
