use crate::core::{
    id::Id,
    uri::Uri,
};

/// The identity of an authenticated session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The authentication ID the client was actually authenticated as.
    pub authid: String,
    /// The authentication role the client was authenticated for.
    pub authrole: String,
    /// The method that produced the identity.
    pub authmethod: String,
    /// The provider that vouched for the identity.
    pub authprovider: String,
    /// The realm the identity belongs to.
    pub realm: Uri,
}

impl Identity {
    /// The identity assigned to sessions that offer no authentication.
    pub fn anonymous(realm: Uri) -> Self {
        Self {
            authid: "anonymous".to_owned(),
            authrole: "anonymous".to_owned(),
            authmethod: "anonymous".to_owned(),
            authprovider: "anonymous".to_owned(),
            realm,
        }
    }
}

/// A snapshot of an established session, as seen by authorizers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// The session ID.
    pub session: Id,
    /// The identity the session authenticated as.
    pub identity: Identity,
}
