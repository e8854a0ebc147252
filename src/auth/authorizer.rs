use std::fmt::Display;

use async_trait::async_trait;

use crate::{
    auth::identity::SessionInfo,
    core::pattern::UriPattern,
};

/// An action a session may attempt against a URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Publish,
    Subscribe,
    Register,
    Call,
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Publish => write!(f, "publish"),
            Self::Subscribe => write!(f, "subscribe"),
            Self::Register => write!(f, "register"),
            Self::Call => write!(f, "call"),
        }
    }
}

/// The outcome of an authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permission {
    /// Whether the action may proceed.
    pub allow: bool,
    /// Whether the session identity may be disclosed to other parties.
    pub disclose: bool,
    /// Whether the decision may be cached by the caller.
    pub cache: bool,
}

impl Permission {
    /// Full denial, the default for anything no authorizer claims.
    pub fn deny() -> Self {
        Self {
            allow: false,
            disclose: false,
            cache: false,
        }
    }

    /// Full approval.
    pub fn allow() -> Self {
        Self {
            allow: true,
            disclose: true,
            cache: true,
        }
    }
}

/// A policy deciding what sessions may do within one URI pattern's scope.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Decides whether the session may perform the action against the URI.
    async fn authorize(&self, session: &SessionInfo, uri: &str, action: Action) -> Permission;
}

/// An [`Authorizer`] that allows everything for any session.
///
/// Careful: within its pattern's scope, this means no protection at all.
#[derive(Debug, Default)]
pub struct AuthorizeEverything {}

#[async_trait]
impl Authorizer for AuthorizeEverything {
    async fn authorize(&self, _: &SessionInfo, _: &str, _: Action) -> Permission {
        Permission::allow()
    }
}

/// An [`Authorizer`] that allows everything for authenticated sessions and
/// nothing for anonymous ones.
#[derive(Debug, Default)]
pub struct AuthorizeAuthenticated {}

#[async_trait]
impl Authorizer for AuthorizeAuthenticated {
    async fn authorize(&self, session: &SessionInfo, _: &str, _: Action) -> Permission {
        if session.identity.authrole == "anonymous" {
            Permission::deny()
        } else {
            Permission::allow()
        }
    }
}

struct ScopedAuthorizer {
    pattern: UriPattern,
    authorizer: Box<dyn Authorizer>,
}

/// An ordered list of pattern-scoped [`Authorizer`]s.
///
/// The first authorizer whose pattern matches the URI decides; a URI no
/// pattern claims is denied outright.
#[derive(Default)]
pub struct AuthorizerChain {
    authorizers: Vec<ScopedAuthorizer>,
}

impl AuthorizerChain {
    /// Appends an authorizer scoped to the given pattern.
    pub fn add(&mut self, pattern: UriPattern, authorizer: Box<dyn Authorizer>) {
        self.authorizers.push(ScopedAuthorizer {
            pattern,
            authorizer,
        });
    }

    /// Decides whether the session may perform the action against the URI.
    pub async fn authorize(&self, session: &SessionInfo, uri: &str, action: Action) -> Permission {
        match self
            .authorizers
            .iter()
            .find(|scoped| scoped.pattern.matches(uri))
        {
            Some(scoped) => scoped.authorizer.authorize(session, uri, action).await,
            None => Permission::deny(),
        }
    }
}
