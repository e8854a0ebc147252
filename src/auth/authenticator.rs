use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    auth::identity::Identity,
    core::id::Id,
    message::message::{
        AuthenticateMessage,
        ChallengeMessage,
        HelloMessage,
    },
};

/// Connection-scoped context handed to authenticators.
#[derive(Debug, Default, Clone)]
pub struct AuthContext {
    /// The session ID assigned to the connection.
    pub session_id: Id,
    /// The opaque cookie presented at connection time, if any.
    pub cookie: Option<String>,
}

/// A single authentication strategy.
///
/// Authenticators are collected into an [`AuthenticatorChain`] and consulted
/// in `order()` order. Every hook is fallible; a failure is reported to the
/// client as an authentication error.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// The WAMP authentication method name (e.g. `ticket`).
    fn auth_method(&self) -> &str;

    /// Position in the chain. Lower runs first.
    fn order(&self) -> i32 {
        0
    }

    /// Produces the CHALLENGE for a HELLO that offered this method.
    ///
    /// Returning `None` passes the HELLO on to the next matching
    /// authenticator.
    async fn create_challenge(
        &self,
        context: &AuthContext,
        hello: &HelloMessage,
    ) -> Result<Option<ChallengeMessage>>;

    /// Verifies an AUTHENTICATE against the challenge this authenticator
    /// issued. `None` means the proof was rejected.
    async fn authenticate_challenge_response(
        &self,
        context: &AuthContext,
        hello: &HelloMessage,
        challenge: &ChallengeMessage,
        authenticate: &AuthenticateMessage,
    ) -> Result<Option<Identity>>;

    /// Attempts to authenticate the HELLO directly, with no challenge round
    /// trip (e.g. a previously-stored cookie).
    async fn authenticate_on_hello(
        &self,
        _context: &AuthContext,
        _hello: &HelloMessage,
    ) -> Result<Option<Identity>> {
        Ok(None)
    }

    /// Invoked after a session authenticates successfully, whichever
    /// authenticator produced the identity.
    async fn on_successful_authenticate(
        &self,
        _context: &AuthContext,
        _identity: &Identity,
    ) -> Result<()> {
        Ok(())
    }
}

/// An ordered chain of [`Authenticator`]s.
///
/// For a given HELLO, only authenticators whose method appears in the HELLO's
/// `authmethods` are consulted, in `order()` order.
#[derive(Default)]
pub struct AuthenticatorChain {
    authenticators: Vec<Arc<dyn Authenticator>>,
}

impl AuthenticatorChain {
    /// Adds an authenticator, keeping the chain sorted by order.
    pub fn add(&mut self, authenticator: Arc<dyn Authenticator>) {
        self.authenticators.push(authenticator);
        self.authenticators
            .sort_by_key(|authenticator| authenticator.order());
    }

    /// Whether any authenticator is installed.
    pub fn is_empty(&self) -> bool {
        self.authenticators.is_empty()
    }

    fn matching(&self, hello: &HelloMessage) -> Vec<Arc<dyn Authenticator>> {
        let offered = hello.auth_methods();
        self.authenticators
            .iter()
            .filter(|authenticator| {
                offered
                    .iter()
                    .any(|method| method == authenticator.auth_method())
            })
            .cloned()
            .collect()
    }

    /// Attempts challenge-free authentication of the HELLO.
    pub async fn authenticate_on_hello(
        &self,
        context: &AuthContext,
        hello: &HelloMessage,
    ) -> Result<Option<Identity>> {
        for authenticator in self.matching(hello) {
            if let Some(identity) = authenticator.authenticate_on_hello(context, hello).await? {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }

    /// Produces the first non-empty CHALLENGE for the HELLO.
    pub async fn create_challenge(
        &self,
        context: &AuthContext,
        hello: &HelloMessage,
    ) -> Result<Option<ChallengeMessage>> {
        for authenticator in self.matching(hello) {
            if let Some(challenge) = authenticator.create_challenge(context, hello).await? {
                return Ok(Some(challenge));
            }
        }
        Ok(None)
    }

    /// Verifies an AUTHENTICATE against every matching authenticator, in
    /// order. The first identity produced wins; `None` means the whole chain
    /// rejected the proof.
    pub async fn authenticate_challenge_response(
        &self,
        context: &AuthContext,
        hello: &HelloMessage,
        challenge: &ChallengeMessage,
        authenticate: &AuthenticateMessage,
    ) -> Result<Option<Identity>> {
        for authenticator in self.matching(hello) {
            if let Some(identity) = authenticator
                .authenticate_challenge_response(context, hello, challenge, authenticate)
                .await?
            {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }

    /// Runs the post-authentication hook on every authenticator.
    pub async fn on_successful_authenticate(
        &self,
        context: &AuthContext,
        identity: &Identity,
    ) -> Result<()> {
        for authenticator in &self.authenticators {
            authenticator
                .on_successful_authenticate(context, identity)
                .await?;
        }
        Ok(())
    }
}
