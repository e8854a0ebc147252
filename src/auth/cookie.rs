use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::lock::Mutex;

use crate::{
    auth::{
        authenticator::{
            AuthContext,
            Authenticator,
        },
        identity::Identity,
    },
    core::hash::HashMap,
    message::message::{
        AuthenticateMessage,
        ChallengeMessage,
        HelloMessage,
    },
};

/// Storage for cookie-to-identity mappings.
///
/// The router does not mint cookies. The embedding transport layer assigns
/// them (e.g. as HTTP cookies during the handshake) and presents them at
/// connection time; the store remembers which identity a cookie last
/// authenticated as.
#[async_trait]
pub trait CookieStore: Send + Sync {
    /// Looks up the identity previously bound to the cookie.
    async fn lookup(&self, cookie: &str) -> Result<Option<Identity>>;

    /// Binds the cookie to an identity.
    async fn store(&self, cookie: &str, identity: &Identity) -> Result<()>;
}

/// An in-memory [`CookieStore`]. Bindings do not survive process restart.
#[derive(Default)]
pub struct MemoryCookieStore {
    cookies: Mutex<HashMap<String, Identity>>,
}

#[async_trait]
impl CookieStore for MemoryCookieStore {
    async fn lookup(&self, cookie: &str) -> Result<Option<Identity>> {
        Ok(self.cookies.lock().await.get(cookie).cloned())
    }

    async fn store(&self, cookie: &str, identity: &Identity) -> Result<()> {
        self.cookies
            .lock()
            .await
            .insert(cookie.to_owned(), identity.clone());
        Ok(())
    }
}

/// An [`Authenticator`] that silently re-authenticates a returning connection
/// by its cookie, with no challenge round trip.
///
/// Runs before interactive methods, and records every successful
/// authentication against the connection's cookie so later reconnects skip
/// the challenge.
pub struct CookieAuthenticator {
    store: Arc<dyn CookieStore>,
}

impl CookieAuthenticator {
    pub fn new(store: Arc<dyn CookieStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Authenticator for CookieAuthenticator {
    fn auth_method(&self) -> &str {
        "cookie"
    }

    fn order(&self) -> i32 {
        -1
    }

    async fn create_challenge(
        &self,
        _: &AuthContext,
        _: &HelloMessage,
    ) -> Result<Option<ChallengeMessage>> {
        // Cookies never challenge; they either match on HELLO or stay out of
        // the way.
        Ok(None)
    }

    async fn authenticate_challenge_response(
        &self,
        _: &AuthContext,
        _: &HelloMessage,
        _: &ChallengeMessage,
        _: &AuthenticateMessage,
    ) -> Result<Option<Identity>> {
        Ok(None)
    }

    async fn authenticate_on_hello(
        &self,
        context: &AuthContext,
        _: &HelloMessage,
    ) -> Result<Option<Identity>> {
        match &context.cookie {
            Some(cookie) => self.store.lookup(cookie).await,
            None => Ok(None),
        }
    }

    async fn on_successful_authenticate(
        &self,
        context: &AuthContext,
        identity: &Identity,
    ) -> Result<()> {
        if let Some(cookie) = &context.cookie {
            self.store.store(cookie, identity).await?;
        }
        Ok(())
    }
}
