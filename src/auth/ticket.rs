use anyhow::Result;
use async_trait::async_trait;

use crate::{
    auth::{
        authenticator::{
            AuthContext,
            Authenticator,
        },
        identity::Identity,
    },
    core::{
        hash::HashMap,
        types::Dictionary,
    },
    message::message::{
        AuthenticateMessage,
        ChallengeMessage,
        HelloMessage,
    },
};

/// One entry in a static ticket table.
#[derive(Debug, Clone)]
pub struct TicketUser {
    pub login: String,
    pub password: String,
    pub role: String,
}

/// An [`Authenticator`] backed by a static table of login/password/role
/// entries, implementing the WAMP `ticket` method.
///
/// Tickets travel in the clear, so this is only as strong as the transport
/// carrying them.
pub struct TicketAuthenticator {
    users: HashMap<String, TicketUser>,
}

impl TicketAuthenticator {
    pub fn new<I>(users: I) -> Self
    where
        I: IntoIterator<Item = TicketUser>,
    {
        Self {
            users: users
                .into_iter()
                .map(|user| (user.login.clone(), user))
                .collect(),
        }
    }
}

#[async_trait]
impl Authenticator for TicketAuthenticator {
    fn auth_method(&self) -> &str {
        "ticket"
    }

    async fn create_challenge(
        &self,
        _: &AuthContext,
        _: &HelloMessage,
    ) -> Result<Option<ChallengeMessage>> {
        Ok(Some(ChallengeMessage {
            auth_method: self.auth_method().to_owned(),
            extra: Dictionary::default(),
        }))
    }

    async fn authenticate_challenge_response(
        &self,
        _: &AuthContext,
        hello: &HelloMessage,
        _: &ChallengeMessage,
        authenticate: &AuthenticateMessage,
    ) -> Result<Option<Identity>> {
        let authid = match hello.authid() {
            Some(authid) => authid,
            None => return Ok(None),
        };
        let user = match self.users.get(authid) {
            Some(user) => user,
            None => return Ok(None),
        };
        if user.password != authenticate.signature {
            return Ok(None);
        }
        Ok(Some(Identity {
            authid: user.login.clone(),
            authrole: user.role.clone(),
            authmethod: self.auth_method().to_owned(),
            authprovider: "static".to_owned(),
            realm: hello.realm.clone(),
        }))
    }
}
