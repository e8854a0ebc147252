use std::{
    fmt::Debug,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

use anyhow::{
    Error,
    Result,
};
use futures_util::lock::Mutex;
use log::{
    debug,
    warn,
};
use tokio::sync::{
    mpsc::UnboundedSender,
    RwLock,
};

use crate::{
    auth::{
        authenticator::AuthContext,
        authorizer::Action,
        identity::{
            Identity,
            SessionInfo,
        },
    },
    core::{
        error::InteractionError,
        hash::HashMap,
        id::Id,
        types::{
            Dictionary,
            Integer,
            Value,
        },
        uri::Uri,
    },
    message::{
        common::{
            error_for_request,
            goodbye_and_out,
        },
        message::{
            AuthenticateMessage,
            CallMessage,
            ChallengeMessage,
            ErrorMessage,
            HelloMessage,
            Message,
            PublishMessage,
            PublishedMessage,
            RegisterMessage,
            RegisteredMessage,
            SubscribeMessage,
            SubscribedMessage,
            UnregisterMessage,
            UnregisteredMessage,
            UnsubscribeMessage,
            UnsubscribedMessage,
            WelcomeMessage,
        },
    },
    router::{
        registrations::PatternOptions,
        router::Router,
    },
};

/// A continuation run when the reply to an outbound request arrives (or the
/// request expires).
pub type ReplyCallback = Box<dyn FnOnce(Message) + Send>;

struct PendingRequest {
    request_type: Integer,
    callback: ReplyCallback,
}

/// A cheap, cloneable handle to a session, held by the registration table for
/// remote dispatch.
///
/// The handle stays valid after the session dies; `closed` reports liveness
/// so holders can reap lazily on touch.
#[derive(Clone)]
pub struct SessionHandle {
    id: Id,
    message_tx: UnboundedSender<Message>,
    pending: Arc<Mutex<HashMap<Id, PendingRequest>>>,
    closed: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl SessionHandle {
    /// The session ID.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Whether the session is no longer able to receive messages.
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.message_tx.is_closed()
    }

    /// Sends a message outbound over the session.
    pub fn send_message(&self, message: Message) -> Result<()> {
        self.message_tx.send(message).map_err(Error::new)
    }

    /// Sends a request outbound and stores a continuation for its reply.
    ///
    /// The continuation runs exactly once: with the correlated reply, or with
    /// a timeout ERROR if no reply arrives within the request timeout.
    pub async fn send_and_await_response(
        &self,
        request: Message,
        callback: ReplyCallback,
    ) -> Result<()> {
        if self.closed() {
            return Err(Error::msg("session is disconnected"));
        }
        let request_id = request
            .request_id()
            .ok_or_else(|| Error::msg("message has no request id to await"))?;
        let request_type = request.tag();
        self.pending.lock().await.insert(
            request_id,
            PendingRequest {
                request_type,
                callback,
            },
        );
        if let Err(err) = self.send_message(request) {
            self.pending.lock().await.remove(&request_id);
            return Err(err);
        }

        let pending = self.pending.clone();
        let timeout = self.request_timeout;
        let session_id = self.id;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = pending.lock().await.remove(&request_id);
            if let Some(expired) = expired {
                debug!("Request {request_id} on session {session_id} timed out");
                let error: Error = InteractionError::Timeout.into();
                (expired.callback)(Message::Error(ErrorMessage {
                    request_type: expired.request_type,
                    request: request_id,
                    details: Dictionary::from_iter([(
                        "message".to_owned(),
                        Value::String(error.to_string()),
                    )]),
                    error: Uri::for_error(&error),
                    ..Default::default()
                }));
            }
        });
        Ok(())
    }

    /// Correlates an inbound message against the pending-request map.
    ///
    /// If a pending request matches the message's request ID, its continuation
    /// consumes the message; otherwise the message is forwarded outbound over
    /// the session.
    pub async fn dispatch_to_awaiting(&self, message: Message) -> Result<()> {
        let pending = match message.request_id() {
            Some(request_id) => self.pending.lock().await.remove(&request_id),
            None => None,
        };
        match pending {
            Some(pending) => {
                (pending.callback)(message);
                Ok(())
            }
            None => self.send_message(message),
        }
    }
}

enum SessionState {
    Connecting,
    Authenticating {
        hello: HelloMessage,
        challenge: ChallengeMessage,
    },
    Connected {
        identity: Identity,
    },
    Disconnected,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Authenticating { .. } => "authenticating",
            Self::Connected { .. } => "connected",
            Self::Disconnected => "disconnected",
        }
    }

    fn allowed_state_transition(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Connecting, Self::Authenticating { .. }) => true,
            (Self::Connecting, Self::Connected { .. }) => true,
            (Self::Authenticating { .. }, Self::Connected { .. }) => true,
            (_, Self::Disconnected) => !matches!(self, Self::Disconnected),
            _ => false,
        }
    }
}

impl Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The router end of a WAMP session.
///
/// Handles WAMP messages in a state machine and owns the pending-request
/// correlation map shared with its handles.
pub struct Session {
    id: Id,
    cookie: Option<String>,
    message_tx: UnboundedSender<Message>,
    state: RwLock<SessionState>,
    pending: Arc<Mutex<HashMap<Id, PendingRequest>>>,
    closed: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl Session {
    /// Creates a new session writing outbound messages to the given channel.
    pub fn new(
        id: Id,
        message_tx: UnboundedSender<Message>,
        cookie: Option<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            id,
            cookie,
            message_tx,
            state: RwLock::new(SessionState::Connecting),
            pending: Arc::new(Mutex::new(HashMap::default())),
            closed: Arc::new(AtomicBool::new(false)),
            request_timeout,
        }
    }

    /// The session ID.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Generates a handle to the session, which can be saved separately from the session's
    /// lifecycle.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            message_tx: self.message_tx.clone(),
            pending: self.pending.clone(),
            closed: self.closed.clone(),
            request_timeout: self.request_timeout,
        }
    }

    /// Whether the session reached its terminal state.
    pub async fn disconnected(&self) -> bool {
        matches!(*self.state.read().await, SessionState::Disconnected)
    }

    /// The authorization-facing snapshot of the session, once connected.
    pub async fn session_info(&self) -> Option<SessionInfo> {
        match &*self.state.read().await {
            SessionState::Connected { identity } => Some(SessionInfo {
                session: self.id,
                identity: identity.clone(),
            }),
            _ => None,
        }
    }

    fn auth_context(&self) -> AuthContext {
        AuthContext {
            session_id: self.id,
            cookie: self.cookie.clone(),
        }
    }

    fn send_message(&self, message: Message) -> Result<()> {
        self.message_tx.send(message).map_err(Error::new)
    }

    async fn transition_state(&self, next: SessionState) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.allowed_state_transition(&next) {
            return Err(Error::msg(format!(
                "invalid state transition from {} to {}",
                state.name(),
                next.name(),
            )));
        }
        debug!(
            "Session {} moved from {} to {}",
            self.id,
            state.name(),
            next.name()
        );
        *state = next;
        Ok(())
    }

    /// Handles a message over the session state machine.
    ///
    /// Client mistakes never escape as errors; they are reported back to the
    /// peer as protocol ERRORs. An `Err` out of this method means the session
    /// itself is no longer usable.
    pub async fn handle_message(&self, router: &Router, message: Message) -> Result<()> {
        debug!("Received message for session {}: {message:?}", self.id);
        // Snapshot the state discriminant, so that handling the message does
        // not hold the state lock.
        let mut connecting = false;
        let mut authenticating = false;
        let mut connected = false;
        match &*self.state.read().await {
            SessionState::Connecting => connecting = true,
            SessionState::Authenticating { .. } => authenticating = true,
            SessionState::Connected { .. } => connected = true,
            SessionState::Disconnected => (),
        }

        if connecting {
            self.handle_connecting(router, message).await
        } else if authenticating {
            self.handle_authenticating(router, message).await
        } else if connected {
            self.handle_connected(router, message).await
        } else {
            warn!(
                "Dropped {} message on disconnected session {}",
                message.message_name(),
                self.id
            );
            Ok(())
        }
    }

    async fn handle_connecting(&self, router: &Router, message: Message) -> Result<()> {
        match message {
            ref message @ Message::Hello(ref hello_message) => {
                if let Err(err) = self.handle_hello(router, hello_message).await {
                    return self.send_message(error_for_request(message, &err));
                }
                Ok(())
            }
            Message::Abort(_) => self.transition_state(SessionState::Disconnected).await,
            message => self.send_message(error_for_request(
                &message,
                &InteractionError::ProtocolViolation(format!(
                    "received {} message before session establishment",
                    message.message_name()
                ))
                .into(),
            )),
        }
    }

    async fn handle_authenticating(&self, router: &Router, message: Message) -> Result<()> {
        match message {
            ref message @ Message::Authenticate(ref authenticate_message) => {
                if let Err(err) = self.handle_authenticate(router, authenticate_message).await {
                    return self.send_message(error_for_request(message, &err));
                }
                Ok(())
            }
            Message::Abort(_) => self.transition_state(SessionState::Disconnected).await,
            Message::Goodbye(_) => {
                self.send_message(goodbye_and_out())?;
                self.transition_state(SessionState::Disconnected).await
            }
            message => self.send_message(error_for_request(
                &message,
                &InteractionError::ProtocolViolation(format!(
                    "received {} message while awaiting authentication",
                    message.message_name()
                ))
                .into(),
            )),
        }
    }

    async fn handle_connected(&self, router: &Router, message: Message) -> Result<()> {
        match message {
            Message::Abort(ref abort_message) => {
                warn!(
                    "Session {} aborted by peer: {}",
                    self.id, abort_message.reason
                );
                self.transition_state(SessionState::Disconnected).await
            }
            Message::Goodbye(_) => {
                self.send_message(goodbye_and_out())?;
                self.transition_state(SessionState::Disconnected).await
            }
            ref message @ Message::Subscribe(ref subscribe_message) => {
                if let Err(err) = self.handle_subscribe(router, subscribe_message).await {
                    return self.send_message(error_for_request(message, &err));
                }
                Ok(())
            }
            ref message @ Message::Unsubscribe(ref unsubscribe_message) => {
                if let Err(err) = self.handle_unsubscribe(router, unsubscribe_message).await {
                    return self.send_message(error_for_request(message, &err));
                }
                Ok(())
            }
            ref message @ Message::Publish(ref publish_message) => {
                if let Err(err) = self.handle_publish(router, publish_message).await {
                    return self.send_message(error_for_request(message, &err));
                }
                Ok(())
            }
            ref message @ Message::Register(ref register_message) => {
                if let Err(err) = self.handle_register(router, register_message).await {
                    return self.send_message(error_for_request(message, &err));
                }
                Ok(())
            }
            ref message @ Message::Unregister(ref unregister_message) => {
                if let Err(err) = self.handle_unregister(router, unregister_message).await {
                    return self.send_message(error_for_request(message, &err));
                }
                Ok(())
            }
            ref message @ Message::Call(ref call_message) => {
                if let Err(err) = self.handle_call(router, call_message).await {
                    return self.send_message(error_for_request(message, &err));
                }
                Ok(())
            }
            // Replies from a callee: satisfy the pending invocation, or pass
            // the message along if nothing awaits it.
            message @ (Message::Yield(_) | Message::Error(_)) => {
                self.handle().dispatch_to_awaiting(message).await
            }
            message @ (Message::Hello(_) | Message::Authenticate(_)) => self.send_message(
                error_for_request(
                    &message,
                    &InteractionError::ProtocolViolation(format!(
                        "received {} message on an established session",
                        message.message_name()
                    ))
                    .into(),
                ),
            ),
            message => self.handle_unknown(router, message).await,
        }
    }

    /// The catch-all for message types with no handler in the current state.
    async fn handle_unknown(&self, router: &Router, message: Message) -> Result<()> {
        warn!(
            "No handler for {} message on session {}",
            message.message_name(),
            self.id
        );
        if router.config().forward_unknown_messages {
            self.handle().dispatch_to_awaiting(message).await
        } else {
            Ok(())
        }
    }

    async fn handle_hello(&self, router: &Router, message: &HelloMessage) -> Result<()> {
        if message.realm != router.config().realm {
            return Err(InteractionError::NoSuchRealm.into());
        }

        // A HELLO that offers no authentication methods is anonymous.
        if message.auth_methods().is_empty() {
            let identity = Identity::anonymous(message.realm.clone());
            return self.welcome(router, identity).await;
        }

        let context = self.auth_context();
        let authenticators = router.authenticators().read().await;
        if let Some(identity) = authenticators
            .authenticate_on_hello(&context, message)
            .await?
        {
            authenticators
                .on_successful_authenticate(&context, &identity)
                .await?;
            return self.welcome(router, identity).await;
        }

        match authenticators.create_challenge(&context, message).await? {
            Some(challenge) => {
                self.transition_state(SessionState::Authenticating {
                    hello: message.clone(),
                    challenge: challenge.clone(),
                })
                .await?;
                self.send_message(Message::Challenge(challenge))
            }
            None => Err(InteractionError::AuthenticationFailed(
                "no authentication scheme found".to_owned(),
            )
            .into()),
        }
    }

    async fn handle_authenticate(
        &self,
        router: &Router,
        message: &AuthenticateMessage,
    ) -> Result<()> {
        let (hello, challenge) = match &*self.state.read().await {
            SessionState::Authenticating {
                hello,
                challenge,
            } => (hello.clone(), challenge.clone()),
            _ => {
                return Err(InteractionError::ProtocolViolation(
                    "received AUTHENTICATE without a pending challenge".to_owned(),
                )
                .into())
            }
        };

        // Any matching authenticator may accept the proof, not just the one
        // that issued the challenge.
        let context = self.auth_context();
        let authenticators = router.authenticators().read().await;
        match authenticators
            .authenticate_challenge_response(&context, &hello, &challenge, message)
            .await?
        {
            Some(identity) => {
                authenticators
                    .on_successful_authenticate(&context, &identity)
                    .await?;
                self.welcome(router, identity).await
            }
            // The session stays in the authenticating state, so the peer may
            // retry.
            None => Err(InteractionError::AuthenticationFailed(
                "invalid signature".to_owned(),
            )
            .into()),
        }
    }

    async fn welcome(&self, router: &Router, identity: Identity) -> Result<()> {
        let features =
            |feature: &str| Value::Dictionary(Dictionary::from_iter([(
                "features".to_owned(),
                Value::Dictionary(Dictionary::from_iter([(
                    feature.to_owned(),
                    Value::Bool(true),
                )])),
            )]));
        let details = Dictionary::from_iter([
            (
                "agent".to_owned(),
                Value::String(router.config().agent.clone()),
            ),
            (
                "authid".to_owned(),
                Value::String(identity.authid.clone()),
            ),
            (
                "authrole".to_owned(),
                Value::String(identity.authrole.clone()),
            ),
            (
                "authmethod".to_owned(),
                Value::String(identity.authmethod.clone()),
            ),
            (
                "authprovider".to_owned(),
                Value::String(identity.authprovider.clone()),
            ),
            (
                "realm".to_owned(),
                Value::String(identity.realm.to_string()),
            ),
            (
                "roles".to_owned(),
                Value::Dictionary(Dictionary::from_iter([
                    ("broker".to_owned(), features("pattern_based_subscription")),
                    ("dealer".to_owned(), features("pattern_based_registration")),
                ])),
            ),
        ]);
        self.transition_state(SessionState::Connected { identity })
            .await?;
        self.send_message(Message::Welcome(WelcomeMessage {
            session: self.id,
            details,
        }))
    }

    async fn authorize(&self, router: &Router, uri: &str, action: Action) -> Result<()> {
        let info = self
            .session_info()
            .await
            .ok_or_else(|| InteractionError::ProtocolViolation("session not connected".to_owned()))?;
        let permission = router.authorize(&info, uri, action).await;
        if !permission.allow {
            return Err(InteractionError::NotAuthorized(format!(
                "session is not authorized to {action} {uri}"
            ))
            .into());
        }
        Ok(())
    }

    async fn handle_subscribe(&self, router: &Router, message: &SubscribeMessage) -> Result<()> {
        self.authorize(router, message.topic.as_ref(), Action::Subscribe)
            .await?;
        let options = PatternOptions::from_dictionary(&message.options)?;
        let subscription = router
            .registrations()
            .subscribe_remote(message.topic.clone(), self.handle(), &options)
            .await?;
        self.send_message(Message::Subscribed(SubscribedMessage {
            subscribe_request: message.request,
            subscription,
        }))
    }

    async fn handle_unsubscribe(
        &self,
        router: &Router,
        message: &UnsubscribeMessage,
    ) -> Result<()> {
        router
            .registrations()
            .unsubscribe(message.subscribed_subscription)
            .await;
        self.send_message(Message::Unsubscribed(UnsubscribedMessage {
            unsubscribe_request: message.request,
        }))
    }

    async fn handle_publish(&self, router: &Router, message: &PublishMessage) -> Result<()> {
        let publication = router.registrations().publish(message).await?;
        if message.acknowledge() {
            return self.send_message(Message::Published(PublishedMessage {
                publish_request: message.request,
                publication,
            }));
        }
        Ok(())
    }

    async fn handle_register(&self, router: &Router, message: &RegisterMessage) -> Result<()> {
        self.authorize(router, message.procedure.as_ref(), Action::Register)
            .await?;
        let options = PatternOptions::from_dictionary(&message.options)?;
        let registration = router
            .registrations()
            .register_remote(message.procedure.clone(), self.handle(), &options)
            .await?;
        self.send_message(Message::Registered(RegisteredMessage {
            register_request: message.request,
            registration,
        }))
    }

    async fn handle_unregister(&self, router: &Router, message: &UnregisterMessage) -> Result<()> {
        router
            .registrations()
            .unregister(message.registered_registration)
            .await;
        self.send_message(Message::Unregistered(UnregisteredMessage {
            unregister_request: message.request,
        }))
    }

    async fn handle_call(&self, router: &Router, message: &CallMessage) -> Result<()> {
        let caller = self.handle();
        router
            .registrations()
            .invoke(
                message.clone(),
                Box::new(move |reply| {
                    if let Err(err) = caller.send_message(reply) {
                        warn!(
                            "Failed to deliver call result to session {}: {err}",
                            caller.id()
                        );
                    }
                }),
            )
            .await
    }

    /// Tears the session down: marks the handles dead, reaps every
    /// registration and subscription the session owns, and moves to the
    /// terminal state. Safe to call more than once.
    pub async fn clean_up(&self, router: &Router) {
        self.closed.store(true, Ordering::SeqCst);
        router.registrations().reap_client(self.id).await;
        let mut state = self.state.write().await;
        if !matches!(*state, SessionState::Disconnected) {
            debug!("Session {} moved from {} to disconnected", self.id, state.name());
            *state = SessionState::Disconnected;
        }
    }
}
