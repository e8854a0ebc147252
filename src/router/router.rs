use std::{
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    auth::{
        authenticator::{
            Authenticator,
            AuthenticatorChain,
        },
        authorizer::{
            Action,
            Authorizer,
            AuthorizerChain,
            Permission,
        },
        identity::SessionInfo,
    },
    core::{
        id::{
            Id,
            IdAllocator,
            RandomIdAllocator,
        },
        pattern::UriPattern,
        stream::{
            direct_stream_pair,
            DirectMessageStream,
            MessageStream,
            TransportMessageStream,
        },
        types::{
            Dictionary,
            List,
        },
        uri::{
            Uri,
            WildcardUri,
        },
    },
    message::message::PublishMessage,
    router::{
        connection::{
            Connection,
            ConnectionInfo,
        },
        registrations::{
            EventHandler,
            PatternOptions,
            ProcedureHandler,
            RegistrationTable,
        },
    },
    serializer::serializer::{
        new_serializer,
        SerializerType,
    },
    transport::transport::Transport,
};

/// A hook run when a session connects or disconnects.
pub type SessionHook = Box<dyn Fn(Id) + Send + Sync>;

/// Configuration for a [`Router`].
#[derive(Debug)]
pub struct RouterConfig {
    /// The agent name, reported to peers in the WELCOME message.
    pub agent: String,
    /// The realm the router serves. A HELLO for any other realm is rejected.
    pub realm: Uri,
    /// An optional URI prefix stripped from procedure and topic URIs before
    /// matching, so peers may address registrations by fully-qualified name.
    pub uri_base: Option<String>,
    /// How long a call may remain unanswered before the caller receives a
    /// timeout ERROR.
    pub call_timeout: Duration,
    /// The maximum number of local procedure invocations running at once.
    /// Calls beyond this limit wait for a slot.
    pub max_concurrent_invocations: usize,
    /// Whether messages with no handler are forwarded through the
    /// pending-request map instead of being dropped.
    pub forward_unknown_messages: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            realm: Uri::from_known("realm1"),
            uri_base: None,
            call_timeout: Duration::from_secs(30),
            max_concurrent_invocations: 32,
            forward_unknown_messages: false,
        }
    }
}

struct RouterInner {
    config: RouterConfig,
    id_allocator: Arc<Box<dyn IdAllocator>>,
    registrations: RegistrationTable,
    authenticators: RwLock<AuthenticatorChain>,
    authorizers: RwLock<AuthorizerChain>,
    on_connect: RwLock<Vec<SessionHook>>,
    on_disconnect: RwLock<Vec<SessionHook>>,
}

/// The WAMP router: a broker for pub/sub and a dealer for RPC, serving one
/// realm.
///
/// The router owns no listener. The embedding process accepts connections
/// however it likes and hands each one over via [`Router::accept`],
/// [`Router::accept_transport`], or [`Router::direct_connect`]. The embedding
/// process may also participate directly, registering procedures and
/// subscribing callbacks without a session of its own.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Creates a new router with the given configuration.
    pub fn new(config: RouterConfig) -> Self {
        let id_allocator: Arc<Box<dyn IdAllocator>> =
            Arc::new(Box::new(RandomIdAllocator::default()));
        let registrations = RegistrationTable::new(
            config.uri_base.clone(),
            id_allocator.clone(),
            config.max_concurrent_invocations,
        );
        Self {
            inner: Arc::new(RouterInner {
                config,
                id_allocator,
                registrations,
                authenticators: RwLock::new(AuthenticatorChain::default()),
                authorizers: RwLock::new(AuthorizerChain::default()),
                on_connect: RwLock::new(Vec::new()),
                on_disconnect: RwLock::new(Vec::new()),
            }),
        }
    }

    /// The router configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    pub(crate) fn id_allocator(&self) -> &Arc<Box<dyn IdAllocator>> {
        &self.inner.id_allocator
    }

    pub(crate) fn registrations(&self) -> &RegistrationTable {
        &self.inner.registrations
    }

    pub(crate) fn authenticators(&self) -> &RwLock<AuthenticatorChain> {
        &self.inner.authenticators
    }

    /// Adds an authenticator to the router's chain.
    ///
    /// A session authenticates against the first matching authenticator, in
    /// order. With no authenticators installed, every session is anonymous.
    pub async fn add_authenticator(&self, authenticator: Arc<dyn Authenticator>) {
        self.inner.authenticators.write().await.add(authenticator);
    }

    /// Adds an authorizer scoped to a URI pattern.
    ///
    /// The first authorizer whose pattern matches a URI decides; a URI no
    /// pattern claims is denied.
    pub async fn add_authorizer(&self, pattern: UriPattern, authorizer: Box<dyn Authorizer>) {
        self.inner.authorizers.write().await.add(pattern, authorizer);
    }

    /// Decides whether the session may perform the action against the URI.
    pub async fn authorize(&self, session: &SessionInfo, uri: &str, action: Action) -> Permission {
        self.inner
            .authorizers
            .read()
            .await
            .authorize(session, uri, action)
            .await
    }

    /// Registers a procedure handler in the embedding process.
    ///
    /// Local registrations bypass authorization; the embedding process is
    /// trusted.
    pub async fn register(
        &self,
        uri: WildcardUri,
        options: PatternOptions,
        handler: ProcedureHandler,
    ) -> Result<Id> {
        self.inner
            .registrations
            .register_local(uri, handler, &options)
            .await
    }

    /// Removes a registration made with [`Router::register`].
    pub async fn unregister(&self, registration: Id) {
        self.inner.registrations.unregister(registration).await;
    }

    /// Subscribes a callback in the embedding process to a topic pattern.
    pub async fn subscribe(
        &self,
        uri: WildcardUri,
        options: PatternOptions,
        callback: EventHandler,
    ) -> Result<Id> {
        self.inner
            .registrations
            .subscribe_local(uri, callback, &options)
            .await
    }

    /// Removes a subscription made with [`Router::subscribe`].
    pub async fn unsubscribe(&self, subscription: Id) {
        self.inner.registrations.unsubscribe(subscription).await;
    }

    /// Publishes an event from the embedding process.
    ///
    /// Returns the publication ID, even when no subscription matched.
    pub async fn publish(
        &self,
        topic: Uri,
        arguments: List,
        arguments_keyword: Dictionary,
    ) -> Result<Id> {
        let publish = PublishMessage {
            request: self.inner.id_allocator.generate_id().await?,
            options: Dictionary::default(),
            topic,
            arguments,
            arguments_keyword,
        };
        self.inner.registrations.publish(&publish).await
    }

    /// Installs a hook run with the session ID of every new session.
    pub async fn on_connect(&self, hook: SessionHook) {
        self.inner.on_connect.write().await.push(hook);
    }

    /// Installs a hook run with the session ID of every closed session.
    pub async fn on_disconnect(&self, hook: SessionHook) {
        self.inner.on_disconnect.write().await.push(hook);
    }

    pub(crate) async fn run_connect_hooks(&self, session: Id) {
        for hook in self.inner.on_connect.read().await.iter() {
            hook(session);
        }
    }

    pub(crate) async fn run_disconnect_hooks(&self, session: Id) {
        for hook in self.inner.on_disconnect.read().await.iter() {
            hook(session);
        }
    }

    /// Accepts a new connection over an already-framed message stream.
    ///
    /// Returns the connection ID. The connection runs until its session
    /// disconnects or the stream closes.
    pub fn accept(&self, stream: Box<dyn MessageStream>, info: ConnectionInfo) -> Uuid {
        let connection = Connection::new();
        let uuid = connection.uuid();
        connection.start(self.clone(), stream, info);
        uuid
    }

    /// Accepts a new connection over a raw transport, framing its bytes with
    /// the given serializer.
    pub fn accept_transport(
        &self,
        transport: Box<dyn Transport>,
        serializer_type: SerializerType,
        info: ConnectionInfo,
    ) -> Uuid {
        let stream = TransportMessageStream::new(transport, new_serializer(serializer_type));
        self.accept(Box::new(stream), info)
    }

    /// Connects an in-process peer directly, with no transport or serializer.
    pub fn direct_connect(&self, info: ConnectionInfo) -> DirectConnection {
        let (router_end, peer_end) = direct_stream_pair();
        let uuid = self.accept(Box::new(router_end), info);
        DirectConnection {
            uuid,
            stream: peer_end,
        }
    }
}

/// The peer end of a connection made with [`Router::direct_connect`].
pub struct DirectConnection {
    /// The connection ID.
    pub uuid: Uuid,
    /// The peer's end of the message stream.
    pub stream: DirectMessageStream,
}
