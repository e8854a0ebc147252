use std::sync::Arc;

use anyhow::{
    Error,
    Result,
};
use futures_util::{
    future::BoxFuture,
    lock::Mutex,
    FutureExt,
};
use log::{
    debug,
    warn,
};
use tokio::sync::Semaphore;

use crate::{
    core::{
        error::{
            BasicError,
            InteractionError,
        },
        id::{
            Id,
            IdAllocator,
        },
        pattern::{
            MatchStyle,
            UriPattern,
        },
        types::{
            Dictionary,
            List,
            Value,
        },
        uri::{
            Uri,
            WildcardUri,
        },
    },
    message::message::{
        CallMessage,
        ErrorMessage,
        EventMessage,
        InvocationMessage,
        Message,
        PublishMessage,
        ResultMessage,
    },
    router::session::{
        ReplyCallback,
        SessionHandle,
    },
};

/// An asynchronous handler for a locally-registered procedure.
pub type ProcedureHandler =
    Arc<dyn Fn(List, Dictionary) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A callback for a locally-subscribed topic.
pub type EventHandler = Arc<dyn Fn(EventMessage) + Send + Sync>;

/// Options accepted when registering or subscribing a URI pattern.
#[derive(Debug, Default, Clone)]
pub struct PatternOptions {
    /// Explicit match style; inferred from the URI when absent.
    pub match_style: Option<MatchStyle>,
}

impl PatternOptions {
    /// Parses the wire-level options dictionary.
    pub fn from_dictionary(options: &Dictionary) -> Result<Self> {
        match options.get("match") {
            Some(value) => {
                let name = value.string().ok_or_else(|| {
                    BasicError::InvalidArgument("match option must be a string".to_owned())
                })?;
                Ok(Self {
                    match_style: Some(MatchStyle::try_from(name).map_err(Error::new)?),
                })
            }
            None => Ok(Self::default()),
        }
    }
}

/// Where a registered procedure lives.
#[derive(Clone)]
enum Handler {
    Local(ProcedureHandler),
    Remote(SessionHandle),
}

/// Where a subscription delivers.
#[derive(Clone)]
enum Subscriber {
    Local(EventHandler),
    Remote(SessionHandle),
}

struct Registration {
    id: Id,
    pattern: UriPattern,
    handler: Handler,
}

struct Subscription {
    id: Id,
    pattern: UriPattern,
    subscriber: Subscriber,
}

#[derive(Default)]
struct TableInner {
    registered: Vec<Registration>,
    subscribed: Vec<Subscription>,
}

impl TableInner {
    fn reap(&mut self, session: Id) {
        self.registered.retain(|registration| {
            !matches!(&registration.handler, Handler::Remote(handle) if handle.id() == session)
        });
        self.subscribed.retain(|subscription| {
            !matches!(&subscription.subscriber, Subscriber::Remote(handle) if handle.id() == session)
        });
    }
}

/// The shared dealer + broker table: every live registration and
/// subscription, remote or local, in insertion order.
///
/// Duplicate and overlapping URI patterns are allowed; dispatch always picks
/// the first match in insertion order. Dead remote sessions are reaped lazily
/// whenever dispatch touches them.
pub struct RegistrationTable {
    uri_base: Option<String>,
    id_allocator: Arc<Box<dyn IdAllocator>>,
    invocation_permits: Arc<Semaphore>,
    inner: Mutex<TableInner>,
}

impl RegistrationTable {
    /// Creates an empty table.
    ///
    /// `uri_base`, when set, is a URI prefix stripped from candidate
    /// procedure and topic URIs before matching, so peers may address
    /// registrations by their fully-qualified name.
    pub fn new(
        uri_base: Option<String>,
        id_allocator: Arc<Box<dyn IdAllocator>>,
        max_concurrent_invocations: usize,
    ) -> Self {
        Self {
            uri_base: uri_base.map(|base| format!("{}.", base.trim_end_matches('.'))),
            id_allocator,
            invocation_permits: Arc::new(Semaphore::new(max_concurrent_invocations)),
            inner: Mutex::new(TableInner::default()),
        }
    }

    fn normalize<'a>(&self, uri: &'a str) -> &'a str {
        match &self.uri_base {
            Some(base) => uri.strip_prefix(base.as_str()).unwrap_or(uri),
            None => uri,
        }
    }

    /// Registers a local procedure handler.
    pub async fn register_local(
        &self,
        uri: WildcardUri,
        handler: ProcedureHandler,
        options: &PatternOptions,
    ) -> Result<Id> {
        let pattern = UriPattern::new(uri, options.match_style)?;
        let id = self.id_allocator.generate_id().await?;
        self.inner.lock().await.registered.push(Registration {
            id,
            pattern,
            handler: Handler::Local(handler),
        });
        Ok(id)
    }

    /// Registers a remote session as the callee for a procedure pattern.
    pub async fn register_remote(
        &self,
        uri: WildcardUri,
        session: SessionHandle,
        options: &PatternOptions,
    ) -> Result<Id> {
        let pattern = UriPattern::new(uri, options.match_style)?;
        let id = self.id_allocator.generate_id().await?;
        self.inner.lock().await.registered.push(Registration {
            id,
            pattern,
            handler: Handler::Remote(session),
        });
        Ok(id)
    }

    /// Removes a registration. Removing an absent ID is a no-op.
    pub async fn unregister(&self, registration: Id) {
        self.inner
            .lock()
            .await
            .registered
            .retain(|existing| existing.id != registration);
    }

    /// Subscribes a local callback to a topic pattern.
    pub async fn subscribe_local(
        &self,
        uri: WildcardUri,
        callback: EventHandler,
        options: &PatternOptions,
    ) -> Result<Id> {
        let pattern = UriPattern::new(uri, options.match_style)?;
        let id = self.id_allocator.generate_id().await?;
        self.inner.lock().await.subscribed.push(Subscription {
            id,
            pattern,
            subscriber: Subscriber::Local(callback),
        });
        Ok(id)
    }

    /// Subscribes a remote session to a topic pattern.
    pub async fn subscribe_remote(
        &self,
        uri: WildcardUri,
        session: SessionHandle,
        options: &PatternOptions,
    ) -> Result<Id> {
        let pattern = UriPattern::new(uri, options.match_style)?;
        let id = self.id_allocator.generate_id().await?;
        self.inner.lock().await.subscribed.push(Subscription {
            id,
            pattern,
            subscriber: Subscriber::Remote(session),
        });
        Ok(id)
    }

    /// Removes a subscription. Removing an absent ID is a no-op.
    pub async fn unsubscribe(&self, subscription: Id) {
        self.inner
            .lock()
            .await
            .subscribed
            .retain(|existing| existing.id != subscription);
    }

    /// Routes a CALL to the first registration matching its procedure.
    ///
    /// The callback receives exactly one terminal message keyed to the CALL:
    /// a RESULT, or an ERROR (handler failure, dead callee, or timeout).
    pub async fn invoke(&self, call: CallMessage, callback: ReplyCallback) -> Result<()> {
        let procedure = self.normalize(call.procedure.as_ref()).to_owned();
        let details = Dictionary::from_iter([(
            "procedure".to_owned(),
            Value::String(call.procedure.to_string()),
        )]);

        let handler = {
            let mut inner = self.inner.lock().await;
            let entry = inner
                .registered
                .iter()
                .find(|registration| registration.pattern.matches(&procedure))
                .ok_or(InteractionError::NoSuchProcedure)?;
            let handler = entry.handler.clone();
            let registration_id = entry.id;
            if let Handler::Remote(handle) = &handler {
                if handle.closed() {
                    let session = handle.id();
                    inner.reap(session);
                    debug!("Reaped dead session {session} during call to {procedure}");
                    return Err(InteractionError::NoSuchProcedure.into());
                }
            }
            (handler, registration_id)
        };

        match handler {
            (Handler::Local(local), _) => {
                // Backpressure: wait for a worker slot before spawning, so a
                // flood of calls suspends callers instead of piling up tasks.
                let permit = self
                    .invocation_permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(Error::new)?;
                let future = local(call.arguments.clone(), call.arguments_keyword.clone());
                tokio::spawn(async move {
                    let _permit = permit;
                    let result = std::panic::AssertUnwindSafe(future).catch_unwind().await;
                    let reply = match result {
                        Ok(Ok(value)) => Message::Result(ResultMessage {
                            call_request: call.request,
                            details,
                            yield_arguments: Vec::from_iter([value]),
                            yield_arguments_keyword: Dictionary::default(),
                        }),
                        Ok(Err(err)) => invocation_error(&call, details, format!("Call failed: {err}")),
                        Err(_) => {
                            invocation_error(&call, details, "Call failed: handler panicked".to_owned())
                        }
                    };
                    callback(reply);
                });
                Ok(())
            }
            (Handler::Remote(callee), registration_id) => {
                let request = self.id_allocator.generate_id().await?;
                let invocation = Message::Invocation(InvocationMessage {
                    request,
                    registered_registration: registration_id,
                    details: details.clone(),
                    call_arguments: call.arguments.clone(),
                    call_arguments_keyword: call.arguments_keyword.clone(),
                });
                let call_request = call.request;
                callee
                    .send_and_await_response(
                        invocation,
                        Box::new(move |reply| match reply {
                            Message::Yield(yield_message) => {
                                callback(Message::Result(ResultMessage {
                                    call_request,
                                    details,
                                    yield_arguments: yield_message.arguments,
                                    yield_arguments_keyword: yield_message.arguments_keyword,
                                }))
                            }
                            Message::Error(mut error_message) => {
                                // Re-key the callee's failure to the original
                                // CALL before handing it back to the caller.
                                error_message.request_type = Message::CALL_TAG;
                                error_message.request = call_request;
                                callback(Message::Error(error_message))
                            }
                            reply => callback(reply),
                        }),
                    )
                    .await
            }
        }
    }

    /// Fans a PUBLISH out to every matching subscription, in insertion order.
    ///
    /// Dead remote subscribers are reaped and skipped; one subscriber's
    /// failure never blocks the rest. Returns the publication ID, even when
    /// nothing matched.
    pub async fn publish(&self, publish: &PublishMessage) -> Result<Id> {
        let topic = self.normalize(publish.topic.as_ref()).to_owned();
        let publication = self.id_allocator.generate_id().await?;
        let details = Dictionary::from_iter([(
            "topic".to_owned(),
            Value::String(publish.topic.to_string()),
        )]);

        let deliveries = {
            let mut inner = self.inner.lock().await;
            let dead = inner
                .subscribed
                .iter()
                .filter_map(|subscription| match &subscription.subscriber {
                    Subscriber::Remote(handle)
                        if subscription.pattern.matches(&topic) && handle.closed() =>
                    {
                        Some(handle.id())
                    }
                    _ => None,
                })
                .collect::<Vec<_>>();
            for session in dead {
                debug!("Reaped dead session {session} during publish to {topic}");
                inner.reap(session);
            }
            inner
                .subscribed
                .iter()
                .filter(|subscription| subscription.pattern.matches(&topic))
                .map(|subscription| (subscription.id, subscription.subscriber.clone()))
                .collect::<Vec<_>>()
        };

        for (subscription, subscriber) in deliveries {
            let event = EventMessage {
                subscribed_subscription: subscription,
                published_publication: publication,
                details: details.clone(),
                publish_arguments: publish.arguments.clone(),
                publish_arguments_keyword: publish.arguments_keyword.clone(),
            };
            match subscriber {
                Subscriber::Local(callback) => callback(event),
                Subscriber::Remote(handle) => {
                    if let Err(err) = handle.send_message(Message::Event(event)) {
                        warn!(
                            "Failed to deliver event on {topic} to session {}: {err}",
                            handle.id()
                        );
                    }
                }
            }
        }
        Ok(publication)
    }

    /// Removes every registration and subscription owned by the session.
    /// Idempotent.
    pub async fn reap_client(&self, session: Id) {
        self.inner.lock().await.reap(session);
    }

    /// The number of live registrations.
    pub async fn registration_count(&self) -> usize {
        self.inner.lock().await.registered.len()
    }

    /// The number of live subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.inner.lock().await.subscribed.len()
    }
}

fn invocation_error(call: &CallMessage, details: Dictionary, message: String) -> Message {
    let error: Error = InteractionError::InvocationError(message.clone()).into();
    Message::Error(ErrorMessage {
        request_type: Message::CALL_TAG,
        request: call.request,
        details,
        error: Uri::for_error(&error),
        arguments: Vec::from_iter([Value::String(message)]),
        ..Default::default()
    })
}

#[cfg(test)]
mod registrations_test {
    use std::{
        sync::Arc,
        time::Duration,
    };

    use anyhow::Result;
    use futures_util::FutureExt;
    use tokio::sync::{
        mpsc::{
            unbounded_channel,
            UnboundedReceiver,
        },
        oneshot,
    };

    use crate::{
        core::{
            error::InteractionError,
            id::{
                Id,
                IdAllocator,
                RandomIdAllocator,
            },
            types::{
                Dictionary,
                Value,
            },
            uri::{
                Uri,
                WildcardUri,
            },
        },
        message::message::{
            CallMessage,
            ErrorMessage,
            Message,
            PublishMessage,
            YieldMessage,
        },
        router::{
            registrations::{
                PatternOptions,
                RegistrationTable,
            },
            session::{
                Session,
                SessionHandle,
            },
        },
    };

    fn table(uri_base: Option<&str>) -> RegistrationTable {
        let id_allocator: Arc<Box<dyn IdAllocator>> =
            Arc::new(Box::new(RandomIdAllocator::default()));
        RegistrationTable::new(uri_base.map(str::to_owned), id_allocator, 8)
    }

    fn remote_session() -> (Session, SessionHandle, UnboundedReceiver<Message>) {
        let (message_tx, message_rx) = unbounded_channel();
        let session = Session::new(
            Id::try_from(42).unwrap(),
            message_tx,
            None,
            Duration::from_secs(5),
        );
        let handle = session.handle();
        (session, handle, message_rx)
    }

    fn call(procedure: &str) -> CallMessage {
        CallMessage {
            request: Id::try_from(777).unwrap(),
            options: Dictionary::default(),
            procedure: Uri::try_from(procedure).unwrap(),
            arguments: Vec::from_iter([Value::Integer(1)]),
            arguments_keyword: Dictionary::from_iter([("a".to_owned(), Value::String("2".to_owned()))]),
        }
    }

    fn publish(topic: &str) -> PublishMessage {
        PublishMessage {
            request: Id::try_from(888).unwrap(),
            options: Dictionary::default(),
            topic: Uri::try_from(topic).unwrap(),
            arguments: Vec::from_iter([Value::String("BARK".to_owned())]),
            arguments_keyword: Dictionary::default(),
        }
    }

    async fn invoke_and_reply(table: &RegistrationTable, call: CallMessage) -> Result<Message> {
        let (reply_tx, reply_rx) = oneshot::channel();
        table
            .invoke(
                call,
                Box::new(move |reply| {
                    reply_tx.send(reply).ok();
                }),
            )
            .await?;
        Ok(reply_rx.await?)
    }

    #[tokio::test]
    async fn invokes_local_handler_and_unregisters() {
        let table = table(None);
        let registration = table
            .register_local(
                WildcardUri::try_from("arf").unwrap(),
                Arc::new(|_, _| async move { Ok(Value::String("TEST".to_owned())) }.boxed()),
                &PatternOptions::default(),
            )
            .await
            .unwrap();

        assert_matches::assert_matches!(
            invoke_and_reply(&table, call("arf")).await,
            Ok(Message::Result(result)) => {
                assert_eq!(result.call_request, Id::try_from(777).unwrap());
                assert_eq!(result.yield_arguments, Vec::from_iter([Value::String("TEST".to_owned())]));
                assert_eq!(
                    result.details.get("procedure"),
                    Some(&Value::String("arf".to_owned()))
                );
            }
        );

        table.unregister(registration).await;
        assert_matches::assert_matches!(
            table.invoke(call("arf"), Box::new(|_| ())).await,
            Err(err) => assert_matches::assert_matches!(
                err.downcast_ref::<InteractionError>(),
                Some(InteractionError::NoSuchProcedure)
            )
        );
    }

    #[tokio::test]
    async fn failing_local_handler_becomes_error_reply() {
        let table = table(None);
        table
            .register_local(
                WildcardUri::try_from("arf").unwrap(),
                Arc::new(|_, _| async move { Err(anyhow::Error::msg("Whoops")) }.boxed()),
                &PatternOptions::default(),
            )
            .await
            .unwrap();

        assert_matches::assert_matches!(
            invoke_and_reply(&table, call("arf")).await,
            Ok(Message::Error(ErrorMessage { request_type, request, error, arguments, .. })) => {
                assert_eq!(request_type, Message::CALL_TAG);
                assert_eq!(request, Id::try_from(777).unwrap());
                assert_eq!(error.as_ref(), "wamp.error.invocation_error");
                assert_matches::assert_matches!(
                    arguments.first(),
                    Some(Value::String(message)) => assert!(message.starts_with("Call failed:"))
                );
            }
        );
    }

    #[tokio::test]
    async fn routes_remote_invocation_through_yield() {
        let table = table(None);
        let (_session, handle, mut message_rx) = remote_session();
        table
            .register_remote(
                WildcardUri::try_from("bloop").unwrap(),
                handle.clone(),
                &PatternOptions::default(),
            )
            .await
            .unwrap();

        let (reply_tx, reply_rx) = oneshot::channel();
        table
            .invoke(
                call("bloop"),
                Box::new(move |reply| {
                    reply_tx.send(reply).ok();
                }),
            )
            .await
            .unwrap();

        // The callee sees an INVOCATION with a fresh request ID.
        let invocation = message_rx.recv().await.unwrap();
        let request = assert_matches::assert_matches!(
            &invocation,
            Message::Invocation(invocation) => {
                assert_ne!(invocation.request, Id::try_from(777).unwrap());
                assert_eq!(invocation.call_arguments, Vec::from_iter([Value::Integer(1)]));
                invocation.request
            }
        );

        handle
            .dispatch_to_awaiting(Message::Yield(YieldMessage {
                invocation_request: request,
                options: Dictionary::default(),
                arguments: Vec::from_iter([Value::String("WORKING".to_owned())]),
                arguments_keyword: Dictionary::default(),
            }))
            .await
            .unwrap();

        assert_matches::assert_matches!(
            reply_rx.await,
            Ok(Message::Result(result)) => {
                assert_eq!(result.call_request, Id::try_from(777).unwrap());
                assert_eq!(
                    result.yield_arguments,
                    Vec::from_iter([Value::String("WORKING".to_owned())])
                );
            }
        );
    }

    #[tokio::test]
    async fn rekeys_remote_error_to_original_call() {
        let table = table(None);
        let (_session, handle, mut message_rx) = remote_session();
        table
            .register_remote(
                WildcardUri::try_from("bloop").unwrap(),
                handle.clone(),
                &PatternOptions::default(),
            )
            .await
            .unwrap();

        let (reply_tx, reply_rx) = oneshot::channel();
        table
            .invoke(
                call("bloop"),
                Box::new(move |reply| {
                    reply_tx.send(reply).ok();
                }),
            )
            .await
            .unwrap();

        let request = assert_matches::assert_matches!(
            message_rx.recv().await,
            Some(Message::Invocation(invocation)) => invocation.request
        );
        handle
            .dispatch_to_awaiting(Message::Error(ErrorMessage {
                request_type: Message::INVOCATION_TAG,
                request,
                error: Uri::from_known("wamp.error.invocation_error"),
                arguments: Vec::from_iter([Value::String("EXPLODED".to_owned())]),
                ..Default::default()
            }))
            .await
            .unwrap();

        assert_matches::assert_matches!(
            reply_rx.await,
            Ok(Message::Error(error)) => {
                assert_eq!(error.request_type, Message::CALL_TAG);
                assert_eq!(error.request, Id::try_from(777).unwrap());
                assert_eq!(error.arguments, Vec::from_iter([Value::String("EXPLODED".to_owned())]));
            }
        );
    }

    #[tokio::test]
    async fn calling_dead_callee_reaps_and_fails() {
        let table = table(None);
        let (_session, handle, message_rx) = remote_session();
        table
            .register_remote(
                WildcardUri::try_from("bloop").unwrap(),
                handle,
                &PatternOptions::default(),
            )
            .await
            .unwrap();
        drop(message_rx);

        assert_matches::assert_matches!(
            table.invoke(call("bloop"), Box::new(|_| ())).await,
            Err(err) => assert_matches::assert_matches!(
                err.downcast_ref::<InteractionError>(),
                Some(InteractionError::NoSuchProcedure)
            )
        );
        assert_eq!(table.registration_count().await, 0);
    }

    #[tokio::test]
    async fn publishes_to_local_and_remote_subscribers() {
        let table = table(None);
        let (event_tx, mut event_rx) = unbounded_channel();
        let subscription = table
            .subscribe_local(
                WildcardUri::try_from("woof").unwrap(),
                Arc::new(move |event| {
                    event_tx.send(event).ok();
                }),
                &PatternOptions::default(),
            )
            .await
            .unwrap();
        let (_session, handle, mut message_rx) = remote_session();
        table
            .subscribe_remote(
                WildcardUri::try_from("woof").unwrap(),
                handle,
                &PatternOptions::default(),
            )
            .await
            .unwrap();

        let publication = table.publish(&publish("woof")).await.unwrap();

        let local_event = event_rx.recv().await.unwrap();
        assert_eq!(local_event.subscribed_subscription, subscription);
        assert_eq!(local_event.published_publication, publication);
        assert_eq!(
            local_event.publish_arguments,
            Vec::from_iter([Value::String("BARK".to_owned())])
        );

        assert_matches::assert_matches!(
            message_rx.recv().await,
            Some(Message::Event(event)) => {
                assert_eq!(event.published_publication, publication);
                assert_eq!(
                    event.details.get("topic"),
                    Some(&Value::String("woof".to_owned()))
                );
            }
        );

        // After unsubscribing, nothing is delivered.
        table.unsubscribe(subscription).await;
        table.publish(&publish("woof")).await.unwrap();
        assert_matches::assert_matches!(event_rx.try_recv(), Err(_));
    }

    #[tokio::test]
    async fn publishing_with_no_subscribers_is_a_no_op() {
        let table = table(None);
        assert_matches::assert_matches!(table.publish(&publish("woof")).await, Ok(_));
    }

    #[tokio::test]
    async fn reaps_dead_subscribers_on_publish() {
        let table = table(None);
        let (_session, handle, message_rx) = remote_session();
        table
            .subscribe_remote(
                WildcardUri::try_from("woof").unwrap(),
                handle.clone(),
                &PatternOptions::default(),
            )
            .await
            .unwrap();
        table
            .register_remote(
                WildcardUri::try_from("arf").unwrap(),
                handle,
                &PatternOptions::default(),
            )
            .await
            .unwrap();
        drop(message_rx);

        table.publish(&publish("woof")).await.unwrap();
        assert_eq!(table.subscription_count().await, 0);
        // Reaping removed the dead session's registrations too.
        assert_eq!(table.registration_count().await, 0);

        // Idempotent.
        table.reap_client(Id::try_from(42).unwrap()).await;
        assert_eq!(table.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn strips_uri_base_from_candidates() {
        let table = table(Some("test.foo"));
        table
            .register_local(
                WildcardUri::try_from("arf").unwrap(),
                Arc::new(|_, _| async move { Ok(Value::String("TEST".to_owned())) }.boxed()),
                &PatternOptions::default(),
            )
            .await
            .unwrap();

        assert_matches::assert_matches!(
            invoke_and_reply(&table, call("test.foo.arf")).await,
            Ok(Message::Result(_))
        );
        assert_matches::assert_matches!(
            invoke_and_reply(&table, call("arf")).await,
            Ok(Message::Result(_))
        );
    }
}
