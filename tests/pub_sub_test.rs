use std::sync::Arc;

use tokio::sync::mpsc::unbounded_channel;
use wamp_router::{
    auth::authorizer::AuthorizeEverything,
    core::{
        id::Id,
        pattern::UriPattern,
        stream::DirectMessageStream,
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
        HelloMessage,
        Message,
        PublishMessage,
        SubscribeMessage,
        UnsubscribeMessage,
    },
    router::{
        ConnectionInfo,
        PatternOptions,
        Router,
        RouterConfig,
    },
};

mod common;

const REALM: &str = "com.myapp.test";

async fn start_router(authorize_everything: bool) -> Router {
    let router = Router::new(RouterConfig {
        realm: Uri::try_from(REALM).unwrap(),
        ..Default::default()
    });
    if authorize_everything {
        router
            .add_authorizer(
                UriPattern::new(WildcardUri::try_from("**").unwrap(), None).unwrap(),
                Box::new(AuthorizeEverything::default()),
            )
            .await;
    }
    router
}

async fn join_realm(router: &Router) -> DirectMessageStream {
    let mut connection = router.direct_connect(ConnectionInfo::default());
    connection
        .stream
        .send_message(Message::Hello(HelloMessage {
            realm: Uri::try_from(REALM).unwrap(),
            details: Dictionary::default(),
        }))
        .unwrap();
    assert_matches::assert_matches!(
        connection.stream.receive_message().await,
        Some(Message::Welcome(_))
    );
    connection.stream
}

async fn subscribe(stream: &mut DirectMessageStream, request: u64, topic: &str) -> Id {
    stream
        .send_message(Message::Subscribe(SubscribeMessage {
            request: Id::try_from(request).unwrap(),
            options: Dictionary::default(),
            topic: WildcardUri::try_from(topic).unwrap(),
        }))
        .unwrap();
    assert_matches::assert_matches!(
        stream.receive_message().await,
        Some(Message::Subscribed(subscribed)) => {
            assert_eq!(subscribed.subscribe_request, Id::try_from(request).unwrap());
            subscribed.subscription
        }
    )
}

fn publish(stream: &DirectMessageStream, request: u64, topic: &str, options: Dictionary) {
    stream
        .send_message(Message::Publish(PublishMessage {
            request: Id::try_from(request).unwrap(),
            options,
            topic: Uri::try_from(topic).unwrap(),
            arguments: Vec::from_iter([Value::String("hi".to_owned())]),
            arguments_keyword: Dictionary::default(),
        }))
        .unwrap();
}

#[tokio::test]
async fn subscriber_receives_published_events() {
    common::setup_test_environment();

    let router = start_router(true).await;
    let mut subscriber = join_realm(&router).await;
    let publisher = join_realm(&router).await;

    let subscription = subscribe(&mut subscriber, 1, "com.myapp.news").await;

    publish(&publisher, 2, "com.myapp.news", Dictionary::default());
    assert_matches::assert_matches!(
        subscriber.receive_message().await,
        Some(Message::Event(event)) => {
            assert_eq!(event.subscribed_subscription, subscription);
            assert_eq!(
                event.publish_arguments,
                Vec::from_iter([Value::String("hi".to_owned())])
            );
            assert_eq!(
                event.details.get("topic"),
                Some(&Value::String("com.myapp.news".to_owned()))
            );
        }
    );
}

#[tokio::test]
async fn acknowledges_publications_on_request() {
    common::setup_test_environment();

    let router = start_router(true).await;
    let mut publisher = join_realm(&router).await;

    // No PUBLISHED without the acknowledge option.
    publish(&publisher, 1, "com.myapp.news", Dictionary::default());

    publish(
        &publisher,
        2,
        "com.myapp.news",
        Dictionary::from_iter([("acknowledge".to_owned(), Value::Bool(true))]),
    );

    // The first reply is the acknowledgement of the second publish. A
    // publication with no subscribers still succeeds.
    assert_matches::assert_matches!(
        publisher.receive_message().await,
        Some(Message::Published(published)) => {
            assert_eq!(published.publish_request, Id::try_from(2).unwrap());
        }
    );
}

#[tokio::test]
async fn subscriptions_are_denied_without_an_authorizer() {
    common::setup_test_environment();

    let router = start_router(false).await;
    let mut subscriber = join_realm(&router).await;

    subscriber
        .send_message(Message::Subscribe(SubscribeMessage {
            request: Id::try_from(1).unwrap(),
            options: Dictionary::default(),
            topic: WildcardUri::try_from("com.myapp.news").unwrap(),
        }))
        .unwrap();
    assert_matches::assert_matches!(
        subscriber.receive_message().await,
        Some(Message::Error(error)) => {
            assert_eq!(error.error.as_ref(), "wamp.error.not_authorized");
            assert_eq!(error.request, Id::try_from(1).unwrap());
        }
    );
}

#[tokio::test]
async fn unsubscribing_stops_delivery() {
    common::setup_test_environment();

    let router = start_router(true).await;
    let mut subscriber = join_realm(&router).await;
    let publisher = join_realm(&router).await;

    let subscription = subscribe(&mut subscriber, 1, "com.myapp.news").await;

    subscriber
        .send_message(Message::Unsubscribe(UnsubscribeMessage {
            request: Id::try_from(2).unwrap(),
            subscribed_subscription: subscription,
        }))
        .unwrap();
    assert_matches::assert_matches!(
        subscriber.receive_message().await,
        Some(Message::Unsubscribed(unsubscribed)) => {
            assert_eq!(unsubscribed.unsubscribe_request, Id::try_from(2).unwrap());
        }
    );

    publish(&publisher, 3, "com.myapp.news", Dictionary::default());

    // Subscribe again to prove nothing was queued in between.
    let subscription = subscribe(&mut subscriber, 4, "com.myapp.news").await;
    publish(&publisher, 5, "com.myapp.news", Dictionary::default());
    assert_matches::assert_matches!(
        subscriber.receive_message().await,
        Some(Message::Event(event)) => {
            assert_eq!(event.subscribed_subscription, subscription);
        }
    );
}

#[tokio::test]
async fn prefix_patterns_match_whole_subtrees() {
    common::setup_test_environment();

    let router = start_router(true).await;
    let mut subscriber = join_realm(&router).await;
    let publisher = join_realm(&router).await;

    let subscription = subscribe(&mut subscriber, 1, "com.myapp.news*").await;

    publish(&publisher, 2, "com.myapp.news.sports", Dictionary::default());
    assert_matches::assert_matches!(
        subscriber.receive_message().await,
        Some(Message::Event(event)) => {
            assert_eq!(event.subscribed_subscription, subscription);
            assert_eq!(
                event.details.get("topic"),
                Some(&Value::String("com.myapp.news.sports".to_owned()))
            );
        }
    );
}

#[tokio::test]
async fn delivers_events_to_local_subscribers() {
    common::setup_test_environment();

    let router = start_router(true).await;
    let (event_tx, mut event_rx) = unbounded_channel();
    router
        .subscribe(
            WildcardUri::try_from("com.myapp.news").unwrap(),
            PatternOptions::default(),
            Arc::new(move |event| {
                event_tx.send(event).ok();
            }),
        )
        .await
        .unwrap();

    let publisher = join_realm(&router).await;
    publish(&publisher, 1, "com.myapp.news", Dictionary::default());

    let event = event_rx.recv().await.unwrap();
    assert_eq!(
        event.publish_arguments,
        Vec::from_iter([Value::String("hi".to_owned())])
    );

    // Local publications reach remote peers the same way.
    let mut subscriber = join_realm(&router).await;
    subscribe(&mut subscriber, 2, "com.myapp.news").await;
    router
        .publish(
            Uri::try_from("com.myapp.news").unwrap(),
            Vec::from_iter([Value::Integer(42)]),
            Dictionary::default(),
        )
        .await
        .unwrap();
    assert_matches::assert_matches!(
        subscriber.receive_message().await,
        Some(Message::Event(event)) => {
            assert_eq!(event.publish_arguments, Vec::from_iter([Value::Integer(42)]));
        }
    );
}
