use std::sync::Arc;

use wamp_router::{
    auth::{
        cookie::{
            CookieAuthenticator,
            MemoryCookieStore,
        },
        ticket::{
            TicketAuthenticator,
            TicketUser,
        },
    },
    core::{
        types::{
            Dictionary,
            Value,
        },
        uri::Uri,
    },
    message::message::{
        AuthenticateMessage,
        HelloMessage,
        Message,
    },
    router::{
        ConnectionInfo,
        Router,
        RouterConfig,
    },
};

mod common;

const REALM: &str = "com.myapp.test";

async fn start_router_with_tickets() -> Router {
    let router = Router::new(RouterConfig {
        realm: Uri::try_from(REALM).unwrap(),
        ..Default::default()
    });
    router
        .add_authenticator(Arc::new(TicketAuthenticator::new([TicketUser {
            login: "test".to_owned(),
            password: "password".to_owned(),
            role: "backend".to_owned(),
        }])))
        .await;
    router
        .add_authenticator(Arc::new(CookieAuthenticator::new(Arc::new(
            MemoryCookieStore::default(),
        ))))
        .await;
    router
}

fn hello_with_methods(methods: &[&str]) -> Message {
    Message::Hello(HelloMessage {
        realm: Uri::try_from(REALM).unwrap(),
        details: Dictionary::from_iter([
            ("authid".to_owned(), Value::String("test".to_owned())),
            (
                "authmethods".to_owned(),
                Value::List(
                    methods
                        .iter()
                        .map(|method| Value::String((*method).to_owned()))
                        .collect(),
                ),
            ),
        ]),
    })
}

fn authenticate(signature: &str) -> Message {
    Message::Authenticate(AuthenticateMessage {
        signature: signature.to_owned(),
        extra: Dictionary::default(),
    })
}

#[tokio::test]
async fn ticket_authentication_round_trip() {
    common::setup_test_environment();

    let router = start_router_with_tickets().await;
    let mut connection = router.direct_connect(ConnectionInfo::default());

    connection
        .stream
        .send_message(hello_with_methods(&["ticket"]))
        .unwrap();
    assert_matches::assert_matches!(
        connection.stream.receive_message().await,
        Some(Message::Challenge(challenge)) => {
            assert_eq!(challenge.auth_method, "ticket");
        }
    );

    connection.stream.send_message(authenticate("password")).unwrap();
    assert_matches::assert_matches!(
        connection.stream.receive_message().await,
        Some(Message::Welcome(welcome)) => {
            assert_eq!(
                welcome.details.get("authid"),
                Some(&Value::String("test".to_owned()))
            );
            assert_eq!(
                welcome.details.get("authrole"),
                Some(&Value::String("backend".to_owned()))
            );
            assert_eq!(
                welcome.details.get("authmethod"),
                Some(&Value::String("ticket".to_owned()))
            );
        }
    );
}

#[tokio::test]
async fn wrong_ticket_fails_but_allows_retry() {
    common::setup_test_environment();

    let router = start_router_with_tickets().await;
    let mut connection = router.direct_connect(ConnectionInfo::default());

    connection
        .stream
        .send_message(hello_with_methods(&["ticket"]))
        .unwrap();
    assert_matches::assert_matches!(
        connection.stream.receive_message().await,
        Some(Message::Challenge(_))
    );

    connection
        .stream
        .send_message(authenticate("rumplestiltskin"))
        .unwrap();
    assert_matches::assert_matches!(
        connection.stream.receive_message().await,
        Some(Message::Error(error)) => {
            assert_eq!(error.error.as_ref(), "wamp.error.authentication_failed");
        }
    );

    // The challenge is still pending; a correct ticket completes the session.
    connection.stream.send_message(authenticate("password")).unwrap();
    assert_matches::assert_matches!(
        connection.stream.receive_message().await,
        Some(Message::Welcome(_))
    );
}

#[tokio::test]
async fn hello_offering_unsupported_methods_is_rejected() {
    common::setup_test_environment();

    let router = start_router_with_tickets().await;
    let mut connection = router.direct_connect(ConnectionInfo::default());

    connection
        .stream
        .send_message(hello_with_methods(&["wampcra"]))
        .unwrap();
    assert_matches::assert_matches!(
        connection.stream.receive_message().await,
        Some(Message::Error(error)) => {
            assert_eq!(error.error.as_ref(), "wamp.error.authentication_failed");
        }
    );
}

#[tokio::test]
async fn cookie_reconnect_skips_the_challenge() {
    common::setup_test_environment();

    let router = start_router_with_tickets().await;
    let info = ConnectionInfo {
        cookie: Some("opaque-cookie".to_owned()),
    };

    // First connection authenticates interactively; the cookie is bound on
    // success.
    let mut connection = router.direct_connect(info.clone());
    connection
        .stream
        .send_message(hello_with_methods(&["cookie", "ticket"]))
        .unwrap();
    assert_matches::assert_matches!(
        connection.stream.receive_message().await,
        Some(Message::Challenge(_))
    );
    connection.stream.send_message(authenticate("password")).unwrap();
    assert_matches::assert_matches!(
        connection.stream.receive_message().await,
        Some(Message::Welcome(_))
    );
    drop(connection);

    // The same cookie now authenticates on HELLO alone.
    let mut connection = router.direct_connect(info);
    connection
        .stream
        .send_message(hello_with_methods(&["cookie", "ticket"]))
        .unwrap();
    assert_matches::assert_matches!(
        connection.stream.receive_message().await,
        Some(Message::Welcome(welcome)) => {
            assert_eq!(
                welcome.details.get("authid"),
                Some(&Value::String("test".to_owned()))
            );
            assert_eq!(
                welcome.details.get("authrole"),
                Some(&Value::String("backend".to_owned()))
            );
        }
    );
}

#[tokio::test]
async fn later_authenticator_in_the_chain_can_accept() {
    common::setup_test_environment();

    // The first ticket table does not know this login; the second does. The
    // challenge comes from the first, but verification runs down the whole
    // chain.
    let router = Router::new(RouterConfig {
        realm: Uri::try_from(REALM).unwrap(),
        ..Default::default()
    });
    router
        .add_authenticator(Arc::new(TicketAuthenticator::new([TicketUser {
            login: "someone_else".to_owned(),
            password: "hunter2".to_owned(),
            role: "frontend".to_owned(),
        }])))
        .await;
    router
        .add_authenticator(Arc::new(TicketAuthenticator::new([TicketUser {
            login: "test".to_owned(),
            password: "password".to_owned(),
            role: "backend".to_owned(),
        }])))
        .await;

    let mut connection = router.direct_connect(ConnectionInfo::default());
    connection
        .stream
        .send_message(hello_with_methods(&["ticket"]))
        .unwrap();
    assert_matches::assert_matches!(
        connection.stream.receive_message().await,
        Some(Message::Challenge(_))
    );

    connection.stream.send_message(authenticate("password")).unwrap();
    assert_matches::assert_matches!(
        connection.stream.receive_message().await,
        Some(Message::Welcome(welcome)) => {
            assert_eq!(
                welcome.details.get("authid"),
                Some(&Value::String("test".to_owned()))
            );
            assert_eq!(
                welcome.details.get("authrole"),
                Some(&Value::String("backend".to_owned()))
            );
        }
    );
}

#[tokio::test]
async fn hello_without_methods_is_anonymous() {
    common::setup_test_environment();

    let router = start_router_with_tickets().await;
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
        Some(Message::Welcome(welcome)) => {
            assert_eq!(
                welcome.details.get("authrole"),
                Some(&Value::String("anonymous".to_owned()))
            );
        }
    );
}
