use crate::core::{
    id::Id,
    types::{
        Dictionary,
        Integer,
        List,
        Value,
    },
    uri::{
        Uri,
        WildcardUri,
    },
};

/// Initiates a new session between a client and the router.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HelloMessage {
    pub realm: Uri,
    pub details: Dictionary,
}

impl HelloMessage {
    /// The authentication methods offered in the HELLO details.
    pub fn auth_methods(&self) -> Vec<String> {
        self.details
            .get("authmethods")
            .and_then(Value::list)
            .map(|methods| {
                methods
                    .iter()
                    .filter_map(|method| method.string().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The authentication ID offered in the HELLO details.
    pub fn authid(&self) -> Option<&str> {
        self.details.get("authid").and_then(Value::string)
    }
}

/// Accepts a session into the realm.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WelcomeMessage {
    pub session: Id,
    pub details: Dictionary,
}

/// Rejects a session before it is established.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AbortMessage {
    pub details: Dictionary,
    pub reason: Uri,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// Demands proof of identity before a session is established.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChallengeMessage {
    pub auth_method: String,
    pub extra: Dictionary,
}

/// Answers a CHALLENGE with a signature.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuthenticateMessage {
    pub signature: String,
    pub extra: Dictionary,
}

/// Closes a session in an orderly manner.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GoodbyeMessage {
    pub details: Dictionary,
    pub reason: Uri,
}

/// Reports a failed request back to its originator.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub request_type: Integer,
    pub request: Id,
    pub details: Dictionary,
    pub error: Uri,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// Publishes an event to a topic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishMessage {
    pub request: Id,
    pub options: Dictionary,
    pub topic: Uri,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

impl PublishMessage {
    /// Whether the publisher asked for a PUBLISHED acknowledgement.
    pub fn acknowledge(&self) -> bool {
        self.options
            .get("acknowledge")
            .and_then(Value::boolean)
            .unwrap_or(false)
    }
}

/// Acknowledges a PUBLISH.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub publish_request: Id,
    pub publication: Id,
}

/// Subscribes the session to a topic pattern.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscribeMessage {
    pub request: Id,
    pub options: Dictionary,
    pub topic: WildcardUri,
}

/// Acknowledges a SUBSCRIBE.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscribedMessage {
    pub subscribe_request: Id,
    pub subscription: Id,
}

/// Removes a subscription.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnsubscribeMessage {
    pub request: Id,
    pub subscribed_subscription: Id,
}

/// Acknowledges an UNSUBSCRIBE.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnsubscribedMessage {
    pub unsubscribe_request: Id,
}

/// Delivers a published event to a subscriber.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventMessage {
    pub subscribed_subscription: Id,
    pub published_publication: Id,
    pub details: Dictionary,
    pub publish_arguments: List,
    pub publish_arguments_keyword: Dictionary,
}

/// Calls a procedure.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: Uri,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// Delivers the result of a completed call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResultMessage {
    pub call_request: Id,
    pub details: Dictionary,
    pub yield_arguments: List,
    pub yield_arguments_keyword: Dictionary,
}

/// Registers a procedure pattern for the session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegisterMessage {
    pub request: Id,
    pub options: Dictionary,
    pub procedure: WildcardUri,
}

/// Acknowledges a REGISTER.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegisteredMessage {
    pub register_request: Id,
    pub registration: Id,
}

/// Removes a registration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnregisterMessage {
    pub request: Id,
    pub registered_registration: Id,
}

/// Acknowledges an UNREGISTER.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnregisteredMessage {
    pub unregister_request: Id,
}

/// Asks a callee to run a registered procedure.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvocationMessage {
    pub request: Id,
    pub registered_registration: Id,
    pub details: Dictionary,
    pub call_arguments: List,
    pub call_arguments_keyword: Dictionary,
}

/// Delivers the result of an invocation back to the router.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct YieldMessage {
    pub invocation_request: Id,
    pub options: Dictionary,
    pub arguments: List,
    pub arguments_keyword: Dictionary,
}

/// A WAMP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello(HelloMessage),
    Welcome(WelcomeMessage),
    Abort(AbortMessage),
    Challenge(ChallengeMessage),
    Authenticate(AuthenticateMessage),
    Goodbye(GoodbyeMessage),
    Error(ErrorMessage),
    Publish(PublishMessage),
    Published(PublishedMessage),
    Subscribe(SubscribeMessage),
    Subscribed(SubscribedMessage),
    Unsubscribe(UnsubscribeMessage),
    Unsubscribed(UnsubscribedMessage),
    Event(EventMessage),
    Call(CallMessage),
    Result(ResultMessage),
    Register(RegisterMessage),
    Registered(RegisteredMessage),
    Unregister(UnregisterMessage),
    Unregistered(UnregisteredMessage),
    Invocation(InvocationMessage),
    Yield(YieldMessage),
}

impl Message {
    pub const HELLO_TAG: Integer = 1;
    pub const WELCOME_TAG: Integer = 2;
    pub const ABORT_TAG: Integer = 3;
    pub const CHALLENGE_TAG: Integer = 4;
    pub const AUTHENTICATE_TAG: Integer = 5;
    pub const GOODBYE_TAG: Integer = 6;
    pub const ERROR_TAG: Integer = 8;
    pub const PUBLISH_TAG: Integer = 16;
    pub const PUBLISHED_TAG: Integer = 17;
    pub const SUBSCRIBE_TAG: Integer = 32;
    pub const SUBSCRIBED_TAG: Integer = 33;
    pub const UNSUBSCRIBE_TAG: Integer = 34;
    pub const UNSUBSCRIBED_TAG: Integer = 35;
    pub const EVENT_TAG: Integer = 36;
    pub const CALL_TAG: Integer = 48;
    pub const RESULT_TAG: Integer = 50;
    pub const REGISTER_TAG: Integer = 64;
    pub const REGISTERED_TAG: Integer = 65;
    pub const UNREGISTER_TAG: Integer = 66;
    pub const UNREGISTERED_TAG: Integer = 67;
    pub const INVOCATION_TAG: Integer = 68;
    pub const YIELD_TAG: Integer = 70;

    /// The numeric tag leading the message on the wire.
    pub fn tag(&self) -> Integer {
        match self {
            Self::Hello(_) => Self::HELLO_TAG,
            Self::Welcome(_) => Self::WELCOME_TAG,
            Self::Abort(_) => Self::ABORT_TAG,
            Self::Challenge(_) => Self::CHALLENGE_TAG,
            Self::Authenticate(_) => Self::AUTHENTICATE_TAG,
            Self::Goodbye(_) => Self::GOODBYE_TAG,
            Self::Error(_) => Self::ERROR_TAG,
            Self::Publish(_) => Self::PUBLISH_TAG,
            Self::Published(_) => Self::PUBLISHED_TAG,
            Self::Subscribe(_) => Self::SUBSCRIBE_TAG,
            Self::Subscribed(_) => Self::SUBSCRIBED_TAG,
            Self::Unsubscribe(_) => Self::UNSUBSCRIBE_TAG,
            Self::Unsubscribed(_) => Self::UNSUBSCRIBED_TAG,
            Self::Event(_) => Self::EVENT_TAG,
            Self::Call(_) => Self::CALL_TAG,
            Self::Result(_) => Self::RESULT_TAG,
            Self::Register(_) => Self::REGISTER_TAG,
            Self::Registered(_) => Self::REGISTERED_TAG,
            Self::Unregister(_) => Self::UNREGISTER_TAG,
            Self::Unregistered(_) => Self::UNREGISTERED_TAG,
            Self::Invocation(_) => Self::INVOCATION_TAG,
            Self::Yield(_) => Self::YIELD_TAG,
        }
    }

    /// The message name, mostly for logging.
    pub fn message_name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "HELLO",
            Self::Welcome(_) => "WELCOME",
            Self::Abort(_) => "ABORT",
            Self::Challenge(_) => "CHALLENGE",
            Self::Authenticate(_) => "AUTHENTICATE",
            Self::Goodbye(_) => "GOODBYE",
            Self::Error(_) => "ERROR",
            Self::Publish(_) => "PUBLISH",
            Self::Published(_) => "PUBLISHED",
            Self::Subscribe(_) => "SUBSCRIBE",
            Self::Subscribed(_) => "SUBSCRIBED",
            Self::Unsubscribe(_) => "UNSUBSCRIBE",
            Self::Unsubscribed(_) => "UNSUBSCRIBED",
            Self::Event(_) => "EVENT",
            Self::Call(_) => "CALL",
            Self::Result(_) => "RESULT",
            Self::Register(_) => "REGISTER",
            Self::Registered(_) => "REGISTERED",
            Self::Unregister(_) => "UNREGISTER",
            Self::Unregistered(_) => "UNREGISTERED",
            Self::Invocation(_) => "INVOCATION",
            Self::Yield(_) => "YIELD",
        }
    }

    /// The request ID on the message.
    pub fn request_id(&self) -> Option<Id> {
        match self {
            Self::Error(message) => Some(message.request),
            Self::Publish(message) => Some(message.request),
            Self::Published(message) => Some(message.publish_request),
            Self::Subscribe(message) => Some(message.request),
            Self::Subscribed(message) => Some(message.subscribe_request),
            Self::Unsubscribe(message) => Some(message.request),
            Self::Unsubscribed(message) => Some(message.unsubscribe_request),
            Self::Call(message) => Some(message.request),
            Self::Result(message) => Some(message.call_request),
            Self::Register(message) => Some(message.request),
            Self::Registered(message) => Some(message.register_request),
            Self::Unregister(message) => Some(message.request),
            Self::Unregistered(message) => Some(message.unregister_request),
            Self::Invocation(message) => Some(message.request),
            Self::Yield(message) => Some(message.invocation_request),
            _ => None,
        }
    }

    /// The details dictionary on the message.
    pub fn details(&self) -> Option<&Dictionary> {
        match self {
            Self::Hello(message) => Some(&message.details),
            Self::Welcome(message) => Some(&message.details),
            Self::Abort(message) => Some(&message.details),
            Self::Goodbye(message) => Some(&message.details),
            Self::Error(message) => Some(&message.details),
            Self::Event(message) => Some(&message.details),
            Self::Result(message) => Some(&message.details),
            Self::Invocation(message) => Some(&message.details),
            _ => None,
        }
    }

    /// The error reason on the message.
    pub fn reason(&self) -> Option<&Uri> {
        match self {
            Self::Abort(message) => Some(&message.reason),
            Self::Goodbye(message) => Some(&message.reason),
            Self::Error(message) => Some(&message.error),
            _ => None,
        }
    }
}
