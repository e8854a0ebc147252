use anyhow::{
    Error,
    Result,
};

use crate::{
    core::{
        id::Id,
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
        AbortMessage,
        AuthenticateMessage,
        CallMessage,
        ChallengeMessage,
        ErrorMessage,
        EventMessage,
        GoodbyeMessage,
        HelloMessage,
        InvocationMessage,
        Message,
        PublishMessage,
        PublishedMessage,
        RegisterMessage,
        RegisteredMessage,
        ResultMessage,
        SubscribeMessage,
        SubscribedMessage,
        UnregisterMessage,
        UnregisteredMessage,
        UnsubscribeMessage,
        UnsubscribedMessage,
        WelcomeMessage,
        YieldMessage,
    },
};

fn id_value(id: Id) -> Value {
    Value::Integer(u64::from(id))
}

/// Appends the trailing argument fields, omitting empty ones where the wire
/// format allows. Keyword arguments force the positional list to be present.
fn push_arguments(payload: &mut List, arguments: &List, arguments_keyword: &Dictionary) {
    if !arguments.is_empty() || !arguments_keyword.is_empty() {
        payload.push(Value::List(arguments.clone()));
    }
    if !arguments_keyword.is_empty() {
        payload.push(Value::Dictionary(arguments_keyword.clone()));
    }
}

/// A cursor over the positional fields of one wire-format message.
struct Fields {
    name: &'static str,
    values: std::vec::IntoIter<Value>,
}

impl Fields {
    fn new(name: &'static str, values: Vec<Value>) -> Self {
        Self {
            name,
            values: values.into_iter(),
        }
    }

    fn next(&mut self, field: &'static str) -> Result<Value> {
        self.values
            .next()
            .ok_or_else(|| Error::msg(format!("{} message missing {field}", self.name)))
    }

    fn id(&mut self, field: &'static str) -> Result<Id> {
        let value = self.next(field)?;
        let value = value
            .integer()
            .ok_or_else(|| Error::msg(format!("{} in {} must be an integer", field, self.name)))?;
        Id::try_from(value).map_err(Error::new)
    }

    fn integer(&mut self, field: &'static str) -> Result<u64> {
        self.next(field)?
            .integer()
            .ok_or_else(|| Error::msg(format!("{} in {} must be an integer", field, self.name)))
    }

    fn string(&mut self, field: &'static str) -> Result<String> {
        match self.next(field)? {
            Value::String(value) => Ok(value),
            _ => Err(Error::msg(format!(
                "{} in {} must be a string",
                field, self.name
            ))),
        }
    }

    fn uri(&mut self, field: &'static str) -> Result<Uri> {
        Uri::try_from(self.string(field)?).map_err(Error::new)
    }

    fn wildcard_uri(&mut self, field: &'static str) -> Result<WildcardUri> {
        WildcardUri::try_from(self.string(field)?).map_err(Error::new)
    }

    fn dictionary(&mut self, field: &'static str) -> Result<Dictionary> {
        match self.next(field)? {
            Value::Dictionary(value) => Ok(value),
            _ => Err(Error::msg(format!(
                "{} in {} must be a dictionary",
                field, self.name
            ))),
        }
    }

    fn arguments(&mut self) -> Result<(List, Dictionary)> {
        let arguments = match self.values.next() {
            Some(Value::List(value)) => value,
            Some(_) => return Err(Error::msg(format!("arguments in {} must be a list", self.name))),
            None => return Ok((List::default(), Dictionary::default())),
        };
        let arguments_keyword = match self.values.next() {
            Some(Value::Dictionary(value)) => value,
            Some(_) => {
                return Err(Error::msg(format!(
                    "keyword arguments in {} must be a dictionary",
                    self.name
                )))
            }
            None => Dictionary::default(),
        };
        Ok((arguments, arguments_keyword))
    }
}

impl Message {
    /// Converts the message to its wire shape: a list led by the numeric tag.
    pub fn to_payload(&self) -> List {
        let mut payload = vec![Value::Integer(self.tag())];
        match self {
            Self::Hello(message) => {
                payload.push(Value::String(message.realm.to_string()));
                payload.push(Value::Dictionary(message.details.clone()));
            }
            Self::Welcome(message) => {
                payload.push(id_value(message.session));
                payload.push(Value::Dictionary(message.details.clone()));
            }
            Self::Abort(message) => {
                payload.push(Value::Dictionary(message.details.clone()));
                payload.push(Value::String(message.reason.to_string()));
                push_arguments(&mut payload, &message.arguments, &message.arguments_keyword);
            }
            Self::Challenge(message) => {
                payload.push(Value::String(message.auth_method.clone()));
                payload.push(Value::Dictionary(message.extra.clone()));
            }
            Self::Authenticate(message) => {
                payload.push(Value::String(message.signature.clone()));
                payload.push(Value::Dictionary(message.extra.clone()));
            }
            Self::Goodbye(message) => {
                payload.push(Value::Dictionary(message.details.clone()));
                payload.push(Value::String(message.reason.to_string()));
            }
            Self::Error(message) => {
                payload.push(Value::Integer(message.request_type));
                payload.push(id_value(message.request));
                payload.push(Value::Dictionary(message.details.clone()));
                payload.push(Value::String(message.error.to_string()));
                push_arguments(&mut payload, &message.arguments, &message.arguments_keyword);
            }
            Self::Publish(message) => {
                payload.push(id_value(message.request));
                payload.push(Value::Dictionary(message.options.clone()));
                payload.push(Value::String(message.topic.to_string()));
                push_arguments(&mut payload, &message.arguments, &message.arguments_keyword);
            }
            Self::Published(message) => {
                payload.push(id_value(message.publish_request));
                payload.push(id_value(message.publication));
            }
            Self::Subscribe(message) => {
                payload.push(id_value(message.request));
                payload.push(Value::Dictionary(message.options.clone()));
                payload.push(Value::String(message.topic.to_string()));
            }
            Self::Subscribed(message) => {
                payload.push(id_value(message.subscribe_request));
                payload.push(id_value(message.subscription));
            }
            Self::Unsubscribe(message) => {
                payload.push(id_value(message.request));
                payload.push(id_value(message.subscribed_subscription));
            }
            Self::Unsubscribed(message) => {
                payload.push(id_value(message.unsubscribe_request));
            }
            Self::Event(message) => {
                payload.push(id_value(message.subscribed_subscription));
                payload.push(id_value(message.published_publication));
                payload.push(Value::Dictionary(message.details.clone()));
                push_arguments(
                    &mut payload,
                    &message.publish_arguments,
                    &message.publish_arguments_keyword,
                );
            }
            Self::Call(message) => {
                payload.push(id_value(message.request));
                payload.push(Value::Dictionary(message.options.clone()));
                payload.push(Value::String(message.procedure.to_string()));
                push_arguments(&mut payload, &message.arguments, &message.arguments_keyword);
            }
            Self::Result(message) => {
                payload.push(id_value(message.call_request));
                payload.push(Value::Dictionary(message.details.clone()));
                push_arguments(
                    &mut payload,
                    &message.yield_arguments,
                    &message.yield_arguments_keyword,
                );
            }
            Self::Register(message) => {
                payload.push(id_value(message.request));
                payload.push(Value::Dictionary(message.options.clone()));
                payload.push(Value::String(message.procedure.to_string()));
            }
            Self::Registered(message) => {
                payload.push(id_value(message.register_request));
                payload.push(id_value(message.registration));
            }
            Self::Unregister(message) => {
                payload.push(id_value(message.request));
                payload.push(id_value(message.registered_registration));
            }
            Self::Unregistered(message) => {
                payload.push(id_value(message.unregister_request));
            }
            Self::Invocation(message) => {
                payload.push(id_value(message.request));
                payload.push(id_value(message.registered_registration));
                payload.push(Value::Dictionary(message.details.clone()));
                push_arguments(
                    &mut payload,
                    &message.call_arguments,
                    &message.call_arguments_keyword,
                );
            }
            Self::Yield(message) => {
                payload.push(id_value(message.invocation_request));
                payload.push(Value::Dictionary(message.options.clone()));
                push_arguments(&mut payload, &message.arguments, &message.arguments_keyword);
            }
        }
        payload
    }

    /// Reconstructs a message from its wire shape.
    pub fn from_payload(payload: List) -> Result<Message> {
        let mut payload = payload.into_iter();
        let tag = payload
            .next()
            .and_then(|tag| tag.integer())
            .ok_or_else(|| Error::msg("message payload must start with an integer tag"))?;
        let rest = payload.collect::<Vec<_>>();
        match tag {
            Self::HELLO_TAG => {
                let mut fields = Fields::new("HELLO", rest);
                Ok(Self::Hello(HelloMessage {
                    realm: fields.uri("realm")?,
                    details: fields.dictionary("details")?,
                }))
            }
            Self::WELCOME_TAG => {
                let mut fields = Fields::new("WELCOME", rest);
                Ok(Self::Welcome(WelcomeMessage {
                    session: fields.id("session")?,
                    details: fields.dictionary("details")?,
                }))
            }
            Self::ABORT_TAG => {
                let mut fields = Fields::new("ABORT", rest);
                let details = fields.dictionary("details")?;
                let reason = fields.uri("reason")?;
                let (arguments, arguments_keyword) = fields.arguments()?;
                Ok(Self::Abort(AbortMessage {
                    details,
                    reason,
                    arguments,
                    arguments_keyword,
                }))
            }
            Self::CHALLENGE_TAG => {
                let mut fields = Fields::new("CHALLENGE", rest);
                Ok(Self::Challenge(ChallengeMessage {
                    auth_method: fields.string("authmethod")?,
                    extra: fields.dictionary("extra")?,
                }))
            }
            Self::AUTHENTICATE_TAG => {
                let mut fields = Fields::new("AUTHENTICATE", rest);
                Ok(Self::Authenticate(AuthenticateMessage {
                    signature: fields.string("signature")?,
                    extra: fields.dictionary("extra").unwrap_or_default(),
                }))
            }
            Self::GOODBYE_TAG => {
                let mut fields = Fields::new("GOODBYE", rest);
                Ok(Self::Goodbye(GoodbyeMessage {
                    details: fields.dictionary("details")?,
                    reason: fields.uri("reason")?,
                }))
            }
            Self::ERROR_TAG => {
                let mut fields = Fields::new("ERROR", rest);
                let request_type = fields.integer("request type")?;
                let request = fields.id("request")?;
                let details = fields.dictionary("details")?;
                let error = fields.uri("error")?;
                let (arguments, arguments_keyword) = fields.arguments()?;
                Ok(Self::Error(ErrorMessage {
                    request_type,
                    request,
                    details,
                    error,
                    arguments,
                    arguments_keyword,
                }))
            }
            Self::PUBLISH_TAG => {
                let mut fields = Fields::new("PUBLISH", rest);
                let request = fields.id("request")?;
                let options = fields.dictionary("options")?;
                let topic = fields.uri("topic")?;
                let (arguments, arguments_keyword) = fields.arguments()?;
                Ok(Self::Publish(PublishMessage {
                    request,
                    options,
                    topic,
                    arguments,
                    arguments_keyword,
                }))
            }
            Self::PUBLISHED_TAG => {
                let mut fields = Fields::new("PUBLISHED", rest);
                Ok(Self::Published(PublishedMessage {
                    publish_request: fields.id("publish request")?,
                    publication: fields.id("publication")?,
                }))
            }
            Self::SUBSCRIBE_TAG => {
                let mut fields = Fields::new("SUBSCRIBE", rest);
                Ok(Self::Subscribe(SubscribeMessage {
                    request: fields.id("request")?,
                    options: fields.dictionary("options")?,
                    topic: fields.wildcard_uri("topic")?,
                }))
            }
            Self::SUBSCRIBED_TAG => {
                let mut fields = Fields::new("SUBSCRIBED", rest);
                Ok(Self::Subscribed(SubscribedMessage {
                    subscribe_request: fields.id("subscribe request")?,
                    subscription: fields.id("subscription")?,
                }))
            }
            Self::UNSUBSCRIBE_TAG => {
                let mut fields = Fields::new("UNSUBSCRIBE", rest);
                Ok(Self::Unsubscribe(UnsubscribeMessage {
                    request: fields.id("request")?,
                    subscribed_subscription: fields.id("subscription")?,
                }))
            }
            Self::UNSUBSCRIBED_TAG => {
                let mut fields = Fields::new("UNSUBSCRIBED", rest);
                Ok(Self::Unsubscribed(UnsubscribedMessage {
                    unsubscribe_request: fields.id("unsubscribe request")?,
                }))
            }
            Self::EVENT_TAG => {
                let mut fields = Fields::new("EVENT", rest);
                let subscribed_subscription = fields.id("subscription")?;
                let published_publication = fields.id("publication")?;
                let details = fields.dictionary("details")?;
                let (publish_arguments, publish_arguments_keyword) = fields.arguments()?;
                Ok(Self::Event(EventMessage {
                    subscribed_subscription,
                    published_publication,
                    details,
                    publish_arguments,
                    publish_arguments_keyword,
                }))
            }
            Self::CALL_TAG => {
                let mut fields = Fields::new("CALL", rest);
                let request = fields.id("request")?;
                let options = fields.dictionary("options")?;
                let procedure = fields.uri("procedure")?;
                let (arguments, arguments_keyword) = fields.arguments()?;
                Ok(Self::Call(CallMessage {
                    request,
                    options,
                    procedure,
                    arguments,
                    arguments_keyword,
                }))
            }
            Self::RESULT_TAG => {
                let mut fields = Fields::new("RESULT", rest);
                let call_request = fields.id("call request")?;
                let details = fields.dictionary("details")?;
                let (yield_arguments, yield_arguments_keyword) = fields.arguments()?;
                Ok(Self::Result(ResultMessage {
                    call_request,
                    details,
                    yield_arguments,
                    yield_arguments_keyword,
                }))
            }
            Self::REGISTER_TAG => {
                let mut fields = Fields::new("REGISTER", rest);
                Ok(Self::Register(RegisterMessage {
                    request: fields.id("request")?,
                    options: fields.dictionary("options")?,
                    procedure: fields.wildcard_uri("procedure")?,
                }))
            }
            Self::REGISTERED_TAG => {
                let mut fields = Fields::new("REGISTERED", rest);
                Ok(Self::Registered(RegisteredMessage {
                    register_request: fields.id("register request")?,
                    registration: fields.id("registration")?,
                }))
            }
            Self::UNREGISTER_TAG => {
                let mut fields = Fields::new("UNREGISTER", rest);
                Ok(Self::Unregister(UnregisterMessage {
                    request: fields.id("request")?,
                    registered_registration: fields.id("registration")?,
                }))
            }
            Self::UNREGISTERED_TAG => {
                let mut fields = Fields::new("UNREGISTERED", rest);
                Ok(Self::Unregistered(UnregisteredMessage {
                    unregister_request: fields.id("unregister request")?,
                }))
            }
            Self::INVOCATION_TAG => {
                let mut fields = Fields::new("INVOCATION", rest);
                let request = fields.id("request")?;
                let registered_registration = fields.id("registration")?;
                let details = fields.dictionary("details")?;
                let (call_arguments, call_arguments_keyword) = fields.arguments()?;
                Ok(Self::Invocation(InvocationMessage {
                    request,
                    registered_registration,
                    details,
                    call_arguments,
                    call_arguments_keyword,
                }))
            }
            Self::YIELD_TAG => {
                let mut fields = Fields::new("YIELD", rest);
                let invocation_request = fields.id("invocation request")?;
                let options = fields.dictionary("options")?;
                let (arguments, arguments_keyword) = fields.arguments()?;
                Ok(Self::Yield(YieldMessage {
                    invocation_request,
                    options,
                    arguments,
                    arguments_keyword,
                }))
            }
            _ => Err(Error::msg(format!("unknown message tag {tag}"))),
        }
    }
}
