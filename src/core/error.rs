use anyhow::Error;
use thiserror::Error;

use crate::{
    core::{
        types::Value,
        uri::Uri,
    },
    message::message::Message,
};

/// A basic error that occurs while processing a WAMP message.
#[derive(Debug, Error)]
pub enum BasicError {
    /// A generic resource was not found.
    ///
    /// WAMP defines standard URIs for not finding specific resource types. This error should only
    /// be used when the standard URI cannot be used.
    #[error("{0}")]
    NotFound(String),
    /// An invalid argument was passed.
    #[error("{0}")]
    InvalidArgument(String),
    /// The operation is not allowed based on process configuration.
    #[error("{0}")]
    NotAllowed(String),
    /// Some internal error occurred.
    ///
    /// Should only be used when there is no other error variant that describes the error, since
    /// the message is very vague and not very useful for debugging.
    #[error("{0}")]
    Internal(String),
}

impl BasicError {
    /// The trailing URI component for the error.
    pub fn uri_component(&self) -> &str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotAllowed(_) => "not_allowed",
            Self::Internal(_) => "internal",
        }
    }
}

/// An interaction error that occurs while processing a WAMP message.
///
/// Interaction errors are clearly defined in the WAMP standard and are reserved for errors that
/// peers must be able to parse easily.
#[derive(Debug, Error)]
pub enum InteractionError {
    /// The incoming message violates the WAMP protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The procedure being called does not exist.
    #[error("no such procedure")]
    NoSuchProcedure,
    /// The registration being referenced does not exist.
    #[error("no such registration")]
    NoSuchRegistration,
    /// The subscription being referenced does not exist.
    #[error("no such subscription")]
    NoSuchSubscription,
    /// The realm being referenced does not exist.
    #[error("no such realm")]
    NoSuchRealm,
    /// The session is not authorized to perform the action.
    #[error("{0}")]
    NotAuthorized(String),
    /// The session could not be authenticated.
    #[error("{0}")]
    AuthenticationFailed(String),
    /// A procedure handler failed or misbehaved.
    #[error("{0}")]
    InvocationError(String),
    /// A message arrived that no handler exists for.
    #[error("unknown message: {0}")]
    UnknownMessage(String),
    /// A pending request expired before any reply arrived.
    #[error("request timed out")]
    Timeout,
}

impl InteractionError {
    /// The trailing URI component for the error.
    pub fn uri_component(&self) -> &str {
        match self {
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::NoSuchProcedure => "no_such_procedure",
            Self::NoSuchRegistration => "no_such_registration",
            Self::NoSuchSubscription => "no_such_subscription",
            Self::NoSuchRealm => "no_such_realm",
            Self::NotAuthorized(_) => "not_authorized",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvocationError(_) => "invocation_error",
            Self::UnknownMessage(_) => "unknown_message",
            Self::Timeout => "timeout",
        }
    }
}

impl Uri {
    /// The standard `wamp.error` URI describing the error.
    pub fn for_error(error: &Error) -> Uri {
        if let Some(error) = error.downcast_ref::<InteractionError>() {
            Uri::from_known(format!("wamp.error.{}", error.uri_component()))
        } else if let Some(error) = error.downcast_ref::<BasicError>() {
            Uri::from_known(format!("wamp.error.{}", error.uri_component()))
        } else {
            Uri::from_known("wamp.error.internal")
        }
    }
}

/// Creates an [`struct@Error`] from a URI error reason and message.
pub fn error_from_uri_reason_and_message(reason: Uri, message: String) -> Error {
    match reason.as_ref() {
        "wamp.error.not_found" => BasicError::NotFound(message).into(),
        "wamp.error.invalid_argument" => BasicError::InvalidArgument(message).into(),
        "wamp.error.not_allowed" => BasicError::NotAllowed(message).into(),
        "wamp.error.protocol_violation" => InteractionError::ProtocolViolation(message).into(),
        "wamp.error.no_such_procedure" => InteractionError::NoSuchProcedure.into(),
        "wamp.error.no_such_registration" => InteractionError::NoSuchRegistration.into(),
        "wamp.error.no_such_subscription" => InteractionError::NoSuchSubscription.into(),
        "wamp.error.no_such_realm" => InteractionError::NoSuchRealm.into(),
        "wamp.error.not_authorized" => InteractionError::NotAuthorized(message).into(),
        "wamp.error.authentication_failed" => {
            InteractionError::AuthenticationFailed(message).into()
        }
        "wamp.error.invocation_error" => InteractionError::InvocationError(message).into(),
        "wamp.error.unknown_message" => InteractionError::UnknownMessage(message).into(),
        "wamp.error.timeout" => InteractionError::Timeout.into(),
        _ => BasicError::Internal(message).into(),
    }
}

/// Extracts a URI error reason and message from a WAMP message.
pub fn extract_error_uri_reason_and_message(message: &Message) -> Result<(&Uri, &str), Error> {
    let reason = match message.reason() {
        Some(reason) => reason,
        None => return Err(Error::msg("message does not contain a reason uri")),
    };
    let message = match message.details().and_then(|details| details.get("message")) {
        Some(Value::String(message)) => message.as_str(),
        _ => "unknown error",
    };
    Ok((reason, message))
}

/// Constructs an [`struct@Error`] from a WAMP message.
///
/// Fails if the message does not describe any error.
pub fn error_from_message(message: &Message) -> Result<Error, Error> {
    let (uri, message) = extract_error_uri_reason_and_message(message)?;
    Ok(error_from_uri_reason_and_message(
        uri.clone(),
        message.to_owned(),
    ))
}

#[cfg(test)]
mod error_test {
    use anyhow::Error;

    use crate::core::{
        error::{
            error_from_uri_reason_and_message,
            BasicError,
            InteractionError,
        },
        uri::Uri,
    };

    #[test]
    fn maps_errors_to_uris() {
        assert_eq!(
            Uri::for_error(&Error::new(InteractionError::NoSuchProcedure)).as_ref(),
            "wamp.error.no_such_procedure"
        );
        assert_eq!(
            Uri::for_error(&Error::new(InteractionError::NotAuthorized("no".to_owned())))
                .as_ref(),
            "wamp.error.not_authorized"
        );
        assert_eq!(
            Uri::for_error(&Error::new(BasicError::NotFound("missing".to_owned()))).as_ref(),
            "wamp.error.not_found"
        );
        assert_eq!(
            Uri::for_error(&Error::msg("anything else")).as_ref(),
            "wamp.error.internal"
        );
    }

    #[test]
    fn maps_uris_to_errors() {
        assert_matches::assert_matches!(
            error_from_uri_reason_and_message(
                Uri::from_known("wamp.error.timeout"),
                "request timed out".to_owned()
            )
            .downcast_ref::<InteractionError>(),
            Some(InteractionError::Timeout)
        );
        assert_matches::assert_matches!(
            error_from_uri_reason_and_message(
                Uri::from_known("wamp.error.who_knows"),
                "mystery".to_owned()
            )
            .downcast_ref::<BasicError>(),
            Some(BasicError::Internal(_))
        );
    }
}
