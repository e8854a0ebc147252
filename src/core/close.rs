use crate::core::uri::Uri;

/// The reason for closing a WAMP session.
///
/// Peers announce `CloseRealm` when leaving; the router always answers with
/// `GoodbyeAndOut`.
#[derive(Debug, Clone, Copy)]
pub enum CloseReason {
    CloseRealm,
    GoodbyeAndOut,
}

impl CloseReason {
    fn uri_component(&self) -> &str {
        match self {
            Self::CloseRealm => "close_realm",
            Self::GoodbyeAndOut => "goodbye_and_out",
        }
    }

    /// URI for the close reason.
    pub fn uri(&self) -> Uri {
        Uri::from_known(format!("wamp.close.{}", self.uri_component()))
    }
}
