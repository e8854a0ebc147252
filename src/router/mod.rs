mod connection;
mod registrations;
mod router;
mod session;

pub use connection::ConnectionInfo;
pub use registrations::{
    EventHandler,
    PatternOptions,
    ProcedureHandler,
};
pub use router::{
    DirectConnection,
    Router,
    RouterConfig,
    SessionHook,
};
