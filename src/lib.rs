pub mod auth;
pub mod core;
pub mod message;
pub mod router;
pub mod serializer;
pub mod transport;
