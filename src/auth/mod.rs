pub mod authenticator;
pub mod authorizer;
pub mod cookie;
pub mod identity;
pub mod ticket;
