pub mod common;
pub mod message;
mod payload;
