use std::fmt::Debug;

use anyhow::Result;

use crate::{
    message::message::Message,
    serializer::{
        json::JsonSerializer,
        message_pack::MessagePackSerializer,
    },
};

/// The wire format a transport frames its messages with.
///
/// Serializer selection happens during the embedding layer's handshake; the
/// router only needs the outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SerializerType {
    Json,
    MessagePack,
}

/// Encodes messages to bytes and back, via the tag-prefixed list shape.
///
/// One message per frame; batching is not supported.
pub trait Serializer: Send + Debug {
    fn serialize(&self, value: &Message) -> Result<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8]) -> Result<Message>;
}

/// Creates a new [`Serializer`] for the given type.
pub fn new_serializer(serializer_type: SerializerType) -> Box<dyn Serializer> {
    match serializer_type {
        SerializerType::Json => Box::new(JsonSerializer::default()),
        SerializerType::MessagePack => Box::new(MessagePackSerializer::default()),
    }
}
