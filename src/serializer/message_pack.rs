use anyhow::{
    Error,
    Result,
};

use crate::{
    core::types::List,
    message::message::Message,
    serializer::serializer::Serializer,
};

/// A serializer implemented for MessagePack.
#[derive(Debug, Default)]
pub struct MessagePackSerializer {}

impl Serializer for MessagePackSerializer {
    fn serialize(&self, value: &Message) -> Result<Vec<u8>> {
        rmp_serde::to_vec(&value.to_payload()).map_err(Error::new)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Message> {
        let payload = rmp_serde::from_slice::<List>(bytes).map_err(Error::new)?;
        Message::from_payload(payload)
    }
}
