use std::fmt::Display;

use anyhow::Error;
use async_trait::async_trait;
use rand::Rng;
use serde::{
    de::Visitor,
    Deserialize,
    Serialize,
};
use thiserror::Error;

/// An error resulting from using an integer outside of the allowed ID range.
#[derive(Debug, Error)]
#[error("id {id} is out of range")]
pub struct IdOutOfRange {
    id: u64,
}

/// An ID, which is an integer between 1 and 2^53 (inclusive).
///
/// IDs in the 53-bit range are safe integers in IEEE-754 doubles, so they
/// survive JSON serialization in every WAMP client environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u64);

impl Id {
    pub const MIN: u64 = 1;
    pub const MAX: u64 = 9007199254740992;
}

impl Default for Id {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<u64> for Id {
    type Error = IdOutOfRange;
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            Err(IdOutOfRange { id: value })
        } else {
            Ok(Self(value))
        }
    }
}

impl From<Id> for u64 {
    fn from(value: Id) -> Self {
        value.0
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

struct IdVisitor;

impl Visitor<'_> for IdVisitor {
    type Value = Id;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "an integer between {} and {}", Id::MIN, Id::MAX)
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Id::try_from(v).map_err(|_| E::custom(format!("invalid id {v}")))
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_u64(IdVisitor)
    }
}

/// An object for generating [`Id`]s.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    /// Generates the next ID.
    async fn generate_id(&self) -> Result<Id, Error>;
}

/// An [`IdAllocator`] that generates IDs randomly over the whole allowed
/// range. Uniqueness is probabilistic, not guaranteed.
#[derive(Debug, Default)]
pub struct RandomIdAllocator {}

#[async_trait]
impl IdAllocator for RandomIdAllocator {
    async fn generate_id(&self) -> Result<Id, Error> {
        Id::try_from(rand::rng().random_range(Id::MIN..=Id::MAX)).map_err(Error::new)
    }
}

#[cfg(test)]
mod id_test {
    use crate::core::id::{
        Id,
        IdAllocator,
        RandomIdAllocator,
    };

    #[test]
    fn validates_range() {
        assert!(Id::try_from(0).is_err());
        assert!(Id::try_from(1).is_ok());
        assert!(Id::try_from(9007199254740992).is_ok());
        assert!(Id::try_from(9007199254740993).is_err());
    }

    #[tokio::test]
    async fn generates_ids_in_range() {
        let allocator = RandomIdAllocator::default();
        for _ in 0..100 {
            let id = allocator.generate_id().await.unwrap();
            let id = u64::from(id);
            assert!((Id::MIN..=Id::MAX).contains(&id));
        }
    }
}
