//! Core types shared by the adapters, normalizers, executor and cache

use serde::{Deserialize, Serialize};

pub mod binary;
pub mod error;
pub mod format;
pub mod request;

pub use binary::*;
pub use error::*;
pub use format::*;
pub use request::*;

/// Identifier of a deployed model endpoint
///
/// Endpoint ids are owned by the persistence layer; the runtime only uses
/// them as cache keys and passes them back to the binary lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub i64);

impl EndpointId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl From<i64> for EndpointId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EndpointId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}
