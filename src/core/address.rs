// src/core/address.rs
// Raw-form ledger addresses: "<workchain>:<64 hex chars>".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("address must look like '<workchain>:<hex>', got '{0}'")]
    Malformed(String),
    #[error("invalid workchain in '{0}'")]
    Workchain(String),
    #[error("account hash must be 32 hex-encoded bytes, got '{0}'")]
    Hash(String),
}

/// Identifier of a single account: workchain number plus the 256-bit
/// account hash. Parsing of friendly/base64 forms happens upstream; this
/// type only deals with the raw form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId {
    pub workchain: i32,
    pub address: [u8; 32],
}

impl AccountId {
    pub fn new(workchain: i32, address: [u8; 32]) -> Self {
        Self { workchain, address }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workchain, hex::encode(self.address))
    }
}

impl FromStr for AccountId {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (wc, hash) = s
            .split_once(':')
            .ok_or_else(|| AddressError::Malformed(s.to_string()))?;
        let workchain: i32 = wc
            .parse()
            .map_err(|_| AddressError::Workchain(s.to_string()))?;
        let bytes = hex::decode(hash).map_err(|_| AddressError::Hash(s.to_string()))?;
        let address: [u8; 32] = bytes
            .try_into()
            .map_err(|_| AddressError::Hash(s.to_string()))?;
        Ok(AccountId { workchain, address })
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
