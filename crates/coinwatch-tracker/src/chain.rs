//! Chain identities.
//!
//! The registry is filled once at startup by whoever loads the process
//! configuration, the tracker only resolves identities from it.

use crate::error::{Error, Result};
use bitcoin::Network;
use bitcoin::bip32::ChildNumber;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Upper-cased crypto code of a chain, such as `BTC` or `LTC`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainId(String);

impl ChainId {
    pub fn new(crypto_code: &str) -> Result<Self> {
        if crypto_code.is_empty() || !crypto_code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::UnknownChain(crypto_code.to_string()));
        }
        Ok(Self(crypto_code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChainId {
    type Error = Error;

    fn try_from(crypto_code: String) -> Result<Self> {
        Self::new(&crypto_code)
    }
}

impl From<ChainId> for String {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Parameters of a tracked chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    pub id: ChainId,
    pub network: Network,
    /// BIP44 coin type, always hardened.
    pub coin_type: ChildNumber,
}

impl ChainParams {
    /// Bitcoin parameters, coin type `0'` on mainnet and `1'` on test networks.
    pub fn bitcoin(network: Network) -> Self {
        let index = match network {
            Network::Bitcoin => 0,
            _ => 1,
        };
        Self {
            id: ChainId("BTC".into()),
            network,
            coin_type: ChildNumber::Hardened { index },
        }
    }

    /// Parameters for another chain sharing the Bitcoin transaction format.
    pub fn with_coin_type(id: ChainId, network: Network, coin_type: u32) -> Result<Self> {
        let coin_type = ChildNumber::from_hardened_idx(coin_type)
            .map_err(|err| Error::UnknownChain(format!("{id}: {err}")))?;
        Ok(Self {
            id,
            network,
            coin_type,
        })
    }
}

/// Chains known to the process, keyed by [`ChainId`].
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: HashMap<ChainId, ChainParams>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `params`, replacing any earlier entry for the same chain.
    pub fn register(&mut self, params: ChainParams) -> Option<ChainParams> {
        self.chains.insert(params.id.clone(), params)
    }

    pub fn get(&self, id: &ChainId) -> Option<&ChainParams> {
        self.chains.get(id)
    }

    /// Looks up a chain by crypto code, case-insensitively.
    pub fn resolve(&self, crypto_code: &str) -> Result<&ChainParams> {
        let id = ChainId::new(crypto_code)?;
        self.chains
            .get(&id)
            .ok_or_else(|| Error::UnknownChain(crypto_code.to_string()))
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainParams> {
        self.chains.values()
    }
}
