//! Matching inputs and outputs, and the event sent for a matched transaction.

use crate::chain::ChainId;
use crate::error::{Error, Result};
use bitcoin::bip32::DerivationPath;
use bitcoin::{Address, Amount, BlockHash, OutPoint, ScriptBuf, Transaction, TxOut, Txid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DERIVATION_SCHEME_PREFIX: &str = "DERIVATIONSCHEME:";
const ADDRESS_PREFIX: &str = "ADDRESS:";

/// Opaque identity of a derivation scheme, as rendered by the wallet layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivationScheme(String);

impl DerivationScheme {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self(scheme.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DerivationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a wallet tracks: a whole derivation scheme or a single address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TrackedSource {
    DerivationScheme(DerivationScheme),
    Address(String),
}

impl TrackedSource {
    pub fn from_address(address: &Address) -> Self {
        Self::Address(address.to_string())
    }

    pub fn derivation_scheme(&self) -> Option<&DerivationScheme> {
        match self {
            Self::DerivationScheme(scheme) => Some(scheme),
            Self::Address(_) => None,
        }
    }
}

impl fmt::Display for TrackedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DerivationScheme(scheme) => write!(f, "{DERIVATION_SCHEME_PREFIX}{scheme}"),
            Self::Address(address) => write!(f, "{ADDRESS_PREFIX}{address}"),
        }
    }
}

impl FromStr for TrackedSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(scheme) = s.strip_prefix(DERIVATION_SCHEME_PREFIX) {
            if !scheme.is_empty() {
                return Ok(Self::DerivationScheme(DerivationScheme::new(scheme)));
            }
        } else if let Some(address) = s.strip_prefix(ADDRESS_PREFIX) {
            if !address.is_empty() {
                return Ok(Self::Address(address.to_string()));
            }
        }
        Err(Error::Serialization(format!("Invalid tracked source: {s}")))
    }
}

impl TryFrom<String> for TrackedSource {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TrackedSource> for String {
    fn from(source: TrackedSource) -> Self {
        source.to_string()
    }
}

/// A script the wallet layer expects to receive on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Derivation path of the script, `None` for a plain address.
    pub key_path: Option<DerivationPath>,
    pub script_pubkey: ScriptBuf,
    pub redeem_script: Option<ScriptBuf>,
}

/// Spendable output rebuilt from a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub outpoint: OutPoint,
    pub tx_out: TxOut,
    /// Script needed to spend a script-hash output.
    pub redeem_script: Option<ScriptBuf>,
}

impl Coin {
    pub fn is_script_coin(&self) -> bool {
        self.redeem_script.is_some()
    }

    pub fn amount(&self) -> Amount {
        self.tx_out.value
    }
}

/// Transaction output paying to one of the tracked scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<DerivationPath>,
    pub script_pubkey: ScriptBuf,
    #[serde(rename = "redeem")]
    pub redeem_script: Option<ScriptBuf>,
    #[serde(rename = "index")]
    pub output_index: u32,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub value: Amount,
}

impl MatchedOutput {
    /// Rebuilds the coin created by this output in transaction `txid`.
    ///
    /// An empty redeem script is treated as absent.
    pub fn as_coin(&self, txid: Txid) -> Coin {
        Coin {
            outpoint: OutPoint::new(txid, self.output_index),
            tx_out: TxOut {
                value: self.value,
                script_pubkey: self.script_pubkey.clone(),
            },
            redeem_script: self.redeem_script.clone().filter(|script| !script.is_empty()),
        }
    }
}

/// A transaction as seen by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    #[serde(with = "transaction_hex")]
    pub transaction: Transaction,
    pub height: Option<u32>,
    pub confirmations: u32,
    /// Unix time the transaction was first seen, in seconds.
    pub timestamp: u64,
}

impl TransactionData {
    /// Unconfirmed transaction first seen at `timestamp`.
    pub fn unconfirmed(transaction: Transaction, timestamp: u64) -> Self {
        Self {
            transaction,
            height: None,
            confirmations: 0,
            timestamp,
        }
    }

    pub fn txid(&self) -> Txid {
        self.transaction.compute_txid()
    }
}

mod transaction_hex {
    use bitcoin::Transaction;
    use bitcoin::consensus::encode;
    use bitcoin::hex::FromHex;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(tx: &Transaction, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode::serialize_hex(tx))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Transaction, D::Error> {
        let hex = String::deserialize(deserializer)?;
        let bytes = Vec::<u8>::from_hex(&hex).map_err(D::Error::custom)?;
        encode::deserialize(&bytes).map_err(D::Error::custom)
    }
}

/// Notification for a transaction paying to a tracked source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransactionEvent {
    pub crypto_code: ChainId,
    pub block_id: Option<BlockHash>,
    pub tracked_source: TrackedSource,
    #[serde(rename = "derivationStrategy", skip_serializing_if = "Option::is_none")]
    pub derivation: Option<DerivationScheme>,
    pub transaction_data: TransactionData,
    pub outputs: Vec<MatchedOutput>,
}

impl NewTransactionEvent {
    pub const EVENT_TYPE: &'static str = "newtransaction";

    /// Coins created by the matched outputs, in output order.
    pub fn received_coins(&self) -> Vec<Coin> {
        let txid = self.transaction_data.txid();
        self.outputs.iter().map(|output| output.as_coin(txid)).collect()
    }

    /// Renders the event inside its `{"type", "data"}` envelope.
    pub fn to_json(&self) -> Result<String> {
        let envelope = serde_json::json!({
            "type": Self::EVENT_TYPE,
            "data": self,
        });
        Ok(serde_json::to_string(&envelope)?)
    }
}
