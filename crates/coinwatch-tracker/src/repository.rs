//! Persistence of matches and derivation state in the partitioned store.
//!
//! Layout, per chain:
//! - `<CHAIN>:M:<tracked source>` / `<txid>-<index>`: bincode [`MatchRecord`]
//! - `<CHAIN>:H:<scheme>` / `<feature>`: highest used child index, `u32`

use crate::chain::ChainId;
use crate::error::{Error, Result};
use crate::models::{DerivationScheme, MatchedOutput, TrackedSource};
use bitcoin::bip32::DerivationPath;
use bitcoin::hashes::Hash;
use bitcoin::{Amount, BlockHash, OutPoint, ScriptBuf, Txid};
use coinwatch_store::PartitionedStore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address derivation branch of a scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivationFeature {
    Deposit,
    Change,
    Direct,
}

impl DerivationFeature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "Deposit",
            Self::Change => "Change",
            Self::Direct => "Direct",
        }
    }
}

impl fmt::Display for DerivationFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored form of a [`MatchedOutput`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub txid: [u8; 32],
    pub block_id: Option<[u8; 32]>,
    pub key_path: Option<String>,
    pub script_pubkey: Vec<u8>,
    pub redeem_script: Option<Vec<u8>>,
    pub output_index: u32,
    pub value: u64,
}

impl MatchRecord {
    pub fn new(txid: Txid, block_id: Option<BlockHash>, output: &MatchedOutput) -> Self {
        Self {
            txid: txid.to_byte_array(),
            block_id: block_id.map(|hash| hash.to_byte_array()),
            key_path: output.key_path.as_ref().map(ToString::to_string),
            script_pubkey: output.script_pubkey.to_bytes(),
            redeem_script: output.redeem_script.as_ref().map(|script| script.to_bytes()),
            output_index: output.output_index,
            value: output.value.to_sat(),
        }
    }

    pub fn txid(&self) -> Txid {
        Txid::from_byte_array(self.txid)
    }

    pub fn block_id(&self) -> Option<BlockHash> {
        self.block_id.map(BlockHash::from_byte_array)
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid(), self.output_index)
    }

    pub fn to_matched_output(&self) -> Result<MatchedOutput> {
        let key_path = self
            .key_path
            .as_deref()
            .map(|path| {
                path.parse::<DerivationPath>()
                    .map_err(|err| Error::Serialization(format!("Invalid key path {path}: {err}")))
            })
            .transpose()?;

        Ok(MatchedOutput {
            key_path,
            script_pubkey: ScriptBuf::from_bytes(self.script_pubkey.clone()),
            redeem_script: self.redeem_script.clone().map(ScriptBuf::from_bytes),
            output_index: self.output_index,
            value: Amount::from_sat(self.value),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn match_row(outpoint: &OutPoint) -> String {
    format!("{}-{:010}", outpoint.txid, outpoint.vout)
}

/// Matches and derivation state of one chain.
#[derive(Debug)]
pub struct MatchRepository {
    chain: ChainId,
    store: PartitionedStore,
}

impl MatchRepository {
    pub fn new(chain: ChainId, store: PartitionedStore) -> Self {
        Self { chain, store }
    }

    pub fn chain(&self) -> &ChainId {
        &self.chain
    }

    pub fn store(&self) -> &PartitionedStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PartitionedStore {
        &mut self.store
    }

    pub fn into_store(self) -> PartitionedStore {
        self.store
    }

    fn match_partition(&self, tracked: &TrackedSource) -> String {
        format!("{}:M:{tracked}", self.chain)
    }

    fn derivation_partition(&self, scheme: &DerivationScheme) -> String {
        format!("{}:H:{scheme}", self.chain)
    }

    /// Stages one row per matched output of `txid`.
    pub fn stage_matches(
        &mut self,
        tracked: &TrackedSource,
        txid: Txid,
        block_id: Option<BlockHash>,
        outputs: &[MatchedOutput],
    ) -> Result<()> {
        let partition = self.match_partition(tracked);
        for output in outputs {
            let record = MatchRecord::new(txid, block_id, output);
            self.store
                .upsert(&partition, &match_row(&record.outpoint()), record.encode()?)?;
        }
        Ok(())
    }

    /// All live matches of `tracked`, ordered by txid then output index.
    pub async fn matches(&mut self, tracked: &TrackedSource) -> Result<Vec<MatchRecord>> {
        let partition = self.match_partition(tracked);
        self.load_matches(&partition, "").await
    }

    /// Live matches of `tracked` in transaction `txid`, in output order.
    pub async fn transaction_matches(
        &mut self,
        tracked: &TrackedSource,
        txid: Txid,
    ) -> Result<Vec<MatchRecord>> {
        let partition = self.match_partition(tracked);
        self.load_matches(&partition, &format!("{txid}-")).await
    }

    async fn load_matches(&mut self, partition: &str, row_prefix: &str) -> Result<Vec<MatchRecord>> {
        let mut records = self.store.scan_prefix(partition, row_prefix).await?;
        let mut matches = Vec::with_capacity(records.len());
        for record in &mut records {
            let bytes = self.store.load_value(record).await?;
            matches.push(MatchRecord::decode(bytes)?);
        }
        Ok(matches)
    }

    pub async fn count_matches(&mut self, tracked: &TrackedSource) -> Result<u64> {
        let partition = self.match_partition(tracked);
        Ok(self.store.count(&partition, "").await?)
    }

    /// Stages the removal of the match at `outpoint`.
    pub fn forget_output(&mut self, tracked: &TrackedSource, outpoint: &OutPoint) -> Result<()> {
        let partition = self.match_partition(tracked);
        Ok(self.store.remove(&partition, &match_row(outpoint))?)
    }

    /// Stages the removal of every live match of `tracked`.
    ///
    /// Returns the number of staged removals.
    pub async fn untrack(&mut self, tracked: &TrackedSource) -> Result<usize> {
        let partition = self.match_partition(tracked);
        let records = self.store.scan_prefix(&partition, "").await?;
        for record in &records {
            self.store.remove(&partition, record.row_key())?;
        }
        Ok(records.len())
    }

    pub fn set_highest_index(
        &mut self,
        scheme: &DerivationScheme,
        feature: DerivationFeature,
        index: u32,
    ) -> Result<()> {
        let partition = self.derivation_partition(scheme);
        Ok(self.store.upsert_value(&partition, feature.as_str(), &index)?)
    }

    pub async fn highest_index(
        &mut self,
        scheme: &DerivationScheme,
        feature: DerivationFeature,
    ) -> Result<Option<u32>> {
        let partition = self.derivation_partition(scheme);
        Ok(self.store.get_value(&partition, feature.as_str()).await?)
    }

    pub async fn commit(&mut self) -> Result<u64> {
        Ok(self.store.commit().await?)
    }
}
