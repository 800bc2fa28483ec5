use crate::chain::ChainParams;
use crate::error::Result;
use crate::events::EventEmitter;
use crate::matcher;
use crate::models::{Candidate, DerivationScheme, NewTransactionEvent, TrackedSource, TransactionData};
use crate::repository::MatchRepository;
use bitcoin::BlockHash;
use coinwatch_store::PartitionedStore;
use tokio::sync::broadcast;

/// A transaction to check against the scripts of one tracked source.
#[derive(Debug, Clone)]
pub struct TrackedTransaction {
    pub tracked_source: TrackedSource,
    pub derivation: Option<DerivationScheme>,
    pub block_id: Option<BlockHash>,
    pub transaction_data: TransactionData,
    pub candidates: Vec<Candidate>,
}

/// Matches incoming transactions, persists the matches and notifies subscribers.
#[derive(Debug)]
pub struct Tracker {
    chain: ChainParams,
    repository: MatchRepository,
    events: EventEmitter,
}

impl Tracker {
    pub fn new(chain: ChainParams, store: PartitionedStore) -> Self {
        Self::with_emitter(chain, store, EventEmitter::default())
    }

    pub fn with_emitter(chain: ChainParams, store: PartitionedStore, events: EventEmitter) -> Self {
        let repository = MatchRepository::new(chain.id.clone(), store);
        Self {
            chain,
            repository,
            events,
        }
    }

    pub fn chain(&self) -> &ChainParams {
        &self.chain
    }

    pub fn repository(&self) -> &MatchRepository {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut MatchRepository {
        &mut self.repository
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NewTransactionEvent> {
        self.events.subscribe()
    }

    /// Processes one transaction.
    ///
    /// Returns `None` without touching the store when no output matches.
    /// Otherwise the matches are committed before the event is emitted, so
    /// a failed commit emits nothing.
    ///
    /// The commit also applies any write staged earlier through
    /// [`repository_mut`](Self::repository_mut), in the same transaction
    /// and ahead of the new matches.
    pub async fn process_transaction(
        &mut self,
        tracked: TrackedTransaction,
    ) -> Result<Option<NewTransactionEvent>> {
        let TrackedTransaction {
            tracked_source,
            derivation,
            block_id,
            transaction_data,
            candidates,
        } = tracked;

        let outputs = matcher::match_outputs(&transaction_data.transaction, &candidates)?;
        if outputs.is_empty() {
            return Ok(None);
        }

        let txid = transaction_data.txid();
        self.repository
            .stage_matches(&tracked_source, txid, block_id, &outputs)?;
        self.repository.commit().await?;

        tracing::debug!(
            chain = %self.chain.id,
            %txid,
            %tracked_source,
            matches = outputs.len(),
            "Recorded new transaction"
        );

        let event = NewTransactionEvent {
            crypto_code: self.chain.id.clone(),
            block_id,
            tracked_source,
            derivation,
            transaction_data,
            outputs,
        };
        self.events.emit(event.clone());

        Ok(Some(event))
    }
}
