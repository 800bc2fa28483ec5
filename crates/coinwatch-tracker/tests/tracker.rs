use bitcoin::absolute::LockTime;
use bitcoin::consensus::deserialize;
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{Amount, BlockHash, Network, OutPoint, ScriptBuf, Transaction, TxOut};
use coinwatch_store::{PartitionedStore, StoreConfig};
use coinwatch_tracker::{
    Candidate, ChainParams, DerivationFeature, DerivationScheme, Error, TrackedSource,
    TrackedTransaction, Tracker, TransactionData,
};
use tokio::sync::broadcast::error::TryRecvError;

const GENESIS_COINBASE: &str = "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";

fn script(byte: u8) -> ScriptBuf {
    ScriptBuf::from_bytes(vec![0x00, 0x14].into_iter().chain([byte; 20]).collect())
}

fn transaction(outputs: &[(ScriptBuf, u64)]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![],
        output: outputs
            .iter()
            .map(|(script_pubkey, sats)| TxOut {
                value: Amount::from_sat(*sats),
                script_pubkey: script_pubkey.clone(),
            })
            .collect(),
    }
}

fn candidate(path: &str, script_pubkey: ScriptBuf) -> Candidate {
    Candidate {
        key_path: Some(path.parse().unwrap()),
        script_pubkey,
        redeem_script: None,
    }
}

fn scheme() -> DerivationScheme {
    DerivationScheme::new("tpubD6NzVbkrYhZ4X-[p2sh]")
}

fn tracked(tx: Transaction, candidates: Vec<Candidate>) -> TrackedTransaction {
    TrackedTransaction {
        tracked_source: TrackedSource::DerivationScheme(scheme()),
        derivation: Some(scheme()),
        block_id: None,
        transaction_data: TransactionData::unconfirmed(tx, 1_700_000_000),
        candidates,
    }
}

async fn tracker() -> Tracker {
    let store = PartitionedStore::open(&StoreConfig::in_memory()).await.unwrap();
    Tracker::new(ChainParams::bitcoin(Network::Regtest), store)
}

#[tokio::test]
async fn test_matched_transaction_is_recorded_and_emitted() {
    let mut tracker = tracker().await;
    let mut events = tracker.subscribe();

    let tx = transaction(&[(script(0xaa), 1000), (script(0xbb), 2000)]);
    let txid = tx.compute_txid();

    let event = tracker
        .process_transaction(tracked(tx, vec![candidate("m/0/0", script(0xaa))]))
        .await
        .unwrap()
        .expect("One output matches");

    assert_eq!(event.crypto_code.as_str(), "BTC");
    assert_eq!(event.outputs.len(), 1);
    assert_eq!(event.outputs[0].output_index, 0);
    assert_eq!(event.outputs[0].value, Amount::from_sat(1000));

    let coins = event.received_coins();
    assert_eq!(coins.len(), 1);
    assert_eq!(coins[0].outpoint, OutPoint::new(txid, 0));
    assert_eq!(coins[0].amount(), Amount::from_sat(1000));

    assert_eq!(events.try_recv().unwrap(), event);

    let source = TrackedSource::DerivationScheme(scheme());
    let repository = tracker.repository_mut();
    let stored = repository.transaction_matches(&source, txid).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].outpoint(), OutPoint::new(txid, 0));
    assert_eq!(stored[0].to_matched_output().unwrap(), event.outputs[0]);
    assert_eq!(repository.count_matches(&source).await.unwrap(), 1);
}

#[tokio::test]
async fn test_unmatched_transaction_touches_nothing() {
    let mut tracker = tracker().await;
    let mut events = tracker.subscribe();
    let queries = tracker.repository().store().stats();

    let tx = transaction(&[(script(0xbb), 2000)]);
    let result = tracker
        .process_transaction(tracked(tx, vec![candidate("m/0/0", script(0xaa))]))
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(tracker.repository().store().stats(), queries);
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_failed_commit_emits_no_event() {
    // Never bootstrapped, so the table does not exist.
    let store = PartitionedStore::new(&StoreConfig::in_memory()).unwrap();
    let mut tracker = Tracker::new(ChainParams::bitcoin(Network::Bitcoin), store);
    let mut events = tracker.subscribe();

    let tx = transaction(&[(script(0xaa), 1000)]);
    let result = tracker
        .process_transaction(tracked(tx, vec![candidate("m/0/0", script(0xaa))]))
        .await;

    assert!(matches!(result, Err(Error::Store(_))));
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(tracker.repository().store().pending_len(), 0);
}

#[tokio::test]
async fn test_malformed_transaction_fails_before_store_access() {
    let mut tracker = tracker().await;
    let stats = tracker.repository().store().stats();

    let tx = transaction(&[(script(0xaa), Amount::MAX_MONEY.to_sat() + 1)]);
    let result = tracker
        .process_transaction(tracked(tx, vec![candidate("m/0/0", script(0xaa))]))
        .await;

    assert!(matches!(result, Err(Error::TransactionData(_))));
    assert_eq!(tracker.repository().store().stats(), stats);
}

#[tokio::test]
async fn test_confirmed_fixture_transaction() {
    let tx: Transaction = deserialize(&hex::decode(GENESIS_COINBASE).unwrap()).unwrap();
    assert_eq!(
        tx.compute_txid().to_string(),
        "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
    );

    let mut tracker = tracker().await;
    let block_id = BlockHash::from_byte_array([1; 32]);
    let address = TrackedSource::Address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa".into());
    let script_pubkey = tx.output[0].script_pubkey.clone();

    let event = tracker
        .process_transaction(TrackedTransaction {
            tracked_source: address.clone(),
            derivation: None,
            block_id: Some(block_id),
            transaction_data: TransactionData {
                transaction: tx,
                height: Some(0),
                confirmations: 1,
                timestamp: 1_231_006_505,
            },
            candidates: vec![Candidate {
                key_path: None,
                script_pubkey,
                redeem_script: None,
            }],
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(event.outputs[0].value, Amount::from_int_btc(50));

    let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
    assert_eq!(json["type"], "newtransaction");
    assert_eq!(json["data"]["blockId"], block_id.to_string());
    assert_eq!(json["data"]["transactionData"]["height"], 0);
    assert!(json["data"].get("derivationStrategy").is_none());
    assert!(json["data"]["outputs"][0].get("keyPath").is_none());

    let stored = tracker.repository_mut().matches(&address).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].block_id(), Some(block_id));
}

#[tokio::test]
async fn test_forget_output_and_untrack() {
    let mut tracker = tracker().await;
    let source = TrackedSource::DerivationScheme(scheme());

    let first = transaction(&[(script(0xaa), 1000), (script(0xbb), 2000)]);
    let second = transaction(&[(script(0xaa), 3000)]);
    let candidates = vec![candidate("m/0/0", script(0xaa)), candidate("m/1/0", script(0xbb))];
    let first_txid = first.compute_txid();

    for tx in [first, second] {
        tracker
            .process_transaction(tracked(tx, candidates.clone()))
            .await
            .unwrap();
    }

    let repository = tracker.repository_mut();
    assert_eq!(repository.count_matches(&source).await.unwrap(), 3);

    repository
        .forget_output(&source, &OutPoint::new(first_txid, 1))
        .unwrap();
    repository.commit().await.unwrap();

    let remaining = repository.transaction_matches(&source, first_txid).await.unwrap();
    assert_eq!(remaining.iter().map(|m| m.output_index).collect::<Vec<_>>(), vec![0]);

    assert_eq!(repository.untrack(&source).await.unwrap(), 2);
    repository.commit().await.unwrap();
    assert_eq!(repository.count_matches(&source).await.unwrap(), 0);
    assert!(repository.matches(&source).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_earlier_staged_writes_commit_with_the_matches() {
    let mut tracker = tracker().await;
    let candidates = vec![candidate("m/0/0", script(0xaa))];

    let tx = transaction(&[(script(0xaa), 1000)]);
    tracker
        .process_transaction(tracked(tx, candidates.clone()))
        .await
        .unwrap();

    tracker
        .repository_mut()
        .set_highest_index(&scheme(), DerivationFeature::Deposit, 4)
        .unwrap();
    assert_eq!(tracker.repository().store().pending_len(), 1);

    let tx = transaction(&[(script(0xaa), 2000)]);
    tracker
        .process_transaction(tracked(tx, candidates))
        .await
        .unwrap()
        .unwrap();

    let repository = tracker.repository_mut();
    assert_eq!(repository.store().pending_len(), 0);
    assert_eq!(
        repository
            .highest_index(&scheme(), DerivationFeature::Deposit)
            .await
            .unwrap(),
        Some(4)
    );
    assert_eq!(
        repository
            .count_matches(&TrackedSource::DerivationScheme(scheme()))
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn test_derivation_state() {
    let mut tracker = tracker().await;
    let repository = tracker.repository_mut();

    assert_eq!(
        repository
            .highest_index(&scheme(), DerivationFeature::Deposit)
            .await
            .unwrap(),
        None
    );

    repository
        .set_highest_index(&scheme(), DerivationFeature::Deposit, 12)
        .unwrap();
    repository
        .set_highest_index(&scheme(), DerivationFeature::Change, 3)
        .unwrap();
    repository.commit().await.unwrap();

    repository
        .set_highest_index(&scheme(), DerivationFeature::Deposit, 13)
        .unwrap();
    repository.commit().await.unwrap();

    assert_eq!(
        repository
            .highest_index(&scheme(), DerivationFeature::Deposit)
            .await
            .unwrap(),
        Some(13)
    );
    assert_eq!(
        repository
            .highest_index(&scheme(), DerivationFeature::Change)
            .await
            .unwrap(),
        Some(3)
    );
    assert_eq!(
        repository
            .highest_index(&scheme(), DerivationFeature::Direct)
            .await
            .unwrap(),
        None
    );

    let other = repository
        .highest_index(&DerivationScheme::new("other"), DerivationFeature::Deposit)
        .await
        .unwrap();
    assert_eq!(other, None);
}
