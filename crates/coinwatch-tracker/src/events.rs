use crate::models::NewTransactionEvent;
use tokio::sync::broadcast;

/// Events buffered per subscriber before the slowest one starts lagging.
pub const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of [`NewTransactionEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<NewTransactionEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NewTransactionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Sends `event` to the current subscribers and returns how many were reached.
    pub fn emit(&self, event: NewTransactionEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!("No subscriber for new transaction event");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainId;
    use crate::models::{TrackedSource, TransactionData};
    use bitcoin::Transaction;
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;

    fn event() -> NewTransactionEvent {
        let tx = Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        NewTransactionEvent {
            crypto_code: ChainId::new("BTC").unwrap(),
            block_id: None,
            tracked_source: TrackedSource::Address("bc1qexample".into()),
            derivation: None,
            transaction_data: TransactionData::unconfirmed(tx, 0),
            outputs: vec![],
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let emitter = EventEmitter::default();
        assert_eq!(emitter.subscriber_count(), 0);
        assert_eq!(emitter.emit(event()), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_the_event() {
        let emitter = EventEmitter::new(4);
        let mut first = emitter.subscribe();
        let mut second = emitter.subscribe();

        assert_eq!(emitter.emit(event()), 2);
        assert_eq!(first.recv().await.unwrap(), event());
        assert_eq!(second.recv().await.unwrap(), event());

        drop(second);
        assert_eq!(emitter.emit(event()), 1);
    }
}
