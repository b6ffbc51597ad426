// src/sources.rs
// In-process fan-out of newly observed chain activity. The trace assembly
// pipeline publishes here; SSE and websocket handlers subscribe.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::{AccountId, AddressError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Every account touched by the trace, so subscribers can filter.
    pub accounts: Vec<AccountId>,
    pub hash: String,
    pub in_progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub account: AccountId,
    pub lt: u64,
    pub tx_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEvent {
    pub workchain: i32,
    pub shard: String,
    pub seqno: u32,
    pub root_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolEvent {
    pub id: Uuid,
    /// Raw external message, hex encoded.
    pub payload: String,
    pub involved_accounts: Vec<AccountId>,
}

/// Broadcast channels per event kind. Slow subscribers lag and miss events
/// rather than applying backpressure to the publisher.
pub struct EventHub {
    traces: broadcast::Sender<TraceEvent>,
    transactions: broadcast::Sender<TransactionEvent>,
    blocks: broadcast::Sender<BlockEvent>,
    mempool: broadcast::Sender<MempoolEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (traces, _) = broadcast::channel(capacity);
        let (transactions, _) = broadcast::channel(capacity);
        let (blocks, _) = broadcast::channel(capacity);
        let (mempool, _) = broadcast::channel(capacity);
        Self {
            traces,
            transactions,
            blocks,
            mempool,
        }
    }

    // send() only fails when nobody is subscribed, which is fine here.
    pub fn publish_trace(&self, event: TraceEvent) {
        let _ = self.traces.send(event);
    }

    pub fn publish_transaction(&self, event: TransactionEvent) {
        let _ = self.transactions.send(event);
    }

    pub fn publish_block(&self, event: BlockEvent) {
        let _ = self.blocks.send(event);
    }

    pub fn publish_mempool(&self, event: MempoolEvent) {
        let _ = self.mempool.send(event);
    }

    pub fn subscribe_traces(&self) -> broadcast::Receiver<TraceEvent> {
        self.traces.subscribe()
    }

    pub fn subscribe_transactions(&self) -> broadcast::Receiver<TransactionEvent> {
        self.transactions.subscribe()
    }

    pub fn subscribe_blocks(&self) -> broadcast::Receiver<BlockEvent> {
        self.blocks.subscribe()
    }

    pub fn subscribe_mempool(&self) -> broadcast::Receiver<MempoolEvent> {
        self.mempool.subscribe()
    }
}

/// Account filter attached to one push subscription.
#[derive(Debug, Clone)]
pub enum AccountFilter {
    All,
    List(HashSet<AccountId>),
}

impl AccountFilter {
    /// Parses the `accounts` query parameter: the literal `ALL` or a
    /// comma-separated list of raw addresses.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        if raw.trim().eq_ignore_ascii_case("all") {
            return Ok(AccountFilter::All);
        }
        let mut set = HashSet::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            set.insert(part.parse::<AccountId>()?);
        }
        Ok(AccountFilter::List(set))
    }

    pub fn matches_one(&self, account: &AccountId) -> bool {
        match self {
            AccountFilter::All => true,
            AccountFilter::List(set) => set.contains(account),
        }
    }

    pub fn matches_any(&self, accounts: &[AccountId]) -> bool {
        match self {
            AccountFilter::All => true,
            AccountFilter::List(set) => accounts.iter().any(|a| set.contains(a)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(byte: u8) -> AccountId {
        AccountId::new(0, [byte; 32])
    }

    #[test]
    fn filter_parses_all_keyword() {
        let filter = AccountFilter::parse("ALL").unwrap();
        assert!(filter.matches_one(&account(7)));
    }

    #[test]
    fn filter_parses_account_list() {
        let raw = format!("{},{}", account(1), account(2));
        let filter = AccountFilter::parse(&raw).unwrap();
        assert!(filter.matches_one(&account(1)));
        assert!(!filter.matches_one(&account(3)));
        assert!(filter.matches_any(&[account(3), account(2)]));
        assert!(!filter.matches_any(&[account(3), account(4)]));
    }

    #[test]
    fn filter_rejects_bad_addresses() {
        assert!(AccountFilter::parse("not-an-address").is_err());
    }

    #[tokio::test]
    async fn hub_delivers_to_subscribers() {
        let hub = EventHub::new(16);
        let mut rx = hub.subscribe_traces();
        hub.publish_trace(TraceEvent {
            accounts: vec![account(1)],
            hash: "abc".into(),
            in_progress: false,
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.hash, "abc");
    }
}
