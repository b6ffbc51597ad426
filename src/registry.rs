// src/registry.rs
// Keeps assembled traces in memory for the REST API and announces them on
// the push channels. No persistence: the registry is rebuilt on restart.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;

use crate::core::{collect_additional_info, AccountId, InformationSource, Trace};
use crate::metrics;
use crate::sources::{EventHub, TraceEvent, TransactionEvent};

pub struct TraceRegistry {
    traces: DashMap<String, Arc<Trace>>,
    hub: Arc<EventHub>,
}

impl TraceRegistry {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self {
            traces: DashMap::new(),
            hub,
        }
    }

    /// Enriches an assembled trace against `source` and stores it. On a
    /// source failure nothing is stored or published; the tree the caller
    /// handed in is discarded un-annotated.
    pub async fn ingest<S>(&self, mut trace: Trace, source: Option<&S>) -> Result<()>
    where
        S: InformationSource + ?Sized,
    {
        if let Err(err) = collect_additional_info(source, &mut trace).await {
            metrics::ENRICHMENT_FAILURES.inc();
            return Err(err);
        }
        self.put(trace);
        Ok(())
    }

    /// Stores a trace and publishes one trace event plus a transaction event
    /// per node. Re-inserting the same root hash replaces the stored tree,
    /// which happens whenever the builder extends a still-in-progress trace.
    ///
    /// Events go out only after the insert, so a subscriber reacting to any
    /// of them can immediately fetch the trace over REST.
    pub fn put(&self, trace: Trace) {
        let trace = Arc::new(trace);
        let hash = trace.transaction.hash.clone();
        metrics::TRACES_STORED.inc();
        self.traces.insert(hash.clone(), trace.clone());

        let mut seen: HashSet<AccountId> = HashSet::new();
        let mut accounts: Vec<AccountId> = Vec::new();
        trace.visit(|node| {
            if seen.insert(node.transaction.account) {
                accounts.push(node.transaction.account);
            }
            self.hub.publish_transaction(TransactionEvent {
                account: node.transaction.account,
                lt: node.transaction.lt,
                tx_hash: node.transaction.hash.clone(),
            });
        });
        self.hub.publish_trace(TraceEvent {
            accounts,
            hash,
            in_progress: trace.in_progress(),
        });
    }

    pub fn get(&self, hash: &str) -> Option<Arc<Trace>> {
        self.traces.get(hash).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
}
