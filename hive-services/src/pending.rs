use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use hive_common::TransactionId;
use tokio::sync::oneshot;

use crate::model::{ServiceResponse, ServiceStatus};

struct PendingEntry {
    reply: oneshot::Sender<ServiceResponse>,
    deadline: Instant,
}

/// Outstanding remote calls awaiting a response message (C7/C8), keyed by
/// transaction-id. Completed either by the matching `service-response`
/// arriving or by [`PendingTable::sweep_timed_out`] firing first.
pub struct PendingTable {
    entries: DashMap<TransactionId, PendingEntry>,
}

impl PendingTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
        })
    }

    pub fn register(
        &self,
        transaction_id: TransactionId,
        timeout: Duration,
    ) -> oneshot::Receiver<ServiceResponse> {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            transaction_id,
            PendingEntry {
                reply: tx,
                deadline: Instant::now() + timeout,
            },
        );
        rx
    }

    /// Completes and removes the pending entry for `transaction_id`, if
    /// any. Returns `false` if no such entry exists (e.g. it already timed
    /// out).
    pub fn complete(&self, transaction_id: TransactionId, response: ServiceResponse) -> bool {
        match self.entries.remove(&transaction_id) {
            Some((_, entry)) => {
                let _ = entry.reply.send(response);
                true
            }
            None => false,
        }
    }

    /// Removes and fails every entry whose deadline has passed.
    pub fn sweep_timed_out(&self) {
        let now = Instant::now();
        let expired: Vec<TransactionId> = self
            .entries
            .iter()
            .filter(|entry| entry.value().deadline <= now)
            .map(|entry| *entry.key())
            .collect();
        for transaction_id in expired {
            if let Some((_, entry)) = self.entries.remove(&transaction_id) {
                let _ = entry.reply.send(ServiceResponse::error(
                    ServiceStatus::InternalError,
                    "call timed out",
                ));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
