//! Dissemination statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated by concurrent rounds
#[derive(Debug, Default)]
pub struct DiffusionCounters {
    gossip_sent: AtomicU64,
    acks: AtomicU64,
    implicit_acks: AtomicU64,
    retries: AtomicU64,
    rounds_started: AtomicU64,
    rounds_completed: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiffusionStats {
    /// `broadcast` requests sent to neighbors, retries included
    pub gossip_sent: u64,
    /// `broadcast_ok` replies that cleared a pending neighbor
    pub acks: u64,
    /// Neighbors cleared because they re-announced the value to us
    pub implicit_acks: u64,
    /// Rounds that had to re-send after a retry interval
    pub retries: u64,
    pub rounds_started: u64,
    pub rounds_completed: u64,
}

impl DiffusionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_send(&self) {
        self.gossip_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self) {
        self.acks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_implicit_ack(&self) {
        self.implicit_acks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round_started(&self) {
        self.rounds_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round_completed(&self) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiffusionStats {
        DiffusionStats {
            gossip_sent: self.gossip_sent.load(Ordering::Relaxed),
            acks: self.acks.load(Ordering::Relaxed),
            implicit_acks: self.implicit_acks.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            rounds_started: self.rounds_started.load(Ordering::Relaxed),
            rounds_completed: self.rounds_completed.load(Ordering::Relaxed),
        }
    }
}

impl DiffusionStats {
    /// Rounds still retrying
    pub fn rounds_in_flight(&self) -> u64 {
        self.rounds_started.saturating_sub(self.rounds_completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = DiffusionCounters::new();
        counters.record_round_started();
        counters.record_send();
        counters.record_send();
        counters.record_ack();

        let stats = counters.snapshot();
        assert_eq!(stats.gossip_sent, 2);
        assert_eq!(stats.acks, 1);
        assert_eq!(stats.rounds_in_flight(), 1);

        counters.record_round_completed();
        assert_eq!(counters.snapshot().rounds_in_flight(), 0);
    }
}
