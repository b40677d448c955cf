//! Rudimentary flow control for backend requests.
//!
//! The frontend is much slower than the backend, so sending every request
//! we can think of gets us flooded with responses. Each requested tile gets
//! a unique, increasing sequence number; responses name the sequence numbers
//! they retire, and we stop issuing new ones while too many are in flight.
//!
//! The backend may attach "orphaned" sequence numbers (from duplicate
//! requests) to an unrelated response: only the in-flight count matters.
//! Entries that never get an answer are forgotten after `expire_ms`; the
//! next pass over missing tiles re-requests them naturally.

use std::collections::BTreeMap;

pub struct FlowController {
    next_seq: u64,
    /// sequence # -> issue timestamp (ms)
    inflight: BTreeMap<u64, f64>,
    /// Retired sequence numbers waiting to piggy-back on the next request.
    ack_queue: Vec<u64>,
    max_inflight: usize,
    expire_ms: f64,
}

impl FlowController {
    pub fn new(max_inflight: usize, expire_ms: f64) -> Self {
        Self {
            next_seq: 0,
            inflight: BTreeMap::new(),
            ack_queue: Vec::new(),
            max_inflight,
            expire_ms,
        }
    }

    /// Allocate a sequence number, or `None` when the budget is exhausted.
    pub fn try_issue(&mut self, now: f64) -> Option<u64> {
        if self.is_saturated() { return None; }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.inflight.insert(seq, now);
        Some(seq)
    }

    pub fn is_saturated(&self) -> bool {
        self.inflight.len() >= self.max_inflight
    }

    /// Retire sequence numbers named by a response, whether or not its
    /// payload turned out to be useful.
    pub fn ack(&mut self, seqs: &[u64]) {
        for &seq in seqs {
            if self.inflight.remove(&seq).is_none() {
                log::trace!("seq #{seq} was not in flight (expired or duplicate)");
            }
            if !self.ack_queue.contains(&seq) {
                self.ack_queue.push(seq);
            }
        }
    }

    /// Sequence numbers to acknowledge on the next outgoing request.
    pub fn take_acks(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.ack_queue)
    }

    /// Forget in-flight requests that are too old.
    pub fn expire_old(&mut self, now: f64) {
        let deadline = now - self.expire_ms;
        self.inflight.retain(|seq, issued| {
            let keep = *issued >= deadline;
            if !keep {
                log::debug!("Forgetting old seq #{seq} ...");
            }
            keep
        });
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_inflight(&self, seq: u64) -> bool {
        self.inflight.contains_key(&seq)
    }
}
