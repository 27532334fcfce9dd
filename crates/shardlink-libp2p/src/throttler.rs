//! Counting semaphore bounding concurrent broadcast submissions.

use shardlink_core::P2pError;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Bounds the number of broadcast submissions staged at any instant.
///
/// This is admission control for producer tasks, not a queue-depth limit;
/// the outgoing load balancer owns the queues.
#[derive(Debug)]
pub struct BroadcastThrottler {
    max: usize,
    in_flight: AtomicUsize,
}

impl BroadcastThrottler {
    pub fn new(max: usize) -> Result<Self, P2pError> {
        if max == 0 {
            return Err(P2pError::InvalidValue("broadcast throttler maximum"));
        }
        Ok(Self {
            max,
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Non-blocking admission check.
    pub fn can_process(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) < self.max
    }

    pub fn start_processing(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub fn end_processing(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
