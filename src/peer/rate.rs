//! Transfer-rate accounting for adaptive request pipelining.
//!
//! Counters only reflect the trailing rate window: every recorded transfer
//! expires out of the window after [`crate::constants::RATE_WINDOW`], which
//! is the "scheduled reversal" of the byte counters.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::constants::BLOCK_SIZE;

/// A sliding-window byte counter.
#[derive(Debug)]
pub struct RateWindow {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
    total: u64,
}

impl RateWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
            total: 0,
        }
    }

    /// Records `bytes` transferred now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    pub fn record_at(&mut self, now: Instant, bytes: u64) {
        self.prune(now);
        self.samples.push_back((now, bytes));
        self.total += bytes;
    }

    /// Bytes transferred within the window ending now.
    pub fn total(&mut self) -> u64 {
        self.total_at(Instant::now())
    }

    pub fn total_at(&mut self, now: Instant) -> u64 {
        self.prune(now);
        self.total
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&(at, bytes)) = self.samples.front() {
            if now.duration_since(at) < self.window {
                break;
            }
            self.samples.pop_front();
            self.total -= bytes;
        }
    }
}

/// Current download rate in bytes per second.
///
/// Until a full window has elapsed since the last unchoke, the observed
/// bytes are divided by the actual elapsed time so a freshly unchoked peer
/// isn't under-measured.
pub fn download_rate(bytes_in_window: u64, since_unchoked: Duration, window: Duration) -> u64 {
    if since_unchoked.is_zero() {
        return 0;
    }
    if since_unchoked < window {
        (bytes_in_window as f64 / since_unchoked.as_secs_f64()) as u64
    } else {
        bytes_in_window / window.as_secs().max(1)
    }
}

/// Sizes the request pipeline to roughly one second of throughput: the
/// steady-state blocks-per-second, clamped to `[min, max]`.
pub fn queue_target(rate: u64, min: usize, max: usize) -> usize {
    ((rate / u64::from(BLOCK_SIZE)) as usize).clamp(min, max)
}
