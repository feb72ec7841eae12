//! Engine configuration.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    CONNECT_TIMEOUT, DEFAULT_PORT_RANGE, HANDSHAKE_TIMEOUT, KEEPALIVE_INTERVAL, KEEPALIVE_TIMEOUT,
    MAX_PEERS_PER_TORRENT, MAX_QUEUE, MIN_QUEUE, RATE_WINDOW, STALL_TIMEOUT, TICK_INTERVAL,
    WRITE_TIMEOUT,
};

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory torrent data is written into.
    pub download_dir: PathBuf,
    /// Directory for resume state.
    pub state_dir: PathBuf,
    /// Listen ports to try, in order; an OS-assigned port is used if every
    /// port in the range is taken.
    pub port_range: RangeInclusive<u16>,
    /// Maximum peer sessions per torrent.
    pub max_peers: usize,
    /// Event-loop timing and pipelining knobs.
    pub tuning: Tuning,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("."),
            state_dir: PathBuf::from(".krill"),
            port_range: DEFAULT_PORT_RANGE,
            max_peers: MAX_PEERS_PER_TORRENT,
            tuning: Tuning::default(),
        }
    }
}

/// Timing and pipelining parameters for peer sessions.
///
/// Defaults come from [`crate::constants`]; tests shrink the timeouts so the
/// timeout paths run in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub write_timeout: Duration,
    /// Interval of the adaptive-rate tick.
    pub tick_interval: Duration,
    /// Send idleness before a keep-alive goes out.
    pub keepalive_interval: Duration,
    /// Receive idleness that closes the session.
    pub keepalive_timeout: Duration,
    /// Unanswered-request span that discards in-flight work.
    pub stall_timeout: Duration,
    /// Trailing window for rate measurement.
    pub rate_window: Duration,
    pub min_queue: usize,
    pub max_queue: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
            tick_interval: TICK_INTERVAL,
            keepalive_interval: KEEPALIVE_INTERVAL,
            keepalive_timeout: KEEPALIVE_TIMEOUT,
            stall_timeout: STALL_TIMEOUT,
            rate_window: RATE_WINDOW,
            min_queue: MIN_QUEUE,
            max_queue: MAX_QUEUE,
        }
    }
}
