//! Protocol constants and tuning parameters.
//!
//! Queue bounds and the rate window follow the adaptive pipelining scheme:
//! the request queue is sized to roughly one second of observed throughput,
//! measured over a trailing window.

use std::ops::RangeInclusive;
use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style)
pub const CLIENT_PREFIX: &[u8] = b"-KR0001-";

// ============================================================================
// Ports
// ============================================================================

/// Default listen port range; on collision the engine falls back to an
/// OS-assigned port.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 6881..=6889;

// ============================================================================
// Connection limits
// ============================================================================

/// Maximum peer sessions per torrent
pub const MAX_PEERS_PER_TORRENT: usize = 50;

// ============================================================================
// Block sizes and request pipelining
// ============================================================================

/// Standard block size (16KB), the unit of a single Request/Piece exchange
pub const BLOCK_SIZE: u32 = 16384;

/// Minimum number of outstanding block requests kept queued per peer
pub const MIN_QUEUE: usize = 5;

/// Maximum number of outstanding block requests per peer
pub const MAX_QUEUE: usize = 625;

/// Maximum accepted frame payload (a Piece message carrying one block, with
/// generous headroom for large bitfields)
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

// ============================================================================
// Timeouts and intervals
// ============================================================================

/// TCP connection timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Handshake exchange timeout after TCP connect
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// Socket write timeout
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(20);

/// Adaptive-rate tick: queue resizing, stall detection, keep-alive checks
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Send a keep-alive after this much send idleness
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(90);

/// Close the session after this long without any received message
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(120);

/// Discard in-flight work when requests go unanswered this long
pub const STALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Trailing window for download/upload rate measurement
pub const RATE_WINDOW: Duration = Duration::from_secs(20);
