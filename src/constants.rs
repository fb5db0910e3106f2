//! Constants used throughout the server
//!
//! This module centralizes magic numbers and timing values to improve maintainability
//! and make the codebase more self-documenting.

use std::time::Duration;

// ============================================================================
// Network
// ============================================================================

/// Default TCP listen port.
pub const DEFAULT_PORT: u16 = 6379;

/// `listen()` backlog.
pub const LISTEN_BACKLOG: u32 = 5;

/// Size of each read from a client socket.
pub const READ_BUFFER_SIZE: usize = 4096;

// ============================================================================
// Keyspace
// ============================================================================

/// Default number of independent databases (`databases` config directive).
pub const DEFAULT_DBNUM: usize = 16;

/// Initial hash table bucket count; also the floor for expand/resize.
pub const DICT_INITIAL_SIZE: usize = 16;

/// Load factor that triggers an expand on insert (`used == size`).
pub const DICT_GROW_LOAD_FACTOR: f64 = 1.0;

/// Table size above which the cron's shrink check applies.
pub const DICT_SHRINK_MIN_SIZE: usize = 16384;

/// Fill ratio (used*100/size) below which a table larger than
/// `DICT_SHRINK_MIN_SIZE` is shrunk back down.
pub const DICT_SHRINK_FILL_PERCENT: usize = 10;

// ============================================================================
// Protocol
// ============================================================================

/// Maximum number of arguments accepted per command; extras are silently
/// dropped rather than rejected.
pub const MAX_ARGS: usize = 16;

/// A client is dropped if its unframed input buffer exceeds this many bytes
/// without completing an inline request line.
pub const MAX_INLINE_LINE_LEN: usize = 1024;

/// Largest accepted bulk-argument length, in bytes.
pub const MAX_BULK_LEN: u64 = 1024 * 1024 * 1024;

// ============================================================================
// Housekeeping
// ============================================================================

/// Housekeeping cron tick interval.
pub const CRON_INTERVAL: Duration = Duration::from_secs(1);

/// Default idle-client timeout, in seconds (`timeout` config directive).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default auto-save rules: `(seconds, changes)` pairs, checked in order.
pub const DEFAULT_SAVE_PARAMS: &[(u64, u64)] = &[(3600, 1), (300, 100), (60, 10000)];

// ============================================================================
// Snapshot format
// ============================================================================

/// Name of the on-disk snapshot file in the server's working directory.
pub const DUMP_FILENAME: &str = "dump.rdb";

/// Magic header written at the start of every snapshot file.
pub const RDB_MAGIC: &[u8; 9] = b"REDIS0000";

/// Key/value byte lengths at or below this threshold are read into a stack
/// buffer during load rather than a heap allocation.
pub const RDB_STACK_BUF_LEN: usize = 1024;
