//! Typed error families, one per §7 row that needs more than a plain
//! string. Modeled on `database/src/errors.rs`'s `thiserror` style.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown config directive {0:?}")]
    UnknownDirective(String),
    #[error("directive {0:?} has the wrong number of arguments")]
    WrongArity(String),
    #[error("directive {0:?} has an invalid value: {1}")]
    InvalidValue(String, String),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A framing/parsing failure on one client's connection. Always fatal to
/// that one client; never surfaced to any other client.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("inline request line exceeds the {0} byte limit without a terminator")]
    LineTooLong(usize),
    #[error("invalid bulk length")]
    InvalidBulkLength,
    #[error("bulk length {0} exceeds the {1} byte limit")]
    BulkTooLarge(u64, u64),
    #[error("connection closed by peer")]
    Eof,
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error writing snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot signature mismatch")]
    BadMagic,
    #[error("unexpected end of snapshot file")]
    ShortRead,
    #[error("duplicate key {0:?} encountered while loading snapshot")]
    DuplicateKey(String),
    #[error("unknown value-type opcode {0} in snapshot")]
    UnknownType(u8),
}

pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;
