//! Named error types the core distinguishes from the catch-all `anyhow::Error`.
//!
//! Everything else (decode misses, malformed messages, bus send timeouts) is
//! handled inline with `tracing::warn!`/`tracing::error!` rather than a typed
//! variant, matching the taxonomy: most failure modes are "log and continue",
//! not "propagate".

use thiserror::Error;

/// Raised by the bus consumer's idle-timeout supervisor when no message
/// arrives within `idle_timeout_s`. This is a normal termination signal, not
/// a failure: the producer ignores it entirely and the consumer's top-level
/// loop treats it as exit code 0.
#[derive(Debug, Error)]
#[error("no partition produced a message within the idle timeout")]
pub struct PartitionsIdle;

/// A bus message didn't match `"<mode>:<hex_hash>"`.
#[derive(Debug, Error)]
pub enum MessageDecodeError {
    #[error("message has no ':' separator: {0:?}")]
    MissingSeparator(String),
    #[error("unrecognized mode {0:?}")]
    UnknownMode(String),
    #[error("hash {0:?} is not 0x + 64 hex chars")]
    MalformedHash(String),
}
