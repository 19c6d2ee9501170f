//! Error types for the afterq scheduler.
//!
//! Scheduling and cancellation never fail; the only fallible surface is
//! scheduler construction with an invalid configuration.

use thiserror::Error;

/// Unified error type for all afterq operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AfterqError {
    /// Worker cap must allow at least one worker
    #[error("worker cap must be at least 1, got {0}")]
    ZeroWorkerCap(usize),

    /// Idle timeout of zero would make a lone idle worker exit immediately
    #[error("idle timeout must be non-zero")]
    ZeroIdleTimeout,
}

/// Result type for all afterq operations.
pub type AfterqResult<T> = Result<T, AfterqError>;
