//! Profiler error taxonomy.

use thiserror::Error;

/// Caller-misuse errors raised by the profiler.
///
/// Instrumentation must never crash the host application, so these are
/// reported through a diagnostic sink while the offending call returns a
/// neutral result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfError {
    /// `begin_block` was called with an empty name.
    #[error("profile blocks must be named")]
    EmptyBlockName,

    /// End or query on a name that was never begun (or is misspelled).
    #[error("the profile block named '{name}' does not exist")]
    UnknownBlock {
        /// The unrecognized block name.
        name: String,
    },

    /// `end_block` on a block with no outstanding `begin_block`.
    #[error("the profile block named '{name}' is not open")]
    BlockNotOpen {
        /// The block name.
        name: String,
    },

    /// `begin_block` on a block that is already open. Timing results for
    /// re-entered blocks are undefined; the open timestamp is restarted.
    #[error("the profile block named '{name}' is already open")]
    ReentrantBegin {
        /// The block name.
        name: String,
    },
}

/// Convenience type alias for profiler operations.
pub type ProfResult<T> = Result<T, ProfError>;
