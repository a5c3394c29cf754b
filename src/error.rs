// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use thiserror::Error;

/// Failures surfaced by the climbing analysis engine.
///
/// A missing background or an unplaced region is deliberately absent here:
/// detection treats those as "not ready" and returns empty results.
#[derive(Debug, Error)]
pub enum DetectError {
    /// A tube index outside `[0, tube_count)`.
    #[error("tube index {index} out of range for {tube_count} tubes")]
    InvalidIndex { index: usize, tube_count: usize },

    /// A rejected setting such as `tube_count < 1` or a zero-sized region.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A background worker ended without delivering its result.
    #[error("worker thread exited without a result")]
    WorkerDisconnected,

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image failure: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, DetectError>;
