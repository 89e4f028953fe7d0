//! Error types for `pace-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid alignment score: {0} (expected 0, 25, 50, 75 or 100)")]
  InvalidScore(u8),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
