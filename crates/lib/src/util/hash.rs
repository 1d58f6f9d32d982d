//! Content digests for instruction-graph nodes.
//!
//! Every marshaled node is identified by the SHA-256 of its canonical JSON
//! encoding. Since node inputs are encoded by digest, two nodes share a
//! digest exactly when their whole upstream sub-graphs are identical, which
//! is what makes the digest usable as a cache key by the engine.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

pub type HashError = serde_json::Error;

/// Algorithm prefix carried by every digest string.
const DIGEST_ALGORITHM: &str = "sha256";

/// A content digest in OCI form, e.g. `sha256:9f86d0...`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest(pub String);

impl Digest {
  /// Digest of arbitrary bytes.
  pub fn of_bytes(bytes: &[u8]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Digest(format!("{}:{}", DIGEST_ALGORITHM, hex::encode(hasher.finalize())))
  }

  /// The hex part of the digest, without the algorithm prefix.
  pub fn hex(&self) -> &str {
    self.0.split_once(':').map(|(_, hex)| hex).unwrap_or(&self.0)
  }

  /// A short form suitable for log lines.
  pub fn short(&self) -> &str {
    let hex = self.hex();
    &hex[..hex.len().min(12)]
  }

  /// Check that a string is a well-formed `sha256:<64 lowercase hex>` digest.
  pub fn is_valid(value: &str) -> bool {
    match value.split_once(':') {
      Some((DIGEST_ALGORITHM, hex)) => {
        hex.len() == 64 && hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
      }
      _ => false,
    }
  }
}

impl std::fmt::Display for Digest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Types whose canonical JSON encoding identifies them.
pub trait Hashable: Serialize {
  fn compute_digest(&self) -> Result<Digest, HashError> {
    let serialized = serde_json::to_string(self)?;
    Ok(Digest::of_bytes(serialized.as_bytes()))
  }
}
