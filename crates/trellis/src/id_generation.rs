//! Hash-based edge id generation.
//!
//! Edge ids take the form `{prefix}-{hash}` where the prefix names the edge
//! family (`dep` or `rel`) and the hash is a base36 rendering of a SHA-256
//! digest over the endpoints, the edge type and the creation timestamp.
//!
//! # Example
//!
//! ```
//! use trellis::id_generation::{EdgeIdGenerator, EdgePrefix};
//!
//! let mut generator = EdgeIdGenerator::new();
//! let id = generator
//!     .generate(EdgePrefix::Dependency, "proj-a", "proj-b", "FINISH_TO_START")
//!     .unwrap();
//! assert!(id.as_str().starts_with("dep-"));
//! ```

use crate::domain::EdgeId;
use crate::error::StorageError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::{debug, warn};

const BASE36_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const MAX_NONCE: u32 = 100;
const MAX_LENGTH: usize = 12;

/// Edge family encoded in the id prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePrefix {
    /// Dependency edges (`dep-`)
    Dependency,
    /// Relationship edges (`rel-`)
    Relationship,
}

impl EdgePrefix {
    fn as_str(self) -> &'static str {
        match self {
            Self::Dependency => "dep",
            Self::Relationship => "rel",
        }
    }
}

/// Collision-checked generator for edge ids.
///
/// Remembers every id it generated or was told about, and retries with a
/// nonce on collision. The id length grows with the number of known ids.
#[derive(Debug, Default)]
pub struct EdgeIdGenerator {
    existing_ids: HashSet<EdgeId>,
}

impl EdgeIdGenerator {
    /// Create an empty generator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing id so it is never handed out again
    pub fn register(&mut self, id: EdgeId) {
        self.existing_ids.insert(id);
    }

    /// Number of ids known to the generator
    #[must_use]
    pub fn known(&self) -> usize {
        self.existing_ids.len()
    }

    /// Generate a fresh id for an edge between `source` and `target`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::IdGeneration` if every nonce collides at every
    /// length up to the maximum.
    pub fn generate(
        &mut self,
        prefix: EdgePrefix,
        source: &str,
        target: &str,
        edge_type: &str,
    ) -> Result<EdgeId, StorageError> {
        let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let mut length = self.adaptive_length();

        while length <= MAX_LENGTH {
            for nonce in 0..MAX_NONCE {
                let content = format!("{source}|{target}|{edge_type}|{timestamp}|{nonce}");
                let id = EdgeId::new(format!(
                    "{}-{}",
                    prefix.as_str(),
                    hash_base36(&content, length)
                ));

                if !self.existing_ids.contains(&id) {
                    if nonce > 0 {
                        debug!(nonce, length, "Generated unique edge id after collisions");
                    }
                    self.existing_ids.insert(id.clone());
                    return Ok(id);
                }
            }
            warn!(length, "All nonces exhausted, increasing edge id length");
            length += 1;
        }

        Err(StorageError::IdGeneration(format!(
            "no unique {} id after {MAX_NONCE} nonces per length",
            prefix.as_str()
        )))
    }

    /// 6 chars up to 1,000 edges, 7 up to 10,000, 8 beyond
    fn adaptive_length(&self) -> usize {
        match self.existing_ids.len() {
            0..=1000 => 6,
            1001..=10_000 => 7,
            _ => 8,
        }
    }
}

/// Base36 rendering of the first 8 bytes of a SHA-256 digest
fn hash_base36(content: &str, length: usize) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut num = digest
        .iter()
        .take(8)
        .fold(0u64, |acc, &byte| acc.wrapping_shl(8).wrapping_add(u64::from(byte)));

    let mut chars = Vec::with_capacity(length);
    for _ in 0..length {
        // `num % 36` is always < 36, so the index is in bounds
        #[allow(clippy::cast_possible_truncation)]
        let index = (num % 36) as usize;
        chars.push(char::from(BASE36_CHARS[index]));
        num /= 36;
    }
    chars.reverse();
    chars.into_iter().collect()
}
