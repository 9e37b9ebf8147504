//! Immutable documents attached to milestone events.
//!
//! An artifact (typically a rendered bank letter) is stored verbatim at the
//! moment of the event and is never regenerated. Its SHA-256 digest is taken
//! once at write time so an auditor can prove the stored text is the text
//! that was issued.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
  pub content: String,
  /// Lowercase hex SHA-256 of `content`.
  pub sha256:  String,
}

impl Artifact {
  pub fn new(content: impl Into<String>) -> Self {
    let content = content.into();
    let sha256 = digest(&content);
    Self { content, sha256 }
  }

  /// Recompute the digest and compare it with the stored one.
  pub fn verify(&self) -> bool { digest(&self.content) == self.sha256 }
}

pub fn digest(content: &str) -> String { hex::encode(Sha256::digest(content.as_bytes())) }
