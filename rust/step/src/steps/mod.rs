//! The generic step library.
//!
//! Recipes compose these instead of reimplementing transport plumbing:
//! run a command (with an idempotency check), upload a file, render a
//! template, download an artifact to the control node, extract an
//! archive.

mod command;
mod download;
mod extract;
mod render;
mod upload;

pub use command::CommandStep;
pub use download::DownloadStep;
pub use extract::ExtractStep;
pub use render::{RenderStep, expand};
pub use upload::{FileSource, UploadStep};

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of a byte slice.
#[must_use]
pub fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
