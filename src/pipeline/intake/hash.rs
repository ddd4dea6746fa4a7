use base64::Engine;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 content hash of a file's raw bytes, base64-encoded.
///
/// The filename plays no part: identical bytes always hash identically.
pub fn compute_content_hash(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    base64::engine::general_purpose::STANDARD.encode(hash)
}
