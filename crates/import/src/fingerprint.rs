use sha2::{Digest, Sha256};
use tally_core::TransactionCandidate;

/// Compute SHA-256 of an in-memory byte slice.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encode a raw 32-byte hash as a lowercase hex string (64 chars).
pub fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Stable identity of a candidate's source: kind, instant, amount and the
/// whitespace-normalized, case-folded reference. Re-importing the same
/// message or statement line yields the same fingerprint.
pub fn fingerprint(candidate: &TransactionCandidate) -> String {
    let reference = candidate
        .reference()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let key = format!(
        "{}|{}|{}|{}",
        candidate.kind(),
        candidate.epoch_millis(),
        candidate.amount(),
        reference
    );
    to_hex(&sha256_bytes(key.as_bytes()))
}
