//! Key normalization and hashing for the exact-match cache.

/// Normalise (lowercase, trim, collapse surrounding whitespace) and hash a
/// raw cache key into a fixed-width hex fingerprint.
///
/// Two keys that differ only in case or leading/trailing whitespace collide
/// on the same fingerprint, per the exact cache's stated invariant.
pub fn fingerprint(raw: &str) -> String {
    let normalized = raw.trim().to_lowercase();
    blake3::hash(normalized.as_bytes()).to_hex().to_string()
}
