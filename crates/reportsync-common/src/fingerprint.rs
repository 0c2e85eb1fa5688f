//! Content fingerprints for deduplication keys
//!
//! A fingerprint is the lowercase hex MD5 digest of a string's UTF-8 bytes.
//! It only has to be stable, not collision resistant, so MD5 is good enough
//! and matches the hashes already present in downstream topics.

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 32;

/// Compute the fingerprint of an optional string
///
/// Returns `None` when there is nothing to hash. The digest primitive is
/// infallible, so a present input always yields a fingerprint.
pub fn fingerprint(value: Option<&str>) -> Option<String> {
    value.map(fingerprint_str)
}

/// Compute the fingerprint of a string
pub fn fingerprint_str(value: &str) -> String {
    format!("{:x}", md5::compute(value.as_bytes()))
}
