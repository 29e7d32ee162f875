use sha2::{Digest, Sha256};

/// Identifier of the fingerprint scheme, stored next to every digest.
pub const FINGERPRINT_SCHEME: &str = "sha256:v1";

const DOMAIN_FINGERPRINT: &[u8] = b"safetysnap.fingerprint.v1";

/// Identity digest of an upload, derived from `(filename, owner_id)` only.
///
/// This groups uploads that share a display name and owner. It says nothing
/// about image content or detection output. The filename is length-prefixed so
/// that `("a1", 2)` and `("a", 12)` cannot collide.
pub fn fingerprint(filename: &str, owner_id: i64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_FINGERPRINT);
    hasher.update((filename.len() as u64).to_le_bytes());
    hasher.update(filename.as_bytes());
    hasher.update(owner_id.to_le_bytes());
    hasher.finalize().into()
}

pub fn fingerprint_hex(filename: &str, owner_id: i64) -> String {
    hex::encode(fingerprint(filename, owner_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_digest() {
        assert_eq!(
            fingerprint_hex("site-a.jpg", 7),
            fingerprint_hex("site-a.jpg", 7)
        );
        assert_eq!(fingerprint_hex("site-a.jpg", 7).len(), 64);
    }

    #[test]
    fn either_input_changes_digest() {
        let base = fingerprint("site-a.jpg", 7);
        assert_ne!(base, fingerprint("site-b.jpg", 7));
        assert_ne!(base, fingerprint("site-a.jpg", 8));
    }

    #[test]
    fn concatenation_ambiguity_is_avoided() {
        assert_ne!(fingerprint("a1", 2), fingerprint("a", 12));
        assert_ne!(fingerprint("photo", 12), fingerprint("photo1", 2));
    }
}
