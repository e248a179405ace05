//! State Fingerprints
//!
//! SHA-256 digests peers compare to confirm they agree: on the full
//! replicated state in debug runs and tests, and on the game tables at
//! session start. Every field is fed in little-endian behind a domain
//! tag, so the digest depends only on values and their order.

use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Domain tag for replicated state.
pub const STATE_DOMAIN: &[u8] = b"LOCKSTEP_ARENA_STATE_V1";
/// Domain tag for game tables.
pub const CONFIG_DOMAIN: &[u8] = b"LOCKSTEP_ARENA_CONFIG_V1";

/// A value with one canonical byte encoding.
pub trait HashField {
    /// Feed the canonical bytes.
    fn feed(&self, sha: &mut Sha256);
}

macro_rules! le_field {
    ($($t:ty),*) => {
        $(impl HashField for $t {
            #[inline]
            fn feed(&self, sha: &mut Sha256) {
                sha.update(self.to_le_bytes());
            }
        })*
    };
}

le_field!(u8, u32, i32, u64);

impl HashField for [u8] {
    #[inline]
    fn feed(&self, sha: &mut Sha256) {
        sha.update(self);
    }
}

impl<const N: usize> HashField for [u8; N] {
    #[inline]
    fn feed(&self, sha: &mut Sha256) {
        sha.update(self);
    }
}

/// Ordered digest builder.
pub struct StateHasher {
    sha: Sha256,
}

impl StateHasher {
    /// Start a digest under `domain`.
    pub fn new(domain: &[u8]) -> Self {
        let mut sha = Sha256::new();
        sha.update(domain);
        Self { sha }
    }

    /// Append one field.
    #[inline]
    pub fn put<T: HashField + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.feed(&mut self.sha);
        self
    }

    /// Finish.
    pub fn finalize(self) -> StateHash {
        self.sha.finalize().into()
    }
}

/// Digest of a replicated state: `tic` and `seed` first, then whatever
/// `add_state` appends.
pub fn compute_state_hash<F>(tic: u32, seed: u32, add_state: F) -> StateHash
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::new(STATE_DOMAIN);
    hasher.put(&tic).put(&seed);
    add_state(&mut hasher);
    hasher.finalize()
}

/// Short hex prefix of a hash for log lines.
pub fn short_hex(hash: &StateHash) -> String {
    hex::encode(&hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_order_matters() {
        let mut a = StateHasher::new(b"test");
        a.put(&1u32).put(&2u32);
        let mut b = StateHasher::new(b"test");
        b.put(&2u32).put(&1u32);
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_domains_differ() {
        let mut a = StateHasher::new(STATE_DOMAIN);
        a.put(&[1u8, 2, 3][..]);
        let mut b = StateHasher::new(CONFIG_DOMAIN);
        b.put(&[1u8, 2, 3][..]);
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_signed_and_unsigned_share_bytes() {
        let mut a = StateHasher::new(b"x");
        a.put(&-1i32);
        let mut b = StateHasher::new(b"x");
        b.put(&u32::MAX);
        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_compute_state_hash() {
        let run = |tic| compute_state_hash(tic, 12345, |h| {
            h.put(&7i32);
        });
        assert_eq!(run(100), run(100));
        assert_ne!(run(100), run(101));
    }

    #[test]
    fn test_short_hex() {
        assert_eq!(short_hex(&[0xab; 32]), "abababababababab");
    }
}
