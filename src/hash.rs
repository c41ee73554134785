use std::fmt;

/// A 32-byte digest.
///
/// The inner bytes are public for zero-cost access; `Display` renders
/// lowercase hex for logs and error messages.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Sentinel digest for absent child slots, empty leaves and the
    /// empty tree. Absent slots contribute this value to their parent
    /// rather than being omitted, so a tree missing its 4th child can
    /// never hash identically to one with 3 children packed into
    /// earlier slots.
    pub const EMPTY: Self = Self([0; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Pluggable digest function for leaf payloads and child combination.
///
/// Implementations must be deterministic with fixed-length output, and
/// should have strong avalanche behavior: flipping one payload byte
/// flips the digest with overwhelming probability.
pub trait Hasher {
    fn digest(&self, bytes: &[u8]) -> Digest;
}

/// Default [`Hasher`] backed by BLAKE3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    fn digest(&self, bytes: &[u8]) -> Digest {
        Digest(*blake3::hash(bytes).as_bytes())
    }
}

/// Combine the 8 child-slot digests of an internal node into one.
///
/// Fixed arity: all 8 slots are hashed in slot order, absent slots as
/// [`Digest::EMPTY`], so structurally different trees cannot collide
/// by slot shifting.
pub fn combine_slots<H: Hasher>(hasher: &H, slots: &[Digest; 8]) -> Digest {
    let mut buf = [0u8; 8 * 32];
    for (chunk, digest) in buf.chunks_exact_mut(32).zip(slots.iter()) {
        chunk.copy_from_slice(digest.as_bytes());
    }
    hasher.digest(&buf)
}

#[test]
fn digest_is_deterministic() {
    let hasher = Blake3Hasher;
    assert_eq!(hasher.digest(b"abc"), hasher.digest(b"abc"));
    assert_ne!(hasher.digest(b"abc"), hasher.digest(b"abd"));
}

#[test]
fn single_byte_flip_changes_digest() {
    let hasher = Blake3Hasher;
    let mut payload = vec![0u8; 64];
    let base = hasher.digest(&payload);
    payload[17] ^= 0x01;
    assert_ne!(hasher.digest(&payload), base);
}

#[test]
fn absent_slots_keep_their_position() {
    let hasher = Blake3Hasher;
    let digest = hasher.digest(b"x");

    let mut at_0 = [Digest::EMPTY; 8];
    at_0[0] = digest;
    let mut at_1 = [Digest::EMPTY; 8];
    at_1[1] = digest;

    assert_ne!(combine_slots(&hasher, &at_0), combine_slots(&hasher, &at_1));
}

#[test]
fn digest_displays_as_hex() {
    assert_eq!(Digest::EMPTY.to_string(), "00".repeat(32));
    let digest = Blake3Hasher.digest(b"abc");
    assert_eq!(digest.to_string().len(), 64);
}
