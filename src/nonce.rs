use base64::{engine::general_purpose::STANDARD_NO_PAD as Base64, Engine as _};
use rand::RngCore;

/// The number of random bytes to generate for a nonce.
pub(crate) const DEFAULT_NONCE_LEN: usize = 16;

/// Generates a nonce with `len` random bytes, base64 encoded to ensure that
/// it meets the criteria for inclusion in a SCRAM message.
///
/// Panics if `len` is zero or if the random source fails.
pub(crate) fn nonce<R: RngCore + ?Sized>(len: usize, rng: &mut R) -> Vec<u8> {
    assert!(len > 0, "cannot generate a zero length nonce");
    let mut raw = vec![0u8; len];
    rng.try_fill_bytes(&mut raw)
        .expect("failed to read from the random source");
    Base64.encode(raw).into_bytes()
}
