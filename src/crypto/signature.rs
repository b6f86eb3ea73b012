//! Long-term peer/TP signing keys for the signed-message framing
//! (component E). `ed25519-consensus` is the teacher's own dependency for
//! long-term identity signatures (see the workspace `Cargo.toml`); we reuse
//! it here rather than introducing a second Ed25519 implementation.

use ed25519_consensus::{Signature, SigningKey, VerificationKey};

use crate::error::FramingError;

pub const SIGNATURE_SIZE: usize = 64;

pub fn sign(key: &SigningKey, msg: &[u8]) -> [u8; SIGNATURE_SIZE] {
	key.sign(msg).to_bytes()
}

pub fn verify(
	key: &VerificationKey,
	msg: &[u8],
	sig_bytes: &[u8; SIGNATURE_SIZE],
) -> Result<(), FramingError> {
	let sig = Signature::try_from(sig_bytes.as_slice()).map_err(|_| FramingError::BadSignature)?;
	key.verify(&sig, msg).map_err(|_| FramingError::BadSignature)
}
