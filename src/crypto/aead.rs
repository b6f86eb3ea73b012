//! AEAD sealing for the per-pair share payload (component F). XChaCha20-
//! Poly1305 is used in preference to the channel's transport-mode cipher
//! so the nonce can be a full 24 random bytes instead of a handshake-
//! managed counter.

use chacha20poly1305::{
	aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
	XChaCha20Poly1305, XNonce,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;

#[derive(ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
	pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
		AeadKey(bytes)
	}

	/// Expose the raw key bytes, needed only when a party reveals a pair's
	/// derived key in response to being accused (the `KeyReveal` message).
	pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
		self.0
	}

	pub fn seal(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8], aad: &[u8]) -> Vec<u8> {
		let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(&self.0));
		cipher
			.encrypt(XNonce::from_slice(nonce), Payload { msg: plaintext, aad })
			.expect("encryption over a 32-byte key and 24-byte nonce cannot fail")
	}

	pub fn open(
		&self,
		nonce: &[u8; NONCE_SIZE],
		ciphertext: &[u8],
		aad: &[u8],
	) -> Result<Vec<u8>, CryptoError> {
		let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(&self.0));
		cipher
			.decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
			.map_err(|_| CryptoError::AeadAuthenticationFailed)
	}
}

impl Zeroize for AeadKey {
	fn zeroize(&mut self) {
		self.0.zeroize();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn seal_then_open_round_trips() {
		let key = AeadKey::new([7u8; KEY_SIZE]);
		let nonce = [1u8; NONCE_SIZE];
		let ct = key.seal(&nonce, b"share payload", b"aad");
		let pt = key.open(&nonce, &ct, b"aad").unwrap();
		assert_eq!(pt, b"share payload");
	}

	#[test]
	fn tampered_aad_is_rejected() {
		let key = AeadKey::new([7u8; KEY_SIZE]);
		let nonce = [1u8; NONCE_SIZE];
		let ct = key.seal(&nonce, b"share payload", b"aad");
		assert!(key.open(&nonce, &ct, b"different aad").is_err());
	}
}
