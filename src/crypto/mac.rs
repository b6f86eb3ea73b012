//! Key-committing MAC over the AEAD ciphertext (component F). XChaCha20-
//! Poly1305 alone is not key-committing — a sender can craft a ciphertext
//! that decrypts successfully under two different keys (the "invisible
//! salamander" attack). Binding an HMAC-SHA256 tag, computed with an
//! independently derived key, over the ciphertext closes that gap.

use hmac::{Hmac, Mac as _};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

pub const TAG_SIZE: usize = 32;

type HmacSha256 = Hmac<Sha256>;

#[derive(ZeroizeOnDrop)]
pub struct MacKey([u8; 32]);

impl MacKey {
	pub fn new(bytes: [u8; 32]) -> Self {
		MacKey(bytes)
	}

	/// Expose the raw key bytes, needed only when a party reveals a pair's
	/// derived key in response to being accused (the `KeyReveal` message).
	pub fn to_bytes(&self) -> [u8; 32] {
		self.0
	}

	pub fn tag(&self, ciphertext: &[u8]) -> [u8; TAG_SIZE] {
		let mut mac =
			HmacSha256::new_from_slice(&self.0).expect("HMAC accepts keys of any length");
		mac.update(ciphertext);
		let mut out = [0u8; TAG_SIZE];
		out.copy_from_slice(&mac.finalize().into_bytes());
		out
	}

	pub fn verify(&self, ciphertext: &[u8], tag: &[u8; TAG_SIZE]) -> Result<(), CryptoError> {
		let expected = self.tag(ciphertext);
		if expected.ct_eq(tag).into() {
			Ok(())
		} else {
			Err(CryptoError::MacMismatch)
		}
	}
}

impl Zeroize for MacKey {
	fn zeroize(&mut self) {
		self.0.zeroize();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tag_verifies() {
		let key = MacKey::new([3u8; 32]);
		let tag = key.tag(b"ciphertext");
		assert!(key.verify(b"ciphertext", &tag).is_ok());
	}

	#[test]
	fn tampered_ciphertext_fails_verification() {
		let key = MacKey::new([3u8; 32]);
		let tag = key.tag(b"ciphertext");
		assert!(key.verify(b"different", &tag).is_err());
	}
}
