//! The per-ordered-pair secure-channel mesh (component F): an XK-pattern
//! Noise handshake (delegated to `snow`) drives to a shared handshake hash,
//! from which HKDF-SHA256 derives an XChaCha20-Poly1305 key for the share
//! payload and an independent HMAC-SHA256 key for a key-committing MAC
//! over the ciphertext.

use hkdf::Hkdf;
use sha2::Sha256;
use snow::Builder;

use crate::{
	crypto::{
		aead::{AeadKey, NONCE_SIZE},
		mac::MacKey,
	},
	error::CryptoError,
};

const NOISE_PATTERN: &str = "Noise_XK_25519_ChaChaPoly_BLAKE2s";
const MAX_MESSAGE_LEN: usize = 1024;

const HKDF_AEAD_INFO: &[u8] = b"toprf-dkg/channel/aead";
const HKDF_MAC_INFO: &[u8] = b"toprf-dkg/channel/mac";

pub struct NoiseKeypair {
	pub public: [u8; 32],
	pub private: [u8; 32],
}

pub fn generate_keypair() -> Result<NoiseKeypair, CryptoError> {
	let builder = Builder::new(NOISE_PATTERN.parse().expect("pattern string is valid"));
	let keypair =
		builder.generate_keypair().map_err(|e| CryptoError::Handshake(e.to_string()))?;
	Ok(NoiseKeypair {
		public: keypair.public.try_into().map_err(|_| {
			CryptoError::Handshake("generated public key has unexpected length".into())
		})?,
		private: keypair.private.try_into().map_err(|_| {
			CryptoError::Handshake("generated private key has unexpected length".into())
		})?,
	})
}

/// Drives one side of a single pair's three-message XK handshake to
/// completion, then yields the derived AEAD and MAC keys. Never enters
/// `snow`'s transport mode: only the handshake hash is used.
pub struct Channel {
	state: snow::HandshakeState,
}

impl Channel {
	pub fn new_initiator(local_private: &[u8; 32], remote_public: &[u8; 32]) -> Result<Self, CryptoError> {
		let state = Builder::new(NOISE_PATTERN.parse().expect("pattern string is valid"))
			.local_private_key(local_private)
			.remote_public_key(remote_public)
			.build_initiator()
			.map_err(|e| CryptoError::Handshake(e.to_string()))?;
		Ok(Channel { state })
	}

	pub fn new_responder(local_private: &[u8; 32]) -> Result<Self, CryptoError> {
		let state = Builder::new(NOISE_PATTERN.parse().expect("pattern string is valid"))
			.local_private_key(local_private)
			.build_responder()
			.map_err(|e| CryptoError::Handshake(e.to_string()))?;
		Ok(Channel { state })
	}

	/// Produce the next outbound handshake message.
	pub fn write_step(&mut self) -> Result<Vec<u8>, CryptoError> {
		let mut buf = [0u8; MAX_MESSAGE_LEN];
		let len = self
			.state
			.write_message(&[], &mut buf)
			.map_err(|e| CryptoError::Handshake(e.to_string()))?;
		Ok(buf[..len].to_vec())
	}

	/// Consume the next inbound handshake message.
	pub fn read_step(&mut self, message: &[u8]) -> Result<(), CryptoError> {
		let mut buf = [0u8; MAX_MESSAGE_LEN];
		self.state
			.read_message(message, &mut buf)
			.map_err(|e| CryptoError::Handshake(e.to_string()))?;
		Ok(())
	}

	pub fn is_finished(&self) -> bool {
		self.state.is_handshake_finished()
	}

	/// Derive the two independent keys for this pair from the finished
	/// handshake's hash. Must only be called once `is_finished()`.
	pub fn derive_keys(&self) -> (AeadKey, MacKey) {
		let handshake_hash = self.state.get_handshake_hash();
		let hk = Hkdf::<Sha256>::new(None, handshake_hash);

		let mut aead_bytes = [0u8; 32];
		hk.expand(HKDF_AEAD_INFO, &mut aead_bytes).expect("32 is a valid HKDF-SHA256 output length");

		let mut mac_bytes = [0u8; 32];
		hk.expand(HKDF_MAC_INFO, &mut mac_bytes).expect("32 is a valid HKDF-SHA256 output length");

		(AeadKey::new(aead_bytes), MacKey::new(mac_bytes))
	}
}

/// A share, sealed and MAC-tagged for delivery over a single pair's channel
/// (the payload of step 7's `ShareDelivery` message).
#[derive(Clone, Debug)]
pub struct SealedShare {
	pub nonce: [u8; NONCE_SIZE],
	pub ciphertext: Vec<u8>,
	pub tag: [u8; crate::crypto::mac::TAG_SIZE],
}

pub fn seal_share(
	aead_key: &AeadKey,
	mac_key: &MacKey,
	nonce: [u8; NONCE_SIZE],
	share_bytes: &[u8],
	aad: &[u8],
) -> SealedShare {
	let ciphertext = aead_key.seal(&nonce, share_bytes, aad);
	let tag = mac_key.tag(&ciphertext);
	SealedShare { nonce, ciphertext, tag }
}

pub fn open_share(
	aead_key: &AeadKey,
	mac_key: &MacKey,
	sealed: &SealedShare,
	aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
	mac_key.verify(&sealed.ciphertext, &sealed.tag)?;
	aead_key.open(&sealed.nonce, &sealed.ciphertext, aad)
}

/// Additional authenticated data binding a sealed share to the ordered
/// pair and session it belongs to, so a ciphertext from one pair or
/// session can never be replayed as another's.
pub fn pair_aad(session_id: &[u8; 32], sender: u8, recipient: u8) -> Vec<u8> {
	let mut out = session_id.to_vec();
	out.push(sender);
	out.push(recipient);
	out
}

/// The step-7 `ShareDelivery` payload: the final handshake message
/// (length-prefixed, since exact Noise message lengths are pattern-
/// dependent rather than the fixed slot a packed wire struct could use)
/// followed by the sealed share.
pub fn encode_share_delivery(handshake_final: &[u8], sealed: &SealedShare) -> Vec<u8> {
	let mut out = Vec::new();
	out.extend_from_slice(&(handshake_final.len() as u16).to_be_bytes());
	out.extend_from_slice(handshake_final);
	out.extend_from_slice(&sealed.nonce);
	out.extend_from_slice(&(sealed.ciphertext.len() as u16).to_be_bytes());
	out.extend_from_slice(&sealed.ciphertext);
	out.extend_from_slice(&sealed.tag);
	out
}

pub fn decode_share_delivery(bytes: &[u8]) -> Option<(Vec<u8>, SealedShare)> {
	let mut offset = 0usize;
	let handshake_len = u16::from_be_bytes(bytes.get(offset..offset + 2)?.try_into().ok()?) as usize;
	offset += 2;
	let handshake_final = bytes.get(offset..offset + handshake_len)?.to_vec();
	offset += handshake_len;

	let mut nonce = [0u8; NONCE_SIZE];
	nonce.copy_from_slice(bytes.get(offset..offset + NONCE_SIZE)?);
	offset += NONCE_SIZE;

	let ct_len = u16::from_be_bytes(bytes.get(offset..offset + 2)?.try_into().ok()?) as usize;
	offset += 2;
	let ciphertext = bytes.get(offset..offset + ct_len)?.to_vec();
	offset += ct_len;

	let mut tag = [0u8; crate::crypto::mac::TAG_SIZE];
	tag.copy_from_slice(bytes.get(offset..offset + crate::crypto::mac::TAG_SIZE)?);

	Some((handshake_final, SealedShare { nonce, ciphertext, tag }))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn handshake_completes_and_derives_matching_keys() {
		let responder_keys = generate_keypair().unwrap();

		let mut initiator =
			Channel::new_initiator(&[1u8; 32], &responder_keys.public).unwrap();
		let mut responder = Channel::new_responder(&responder_keys.private).unwrap();

		// -> e
		let m1 = initiator.write_step().unwrap();
		responder.read_step(&m1).unwrap();
		// <- e, ee, s, es
		let m2 = responder.write_step().unwrap();
		initiator.read_step(&m2).unwrap();
		// -> s, se
		let m3 = initiator.write_step().unwrap();
		responder.read_step(&m3).unwrap();

		assert!(initiator.is_finished());
		assert!(responder.is_finished());

		let (initiator_aead, initiator_mac) = initiator.derive_keys();
		let (responder_aead, responder_mac) = responder.derive_keys();

		let nonce = [3u8; NONCE_SIZE];
		let sealed = seal_share(&initiator_aead, &initiator_mac, nonce, b"a share", b"aad");
		let opened = open_share(&responder_aead, &responder_mac, &sealed, b"aad").unwrap();

		assert_eq!(opened, b"a share");
	}

	#[test]
	fn share_delivery_payload_round_trips() {
		let sealed = SealedShare { nonce: [7u8; NONCE_SIZE], ciphertext: vec![1, 2, 3, 4], tag: [9u8; 32] };
		let encoded = encode_share_delivery(b"handshake-bytes", &sealed);
		let (hs, decoded) = decode_share_delivery(&encoded).unwrap();
		assert_eq!(hs, b"handshake-bytes");
		assert_eq!(decoded.nonce, sealed.nonce);
		assert_eq!(decoded.ciphertext, sealed.ciphertext);
		assert_eq!(decoded.tag, sealed.tag);
	}
}
