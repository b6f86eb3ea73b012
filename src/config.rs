//! Configuration passed to `start_tp`/`start_peer`. No environment
//! variables, no files, no global mutable state: everything a state engine
//! needs (including its RNG) is injected here or at construction time.

use ed25519_consensus::SigningKey;

/// Default freshness window, in the same units as the wire timestamp
/// (milliseconds since the Unix epoch). See DESIGN.md's Open Question on
/// freshness-window units for why this crate uses milliseconds throughout
/// rather than the seconds SPEC_FULL.md's wire format describes.
pub const DEFAULT_EPSILON_MS: u64 = 5_000;

#[derive(Clone)]
pub struct Config {
	/// Total number of peers, `n`.
	pub n: u8,
	/// Reconstruction threshold: `t` shares are required to combine an
	/// OPRF evaluation or reconstruct the secret, per the sharing
	/// polynomial's degree `t - 1` (SPEC_FULL.md §4.C: `t - 1` random
	/// coefficients are drawn above the constant term).
	pub t: u8,
	/// Freshness window epsilon, in milliseconds.
	pub epsilon_ms: u64,
	/// Domain-separation tag mixed into every hash-to-group and
	/// Fiat-Shamir challenge this run of the protocol computes.
	pub domain_separation_tag: Vec<u8>,
	pub session_id: [u8; crate::message::SESSION_ID_LEN],
}

impl Config {
	pub fn new(n: u8, t: u8, session_id: [u8; crate::message::SESSION_ID_LEN]) -> Self {
		Config {
			n,
			t,
			epsilon_ms: DEFAULT_EPSILON_MS,
			domain_separation_tag: b"toprf-dkg/v1".to_vec(),
			session_id,
		}
	}
}

/// A peer's long-term signing identity, distinct from its per-pair Noise
/// static keypair (`channel::NoiseKeypair`).
pub struct PeerIdentity {
	pub index: u8,
	pub signing_key: SigningKey,
}

impl PeerIdentity {
	pub fn generate(index: u8, rng: &mut crate::crypto::Rng) -> Self {
		use rand::RngCore;
		let mut seed = [0u8; 32];
		rng.fill_bytes(&mut seed);
		PeerIdentity { index, signing_key: SigningKey::from(seed) }
	}
}
