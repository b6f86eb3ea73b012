//! Shared harness for the multi-party protocol-flow integration tests:
//! builds a TP plus its `n` peers and drives them through the `next()`/
//! `deliver()` round loop the way a real transport would.

use ed25519_consensus::SigningKey;
use rand::{RngCore, SeedableRng};

use toprf_dkg::{
	channel,
	config::{Config, PeerIdentity},
	message::Message,
	tp::{Tp, TpStep},
	Peer, Rng,
};

pub struct Fixture {
	pub tp: Tp,
	pub peers: Vec<Peer>,
	pub peer_seeds: Vec<[u8; 32]>,
	pub session_id: [u8; 32],
	pub now_ms: u64,
}

/// Build a fresh TP and `n` peers for a session with reconstruction
/// threshold `t` (`t` shares are required, per `Config::t`'s documented
/// convention). `seed` only needs to vary between tests that must not share
/// an RNG stream.
pub fn build_fixture(n: u8, t: u8, seed: u8) -> Fixture {
	let mut rng = Rng::from_seed([seed; 32]);

	let mut session_id = [0u8; 32];
	rng.fill_bytes(&mut session_id);
	let config = Config::new(n, t, session_id);

	let mut tp_seed = [0u8; 32];
	rng.fill_bytes(&mut tp_seed);
	let tp_signing = SigningKey::from(tp_seed);
	let tp_verification_key = tp_signing.verification_key();

	let tp = Tp::new(config.clone(), tp_signing);

	let mut peers = Vec::with_capacity(n as usize);
	let mut peer_seeds = Vec::with_capacity(n as usize);
	for idx in 1..=n {
		let mut peer_seed = [0u8; 32];
		rng.fill_bytes(&mut peer_seed);
		let identity = PeerIdentity { index: idx, signing_key: SigningKey::from(peer_seed) };
		let noise = channel::generate_keypair().expect("noise keypair generation");

		let mut peer_rng_seed = [0u8; 32];
		rng.fill_bytes(&mut peer_rng_seed);
		let peer_rng = Rng::from_seed(peer_rng_seed);

		peer_seeds.push(peer_seed);
		peers.push(Peer::new(config.clone(), identity, noise, tp_verification_key, peer_rng));
	}

	Fixture { tp, peers, peer_seeds, session_id, now_ms: 1_000_000 }
}

impl Fixture {
	/// Run exactly one round: advance the TP, route whatever it emits to
	/// whichever peers it's addressed to (`to == toprf_dkg::message::BROADCAST`
	/// is a broadcast), then deliver every peer's response back to the TP.
	/// The TP is the mandatory first hop for all traffic, including
	/// peer-to-peer relay messages, so every peer output goes through
	/// `tp.deliver` regardless of its `to`.
	pub fn step_once(&mut self) {
		self.now_ms += 1;
		let tp_out = self.tp.next(self.now_ms).expect("tp.next should not error in these scenarios");

		for peer in self.peers.iter_mut() {
			let inbound: Vec<Message> = tp_out
				.to_send
				.iter()
				.filter(|m| m.to == toprf_dkg::message::BROADCAST || m.to == peer.index())
				.cloned()
				.collect();
			let peer_out =
				peer.next(&inbound, self.now_ms).expect("peer.next should not error in these scenarios");
			for msg in peer_out.to_send {
				let _ = self.tp.deliver(msg, self.now_ms);
			}
		}
	}

	/// Drive both engines until the TP reaches [`TpStep::Done`] or a
	/// generous round budget is exhausted.
	pub fn drive_to_completion(&mut self) {
		for _ in 0..300 {
			self.step_once();
			if self.tp.step() == TpStep::Done {
				break;
			}
		}
	}

	/// Recover a peer's long-term signing key, for tests that need to craft
	/// an extra message in that peer's name.
	pub fn peer_signing_key(&self, index: u8) -> SigningKey {
		SigningKey::from(self.peer_seeds[(index - 1) as usize])
	}
}
