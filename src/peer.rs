//! The peer state engine (component H): mirrors `tp::Tp` step for step,
//! but from a single peer's point of view. Every message a peer receives
//! over the lifetime of a session was emitted — or, for relayed p2p
//! traffic, re-signed — by the trusted party, so unlike `Tp::deliver` a
//! peer only ever checks an inbound signature against one key: the TP's.
//!
//! Grounded on the same `CeremonyStage` shape as `tp.rs`
//! (`client/common/ceremony_stage.rs`): a peer processes exactly the
//! batch of messages the caller routed to it for the current step and
//! returns the message(s) it wants relayed back to the TP.

use std::collections::{BTreeMap, BTreeSet};

use ed25519_consensus::VerificationKey;
use tracing::{debug, warn};

use crate::{
	channel::{self, Channel, NoiseKeypair},
	config::{Config, PeerIdentity},
	crypto::{aead::NONCE_SIZE, hash::Transcript, Point, Rng},
	error::{FramingError, ProtocolError},
	message::{Message, MessageType},
	shamir::{self, CoefficientCommitments, Share},
};

/// Each pair's derived AEAD key is used to seal exactly one message (the
/// share), so a fixed nonce is safe: the danger a nonce guards against is
/// reuse of a (key, nonce) pair, and here the key itself never repeats
/// within a session.
const SHARE_NONCE: [u8; NONCE_SIZE] = [0u8; NONCE_SIZE];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
	AwaitConfig,
	AwaitPeerTable,
	AwaitCommitmentMatrix,
	AwaitHandshakeA,
	AwaitHandshakeB,
	AwaitShareDelivery,
	AwaitComplaintMatrix,
	AwaitRevealTable,
	AwaitTranscript,
	Done,
}

pub struct PeerOutput {
	pub to_send: Vec<Message>,
	pub not_done: bool,
}

pub struct Peer {
	config: Config,
	identity: PeerIdentity,
	noise: NoiseKeypair,
	/// Learned via trust-on-first-use from msg0's embedded key (SPEC_FULL.md
	/// §3/§6), the same way `Tp::deliver` learns a peer's long-term key from
	/// its `PeerHello` payload — not taken as configuration, since the TP's
	/// *session* signing key only exists once a run starts.
	tp_verification_key: Option<VerificationKey>,
	rng: Rng,
	phase: Phase,
	last_seen_ts: Option<u64>,
	peer_signing: BTreeMap<u8, VerificationKey>,
	peer_noise: BTreeMap<u8, [u8; 32]>,
	own_coefficients_commitments: CoefficientCommitments,
	outgoing_shares: BTreeMap<u8, Share>,
	commitments: BTreeMap<u8, CoefficientCommitments>,
	init_channels: BTreeMap<u8, Channel>,
	resp_channels: BTreeMap<u8, Channel>,
	incoming_shares: BTreeMap<u8, Share>,
	complaints: BTreeSet<u8>,
	transcript: Vec<u8>,
	transcript_mismatch: bool,
	final_share: Option<Share>,
}

impl Peer {
	/// `tp_verification_key` is learned out of band before the session
	/// starts (the same way `n`/`t`/epsilon are): it is configuration, not
	/// protocol state, so it is a constructor input rather than something
	/// this engine discovers over the wire.
	pub fn new(
		config: Config,
		identity: PeerIdentity,
		noise: NoiseKeypair,
		tp_verification_key: VerificationKey,
		rng: Rng,
	) -> Self {
		Peer {
			config,
			identity,
			noise,
			tp_verification_key,
			rng,
			phase: Phase::AwaitConfig,
			last_seen_ts: None,
			peer_signing: BTreeMap::new(),
			peer_noise: BTreeMap::new(),
			own_coefficients_commitments: CoefficientCommitments(Vec::new()),
			outgoing_shares: BTreeMap::new(),
			commitments: BTreeMap::new(),
			init_channels: BTreeMap::new(),
			resp_channels: BTreeMap::new(),
			incoming_shares: BTreeMap::new(),
			complaints: BTreeSet::new(),
			transcript: Vec::new(),
			transcript_mismatch: false,
			final_share: None,
		}
	}

	pub fn index(&self) -> u8 {
		self.identity.index
	}

	pub fn transcript_mismatch(&self) -> bool {
		self.transcript_mismatch
	}

	/// This peer's own published commitment vector, kept for callers that
	/// want to audit it against the commitment matrix the TP re-broadcasts.
	pub fn own_commitments(&self) -> &CoefficientCommitments {
		&self.own_coefficients_commitments
	}

	/// The accumulated share of the group secret, available once the
	/// engine reaches [`Phase::Done`].
	pub fn final_share(&self) -> Option<&Share> {
		self.final_share.as_ref()
	}

	/// Test-only hook (see SPEC_FULL.md §9's Open Question on
	/// `UNITTEST_CORRUPT`): deliberately corrupt the share this peer will
	/// deliver to `target` so integration tests can drive the complaint and
	/// adjudication machinery without reaching into private state. Must be
	/// called after this peer's shares are sampled (i.e. after it has
	/// processed the peer table) and before it reaches `target` in the
	/// handshake, or it has no effect.
	#[cfg(feature = "test")]
	pub fn corrupt_outgoing_share_to(&mut self, target: u8) {
		if let Some(share) = self.outgoing_shares.get_mut(&target) {
			share.0 = share.0.clone() + crate::crypto::Scalar::one();
		}
	}

	/// Test-only hook: raise a complaint against `accused` that isn't backed
	/// by an actual share-verification failure, exercising the
	/// false-complaint adjudication path (cheater code 128). Must be called
	/// before this peer reaches the complaint-reporting step.
	#[cfg(feature = "test")]
	pub fn inject_false_complaint(&mut self, accused: u8) {
		self.complaints.insert(accused);
	}

	fn sign(&self, message_type: MessageType, to: u8, now_ms: u64, payload: Vec<u8>) -> Message {
		Message::sign(
			&self.identity.signing_key,
			message_type,
			self.identity.index,
			to,
			now_ms,
			self.config.session_id,
			payload,
		)
	}

	fn mark_transcript(&mut self, label: &str) {
		let mut t = Transcript::new(b"toprf-dkg/transcript");
		t.update(&self.transcript);
		t.update(label.as_bytes());
		self.transcript = t.finalize().to_vec();
		debug!(self_idx = self.identity.index, phase = ?self.phase, label, "peer transcript advanced");
	}

	fn digest32(parts: &[&[u8]]) -> [u8; 32] {
		let mut t = Transcript::new(b"toprf-dkg/peer-echo");
		for p in parts {
			t.update(p);
		}
		t.finalize()
	}

	/// Every message a peer receives was emitted (or re-signed, for
	/// relayed p2p traffic) by the TP, so the TP's session key is the
	/// only signature key ever checked here.
	fn validate(&mut self, message: &Message, now_ms: u64) -> Result<(), FramingError> {
		if let Err(e) = message.validate(
			&self.config.session_id,
			Some(self.identity.index),
			crate::message::PEER_INBOUND_TYPES,
			Some(&self.tp_verification_key),
			now_ms,
			self.config.epsilon_ms,
			self.last_seen_ts,
		) {
			warn!(self_idx = self.identity.index, phase = ?self.phase, error = %e, "ignoring unverifiable message from tp");
			return Err(e);
		}
		self.last_seen_ts = Some(message.timestamp);
		Ok(())
	}

	/// Drive the engine with the batch of messages the TP routed to this
	/// peer for the current step (a single broadcast, or the relayed p2p
	/// messages addressed to this peer). Mirrors [`crate::tp::Tp::next`]:
	/// never blocks, performs this step's local computation, and returns
	/// whatever this peer now has to send back to the TP.
	pub fn next(&mut self, inbound: &[Message], now_ms: u64) -> Result<PeerOutput, ProtocolError> {
		for m in inbound {
			self.validate(m, now_ms)?;
		}

		let to_send = match self.phase {
			Phase::AwaitConfig => self.handle_config(inbound, now_ms),
			Phase::AwaitPeerTable => self.handle_peer_table(inbound, now_ms),
			Phase::AwaitCommitmentMatrix => self.handle_commitment_matrix(inbound, now_ms),
			Phase::AwaitHandshakeA => self.handle_handshake_a(inbound, now_ms),
			Phase::AwaitHandshakeB => self.handle_handshake_b(inbound, now_ms),
			Phase::AwaitShareDelivery => self.handle_share_delivery(inbound, now_ms),
			Phase::AwaitComplaintMatrix => self.handle_complaint_matrix(inbound, now_ms),
			Phase::AwaitRevealTable => self.handle_reveal_table(inbound, now_ms),
			Phase::AwaitTranscript => self.handle_transcript(inbound, now_ms),
			Phase::Done => vec![],
		};

		Ok(PeerOutput { to_send, not_done: self.phase != Phase::Done })
	}

	fn handle_config(&mut self, inbound: &[Message], now_ms: u64) -> Vec<Message> {
		if inbound.iter().all(|m| m.message_type != MessageType::Config) {
			return vec![];
		}
		self.mark_transcript("config");

		let mut payload = Vec::with_capacity(64);
		payload.extend_from_slice(self.identity.signing_key.verification_key().as_bytes());
		payload.extend_from_slice(&self.noise.public);
		let hello = self.sign(MessageType::PeerHello, 0, now_ms, payload);

		self.phase = Phase::AwaitPeerTable;
		vec![hello]
	}

	fn handle_peer_table(&mut self, inbound: &[Message], now_ms: u64) -> Vec<Message> {
		let Some(table) = inbound.iter().find(|m| m.message_type == MessageType::PeerTable)
		else {
			return vec![];
		};

		for chunk in table.payload.chunks_exact(65) {
			let idx = chunk[0];
			if let Ok(vk) = VerificationKey::try_from(&chunk[1..33]) {
				self.peer_signing.insert(idx, vk);
			}
			let mut noise = [0u8; 32];
			noise.copy_from_slice(&chunk[33..65]);
			self.peer_noise.insert(idx, noise);
		}

		self.mark_transcript("peer-table");
		self.mark_transcript("peer-table-echo");
		let echo = self.sign(
			MessageType::Echo,
			0,
			now_ms,
			Self::digest32(&[table.payload.as_slice()]).to_vec(),
		);

		let indices: Vec<u8> = (1..=self.config.n).collect();
		let secret = crate::crypto::Scalar::random(&mut self.rng);
		// Polynomial degree is `t - 1` (SPEC_FULL.md §4.C: `t - 1` random
		// coefficients above the constant term), so exactly `t` shares
		// reconstruct it.
		let (commitments, shares) = shamir::generate_secret_and_shares(
			secret,
			self.config.t - 1,
			&indices,
			&mut self.rng,
		);
		self.own_coefficients_commitments = commitments.clone();
		// No network hop is needed to deliver a share to oneself.
		if let Some(own_share) = shares.get(&self.identity.index) {
			self.incoming_shares.insert(self.identity.index, own_share.clone());
		}
		self.outgoing_shares = shares;

		self.mark_transcript("commitments");
		let mut payload = Vec::with_capacity(commitments.0.len() * 32);
		for p in &commitments.0 {
			payload.extend_from_slice(&p.as_bytes());
		}
		let commit_msg = self.sign(MessageType::Commitments, 0, now_ms, payload);

		self.phase = Phase::AwaitCommitmentMatrix;
		vec![echo, commit_msg]
	}

	fn handle_commitment_matrix(&mut self, inbound: &[Message], now_ms: u64) -> Vec<Message> {
		let Some(matrix) = inbound.iter().find(|m| m.message_type == MessageType::CommitmentMatrix)
		else {
			return vec![];
		};

		self.commitments = parse_commitment_matrix(&matrix.payload);
		self.mark_transcript("commitments-echo");
		let echo = self.sign(
			MessageType::Echo,
			0,
			now_ms,
			Self::digest32(&[matrix.payload.as_slice()]).to_vec(),
		);

		let mut out = vec![echo];
		for j in 1..=self.config.n {
			if j == self.identity.index {
				continue;
			}
			let Some(remote_noise) = self.peer_noise.get(&j) else { continue };
			let Ok(mut ch) = Channel::new_initiator(&self.noise.private, remote_noise) else {
				continue;
			};
			if let Ok(msg_a) = ch.write_step() {
				out.push(self.sign(MessageType::HandshakeA, j, now_ms, msg_a));
				self.init_channels.insert(j, ch);
			}
		}

		self.phase = Phase::AwaitHandshakeA;
		out
	}

	fn handle_handshake_a(&mut self, inbound: &[Message], now_ms: u64) -> Vec<Message> {
		let incoming: Vec<&Message> =
			inbound.iter().filter(|m| m.message_type == MessageType::HandshakeA).collect();
		if incoming.is_empty() {
			return vec![];
		}

		let mut out = Vec::with_capacity(incoming.len());
		for m in incoming {
			let Ok(mut ch) = Channel::new_responder(&self.noise.private) else { continue };
			if ch.read_step(&m.payload).is_err() {
				continue;
			}
			if let Ok(msg_b) = ch.write_step() {
				out.push(self.sign(MessageType::HandshakeB, m.from, now_ms, msg_b));
				self.resp_channels.insert(m.from, ch);
			}
		}

		self.mark_transcript("relay-complete");
		self.phase = Phase::AwaitHandshakeB;
		out
	}

	fn handle_handshake_b(&mut self, inbound: &[Message], now_ms: u64) -> Vec<Message> {
		let incoming: Vec<&Message> =
			inbound.iter().filter(|m| m.message_type == MessageType::HandshakeB).collect();
		if incoming.is_empty() {
			return vec![];
		}

		let mut out = Vec::with_capacity(incoming.len());
		for m in incoming {
			let j = m.from;
			let Some(ch) = self.init_channels.get_mut(&j) else { continue };
			if ch.read_step(&m.payload).is_err() {
				continue;
			}
			let Ok(handshake_final) = ch.write_step() else { continue };
			let (aead_key, mac_key) = ch.derive_keys();

			let Some(share) = self.outgoing_shares.get(&j) else { continue };
			let share_bytes = share.to_wire(j);
			let aad = channel::pair_aad(&self.config.session_id, self.identity.index, j);
			let sealed = channel::seal_share(&aead_key, &mac_key, SHARE_NONCE, &share_bytes, &aad);

			let payload = channel::encode_share_delivery(&handshake_final, &sealed);
			out.push(self.sign(MessageType::ShareDelivery, j, now_ms, payload));
		}

		self.mark_transcript("relay-complete");
		self.phase = Phase::AwaitShareDelivery;
		out
	}

	fn handle_share_delivery(&mut self, inbound: &[Message], now_ms: u64) -> Vec<Message> {
		let incoming: Vec<&Message> =
			inbound.iter().filter(|m| m.message_type == MessageType::ShareDelivery).collect();
		if incoming.is_empty() {
			return vec![];
		}

		let self_idx = self.identity.index;
		let raise_complaint = |complaints: &mut BTreeSet<u8>, against: u8, reason: &str| {
			warn!(self_idx, against, reason, "raising complaint over share delivery");
			complaints.insert(against);
		};

		for m in incoming {
			let j = m.from;
			let Some((handshake_final, sealed)) = channel::decode_share_delivery(&m.payload) else {
				raise_complaint(&mut self.complaints, j, "malformed share-delivery payload");
				continue;
			};
			let Some(ch) = self.resp_channels.get_mut(&j) else {
				raise_complaint(&mut self.complaints, j, "no responder channel for sender");
				continue;
			};
			if ch.read_step(&handshake_final).is_err() {
				raise_complaint(&mut self.complaints, j, "handshake finalization failed");
				continue;
			}
			let (aead_key, mac_key) = ch.derive_keys();
			let aad = channel::pair_aad(&self.config.session_id, j, self.identity.index);

			let Ok(plaintext) = channel::open_share(&aead_key, &mac_key, &sealed, &aad) else {
				raise_complaint(&mut self.complaints, j, "aead/mac open failed");
				continue;
			};
			let Some((idx, share)) = Share::from_wire(&plaintext) else {
				raise_complaint(&mut self.complaints, j, "share did not decode");
				continue;
			};
			if idx != self.identity.index {
				raise_complaint(&mut self.complaints, j, "share addressed to wrong index");
				continue;
			}
			let Some(commitments) = self.commitments.get(&j) else {
				raise_complaint(&mut self.complaints, j, "no commitment vector for sender");
				continue;
			};
			if shamir::verify_share(&share, commitments, self.identity.index).is_err() {
				raise_complaint(&mut self.complaints, j, "share failed commitment verification");
				continue;
			}
			self.incoming_shares.insert(j, share);
		}

		self.mark_transcript("relay-complete");
		self.mark_transcript("share-delivery-echo");
		let complaint_payload: Vec<u8> = self.complaints.iter().copied().collect();
		let echo = self.sign(
			MessageType::Echo,
			0,
			now_ms,
			Self::digest32(&[complaint_payload.as_slice()]).to_vec(),
		);

		self.mark_transcript("complaints");
		let complaints_msg = self.sign(MessageType::Complaints, 0, now_ms, complaint_payload);

		self.phase = Phase::AwaitComplaintMatrix;
		vec![echo, complaints_msg]
	}

	fn handle_complaint_matrix(&mut self, inbound: &[Message], now_ms: u64) -> Vec<Message> {
		let Some(matrix) = inbound.iter().find(|m| m.message_type == MessageType::ComplaintMatrix)
		else {
			return vec![];
		};

		let complaint_map = parse_complaint_matrix(&matrix.payload);
		self.mark_transcript("complaints-echo");
		let echo1 = self.sign(
			MessageType::Echo,
			0,
			now_ms,
			Self::digest32(&[matrix.payload.as_slice()]).to_vec(),
		);

		let total_accusations: usize = complaint_map.values().map(|s| s.len()).sum();
		let mut out = vec![echo1];

		if total_accusations == 0 {
			self.mark_transcript("no-reveals-needed");
		} else {
			for (&accuser, accused_set) in &complaint_map {
				if !accused_set.contains(&self.identity.index) {
					continue;
				}
				let Some(ch) = self.init_channels.get(&accuser) else { continue };
				if !ch.is_finished() {
					continue;
				}
				let (aead_key, mac_key) = ch.derive_keys();
				let mut payload = Vec::with_capacity(66);
				payload.push(self.identity.index);
				payload.push(accuser);
				payload.extend_from_slice(&aead_key.to_bytes());
				payload.extend_from_slice(&mac_key.to_bytes());
				out.push(self.sign(MessageType::KeyReveal, accuser, now_ms, payload));
			}
			self.mark_transcript("relay-complete");
		}

		self.phase = Phase::AwaitRevealTable;
		out
	}

	/// Step 12: the TP's aggregated reveal table broadcast is this round's
	/// common trigger, so every peer — accused or not — sends its
	/// key-reveals-echo in the same round, distinct from step 10's
	/// complaints-echo.
	fn handle_reveal_table(&mut self, inbound: &[Message], now_ms: u64) -> Vec<Message> {
		let Some(table) = inbound.iter().find(|m| m.message_type == MessageType::RevealTable) else {
			return vec![];
		};

		self.mark_transcript("key-reveals-echo");
		let echo = self.sign(
			MessageType::Echo,
			0,
			now_ms,
			Self::digest32(&[table.payload.as_slice()]).to_vec(),
		);

		for _ in 0..5 {
			self.mark_transcript("reserved");
		}
		self.mark_transcript("adjudication");

		self.phase = Phase::AwaitTranscript;
		vec![echo]
	}

	fn handle_transcript(&mut self, inbound: &[Message], now_ms: u64) -> Vec<Message> {
		let Some(tp_transcript) = inbound.iter().find(|m| m.message_type == MessageType::Transcript)
		else {
			return vec![];
		};

		let own_hash = self.transcript_hash();
		self.transcript_mismatch = tp_transcript.payload != own_hash;

		let mut sum = crate::crypto::Scalar::zero();
		for (idx, share) in &self.incoming_shares {
			if !self.complaints.contains(idx) {
				sum = sum + share.0.clone();
			}
		}
		self.final_share = Some(Share(sum));

		let msg =
			self.sign(MessageType::PeerTranscript, 0, now_ms, own_hash.to_vec());

		self.phase = Phase::Done;
		vec![msg]
	}

	fn transcript_hash(&self) -> Vec<u8> {
		self.transcript.clone()
	}
}

fn parse_commitment_matrix(bytes: &[u8]) -> BTreeMap<u8, CoefficientCommitments> {
	let mut out = BTreeMap::new();
	let mut offset = 0usize;
	while offset + 2 <= bytes.len() {
		let idx = bytes[offset];
		let count = bytes[offset + 1] as usize;
		offset += 2;
		let mut points = Vec::with_capacity(count);
		for _ in 0..count {
			if offset + 32 > bytes.len() {
				return out;
			}
			let mut arr = [0u8; 32];
			arr.copy_from_slice(&bytes[offset..offset + 32]);
			offset += 32;
			match Point::from_canonical_bytes(&arr) {
				Some(p) => points.push(p),
				None => return out,
			}
		}
		out.insert(idx, CoefficientCommitments(points));
	}
	out
}

fn parse_complaint_matrix(bytes: &[u8]) -> BTreeMap<u8, BTreeSet<u8>> {
	let mut out = BTreeMap::new();
	let mut offset = 0usize;
	while offset + 2 <= bytes.len() {
		let idx = bytes[offset];
		let count = bytes[offset + 1] as usize;
		offset += 2;
		if offset + count > bytes.len() {
			return out;
		}
		out.insert(idx, bytes[offset..offset + count].iter().copied().collect());
		offset += count;
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn commitment_matrix_round_trips() {
		let mut commitments = BTreeMap::new();
		commitments.insert(
			1u8,
			CoefficientCommitments(vec![
				Point::from_scalar(&crate::crypto::Scalar::from(3u32)),
				Point::from_scalar(&crate::crypto::Scalar::from(7u32)),
			]),
		);

		let mut serialized = Vec::new();
		for (idx, comm) in &commitments {
			serialized.push(*idx);
			serialized.push(comm.0.len() as u8);
			for p in &comm.0 {
				serialized.extend_from_slice(&p.as_bytes());
			}
		}

		let parsed = parse_commitment_matrix(&serialized);
		assert_eq!(parsed, commitments);
	}

	#[test]
	fn complaint_matrix_round_trips() {
		let mut complaints: BTreeMap<u8, BTreeSet<u8>> = BTreeMap::new();
		complaints.insert(2u8, BTreeSet::from([4u8]));
		complaints.insert(3u8, BTreeSet::new());

		let mut serialized = Vec::new();
		for (idx, accused) in &complaints {
			serialized.push(*idx);
			serialized.push(accused.len() as u8);
			serialized.extend(accused.iter().copied());
		}

		let parsed = parse_complaint_matrix(&serialized);
		assert_eq!(parsed[&2], BTreeSet::from([4u8]));
		assert!(parsed[&3].is_empty());
	}
}
