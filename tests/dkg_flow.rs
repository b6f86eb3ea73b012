//! Multi-party protocol-flow tests driving the full `Tp` + `Peer` engines
//! together, one of each Testable Scenario the design calls out.

mod common;

use std::collections::BTreeSet;

use toprf_dkg::{
	channel,
	error::{CheaterCode, FramingError},
	lagrange,
	message::{Message, MessageType},
	shamir::Share,
	tp::TpStep,
	Point, Scalar,
};

use common::build_fixture;

/// S2: a clean `n = 5`, `t = 3` run. Every peer's final share, combined
/// with Lagrange weights over any reconstruction-sized (`t`) subset of
/// indices, reconstructs the same group public key; every peer's transcript
/// hash agrees with the TP's; no cheating is recorded.
#[test]
fn s2_happy_path_produces_consistent_shares_and_transcripts() {
	let mut fx = build_fixture(5, 3, 2);
	fx.drive_to_completion();

	assert_eq!(fx.tp.step(), TpStep::Done);
	assert!(fx.tp.ledger().is_empty(), "no cheating should be detected on the happy path");

	for peer in &fx.peers {
		assert!(!peer.transcript_mismatch(), "peer {} disagreed with the TP's transcript", peer.index());
		assert!(peer.final_share().is_some(), "peer {} never finalized a share", peer.index());
	}

	let group_pk: Point = fx.peers.iter().map(|p| p.own_commitments().constant_term()).sum();

	let reconstruct = |subset: &[u8]| -> Point {
		let indices: BTreeSet<u8> = subset.iter().copied().collect();
		let coeffs = lagrange::coefficients(&indices);
		let combined: Scalar = subset
			.iter()
			.map(|idx| {
				let share = fx.peers[(*idx - 1) as usize].final_share().unwrap();
				coeffs[idx].clone() * share.0.clone()
			})
			.sum();
		Point::from_scalar(&combined)
	};

	// Two different reconstruction-threshold (`t = 3`) subsets of the five
	// peers must both recover the same group secret.
	assert_eq!(reconstruct(&[1, 2, 3]), group_pk);
	assert_eq!(reconstruct(&[3, 4, 5]), group_pk);
}

/// S3: peer 4 sends peer 2 a corrupted share. Peer 2's local verification
/// fails and it complains; adjudication opens the disputed ciphertext and
/// finds the corrupted share really was inconsistent with peer 4's own
/// commitments, recording a proven cheat against peer 4 at step 18.
#[test]
fn s3_corrupted_share_is_caught_and_blamed_on_its_sender() {
	let mut fx = build_fixture(5, 3, 3);

	// Round 1: Config -> PeerHello. Round 2: PeerTable -> peers sample
	// their polynomials, populating their outgoing shares.
	fx.step_once();
	fx.step_once();

	fx.peers[3].corrupt_outgoing_share_to(2);

	fx.drive_to_completion();

	assert_eq!(fx.tp.step(), TpStep::Done);
	let entries = fx.tp.ledger().entries();
	assert!(
		entries.iter().any(|e| e.step == 18 && e.party == 4 && e.code == CheaterCode::ProvenCheat),
		"expected a proven-cheat record against peer 4 at adjudication, got {entries:?}"
	);
}

/// S4: peer 2 accuses honest peer 4 without any real verification failure.
/// Adjudication opens the (genuinely valid) share peer 4 sent and finds it
/// consistent with peer 4's commitments, recording a false complaint
/// against the accuser, peer 2, at step 18.
#[test]
fn s4_false_complaint_is_caught_and_blamed_on_its_accuser() {
	let mut fx = build_fixture(5, 3, 4);

	fx.peers[1].inject_false_complaint(4);

	fx.drive_to_completion();

	assert_eq!(fx.tp.step(), TpStep::Done);
	let entries = fx.tp.ledger().entries();
	assert!(
		entries.iter().any(|e| e.step == 18 && e.party == 2 && e.code == CheaterCode::FalseComplaint),
		"expected a false-complaint record against peer 2 at adjudication, got {entries:?}"
	);
}

/// S5: a message whose timestamp falls well outside the freshness window
/// is rejected at the framing layer, before it ever reaches the protocol
/// state machine, and leaves no trace: the ledger and step are untouched,
/// and the session still completes cleanly afterward.
#[test]
fn s5_stale_message_is_rejected_without_state_mutation() {
	let mut fx = build_fixture(5, 3, 5);
	fx.step_once();
	fx.step_once();

	let stale = Message::sign(
		&fx.peer_signing_key(1),
		MessageType::Echo,
		1,
		0,
		0, // far outside the freshness window relative to fx.now_ms
		fx.session_id,
		vec![],
	);

	let ledger_before = fx.tp.ledger().entries().len();
	let step_before = fx.tp.step();

	let result = fx.tp.deliver(stale, fx.now_ms);
	assert!(matches!(result, Err(FramingError::StaleTimestamp { .. })), "got {result:?}");
	assert_eq!(fx.tp.ledger().entries().len(), ledger_before);
	assert_eq!(fx.tp.step(), step_before);

	fx.drive_to_completion();
	assert_eq!(fx.tp.step(), TpStep::Done);
	assert!(fx.tp.ledger().is_empty());
}

/// S6: a 33-byte plaintext whose scalar half is not a canonical encoding
/// still authenticates under the AEAD/MAC (those operate on opaque bytes),
/// but is rejected at the share-decoding layer before it is ever treated
/// as a usable share — defense in depth past the channel's own guarantees.
#[test]
fn s6_non_canonical_scalar_survives_decryption_but_is_rejected_at_the_share_layer() {
	use toprf_dkg::crypto::aead::NONCE_SIZE;

	let responder_keys = channel::generate_keypair().unwrap();
	let mut initiator = channel::Channel::new_initiator(&[9u8; 32], &responder_keys.public).unwrap();
	let mut responder = channel::Channel::new_responder(&responder_keys.private).unwrap();

	let m1 = initiator.write_step().unwrap();
	responder.read_step(&m1).unwrap();
	let m2 = responder.write_step().unwrap();
	initiator.read_step(&m2).unwrap();
	let m3 = initiator.write_step().unwrap();
	responder.read_step(&m3).unwrap();

	let (initiator_aead, initiator_mac) = initiator.derive_keys();
	let (responder_aead, responder_mac) = responder.derive_keys();

	// 2^255 - 19 + 1: a 32-byte string that is a valid byte string but not
	// the canonical encoding of any scalar.
	let mut bad_share = [0u8; 33];
	bad_share[0] = 2;
	bad_share[1..32].fill(0xff);
	bad_share[32] = 0x7f;

	let aad = channel::pair_aad(&[0u8; 32], 1, 2);
	let nonce = [0u8; NONCE_SIZE];
	let sealed = channel::seal_share(&initiator_aead, &initiator_mac, nonce, &bad_share, &aad);
	let opened = channel::open_share(&responder_aead, &responder_mac, &sealed, &aad)
		.expect("a well-formed ciphertext opens regardless of what scalar it encodes");

	assert!(
		Share::from_wire(&opened).is_none(),
		"a non-canonical scalar must be rejected even after it authenticates"
	);
}
