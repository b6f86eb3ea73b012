//! Signed-message framing (component E): a fixed 111-byte header —
//! 64-byte signature, 1-byte type, 4-byte big-endian payload length,
//! 1-byte sender, 1-byte recipient, 8-byte timestamp, 32-byte session id —
//! followed by the payload. Header fields are hand-packed rather than run
//! through `bincode`, per the Design Note that the wire header's layout is
//! fixed and must not depend on a serialization crate's internal framing.

use ed25519_consensus::VerificationKey;

use crate::{crypto::signature, error::FramingError};

pub const HEADER_LEN: usize = 111;
pub const SIGNATURE_LEN: usize = 64;
pub const SESSION_ID_LEN: usize = 32;

/// Domain-separation tag folded into every signature, per SPEC_FULL.md §3/
/// §4.E, so a signature produced for this framing can never be replayed as
/// valid under some other signed-message scheme that happens to share the
/// same signing key.
pub const SIGNATURE_DST: &[u8] = b"toprf-dkg/message/v1";

/// Recipient code for the trusted party, per SPEC_FULL.md §6.
pub const TP_RECIPIENT: u8 = 0;
/// Recipient code marking a message as addressed to every peer at once,
/// per SPEC_FULL.md §6. Distinct from `TP_RECIPIENT` so a message one peer
/// legitimately addresses to the TP alone can never be mistaken by another
/// peer for a broadcast meant for it too.
pub const BROADCAST: u8 = 0xff;

/// The wire `type` tag. Each variant corresponds to one step's payload
/// shape; see the step table in `tp`/`peer` for which types are expected
/// at which step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
	Config = 0,
	PeerHello = 1,
	PeerTable = 2,
	Echo = 3,
	Commitments = 4,
	CommitmentMatrix = 5,
	HandshakeA = 6,
	HandshakeB = 7,
	ShareDelivery = 8,
	Complaints = 9,
	ComplaintMatrix = 10,
	KeyReveal = 11,
	RevealTable = 12,
	Transcript = 13,
	PeerTranscript = 14,
}

/// Types a peer ever legitimately sends directly to the trusted party.
/// `HandshakeA`/`HandshakeB`/`ShareDelivery`/`KeyReveal` also appear here
/// even though the TP only ever relays them onward, never originates
/// them — they reach `Tp::deliver` first, straight from the sending peer.
pub const TP_INBOUND_TYPES: &[MessageType] = &[
	MessageType::PeerHello,
	MessageType::Echo,
	MessageType::Commitments,
	MessageType::HandshakeA,
	MessageType::HandshakeB,
	MessageType::ShareDelivery,
	MessageType::Complaints,
	MessageType::KeyReveal,
	MessageType::PeerTranscript,
];

/// Types a peer ever legitimately receives, whether broadcast directly by
/// the trusted party or relayed by it on a peer's behalf (every message a
/// peer sees is signed by the TP's session key either way, per the module
/// doc comment on `peer`).
pub const PEER_INBOUND_TYPES: &[MessageType] = &[
	MessageType::Config,
	MessageType::PeerTable,
	MessageType::CommitmentMatrix,
	MessageType::HandshakeA,
	MessageType::HandshakeB,
	MessageType::ShareDelivery,
	MessageType::ComplaintMatrix,
	MessageType::KeyReveal,
	MessageType::RevealTable,
	MessageType::Transcript,
];

impl MessageType {
	pub fn from_u8(b: u8) -> Result<Self, FramingError> {
		use MessageType::*;
		Ok(match b {
			0 => Config,
			1 => PeerHello,
			2 => PeerTable,
			3 => Echo,
			4 => Commitments,
			5 => CommitmentMatrix,
			6 => HandshakeA,
			7 => HandshakeB,
			8 => ShareDelivery,
			9 => Complaints,
			10 => ComplaintMatrix,
			11 => KeyReveal,
			12 => RevealTable,
			13 => Transcript,
			14 => PeerTranscript,
			other => return Err(FramingError::UnknownType(other)),
		})
	}
}

/// The 111-byte header plus payload, exactly as it travels over the wire.
#[derive(Clone, Debug)]
pub struct Message {
	pub signature: [u8; SIGNATURE_LEN],
	pub message_type: MessageType,
	pub from: u8,
	pub to: u8,
	pub timestamp: u64,
	pub session_id: [u8; SESSION_ID_LEN],
	pub payload: Vec<u8>,
}

impl Message {
	/// Build and sign a message. `to = 0` is reserved for broadcast.
	pub fn sign(
		key: &ed25519_consensus::SigningKey,
		message_type: MessageType,
		from: u8,
		to: u8,
		timestamp: u64,
		session_id: [u8; SESSION_ID_LEN],
		payload: Vec<u8>,
	) -> Self {
		let mut msg = Message {
			signature: [0u8; SIGNATURE_LEN],
			message_type,
			from,
			to,
			timestamp,
			session_id,
			payload,
		};
		let signed_bytes = msg.signed_portion();
		msg.signature = signature::sign(key, &signed_bytes);
		msg
	}

	/// Everything the signature covers: every header field except the
	/// signature itself, followed by the payload and the fixed
	/// domain-separation tag. `length` is the whole message's length on the
	/// wire (header plus payload), not just the payload's, matching what
	/// [`Message::parse`] checks it against.
	fn signed_portion(&self) -> Vec<u8> {
		let mut buf =
			Vec::with_capacity(HEADER_LEN - SIGNATURE_LEN + self.payload.len() + SIGNATURE_DST.len());
		buf.push(self.message_type as u8);
		buf.extend_from_slice(&((HEADER_LEN + self.payload.len()) as u32).to_be_bytes());
		buf.push(self.from);
		buf.push(self.to);
		buf.extend_from_slice(&self.timestamp.to_be_bytes());
		buf.extend_from_slice(&self.session_id);
		buf.extend_from_slice(&self.payload);
		buf.extend_from_slice(SIGNATURE_DST);
		buf
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
		buf.extend_from_slice(&self.signature);
		buf.extend_from_slice(&self.signed_portion());
		buf
	}

	pub fn parse(bytes: &[u8]) -> Result<Self, FramingError> {
		if bytes.len() < HEADER_LEN {
			return Err(FramingError::TooShort);
		}

		let mut signature = [0u8; SIGNATURE_LEN];
		signature.copy_from_slice(&bytes[0..64]);
		let message_type = MessageType::from_u8(bytes[64])?;
		let declared_len = u32::from_be_bytes(bytes[65..69].try_into().unwrap());
		let from = bytes[69];
		let to = bytes[70];
		let timestamp = u64::from_be_bytes(bytes[71..79].try_into().unwrap());
		let mut session_id = [0u8; SESSION_ID_LEN];
		session_id.copy_from_slice(&bytes[79..111]);
		let payload = bytes[111..].to_vec();

		let actual = bytes.len() as u32;
		if declared_len != actual {
			return Err(FramingError::LengthMismatch { declared: declared_len, actual });
		}

		Ok(Message { signature, message_type, from, to, timestamp, session_id, payload })
	}

	/// The six ordered checks: length (folded into [`Message::parse`]),
	/// type, sender, recipient, freshness, signature.
	///
	/// `expected_types` is the set of message types that can ever
	/// legitimately reach this recipient (see [`TP_INBOUND_TYPES`] and
	/// [`PEER_INBOUND_TYPES`]) — a message tagged with a recognized but
	/// wrong-for-this-recipient type (e.g. a peer forging a TP-only
	/// broadcast type) is rejected here rather than silently absorbed.
	///
	/// `this_party` is `None` for the trusted party: every message in the
	/// system passes through the TP first, including peer-to-peer traffic
	/// addressed (via `to`) to some other peer for the TP to relay, so the
	/// TP accepts any recipient. A peer, which only ever sees messages the
	/// TP has already routed to it, passes `Some(its own index)` and
	/// requires `to` to be either that index or the broadcast value `0`.
	pub fn validate(
		&self,
		expected_session_id: &[u8; SESSION_ID_LEN],
		this_party: Option<u8>,
		expected_types: &[MessageType],
		sender_key: Option<&VerificationKey>,
		now: u64,
		epsilon: u64,
		last_seen_from_sender: Option<u64>,
	) -> Result<(), FramingError> {
		if !expected_types.contains(&self.message_type) {
			return Err(FramingError::UnexpectedMessageType { got: self.message_type });
		}

		let Some(sender_key) = sender_key else {
			return Err(FramingError::UnknownSender { claimed: self.from });
		};

		if let Some(this_party) = this_party {
			if self.to != BROADCAST && self.to != this_party {
				return Err(FramingError::WrongRecipient { to: self.to, expected: this_party });
			}
		}

		if &self.session_id != expected_session_id {
			return Err(FramingError::WrongSession);
		}

		if self.timestamp.abs_diff(now) > epsilon {
			return Err(FramingError::StaleTimestamp { ts: self.timestamp, now, epsilon });
		}

		// Per SPEC_FULL.md S4.E, timestamps must be non-decreasing per sender,
		// not strictly increasing: a sender legitimately emits more than one
		// message in the same protocol round (e.g. an echo and a commitment
		// broadcast together), all stamped with that round's clock reading.
		if let Some(last) = last_seen_from_sender {
			if self.timestamp < last {
				return Err(FramingError::NonMonotonicTimestamp {
					ts: self.timestamp,
					last,
					from: self.from,
				});
			}
		}

		signature::verify(sender_key, &self.signed_portion(), &self.signature)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ed25519_consensus::SigningKey;

	fn test_key(seed: u8) -> SigningKey {
		SigningKey::from(rand_seed(seed))
	}

	fn rand_seed(seed: u8) -> [u8; 32] {
		[seed; 32]
	}

	#[test]
	fn round_trips_through_bytes() {
		let key = test_key(1);
		let msg = Message::sign(
			&key,
			MessageType::Commitments,
			1,
			0,
			1000,
			[9u8; SESSION_ID_LEN],
			b"payload".to_vec(),
		);

		let bytes = msg.to_bytes();
		let parsed = Message::parse(&bytes).unwrap();

		assert_eq!(parsed.from, 1);
		assert_eq!(parsed.to, 0);
		assert_eq!(parsed.timestamp, 1000);
		assert_eq!(parsed.payload, b"payload");
	}

	#[test]
	fn validates_a_well_formed_message() {
		let key = test_key(2);
		let verifying = key.verification_key();
		let msg = Message::sign(
			&key,
			MessageType::Echo,
			3,
			5,
			1000,
			[1u8; SESSION_ID_LEN],
			vec![],
		);

		assert!(msg
			.validate(&[1u8; SESSION_ID_LEN], Some(5), &[MessageType::Echo], Some(&verifying), 1000, 5, None)
			.is_ok());
	}

	#[test]
	fn rejects_stale_timestamp() {
		let key = test_key(3);
		let verifying = key.verification_key();
		let msg =
			Message::sign(&key, MessageType::Echo, 1, 0, 1000, [0u8; SESSION_ID_LEN], vec![]);

		let err = msg.validate(&[0u8; SESSION_ID_LEN], Some(0), &[MessageType::Echo], Some(&verifying), 2000, 5, None);
		assert!(matches!(err, Err(FramingError::StaleTimestamp { .. })));
	}

	#[test]
	fn rejects_timestamp_regression() {
		let key = test_key(4);
		let verifying = key.verification_key();
		let msg =
			Message::sign(&key, MessageType::Echo, 1, 0, 999, [0u8; SESSION_ID_LEN], vec![]);

		let err = msg.validate(&[0u8; SESSION_ID_LEN], Some(0), &[MessageType::Echo], Some(&verifying), 999, 5, Some(1000));
		assert!(matches!(err, Err(FramingError::NonMonotonicTimestamp { .. })));
	}

	#[test]
	fn accepts_equal_timestamp_from_same_sender() {
		// A sender may legitimately emit more than one message in the same
		// protocol round, all stamped with that round's clock reading.
		let key = test_key(6);
		let verifying = key.verification_key();
		let msg =
			Message::sign(&key, MessageType::Echo, 1, 0, 1000, [0u8; SESSION_ID_LEN], vec![]);

		assert!(msg
			.validate(&[0u8; SESSION_ID_LEN], Some(0), &[MessageType::Echo], Some(&verifying), 1000, 5, Some(1000))
			.is_ok());
	}

	#[test]
	fn rejects_tampered_payload() {
		let key = test_key(5);
		let verifying = key.verification_key();
		let mut msg =
			Message::sign(&key, MessageType::Echo, 1, 0, 1000, [0u8; SESSION_ID_LEN], b"x".to_vec());
		msg.payload = b"y".to_vec();

		let err = msg.validate(&[0u8; SESSION_ID_LEN], Some(0), &[MessageType::Echo], Some(&verifying), 1000, 5, None);
		assert!(matches!(err, Err(FramingError::BadSignature)));
	}

	#[test]
	fn parse_rejects_truncated_bytes() {
		let bytes = vec![0u8; HEADER_LEN - 1];
		assert!(matches!(Message::parse(&bytes), Err(FramingError::TooShort)));
	}
}
