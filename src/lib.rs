//! A (t,n)-threshold oblivious pseudo-random function and the
//! trusted-party-orchestrated distributed key generation that shares its
//! evaluation key among `n` peers.
//!
//! This crate exports two re-entrant, `next()`-driven state engines —
//! [`tp::Tp`] for the trusted party, [`peer::Peer`] for each participant —
//! plus the wire types and cryptographic primitives they are built from.
//! Networking, persistence and scheduling are left to the caller: a state
//! engine is handed exactly the batch of signed [`message::Message`]s
//! routed to it for the current step and returns whatever it wants sent
//! back out.

pub use crypto::{Point, Rng, Scalar};
pub use message::{Message, MessageType};
pub use peer::{Peer, PeerOutput};
pub use tp::{Tp, TpOutput, TpStep};

pub mod channel;
pub mod cheater;
pub mod config;
pub mod crypto;
pub mod error;
pub mod lagrange;
pub mod message;
pub mod oprf;
pub mod peer;
pub mod shamir;
pub mod tp;
mod util;
