//! Shamir secret sharing with Pedersen-style verifiable commitments
//! (component C).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
	crypto::{Point, Rng, Scalar},
	error::CryptoError,
};

/// Evaluate a polynomial (lowest-degree coefficient first) at `x`, using
/// Horner's method.
pub fn evaluate_polynomial(coefficients: &[Scalar], x: u8) -> Scalar {
	let x = Scalar::from(x as u32);
	coefficients
		.iter()
		.rev()
		.fold(Scalar::zero(), |acc, coeff| acc * x.clone() + coeff.clone())
}

/// Commitments to each coefficient of the sharing polynomial, published so
/// that a share can be checked against them without revealing the
/// polynomial itself (`c_k = g^{a_k}`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoefficientCommitments(pub Vec<Point>);

impl CoefficientCommitments {
	pub fn degree(&self) -> usize {
		self.0.len().saturating_sub(1)
	}

	/// Evaluate the commitment polynomial at `x` "in the exponent":
	/// `sum_k c_k * x^k`.
	pub fn evaluate(&self, x: u8) -> Point {
		let x = Scalar::from(x as u32);
		let mut acc = Point::point_at_infinity();
		for commitment in self.0.iter().rev() {
			acc = acc * &x + *commitment;
		}
		acc
	}

	pub fn constant_term(&self) -> Point {
		self.0[0]
	}
}

/// A single secret share of the DKG's constant term, held by the receiving
/// party. Kept as a thin newtype over `Scalar` so it inherits zeroization.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Share(pub Scalar);

impl Share {
	/// Wire encoding fixed by the external interface: 1-byte index ∥
	/// 32-byte scalar (33 bytes total).
	pub fn to_wire(&self, index: u8) -> [u8; 33] {
		let mut out = [0u8; 33];
		out[0] = index;
		out[1..33].copy_from_slice(&self.0.to_bytes());
		out
	}

	/// Decode a wire share, rejecting a non-canonical scalar encoding.
	pub fn from_wire(bytes: &[u8]) -> Option<(u8, Share)> {
		if bytes.len() != 33 {
			return None;
		}
		let mut scalar_bytes = [0u8; 32];
		scalar_bytes.copy_from_slice(&bytes[1..33]);
		let scalar = Scalar::from_canonical_bytes(&scalar_bytes)?;
		Some((bytes[0], Share(scalar)))
	}
}

/// Sample a random polynomial of the given degree with the given constant
/// term and return both its coefficient commitments and the evaluation at
/// every requested index. Per SPEC_FULL.md §4.C, a `(n, t)` threshold
/// scheme calls this with `degree = t - 1` (`t - 1` random coefficients
/// above the constant term), so that exactly `t` shares reconstruct it.
pub fn generate_secret_and_shares(
	secret: Scalar,
	degree: u8,
	indices: &[u8],
	rng: &mut Rng,
) -> (CoefficientCommitments, BTreeMap<u8, Share>) {
	let mut coefficients = Vec::with_capacity(degree as usize + 1);
	coefficients.push(secret);
	for _ in 0..degree {
		coefficients.push(Scalar::random(rng));
	}

	let commitments =
		CoefficientCommitments(coefficients.iter().map(Point::from_scalar).collect());

	let shares = indices
		.iter()
		.map(|&idx| (idx, Share(evaluate_polynomial(&coefficients, idx))))
		.collect();

	(commitments, shares)
}

/// Like [`generate_secret_and_shares`], but without committing to a
/// pre-chosen secret — used when a party only needs to sample shares of a
/// fresh random value (e.g. for the `oprf::base` demo client).
pub fn generate_shares(
	secret: &Scalar,
	degree: u8,
	indices: &[u8],
	rng: &mut Rng,
) -> BTreeMap<u8, Scalar> {
	let mut coefficients = Vec::with_capacity(degree as usize + 1);
	coefficients.push(secret.clone());
	for _ in 0..degree {
		coefficients.push(Scalar::random(rng));
	}

	indices.iter().map(|&idx| (idx, evaluate_polynomial(&coefficients, idx))).collect()
}

/// Check that a received share is consistent with the sender's published
/// commitments: `g^{share} == sum_k c_k * index^k`.
pub fn verify_share(
	share: &Share,
	commitments: &CoefficientCommitments,
	index: u8,
) -> Result<(), CryptoError> {
	if Point::from_scalar(&share.0) == commitments.evaluate(index) {
		Ok(())
	} else {
		Err(CryptoError::CommitmentMismatch(index))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;

	#[test]
	fn share_verifies_against_its_own_commitments() {
		let mut rng = Rng::from_seed([1u8; 32]);
		let secret = Scalar::from(99u32);
		let (commitments, shares) =
			generate_secret_and_shares(secret, 2, &[1, 2, 3, 4], &mut rng);

		for (idx, share) in &shares {
			assert!(verify_share(share, &commitments, *idx).is_ok());
		}
	}

	#[test]
	fn tampered_share_fails_verification() {
		let mut rng = Rng::from_seed([2u8; 32]);
		let secret = Scalar::from(7u32);
		let (commitments, mut shares) =
			generate_secret_and_shares(secret, 1, &[1, 2, 3], &mut rng);

		let share = shares.get_mut(&1).unwrap();
		share.0 = share.0.clone() + Scalar::one();

		assert!(verify_share(shares.get(&1).unwrap(), &commitments, 1).is_err());
	}

	#[test]
	fn share_wire_encoding_round_trips() {
		let share = Share(Scalar::from(42u32));
		let wire = share.to_wire(9);
		let (idx, decoded) = Share::from_wire(&wire).unwrap();
		assert_eq!(idx, 9);
		assert_eq!(decoded, share);
	}

	#[test]
	fn constant_term_matches_secret_commitment() {
		let mut rng = Rng::from_seed([3u8; 32]);
		let secret = Scalar::from(55u32);
		let (commitments, _shares) =
			generate_secret_and_shares(secret.clone(), 3, &[1, 2, 3, 4, 5], &mut rng);

		assert_eq!(commitments.constant_term(), Point::from_scalar(&secret));
	}
}
