//! The (t,n)-threshold OPRF combiner (component D): each of t servers folds
//! its own Lagrange coefficient into its share before exponentiating
//! (`Evaluate`), so the requester's combiner is plain point addition
//! (`thresholdcombine`) rather than a second Lagrange pass — shifting one
//! scalar multiplication from the client to each server, per SPEC_FULL.md
//! §4.D's rationale.

use std::collections::{BTreeMap, BTreeSet};

use crate::{crypto::Point, error::CryptoError, lagrange};

/// `Evaluate(k_i, alpha, self = index, indices)`: fold this server's
/// Lagrange coefficient into its own key share before exponentiating,
/// `k_i' = k_i * lambda_i(indices)`, `beta_i = alpha^{k_i'}`. The result is
/// tagged by `index` by the caller (typically as the key of a `BTreeMap`
/// handed to [`threshold_combine`]).
pub fn evaluate(
	key_share: &crate::crypto::Scalar,
	blinded_input: &Point,
	index: u8,
	indices: &BTreeSet<u8>,
) -> Point {
	let lambda_i = lagrange::coefficient(index, indices);
	let folded_share = key_share.clone() * lambda_i;
	*blinded_input * &folded_share
}

/// `thresholdcombine({beta_i})`: plain point addition over partials already
/// pre-multiplied by [`evaluate`]. Equals `alpha^k` without either side ever
/// forming `k`.
pub fn threshold_combine(partial_evaluations: &BTreeMap<u8, Point>) -> Point {
	partial_evaluations.values().copied().fold(Point::point_at_infinity(), |acc, beta| acc + beta)
}

/// The non-pre-multiplied combiner variant: given each server's raw
/// contribution `gamma_i` (not yet folded with its own Lagrange weight, the
/// way [`evaluate`]'s output is), compute `sum_i gamma_i^{lambda_i}`
/// directly. Fails if any individual weighted term lands on the group
/// identity — a server contributing the identity (or an index set whose
/// Lagrange weight vanishes a nonzero contribution, which cannot happen for
/// distinct nonzero indices but is checked regardless) can never be a valid
/// threshold result.
pub fn thresholdmult(contributions: &BTreeMap<u8, Point>) -> Result<Point, CryptoError> {
	let indices: BTreeSet<u8> = contributions.keys().copied().collect();
	let coeffs = lagrange::coefficients(&indices);

	let mut acc = Point::point_at_infinity();
	for (idx, gamma) in contributions {
		let term = *gamma * &coeffs[idx];
		if term.is_point_at_infinity() {
			return Err(CryptoError::UnexpectedIdentity);
		}
		acc = acc + term;
	}
	Ok(acc)
}

/// Base two-hash OPRF primitives (`Blind`/`Evaluate`/`Unblind`/`Finalize`).
///
/// The design leaves these as external collaborators — a caller may swap in
/// any compatible hash-to-group construction. This submodule exists only so
/// the threshold combiner above has a runnable end-to-end demo client and a
/// concrete vehicle for the cross-subset consistency and homomorphism
/// properties; it carries no protocol state of its own.
pub mod base {
	use rand::RngCore;

	use crate::crypto::{Point, Rng, Scalar};

	const FINALIZE_DOMAIN: &[u8] = b"toprf-dkg/oprf/finalize";

	/// `Blind(x) -> (r, H1(x)^r)`. The blinding factor `r` must be kept
	/// secret by the requester and destroyed after `unblind`.
	pub fn blind(domain_separator: &[u8], input: &[u8], rng: &mut Rng) -> (Scalar, Point) {
		let r = Scalar::random(rng);
		let h1 = Point::hash_to_point(domain_separator, input);
		(r.clone(), h1 * &r)
	}

	/// `Evaluate(k, blinded) -> blinded^k`. In the threshold setting this is
	/// replaced by [`super::evaluate`]/[`super::threshold_combine`]; this
	/// single-key form is kept only for local (non-threshold) testing.
	pub fn evaluate(key: &Scalar, blinded_input: &Point) -> Point {
		*blinded_input * key
	}

	/// `Unblind(r, evaluated) -> evaluated^{1/r} = H1(x)^k`.
	pub fn unblind(blinding_factor: &Scalar, evaluated: &Point) -> Point {
		let inverse =
			blinding_factor.invert().expect("blind() never samples a zero scalar in practice");
		*evaluated * &inverse
	}

	/// `Finalize(x, H1(x)^k) -> output`, a domain-separated hash of the
	/// input and the unblinded point.
	pub fn finalize(input: &[u8], unblinded: &Point) -> [u8; 64] {
		use sha2::{Digest, Sha512};

		let mut hasher = Sha512::new();
		hasher.update(FINALIZE_DOMAIN);
		hasher.update(input);
		hasher.update(unblinded.as_bytes());

		let mut out = [0u8; 64];
		out.copy_from_slice(&hasher.finalize());
		out
	}

	/// Sample a 32-byte key uniformly at random; used by local tests that
	/// don't drive the full DKG.
	pub fn random_key(rng: &mut Rng) -> Scalar {
		let mut bytes = [0u8; 32];
		rng.fill_bytes(&mut bytes);
		Scalar::from_bytes_mod_order(&bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		crypto::{Rng, Scalar},
		shamir,
	};
	use rand::SeedableRng;

	const DST: &[u8] = b"toprf-dkg/test";

	/// Testable Property: combining any two distinct t-of-n subsets of
	/// partial evaluations over the same blinded input yields the same
	/// combined point.
	#[test]
	fn combine_is_consistent_across_disjoint_subsets() {
		let mut rng = Rng::from_seed([4u8; 32]);
		let key = base::random_key(&mut rng);
		let degree = 2u8; // t = 3 (degree t - 1 = 2), so 3 servers needed out of 5
		let indices = [1u8, 2, 3, 4, 5];
		let (_commitments, shares) =
			shamir::generate_secret_and_shares(key, degree, &indices, &mut rng);

		let (_r, blinded) = base::blind(DST, b"query-input", &mut rng);

		let evaluate_subset = |subset: &[u8]| {
			let index_set: BTreeSet<u8> = subset.iter().copied().collect();
			let partials: BTreeMap<u8, Point> = subset
				.iter()
				.map(|idx| (*idx, evaluate(&shares[idx].0, &blinded, *idx, &index_set)))
				.collect();
			threshold_combine(&partials)
		};

		let a = evaluate_subset(&[1, 2, 3]);
		let b = evaluate_subset(&[3, 4, 5]);

		assert_eq!(a, b);
	}

	#[test]
	fn combine_matches_single_key_evaluation() {
		let mut rng = Rng::from_seed([5u8; 32]);
		let key = base::random_key(&mut rng);
		let indices = [1u8, 2, 3];
		let (_commitments, shares) =
			shamir::generate_secret_and_shares(key.clone(), 1, &indices, &mut rng);

		let (r, blinded) = base::blind(DST, b"input", &mut rng);

		let index_set: BTreeSet<u8> = indices.iter().copied().collect();
		let partials: BTreeMap<u8, Point> = indices
			.iter()
			.map(|idx| (*idx, evaluate(&shares[idx].0, &blinded, *idx, &index_set)))
			.collect();
		let combined = threshold_combine(&partials);
		let unblinded = base::unblind(&r, &combined);

		let direct_h1 = Point::hash_to_point(DST, b"input") * &key;

		assert_eq!(unblinded, direct_h1);
	}

	#[test]
	fn homomorphic_evaluate_of_blind_distributes_over_the_key() {
		let mut rng = Rng::from_seed([6u8; 32]);
		let key = base::random_key(&mut rng);
		let (r, blinded) = base::blind(DST, b"input", &mut rng);
		let evaluated = base::evaluate(&key, &blinded);
		let unblinded = base::unblind(&r, &evaluated);

		assert_eq!(unblinded, Point::hash_to_point(DST, b"input") * &key);
	}

	#[test]
	fn end_to_end_finalize_is_deterministic() {
		let mut rng = Rng::from_seed([7u8; 32]);
		let key = base::random_key(&mut rng);

		let run = || {
			let mut rng = Rng::from_seed([8u8; 32]);
			let (r, blinded) = base::blind(DST, b"input", &mut rng);
			let evaluated = base::evaluate(&key, &blinded);
			let unblinded = base::unblind(&r, &evaluated);
			base::finalize(b"input", &unblinded)
		};

		assert_eq!(run(), run());
	}

	/// `thresholdmult` over raw (non-pre-multiplied) contributions must
	/// agree with `threshold_combine` over the same contributions after
	/// `evaluate` pre-multiplies each by its own Lagrange weight.
	#[test]
	fn thresholdmult_matches_pre_multiplied_combine() {
		let mut rng = Rng::from_seed([11u8; 32]);
		let key = base::random_key(&mut rng);
		let degree = 2u8;
		let indices = [1u8, 2, 3, 4, 5];
		let (_commitments, shares) =
			shamir::generate_secret_and_shares(key, degree, &indices, &mut rng);

		let (_r, blinded) = base::blind(DST, b"query-input", &mut rng);

		let subset = [1u8, 2, 3];
		let index_set: BTreeSet<u8> = subset.iter().copied().collect();
		let pre_multiplied: BTreeMap<u8, Point> = subset
			.iter()
			.map(|idx| (*idx, evaluate(&shares[idx].0, &blinded, *idx, &index_set)))
			.collect();
		let raw: BTreeMap<u8, Point> =
			subset.iter().map(|idx| (*idx, blinded * &shares[idx].0)).collect();

		assert_eq!(threshold_combine(&pre_multiplied), thresholdmult(&raw).unwrap());
	}

	#[test]
	fn thresholdmult_rejects_an_identity_contribution() {
		let mut contributions = BTreeMap::new();
		contributions.insert(1u8, Point::point_at_infinity());
		contributions.insert(2u8, Point::from_scalar(&Scalar::from(7u32)));

		assert!(matches!(thresholdmult(&contributions), Err(CryptoError::UnexpectedIdentity)));
	}

	#[test]
	fn lagrange_sum_to_one_property_holds_for_arbitrary_subset() {
		let indices: BTreeSet<u8> = [2u8, 5, 9, 20].into_iter().collect();
		let coeffs = lagrange::coefficients(&indices);
		let sum: Scalar = coeffs.values().cloned().sum();
		assert_eq!(sum, Scalar::one());
	}
}
