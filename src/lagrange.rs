//! Lagrange coefficients "in the exponent" (component B), operating over
//! the wire's `u8` party indices (1..=255).

use std::collections::BTreeSet;

use crate::crypto::Scalar;

/// The Lagrange coefficient for party `index`, evaluated at x = 0, given
/// the full set of indices participating in the interpolation.
///
/// Panics only if `all_indices` contains a duplicate of `index` paired with
/// itself under subtraction to zero, which cannot happen for a `BTreeSet`
/// of distinct indices.
pub fn coefficient(index: u8, all_indices: &BTreeSet<u8>) -> Scalar {
	let mut num = Scalar::one();
	let mut den = Scalar::one();

	for &j in all_indices {
		if j == index {
			continue;
		}

		let j = Scalar::from(j as u32);
		let index_scalar = Scalar::from(index as u32);
		num = num * j.clone();
		den = den * (j - index_scalar);
	}

	num * den.invert().expect("all_indices are distinct, so no denominator term is zero")
}

/// Evaluate the full set of Lagrange coefficients for `all_indices` at once.
pub fn coefficients(all_indices: &BTreeSet<u8>) -> std::collections::BTreeMap<u8, Scalar> {
	all_indices.iter().map(|&i| (i, coefficient(i, all_indices))).collect()
}
