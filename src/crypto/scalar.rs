use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::Rng;

type SK = curve25519_dalek::scalar::Scalar;

/// A scalar modulo the order of the Ristretto255 group.
///
/// Wraps `curve25519_dalek`'s scalar type the way the rest of this crate
/// wraps the curve: operator overloads and zeroization are derived once via
/// [`derive_scalar_impls`], the underlying arithmetic is left to the dalek
/// crate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scalar(pub(super) SK);

impl Ord for Scalar {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.0.as_bytes().cmp(other.0.as_bytes())
	}
}

impl PartialOrd for Scalar {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Scalar {
	pub fn random(rng: &mut Rng) -> Self {
		use rand::RngCore;

		// Copy SK::random()'s implementation so we can use our own (injected) Rng
		// rather than depend on a thread-local one.
		let mut scalar_bytes = [0u8; 64];
		rng.fill_bytes(&mut scalar_bytes);
		Scalar(SK::from_bytes_mod_order_wide(&scalar_bytes))
	}

	/// Reduce an arbitrary 32-byte string modulo the group order. Used for
	/// deriving scalars from hash output, never for decoding wire scalars
	/// (those must go through [`Scalar::from_canonical_bytes`]).
	pub fn from_bytes_mod_order(x: &[u8; 32]) -> Self {
		Scalar(SK::from_bytes_mod_order(*x))
	}

	/// Reduce a 64-byte wide hash output modulo the group order.
	pub fn from_bytes_mod_order_wide(x: &[u8; 64]) -> Self {
		Scalar(SK::from_bytes_mod_order_wide(x))
	}

	/// Decode a scalar, rejecting any encoding that isn't the unique
	/// canonical representative of its residue class.
	pub fn from_canonical_bytes(bytes: &[u8; 32]) -> Option<Self> {
		Option::from(SK::from_canonical_bytes(*bytes)).map(Scalar)
	}

	pub fn zero() -> Self {
		Scalar(SK::ZERO)
	}

	pub fn one() -> Self {
		Scalar(SK::ONE)
	}

	pub fn invert(&self) -> Option<Self> {
		if self.0 != SK::ZERO {
			Some(Scalar(self.0.invert()))
		} else {
			None
		}
	}

	/// Same as [`Scalar::invert`], surfaced as the crate's error type for
	/// callers outside this module (component A: "inversion of zero fails
	/// with a domain error").
	pub fn try_invert(&self) -> Result<Self, crate::error::CryptoError> {
		self.invert().ok_or(crate::error::CryptoError::ZeroInversion)
	}

	pub fn to_bytes(&self) -> [u8; 32] {
		self.0.to_bytes()
	}

	pub fn as_bytes(&self) -> &[u8; 32] {
		self.0.as_bytes()
	}
}

impl From<u32> for Scalar {
	fn from(x: u32) -> Self {
		Scalar(SK::from(x))
	}
}

impl From<SK> for Scalar {
	fn from(sk: SK) -> Self {
		Scalar(sk)
	}
}

derive_scalar_impls!(Scalar);

impl Zeroize for Scalar {
	fn zeroize(&mut self) {
		self.0.zeroize();
	}
}

impl std::ops::Add for &Scalar {
	type Output = Scalar;

	fn add(self, rhs: Self) -> Self::Output {
		Scalar(self.0 + rhs.0)
	}
}

impl std::ops::Sub for &Scalar {
	type Output = Scalar;

	fn sub(self, rhs: Self) -> Self::Output {
		Scalar(self.0 - rhs.0)
	}
}

impl std::ops::Mul for &Scalar {
	type Output = Scalar;

	fn mul(self, rhs: Self) -> Self::Output {
		Scalar(self.0 * rhs.0)
	}
}
