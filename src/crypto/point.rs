use curve25519_dalek::traits::Identity;
use serde::{Deserialize, Serialize};

use super::Scalar;

type PK = curve25519_dalek::ristretto::RistrettoPoint;

/// A point on the Ristretto255 group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point(PK);

impl Ord for Point {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.as_bytes().cmp(&other.as_bytes())
	}
}

impl PartialOrd for Point {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Point {
	pub fn get_element(&self) -> PK {
		self.0
	}

	pub fn from_scalar(scalar: &Scalar) -> Self {
		Point(curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT * scalar.0)
	}

	pub fn as_bytes(&self) -> [u8; 32] {
		self.0.compress().to_bytes()
	}

	pub fn point_at_infinity() -> Self {
		Point(PK::identity())
	}

	pub fn is_point_at_infinity(&self) -> bool {
		self == &Self::point_at_infinity()
	}

	/// Decode a compressed Ristretto point, rejecting non-canonical and
	/// non-group encodings.
	pub fn from_canonical_bytes(bytes: &[u8; 32]) -> Option<Self> {
		curve25519_dalek::ristretto::CompressedRistretto(*bytes).decompress().map(Point)
	}

	/// Hash an arbitrary byte string onto the curve using wide reduction
	/// (the same construction `curve25519-dalek` uses internally for
	/// `RistrettoPoint::from_uniform_bytes`).
	pub fn hash_to_point(domain_separator: &[u8], input: &[u8]) -> Self {
		use sha2::{Digest, Sha512};

		let mut hasher = Sha512::new();
		hasher.update(domain_separator);
		hasher.update(input);
		let mut wide = [0u8; 64];
		wide.copy_from_slice(&hasher.finalize());

		Point(PK::from_uniform_bytes(&wide))
	}
}

derive_point_impls!(Point);

impl std::ops::Add for Point {
	type Output = Self;

	fn add(self, rhs: Self) -> Self::Output {
		Point(self.0 + rhs.0)
	}
}

impl std::ops::Sub for Point {
	type Output = Self;

	fn sub(self, rhs: Self) -> Self::Output {
		Point(self.0 - rhs.0)
	}
}

impl<B: std::borrow::Borrow<Scalar>> std::ops::Mul<B> for Point {
	type Output = Self;

	fn mul(self, rhs: B) -> Self::Output {
		Point(self.0 * rhs.borrow().0)
	}
}

impl std::fmt::Display for Point {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", hex::encode(self.as_bytes()))
	}
}

#[test]
fn sanity_check_point_at_infinity() {
	assert_eq!(Point::point_at_infinity(), Point::from_scalar(&Scalar::zero()));
}

#[test]
fn non_canonical_point_is_rejected() {
	// All-0xff is not a valid compressed Ristretto encoding.
	assert!(Point::from_canonical_bytes(&[0xffu8; 32]).is_none());
}

#[test]
fn display_is_lowercase_hex_of_the_compressed_encoding() {
	let point = Point::from_scalar(&Scalar::one());
	assert_eq!(point.to_string(), hex::encode(point.as_bytes()));
}
