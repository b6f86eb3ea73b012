//! Scalar/point primitives over Ristretto255 (component A), plus the
//! hashing, signing, AEAD and MAC building blocks the rest of the crate is
//! layered on top of.

#[macro_use]
mod helpers;
mod point;
mod scalar;

pub mod aead;
pub mod hash;
pub mod mac;
pub mod signature;

pub use point::Point;
pub use scalar::Scalar;

/// The injected randomness capability. Concrete rather than a trait bound —
/// callers seed it explicitly rather than this crate ever reaching for a
/// thread-local RNG.
pub type Rng = rand::rngs::StdRng;

pub const POINT_SIZE: usize = 32;
pub const SCALAR_SIZE: usize = 32;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn serialization_is_consistent() {
		let scalar = Scalar::from_bytes_mod_order(&[
			22, 33, 188, 127, 243, 114, 222, 165, 177, 158, 212, 131, 122, 34, 112, 164, 230, 48,
			112, 90, 14, 78, 91, 42, 120, 206, 28, 215, 160, 190, 21, 0,
		]);
		let point = Point::from_scalar(&scalar);
		assert_eq!(
			point.as_bytes(),
			[
				46, 177, 159, 111, 170, 191, 255, 194, 205, 23, 199, 98, 188, 141, 12, 36, 188,
				225, 13, 218, 203, 150, 50, 216, 195, 73, 245, 243, 5, 221, 23, 118,
			]
		);
	}
}
