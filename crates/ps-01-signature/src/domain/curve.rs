//! # Curve Helpers
//!
//! Hashing, point encoding and the half-order rule shared by the single-signer
//! and multi-party schemes.

use k256::elliptic_curve::ops::Reduce;
use k256::elliptic_curve::point::AffineCoordinates;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{FieldBytes, ProjectivePoint, PublicKey, Scalar, U256};
use sha3::{Digest, Keccak256};
use shared_types::{Address, Hash, PartyKey, COMPRESSED_KEY_LEN};
use subtle::Choice;

use super::errors::SignatureError;

/// `(n >> 1) + 1` for the secp256k1 group order n.
///
/// Single-signer public keys must have an x-coordinate strictly below this.
pub const HALF_ORDER_PLUS_ONE: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA1,
];

/// Keccak-256 of `data`.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Keccak-256 of `data` reduced modulo the group order.
pub fn hash_to_scalar(data: &[u8]) -> Scalar {
    let hash = keccak256(data);
    <Scalar as Reduce<U256>>::reduce_bytes(FieldBytes::from_slice(&hash))
}

/// Ethereum address of a point: last 20 bytes of keccak(uncompressed X ‖ Y).
///
/// Returns `None` for the identity, which has no affine coordinates.
pub fn address_from_point(point: &ProjectivePoint) -> Option<Address> {
    if *point == ProjectivePoint::IDENTITY {
        return None;
    }
    let encoded = point.to_affine().to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Some(address)
}

/// Compressed SEC1 encoding of a non-identity point.
pub fn encode_point(point: &ProjectivePoint) -> Result<PartyKey, SignatureError> {
    let encoded = point.to_affine().to_encoded_point(true);
    let bytes: [u8; COMPRESSED_KEY_LEN] = encoded
        .as_bytes()
        .try_into()
        .map_err(|_| SignatureError::DegenerateAggregate)?;
    Ok(PartyKey::new(bytes))
}

/// Decode a compressed key into a curve point, rejecting the identity and
/// anything off the curve.
pub fn decode_point(key: &PartyKey) -> Result<ProjectivePoint, SignatureError> {
    PublicKey::from_sec1_bytes(key.as_bytes())
        .map(|pk| pk.to_projective())
        .map_err(|_| SignatureError::InvalidEncoding(key.to_string()))
}

/// Big-endian x-coordinate and y-parity (0 even, 1 odd).
pub fn x_and_parity(point: &ProjectivePoint) -> ([u8; 32], u8) {
    let affine = point.to_affine();
    let mut x = [0u8; 32];
    x.copy_from_slice(&affine.x());
    (x, affine.y_is_odd().unwrap_u8())
}

/// Whether `x < (n/2)+1`.
///
/// ## Security: Constant-Time Implementation
///
/// The comparison walks every byte regardless of where the first difference
/// sits, so timing does not reveal the key's x-coordinate.
pub fn is_below_half_order(x: &[u8; 32]) -> bool {
    let mut less = Choice::from(0u8);
    let mut greater = Choice::from(0u8);

    for (x_byte, h_byte) in x.iter().zip(HALF_ORDER_PLUS_ONE.iter()) {
        let not_decided = !(less | greater);
        let byte_less = Choice::from((x_byte < h_byte) as u8);
        let byte_greater = Choice::from((x_byte > h_byte) as u8);

        less |= not_decided & byte_less;
        greater |= not_decided & byte_greater;
    }

    less.into()
}

/// Scalar from canonical big-endian bytes; values at or above n are rejected.
pub fn scalar_from_bytes(bytes: &[u8; 32]) -> Result<Scalar, SignatureError> {
    use k256::elliptic_curve::PrimeField;

    Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(bytes)))
        .ok_or_else(|| SignatureError::InvalidEncoding(format!("0x{}", hex::encode(bytes))))
}

/// Big-endian bytes of a scalar.
pub fn scalar_to_bytes(scalar: &Scalar) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&scalar.to_bytes());
    out
}

/// `base^exp` by repeated multiplication; exponents are small nonce indices.
pub fn scalar_pow(base: &Scalar, exp: usize) -> Scalar {
    let mut acc = Scalar::ONE;
    for _ in 0..exp {
        acc *= base;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        // Well-known keccak256("") value
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_half_order_boundary() {
        let mut just_below = HALF_ORDER_PLUS_ONE;
        just_below[31] -= 1;
        assert!(is_below_half_order(&just_below));
        assert!(!is_below_half_order(&HALF_ORDER_PLUS_ONE));
        assert!(!is_below_half_order(&[0xFF; 32]));
        assert!(is_below_half_order(&[0u8; 32]));
    }

    #[test]
    fn test_generator_address() {
        // Address of the private key 1
        let address = address_from_point(&ProjectivePoint::GENERATOR).unwrap();
        assert_eq!(
            hex::encode(address),
            "7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
        assert!(address_from_point(&ProjectivePoint::IDENTITY).is_none());
    }

    #[test]
    fn test_point_encoding_round_trip() {
        let point = ProjectivePoint::GENERATOR * Scalar::from(7u64);
        let key = encode_point(&point).unwrap();
        assert_eq!(decode_point(&key).unwrap(), point);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let key = PartyKey::new([0x05; COMPRESSED_KEY_LEN]);
        assert!(matches!(
            decode_point(&key),
            Err(SignatureError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_scalar_pow() {
        let two = Scalar::from(2u64);
        assert_eq!(scalar_pow(&two, 0), Scalar::ONE);
        assert_eq!(scalar_pow(&two, 10), Scalar::from(1024u64));
    }

    #[test]
    fn test_scalar_from_bytes_rejects_order() {
        assert!(scalar_from_bytes(&[0xFF; 32]).is_err());
        let one = scalar_from_bytes(&{
            let mut b = [0u8; 32];
            b[31] = 1;
            b
        })
        .unwrap();
        assert_eq!(one, Scalar::ONE);
    }
}
