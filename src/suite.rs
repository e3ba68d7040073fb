//! The two cryptographic suites used by the service.
//!
//! Every component receives a [`CurveContext`] value instead of reaching for
//! module-level suite singletons. The Edwards suite carries the DKG, the
//! ElGamal layer and the verifiable-decryption proofs; the pairing suite
//! carries the BDN credential signatures.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use ff::Field;
use group::{Curve, Group};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256, Sha512};

use crate::errors::DkgError;

/// Width of the message prefix that fits into a single Edwards point.
///
/// One byte of the 32-byte compressed encoding holds the data length and
/// two further bytes' worth of entropy are left for the rejection sampling
/// to land on a decodable, torsion-free point.
pub const EMBED_LEN: usize = 29;

/// Both suites, constructed once and threaded through.
#[derive(Clone, Copy, Debug, Default)]
pub struct CurveContext {
    pub edwards: EdwardsSuite,
    pub pairing: PairingSuite,
}

impl CurveContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Prime-order operations on edwards25519.
#[derive(Clone, Copy, Debug, Default)]
pub struct EdwardsSuite;

impl EdwardsSuite {
    /// The group base point.
    pub fn generator(&self) -> EdwardsPoint {
        ED25519_BASEPOINT_POINT
    }

    pub fn random_scalar<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Scalar {
        Scalar::random(rng)
    }

    /// `s * G`.
    pub fn base_mul(&self, s: &Scalar) -> EdwardsPoint {
        EdwardsPoint::mul_base(s)
    }

    /// Generate a long-term identity key pair.
    pub fn keygen<R: RngCore + CryptoRng>(&self, rng: &mut R) -> (Scalar, EdwardsPoint) {
        let secret = self.random_scalar(rng);
        let public = self.base_mul(&secret);
        (secret, public)
    }

    /// Embed a message prefix into a curve point.
    ///
    /// Fills the compressed encoding with `[len, data.., random padding..]`
    /// and rejection-samples until the bytes decompress to a torsion-free
    /// point. Returns the point and the number of message bytes consumed;
    /// the caller keeps the remainder.
    pub fn embed<R: RngCore + CryptoRng>(
        &self,
        data: &[u8],
        rng: &mut R,
    ) -> Result<(EdwardsPoint, usize), DkgError> {
        let dl = data.len().min(EMBED_LEN);

        // The loop terminates quickly: about half of all candidate strings
        // decode to a point and one in eight of those is torsion free.
        for _ in 0..1024 {
            let mut buf = [0u8; 32];
            rng.fill_bytes(&mut buf);
            buf[0] = dl as u8;
            buf[1..1 + dl].copy_from_slice(&data[..dl]);

            if let Some(point) = CompressedEdwardsY(buf).decompress() {
                if point.is_torsion_free() && point.compress().0 == buf {
                    return Ok((point, dl));
                }
            }
        }

        Err(DkgError::Crypto(
            "embedding failed to find a valid point".into(),
        ))
    }

    /// Extract the message prefix embedded by [`EdwardsSuite::embed`].
    pub fn point_data(&self, point: &EdwardsPoint) -> Result<Vec<u8>, DkgError> {
        let buf = point.compress().to_bytes();
        let dl = buf[0] as usize;
        if dl > EMBED_LEN {
            return Err(DkgError::Crypto(format!(
                "invalid embedded data length: {dl}"
            )));
        }
        Ok(buf[1..1 + dl].to_vec())
    }

    /// Reduce a SHA-256 digest over `parts` into the scalar field.
    pub fn hash_to_scalar(&self, parts: &[&[u8]]) -> Scalar {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        let digest: [u8; 32] = hasher.finalize().into();
        Scalar::from_bytes_mod_order(digest)
    }

    /// Wide reduction used for signature challenges.
    pub fn wide_challenge(&self, parts: &[&[u8]]) -> Scalar {
        let mut hasher = Sha512::new();
        for part in parts {
            hasher.update(part);
        }
        let digest: [u8; 64] = hasher.finalize().into();
        Scalar::from_bytes_mod_order_wide(&digest)
    }

    pub fn identity(&self) -> EdwardsPoint {
        EdwardsPoint::identity()
    }

    pub fn point_to_bytes(&self, point: &EdwardsPoint) -> [u8; 32] {
        point.compress().to_bytes()
    }

    pub fn point_from_bytes(&self, bytes: &[u8]) -> Result<EdwardsPoint, DkgError> {
        let buf: [u8; 32] = bytes
            .try_into()
            .map_err(|_| DkgError::Crypto("point encoding must be 32 bytes".into()))?;
        CompressedEdwardsY(buf)
            .decompress()
            .ok_or_else(|| DkgError::Crypto("invalid point encoding".into()))
    }

    pub fn scalar_to_bytes(&self, scalar: &Scalar) -> [u8; 32] {
        scalar.to_bytes()
    }

    pub fn scalar_from_bytes(&self, bytes: &[u8]) -> Result<Scalar, DkgError> {
        let buf: [u8; 32] = bytes
            .try_into()
            .map_err(|_| DkgError::Crypto("scalar encoding must be 32 bytes".into()))?;
        Option::from(Scalar::from_canonical_bytes(buf))
            .ok_or_else(|| DkgError::Crypto("non-canonical scalar encoding".into()))
    }
}

/// BLS12-381 helpers for the BDN signature layer.
///
/// Signatures live in G1 (48-byte compressed), public keys in G2 (96-byte
/// compressed).
#[derive(Clone, Copy, Debug, Default)]
pub struct PairingSuite;

impl PairingSuite {
    pub fn random_scalar<R: RngCore + CryptoRng>(&self, rng: &mut R) -> blstrs::Scalar {
        blstrs::Scalar::random(rng)
    }

    pub fn g2_generator(&self) -> blstrs::G2Projective {
        blstrs::G2Projective::generator()
    }

    pub fn g1_to_bytes(&self, point: &blstrs::G1Projective) -> [u8; 48] {
        point.to_affine().to_compressed()
    }

    pub fn g1_from_bytes(&self, bytes: &[u8]) -> Result<blstrs::G1Projective, DkgError> {
        let buf: [u8; 48] = bytes
            .try_into()
            .map_err(|_| DkgError::Crypto("G1 encoding must be 48 bytes".into()))?;
        let affine: Option<blstrs::G1Affine> = blstrs::G1Affine::from_compressed(&buf).into();
        affine
            .map(blstrs::G1Projective::from)
            .ok_or_else(|| DkgError::Crypto("invalid G1 encoding".into()))
    }

    pub fn scalar_to_bytes(&self, scalar: &blstrs::Scalar) -> [u8; 32] {
        scalar.to_bytes_le()
    }

    pub fn scalar_from_bytes(&self, bytes: &[u8]) -> Result<blstrs::Scalar, DkgError> {
        let buf: [u8; 32] = bytes
            .try_into()
            .map_err(|_| DkgError::Crypto("BLS scalar encoding must be 32 bytes".into()))?;
        Option::from(blstrs::Scalar::from_bytes_le(&buf))
            .ok_or_else(|| DkgError::Crypto("non-canonical BLS scalar encoding".into()))
    }

    pub fn g2_to_bytes(&self, point: &blstrs::G2Projective) -> [u8; 96] {
        point.to_affine().to_compressed()
    }

    pub fn g2_from_bytes(&self, bytes: &[u8]) -> Result<blstrs::G2Projective, DkgError> {
        let buf: [u8; 96] = bytes
            .try_into()
            .map_err(|_| DkgError::Crypto("G2 encoding must be 96 bytes".into()))?;
        let affine: Option<blstrs::G2Affine> = blstrs::G2Affine::from_compressed(&buf).into();
        affine
            .map(blstrs::G2Projective::from)
            .ok_or_else(|| DkgError::Crypto("invalid G2 encoding".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn embed_round_trips() {
        let suite = EdwardsSuite;
        let message = b"29 bytes fit in one point!!!!";
        assert_eq!(message.len(), EMBED_LEN);

        let (point, used) = suite.embed(message, &mut OsRng).unwrap();
        assert_eq!(used, EMBED_LEN);
        assert_eq!(suite.point_data(&point).unwrap(), message);
    }

    #[test]
    fn embed_truncates_long_messages() {
        let suite = EdwardsSuite;
        let message = [0x42u8; 64];

        let (point, used) = suite.embed(&message, &mut OsRng).unwrap();
        assert_eq!(used, EMBED_LEN);
        assert_eq!(suite.point_data(&point).unwrap(), &message[..EMBED_LEN]);
    }

    #[test]
    fn embed_empty_message() {
        let suite = EdwardsSuite;
        let (point, used) = suite.embed(b"", &mut OsRng).unwrap();
        assert_eq!(used, 0);
        assert!(suite.point_data(&point).unwrap().is_empty());
    }

    #[test]
    fn embedded_points_are_torsion_free() {
        let suite = EdwardsSuite;
        let (point, _) = suite.embed(b"subgroup", &mut OsRng).unwrap();
        assert!(point.is_torsion_free());
    }

    #[test]
    fn point_encoding_round_trips() {
        let suite = EdwardsSuite;
        let point = suite.base_mul(&suite.random_scalar(&mut OsRng));
        let decoded = suite.point_from_bytes(&suite.point_to_bytes(&point)).unwrap();
        assert_eq!(point, decoded);
    }

    #[test]
    fn g2_encoding_round_trips() {
        let suite = PairingSuite;
        let point = suite.g2_generator() * suite.random_scalar(&mut OsRng);
        let decoded = suite.g2_from_bytes(&suite.g2_to_bytes(&point)).unwrap();
        assert_eq!(point, decoded);
    }

    #[test]
    fn hash_to_scalar_is_deterministic() {
        let suite = EdwardsSuite;
        let a = suite.hash_to_scalar(&[b"one", b"two"]);
        let b = suite.hash_to_scalar(&[b"one", b"two"]);
        let c = suite.hash_to_scalar(&[b"one", b"three"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
