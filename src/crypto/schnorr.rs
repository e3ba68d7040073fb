//! Schnorr signatures over edwards25519.
//!
//! Deals and responses are authenticated with the participants' long-term
//! DKG identity keys. Those keys are raw scalars, so the classic scheme is
//! used directly: `R = r·G`, `s = r + H(R ‖ A ‖ m)·x`.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};

use crate::errors::DkgError;
use crate::suite::EdwardsSuite;

pub const SIGNATURE_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub r: EdwardsPoint,
    pub s: Scalar,
}

impl Signature {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIGNATURE_LEN);
        out.extend_from_slice(&self.r.compress().to_bytes());
        out.extend_from_slice(&self.s.to_bytes());
        out
    }

    pub fn from_bytes(suite: &EdwardsSuite, bytes: &[u8]) -> Result<Self, DkgError> {
        if bytes.len() != SIGNATURE_LEN {
            return Err(DkgError::Crypto(format!(
                "signature must be {SIGNATURE_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            r: suite.point_from_bytes(&bytes[..32])?,
            s: suite.scalar_from_bytes(&bytes[32..])?,
        })
    }
}

pub fn sign<R: RngCore + CryptoRng>(
    suite: &EdwardsSuite,
    secret: &Scalar,
    public: &EdwardsPoint,
    message: &[u8],
    rng: &mut R,
) -> Signature {
    let nonce = suite.random_scalar(rng);
    let r = suite.base_mul(&nonce);
    let challenge = challenge(suite, &r, public, message);
    Signature {
        r,
        s: nonce + challenge * secret,
    }
}

pub fn verify(
    suite: &EdwardsSuite,
    public: &EdwardsPoint,
    message: &[u8],
    signature: &Signature,
) -> bool {
    let challenge = challenge(suite, &signature.r, public, message);
    suite.base_mul(&signature.s) == signature.r + public * challenge
}

fn challenge(
    suite: &EdwardsSuite,
    r: &EdwardsPoint,
    public: &EdwardsPoint,
    message: &[u8],
) -> Scalar {
    suite.wide_challenge(&[
        &suite.point_to_bytes(r),
        &suite.point_to_bytes(public),
        message,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn sign_verify_round_trip() {
        let suite = EdwardsSuite;
        let (secret, public) = suite.keygen(&mut OsRng);

        let sig = sign(&suite, &secret, &public, b"deal payload", &mut OsRng);
        assert!(verify(&suite, &public, b"deal payload", &sig));
        assert!(!verify(&suite, &public, b"other payload", &sig));
    }

    #[test]
    fn wrong_key_rejects() {
        let suite = EdwardsSuite;
        let (secret, public) = suite.keygen(&mut OsRng);
        let (_, other_public) = suite.keygen(&mut OsRng);

        let sig = sign(&suite, &secret, &public, b"msg", &mut OsRng);
        assert!(!verify(&suite, &other_public, b"msg", &sig));
    }

    #[test]
    fn byte_encoding_round_trips() {
        let suite = EdwardsSuite;
        let (secret, public) = suite.keygen(&mut OsRng);

        let sig = sign(&suite, &secret, &public, b"msg", &mut OsRng);
        let decoded = Signature::from_bytes(&suite, &sig.to_bytes()).unwrap();
        assert_eq!(sig, decoded);
        assert!(verify(&suite, &public, b"msg", &decoded));
    }
}
