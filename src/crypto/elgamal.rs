//! ElGamal encryption of embedded messages.
//!
//! `Encrypt` packs the message prefix into a curve point M and produces
//! `(K, C) = (k·G, k·P + M)` against the distributed public key P. The
//! unembedded tail of the message is returned to the caller.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};

use crate::errors::DkgError;
use crate::suite::EdwardsSuite;

/// A plain ElGamal ciphertext.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElGamalPair {
    pub k: EdwardsPoint,
    pub c: EdwardsPoint,
}

/// Encrypt as much of `message` as fits into one point.
///
/// Returns the ciphertext and the remainder of the message that did not
/// fit.
pub fn encrypt<R: RngCore + CryptoRng>(
    suite: &EdwardsSuite,
    public_key: &EdwardsPoint,
    message: &[u8],
    rng: &mut R,
) -> Result<(ElGamalPair, Vec<u8>), DkgError> {
    let (m, used) = suite.embed(message, rng)?;
    let remainder = message[used..].to_vec();

    let k = suite.random_scalar(rng);
    let pair = ElGamalPair {
        k: suite.base_mul(&k),
        c: public_key * k + m,
    };
    Ok((pair, remainder))
}

/// Decrypt with the full secret. Only reachable from tests and tooling;
/// the protocol recovers `k·P` through share interpolation instead.
pub fn decrypt(
    suite: &EdwardsSuite,
    secret: &Scalar,
    pair: &ElGamalPair,
) -> Result<Vec<u8>, DkgError> {
    let m = pair.c - pair.k * secret;
    suite.point_data(&m)
}
