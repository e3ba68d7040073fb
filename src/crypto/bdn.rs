//! BDN aggregate signatures over BLS12-381.
//!
//! Signatures live in G1, public keys in G2. Aggregation weighs every
//! component with an anti-rogue-key coefficient derived from the *full*
//! roster, never from the mask, so a participant cannot bias its own
//! coefficient by choosing its key after seeing the others.

use blstrs::{G1Projective, G2Projective};
use group::{Curve, Group};
use rand::{CryptoRng, RngCore};

use crate::constants::{BDN_COEFF_TAG, BDN_SIG_DST};
use crate::errors::DkgError;
use crate::suite::PairingSuite;

/// A node's BDN signing identity.
#[derive(Clone, Debug)]
pub struct BdnKeyPair {
    pub secret: blstrs::Scalar,
    pub public: G2Projective,
}

impl BdnKeyPair {
    pub fn generate<R: RngCore + CryptoRng>(suite: &PairingSuite, rng: &mut R) -> Self {
        let secret = suite.random_scalar(rng);
        let public = suite.g2_generator() * secret;
        Self { secret, public }
    }
}

/// Sign the exact message bytes.
pub fn sign(secret: &blstrs::Scalar, message: &[u8]) -> G1Projective {
    hash_to_point(message) * secret
}

/// Verify a single signature: `e(σ, G₂) = e(H(m), pk)`.
pub fn verify(
    public: &G2Projective,
    message: &[u8],
    signature: &G1Projective,
) -> Result<(), DkgError> {
    let g2 = G2Projective::generator().to_affine();
    let lhs = blstrs::pairing(&signature.to_affine(), &g2);
    let rhs = blstrs::pairing(&hash_to_point(message).to_affine(), &public.to_affine());
    if lhs != rhs {
        return Err(DkgError::CredentialInvalid("signature mismatch".into()));
    }
    Ok(())
}

/// Bit vector recording which roster members contributed to an aggregate.
/// Serialized big-endian, byte padded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    bits: Vec<bool>,
}

impl Mask {
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![false; len],
        }
    }

    /// A mask with every roster member enabled.
    pub fn all(len: usize) -> Self {
        Self {
            bits: vec![true; len],
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn enable(&mut self, index: usize) -> Result<(), DkgError> {
        let len = self.bits.len();
        let slot = self.bits.get_mut(index).ok_or_else(|| {
            DkgError::Config(format!("mask index {index} out of range for {len}"))
        })?;
        *slot = true;
        Ok(())
    }

    pub fn contains(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.bits.len().div_ceil(8)];
        for (i, bit) in self.bits.iter().enumerate() {
            if *bit {
                out[i / 8] |= 1 << (7 - (i % 8));
            }
        }
        out
    }

    pub fn from_bytes(len: usize, bytes: &[u8]) -> Result<Self, DkgError> {
        if bytes.len() != len.div_ceil(8) {
            return Err(DkgError::Config("mask byte length mismatch".into()));
        }
        let mut bits = vec![false; len];
        for (i, bit) in bits.iter_mut().enumerate() {
            *bit = bytes[i / 8] & (1 << (7 - (i % 8))) != 0;
        }
        Ok(Self { bits })
    }
}

/// Anti-rogue-key coefficients for the full roster.
///
/// `mix` commits to every public key in roster order; the per-index
/// coefficient is the first 128 bits of a second hash over `mix` and the
/// index.
pub fn coefficients(suite: &PairingSuite, roster: &[G2Projective]) -> Vec<blstrs::Scalar> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(BDN_COEFF_TAG);
    for public in roster {
        hasher.update(&suite.g2_to_bytes(public));
    }
    let mix = hasher.finalize();

    roster
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let mut hasher = blake3::Hasher::new();
            hasher.update(mix.as_bytes());
            hasher.update(&(i as u32).to_be_bytes());
            let digest = hasher.finalize();

            let mut raw = [0u8; 32];
            raw[..16].copy_from_slice(&digest.as_bytes()[..16]);
            // 128-bit values are always canonical in the BLS12-381 scalar field.
            blstrs::Scalar::from_bytes_le(&raw).unwrap()
        })
        .collect()
}

/// Aggregate the mask-enabled signatures, each scaled by its roster
/// coefficient. `signatures` is aligned with the roster; entries outside
/// the mask are ignored.
pub fn aggregate_signatures(
    suite: &PairingSuite,
    roster: &[G2Projective],
    signatures: &[G1Projective],
    mask: &Mask,
) -> Result<G1Projective, DkgError> {
    if roster.len() != signatures.len() || roster.len() != mask.len() {
        return Err(DkgError::Config(
            "signature, roster and mask lengths must match".into(),
        ));
    }
    if mask.count() == 0 {
        return Err(DkgError::Config("empty aggregation mask".into()));
    }

    let coeffs = coefficients(suite, roster);
    let mut acc = G1Projective::identity();
    for (i, signature) in signatures.iter().enumerate() {
        if mask.contains(i) {
            acc += signature * coeffs[i];
        }
    }
    Ok(acc)
}

/// The effective public key of the mask-enabled subset.
pub fn aggregate_public_keys(
    suite: &PairingSuite,
    roster: &[G2Projective],
    mask: &Mask,
) -> Result<G2Projective, DkgError> {
    if roster.len() != mask.len() {
        return Err(DkgError::Config("roster and mask lengths must match".into()));
    }

    let coeffs = coefficients(suite, roster);
    let mut acc = G2Projective::identity();
    for (i, public) in roster.iter().enumerate() {
        if mask.contains(i) {
            acc += public * coeffs[i];
        }
    }
    Ok(acc)
}

/// Verify an aggregate against the subset of the roster that signed.
pub fn verify_aggregate(
    suite: &PairingSuite,
    roster: &[G2Projective],
    message: &[u8],
    mask: &Mask,
    signature: &G1Projective,
) -> Result<(), DkgError> {
    let agg_public = aggregate_public_keys(suite, roster, mask)?;
    verify(&agg_public, message, signature)
        .map_err(|_| DkgError::CredentialInvalid("aggregate signature mismatch".into()))
}

fn hash_to_point(message: &[u8]) -> G1Projective {
    G1Projective::hash_to_curve(message, BDN_SIG_DST, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn committee(n: usize) -> (Vec<BdnKeyPair>, Vec<G2Projective>) {
        let suite = PairingSuite;
        let keys: Vec<BdnKeyPair> = (0..n)
            .map(|_| BdnKeyPair::generate(&suite, &mut OsRng))
            .collect();
        let roster = keys.iter().map(|k| k.public).collect();
        (keys, roster)
    }

    #[test]
    fn single_signature_verifies() {
        let suite = PairingSuite;
        let pair = BdnKeyPair::generate(&suite, &mut OsRng);

        let sig = sign(&pair.secret, b"credential");
        verify(&pair.public, b"credential", &sig).unwrap();
        assert!(verify(&pair.public, b"other", &sig).is_err());
    }

    #[test]
    fn aggregate_verifies_with_full_mask() {
        let suite = PairingSuite;
        let (keys, roster) = committee(4);

        let sigs: Vec<G1Projective> = keys.iter().map(|k| sign(&k.secret, b"msg")).collect();
        let mask = Mask::all(4);

        let agg = aggregate_signatures(&suite, &roster, &sigs, &mask).unwrap();
        verify_aggregate(&suite, &roster, b"msg", &mask, &agg).unwrap();
    }

    #[test]
    fn aggregation_is_order_independent() {
        let suite = PairingSuite;
        let (keys, roster) = committee(3);
        let sigs: Vec<G1Projective> = keys.iter().map(|k| sign(&k.secret, b"msg")).collect();
        let mask = Mask::all(3);

        let aggregated = aggregate_signatures(&suite, &roster, &sigs, &mask).unwrap();

        // Summing the weighted components in reverse must give the same
        // aggregate.
        let coeffs = coefficients(&suite, &roster);
        let mut reversed = G1Projective::identity();
        for i in (0..3).rev() {
            reversed += sigs[i] * coeffs[i];
        }
        assert_eq!(aggregated, reversed);

        verify_aggregate(&suite, &roster, b"msg", &mask, &aggregated).unwrap();
    }

    #[test]
    fn subset_mask_verifies_against_subset_only() {
        let suite = PairingSuite;
        let (keys, roster) = committee(4);
        let sigs: Vec<G1Projective> = keys.iter().map(|k| sign(&k.secret, b"msg")).collect();

        let mut mask = Mask::new(4);
        mask.enable(1).unwrap();
        mask.enable(3).unwrap();

        let agg = aggregate_signatures(&suite, &roster, &sigs, &mask).unwrap();
        verify_aggregate(&suite, &roster, b"msg", &mask, &agg).unwrap();

        // The same aggregate must not verify under the full mask.
        let full = Mask::all(4);
        assert!(verify_aggregate(&suite, &roster, b"msg", &full, &agg).is_err());
    }

    #[test]
    fn coefficients_depend_on_the_roster_not_the_mask() {
        let suite = PairingSuite;
        let (_, roster) = committee(3);

        let a = coefficients(&suite, &roster);
        let b = coefficients(&suite, &roster);
        assert_eq!(a, b);

        let mut reordered = roster.clone();
        reordered.swap(0, 1);
        assert_ne!(a, coefficients(&suite, &reordered));
    }

    #[test]
    fn mask_bytes_round_trip() {
        let mut mask = Mask::new(10);
        mask.enable(0).unwrap();
        mask.enable(7).unwrap();
        mask.enable(9).unwrap();

        let bytes = mask.to_bytes();
        assert_eq!(bytes.len(), 2);
        assert_eq!(bytes[0], 0b1000_0001);
        assert_eq!(bytes[1], 0b0100_0000);

        assert_eq!(Mask::from_bytes(10, &bytes).unwrap(), mask);
    }
}
