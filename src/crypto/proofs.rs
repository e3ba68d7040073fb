//! Verifiable encryption and verifiable decryption shares.
//!
//! Both proofs are Chaum-Pedersen discrete-log equality arguments made
//! non-interactive with a SHA-256 Fiat-Shamir challenge reduced into the
//! scalar field. The encryptor proves knowledge of the ephemeral key over
//! the bases `(G, GBar)`; each decryptor proves that its share was applied
//! to `(K, GBar)` consistently.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};

use crate::crypto::poly::PriShare;
use crate::errors::DkgError;
use crate::suite::EdwardsSuite;

/// An ElGamal ciphertext extended with the encryptor's knowledge proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifiableCiphertext {
    pub k: EdwardsPoint,
    pub c: EdwardsPoint,
    pub ubar: EdwardsPoint,
    pub e: Scalar,
    pub f: Scalar,
    pub gbar: EdwardsPoint,
}

/// One node's decryption share together with its correctness proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShareAndProof {
    pub v: EdwardsPoint,
    pub i: u32,
    pub ui: EdwardsPoint,
    pub ei: Scalar,
    pub fi: Scalar,
    pub hi: EdwardsPoint,
}

/// Encrypt a message prefix and prove knowledge of the ephemeral key.
pub fn verifiable_encrypt<R: RngCore + CryptoRng>(
    suite: &EdwardsSuite,
    public_key: &EdwardsPoint,
    message: &[u8],
    gbar: &EdwardsPoint,
    rng: &mut R,
) -> Result<(VerifiableCiphertext, Vec<u8>), DkgError> {
    let (m, used) = suite.embed(message, rng)?;
    let remainder = message[used..].to_vec();

    let k = suite.random_scalar(rng);
    let big_k = suite.base_mul(&k);
    let c = public_key * k + m;

    let ubar = gbar * k;
    let s = suite.random_scalar(rng);
    let w = suite.base_mul(&s);
    let wbar = gbar * s;

    let e = encryption_challenge(suite, &c, &big_k, &ubar, &w, &wbar);
    let f = s + e * k;

    Ok((
        VerifiableCiphertext {
            k: big_k,
            c,
            ubar,
            e,
            f,
            gbar: *gbar,
        },
        remainder,
    ))
}

/// Check the encryptor's knowledge proof before releasing any share.
pub fn verify_encryption(
    suite: &EdwardsSuite,
    ct: &VerifiableCiphertext,
) -> Result<(), DkgError> {
    let w = suite.base_mul(&ct.f) - ct.k * ct.e;
    let wbar = ct.gbar * ct.f - ct.ubar * ct.e;

    let expected = encryption_challenge(suite, &ct.c, &ct.k, &ct.ubar, &w, &wbar);
    if expected != ct.e {
        return Err(DkgError::ProofInvalid(
            "encryption proof challenge mismatch".into(),
        ));
    }
    Ok(())
}

/// Produce this node's decryption share for one ciphertext along with the
/// proof of correct decryption.
pub fn prove_share<R: RngCore + CryptoRng>(
    suite: &EdwardsSuite,
    share: &PriShare,
    ct: &VerifiableCiphertext,
    rng: &mut R,
) -> ShareAndProof {
    let v = ct.k * share.value;
    let ui = ct.gbar * share.value;
    let hi = suite.base_mul(&share.value);

    let si = suite.random_scalar(rng);
    let wi = ct.k * si;
    let wbari = ct.gbar * si;

    let ei = share_challenge(suite, &v, &wi, &wbari);
    let fi = si + ei * share.value;

    ShareAndProof {
        v,
        i: share.index,
        ui,
        ei,
        fi,
        hi,
    }
}

/// Verify one node's decryption share against the ciphertext it claims to
/// decrypt.
pub fn verify_share(
    suite: &EdwardsSuite,
    sp: &ShareAndProof,
    k: &EdwardsPoint,
    gbar: &EdwardsPoint,
) -> Result<(), DkgError> {
    let wi = k * sp.fi - sp.v * sp.ei;
    let wbari = gbar * sp.fi - sp.ui * sp.ei;

    let expected = share_challenge(suite, &sp.v, &wi, &wbari);
    if expected != sp.ei {
        return Err(DkgError::ProofInvalid(format!(
            "decryption share {} challenge mismatch",
            sp.i
        )));
    }
    Ok(())
}

fn encryption_challenge(
    suite: &EdwardsSuite,
    c: &EdwardsPoint,
    k: &EdwardsPoint,
    ubar: &EdwardsPoint,
    w: &EdwardsPoint,
    wbar: &EdwardsPoint,
) -> Scalar {
    suite.hash_to_scalar(&[
        &suite.point_to_bytes(c),
        &suite.point_to_bytes(k),
        &suite.point_to_bytes(ubar),
        &suite.point_to_bytes(w),
        &suite.point_to_bytes(wbar),
    ])
}

fn share_challenge(
    suite: &EdwardsSuite,
    v: &EdwardsPoint,
    wi: &EdwardsPoint,
    wbari: &EdwardsPoint,
) -> Scalar {
    suite.hash_to_scalar(&[
        &suite.point_to_bytes(v),
        &suite.point_to_bytes(wi),
        &suite.point_to_bytes(wbari),
    ])
}
