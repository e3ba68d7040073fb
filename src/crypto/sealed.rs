//! Authenticated sealing of deal payloads.
//!
//! Each deal travels encrypted to exactly one recipient: an ephemeral
//! Diffie-Hellman exchange against the recipient's long-term DKG key yields
//! a symmetric key through HKDF-SHA256, the payload is sealed with
//! ChaCha20-Poly1305, and a Schnorr signature binds the ephemeral key to
//! the dealer's identity.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;

use crate::constants::DEAL_SEAL_INFO;
use crate::crypto::schnorr;
use crate::errors::DkgError;
use crate::suite::EdwardsSuite;

const NONCE_LEN: usize = 12;

/// The sealed payload as it travels inside a deal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedPayload {
    /// Compressed ephemeral DH public point.
    pub dh_key: Vec<u8>,
    /// Schnorr signature over `dh_key` by the dealer's long-term key.
    pub signature: Vec<u8>,
    /// AEAD nonce.
    pub nonce: Vec<u8>,
    /// AEAD ciphertext (payload plus tag).
    pub cipher: Vec<u8>,
}

pub fn seal<R: RngCore + CryptoRng>(
    suite: &EdwardsSuite,
    dealer_secret: &Scalar,
    dealer_public: &EdwardsPoint,
    recipient_public: &EdwardsPoint,
    plaintext: &[u8],
    rng: &mut R,
) -> Result<SealedPayload, DkgError> {
    let ephemeral = suite.random_scalar(rng);
    let dh_public = suite.base_mul(&ephemeral);
    let shared = recipient_public * ephemeral;

    let dh_key = suite.point_to_bytes(&dh_public).to_vec();
    let signature = schnorr::sign(suite, dealer_secret, dealer_public, &dh_key, rng).to_bytes();

    let key = derive_key(suite, &shared)?;
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key))
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| DkgError::Crypto("deal encryption failed".into()))?;

    Ok(SealedPayload {
        dh_key,
        signature,
        nonce: nonce.to_vec(),
        cipher,
    })
}

pub fn open(
    suite: &EdwardsSuite,
    recipient_secret: &Scalar,
    dealer_public: &EdwardsPoint,
    sealed: &SealedPayload,
) -> Result<Vec<u8>, DkgError> {
    let signature = schnorr::Signature::from_bytes(suite, &sealed.signature)?;
    if !schnorr::verify(suite, dealer_public, &sealed.dh_key, &signature) {
        return Err(DkgError::Crypto(
            "ephemeral key signature does not match the dealer".into(),
        ));
    }

    let dh_public = suite.point_from_bytes(&sealed.dh_key)?;
    let shared = dh_public * recipient_secret;
    let key = derive_key(suite, &shared)?;

    if sealed.nonce.len() != NONCE_LEN {
        return Err(DkgError::Crypto("invalid nonce length".into()));
    }

    ChaCha20Poly1305::new(Key::from_slice(&key))
        .decrypt(Nonce::from_slice(&sealed.nonce), sealed.cipher.as_slice())
        .map_err(|_| DkgError::Crypto("deal decryption failed".into()))
}

fn derive_key(suite: &EdwardsSuite, shared: &EdwardsPoint) -> Result<[u8; 32], DkgError> {
    let ikm = suite.point_to_bytes(shared);
    let hk = Hkdf::<Sha256>::new(None, &ikm);
    let mut key = [0u8; 32];
    hk.expand(DEAL_SEAL_INFO, &mut key)
        .map_err(|_| DkgError::Crypto("key derivation failed".into()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn seal_open_round_trip() {
        let suite = EdwardsSuite;
        let (dealer_sk, dealer_pk) = suite.keygen(&mut OsRng);
        let (recipient_sk, recipient_pk) = suite.keygen(&mut OsRng);

        let sealed = seal(
            &suite,
            &dealer_sk,
            &dealer_pk,
            &recipient_pk,
            b"share material",
            &mut OsRng,
        )
        .unwrap();

        let opened = open(&suite, &recipient_sk, &dealer_pk, &sealed).unwrap();
        assert_eq!(opened, b"share material");
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let suite = EdwardsSuite;
        let (dealer_sk, dealer_pk) = suite.keygen(&mut OsRng);
        let (_, recipient_pk) = suite.keygen(&mut OsRng);
        let (other_sk, _) = suite.keygen(&mut OsRng);

        let sealed = seal(
            &suite,
            &dealer_sk,
            &dealer_pk,
            &recipient_pk,
            b"share material",
            &mut OsRng,
        )
        .unwrap();

        assert!(open(&suite, &other_sk, &dealer_pk, &sealed).is_err());
    }

    #[test]
    fn forged_dealer_is_rejected() {
        let suite = EdwardsSuite;
        let (dealer_sk, dealer_pk) = suite.keygen(&mut OsRng);
        let (recipient_sk, recipient_pk) = suite.keygen(&mut OsRng);
        let (_, claimed_pk) = suite.keygen(&mut OsRng);

        let sealed = seal(
            &suite,
            &dealer_sk,
            &dealer_pk,
            &recipient_pk,
            b"share material",
            &mut OsRng,
        )
        .unwrap();

        assert!(open(&suite, &recipient_sk, &claimed_pk, &sealed).is_err());
    }

    #[test]
    fn tampered_cipher_is_rejected() {
        let suite = EdwardsSuite;
        let (dealer_sk, dealer_pk) = suite.keygen(&mut OsRng);
        let (recipient_sk, recipient_pk) = suite.keygen(&mut OsRng);

        let mut sealed = seal(
            &suite,
            &dealer_sk,
            &dealer_pk,
            &recipient_pk,
            b"share material",
            &mut OsRng,
        )
        .unwrap();
        sealed.cipher[0] ^= 0x01;

        assert!(open(&suite, &recipient_sk, &dealer_pk, &sealed).is_err());
    }
}
