//! Cryptographic building blocks of the DKG service.
//!
//! - [`poly`]: secret-sharing polynomials and Lagrange recovery
//! - [`schnorr`]: deal and response authentication
//! - [`sealed`]: authenticated per-recipient deal encryption
//! - [`elgamal`]: embedded-message ElGamal encryption
//! - [`proofs`]: verifiable encryption and decryption-share proofs
//! - [`bdn`]: aggregate credential signatures with rogue-key protection

pub mod bdn;
pub mod elgamal;
pub mod poly;
pub mod proofs;
pub mod schnorr;
pub mod sealed;
