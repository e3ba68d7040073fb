//! Protocol message types.
//!
//! Defines the messages exchanged between the coordinator and the
//! participant nodes over a stream session.
//!
//! # Message Flow
//!
//! ```text
//! Coordinator                Node i                     Node j
//!   │                          │                          │
//!   ├────────Start───────────→ │ ←────────Start───────────┤
//!   │                          ├──Deal / Response───────→ │
//!   │                          │ ←─Deal / Response────────┤
//!   │ ←──────StartDone─────────┤                          │
//!   │                          │                          │
//!   ├──DecryptRequest────────→ │                          │
//!   │ ←──────DecryptReply──────┤                          │
//!   ├──SignRequest───────────→ │                          │
//!   │ ←──────SignResponse──────┤                          │
//! ```

use blstrs::G2Projective;
use curve25519_dalek::edwards::EdwardsPoint;
use std::fmt;

use crate::crypto::proofs::{ShareAndProof, VerifiableCiphertext};

/// Participant address. Opaque UTF-8; the roster position gives the
/// participant index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub String);

impl Address {
    pub fn new(inner: impl Into<String>) -> Self {
        Self(inner.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kicks off a DKG round on every participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Start {
    pub threshold: u32,
    pub addresses: Vec<Address>,
    pub dkg_pubkeys: Vec<EdwardsPoint>,
    pub bdn_pubkeys: Vec<G2Projective>,
}

/// A node's confirmation that the round certified, carrying the
/// distributed public key it computed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartDone {
    pub public_key: EdwardsPoint,
}

/// The sealed per-recipient deal payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedDeal {
    pub dh_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub nonce: Vec<u8>,
    pub cipher: Vec<u8>,
}

/// One dealer's share distribution to one recipient. `index` identifies
/// the dealer; `signature` binds the dealer index to the sealed payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deal {
    pub index: u32,
    pub signature: Vec<u8>,
    pub encrypted_deal: EncryptedDeal,
}

/// A verifier's verdict on one dealer's deal. `index` is the verifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DealerResponse {
    pub index: u32,
    pub status: bool,
    pub session_id: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Broadcast wrapper for a [`DealerResponse`]; `index` is the dealer the
/// verdict concerns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub index: u32,
    pub inner: DealerResponse,
}

/// Dual use: a justification during setup (the accused dealer re-sends the
/// complainant's deal) and a share redistribution during resharing (the
/// public coefficients carry the previous committed polynomial).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reshare {
    pub deal: Deal,
    pub public_coeffs: Vec<EdwardsPoint>,
}

/// Kicks off a resharing round. Old-roster members receive only the new
/// roster; nodes joining fresh also receive the old roster and threshold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartResharing {
    pub threshold_new: u32,
    pub threshold_old: u32,
    pub addrs_new: Vec<Address>,
    pub addrs_old: Vec<Address>,
    pub pubkeys_new: Vec<EdwardsPoint>,
    pub pubkeys_old: Vec<EdwardsPoint>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptRequest {
    pub k: EdwardsPoint,
    pub c: EdwardsPoint,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecryptReply {
    pub i: u32,
    pub v: EdwardsPoint,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiableDecryptRequest {
    pub ciphertexts: Vec<VerifiableCiphertext>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiableDecryptReply {
    pub shares: Vec<ShareAndProof>,
}

/// Asks one node to sign `message` with its BDN key. `index` is the
/// node's roster position, echoed back in the response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignRequest {
    pub message: Vec<u8>,
    pub index: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignResponse {
    pub signature: Vec<u8>,
    pub index: u32,
    pub pubkey: G2Projective,
}

/// Every message that can travel over a stream session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolMessage {
    Start(Start),
    StartDone(StartDone),
    Deal(Deal),
    Response(Response),
    Reshare(Reshare),
    StartResharing(StartResharing),
    DecryptRequest(DecryptRequest),
    DecryptReply(DecryptReply),
    VerifiableDecryptRequest(VerifiableDecryptRequest),
    VerifiableDecryptReply(VerifiableDecryptReply),
    SignRequest(SignRequest),
    SignResponse(SignResponse),
}

impl ProtocolMessage {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            ProtocolMessage::Start(_) => "start",
            ProtocolMessage::StartDone(_) => "start-done",
            ProtocolMessage::Deal(_) => "deal",
            ProtocolMessage::Response(_) => "response",
            ProtocolMessage::Reshare(_) => "reshare",
            ProtocolMessage::StartResharing(_) => "start-resharing",
            ProtocolMessage::DecryptRequest(_) => "decrypt-request",
            ProtocolMessage::DecryptReply(_) => "decrypt-reply",
            ProtocolMessage::VerifiableDecryptRequest(_) => "verifiable-decrypt-request",
            ProtocolMessage::VerifiableDecryptReply(_) => "verifiable-decrypt-reply",
            ProtocolMessage::SignRequest(_) => "sign-request",
            ProtocolMessage::SignResponse(_) => "sign-response",
        }
    }
}
