//! Client-side orchestration of the DKG service.
//!
//! The [`Actor`] lives next to one node and shares its [`AuthState`]. It
//! opens one stream per operation, fans the request out to every
//! participant, gathers the replies and recombines them. Nothing is
//! retried automatically; every phase runs under its hard deadline.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use blstrs::G2Projective;
use curve25519_dalek::edwards::EdwardsPoint;
use tracing::{debug, info, instrument};

use crate::constants::{
    DECRYPT_TIMEOUT, PROTOCOL_DECRYPT, PROTOCOL_RESHARING, PROTOCOL_SETUP, RESHARING_TIMEOUT,
    SETUP_TIMEOUT,
};
use crate::crypto::bdn::{self, Mask};
use crate::crypto::elgamal::{self, ElGamalPair};
use crate::crypto::poly::{recover_commit, PubShare};
use crate::crypto::proofs::{self, VerifiableCiphertext};
use crate::dkg::state::{validate_roster, AuthState};
use crate::errors::DkgError;
use crate::network::messages::{
    Address, DecryptRequest, ProtocolMessage, SignRequest, Start, StartResharing,
    VerifiableDecryptRequest,
};
use crate::network::transport::Rpc;
use crate::scheduler::parallel_for_indexed;
use crate::suite::CurveContext;

/// Coordinator handle for DKG operations.
pub struct Actor {
    ctx: CurveContext,
    rpc: Arc<dyn Rpc>,
    state: Arc<Mutex<AuthState>>,
    issued_ids: Mutex<HashSet<String>>,
}

/// A snapshot of the certified roster taken under the state lock.
struct Roster {
    participants: Vec<Address>,
    bdn_pubkeys: Vec<G2Projective>,
}

impl Actor {
    pub fn new(ctx: CurveContext, rpc: Arc<dyn Rpc>, state: Arc<Mutex<AuthState>>) -> Self {
        Self {
            ctx,
            rpc,
            state,
            issued_ids: Mutex::new(HashSet::new()),
        }
    }

    fn certified_roster(&self) -> Result<Roster, DkgError> {
        let state = self.state.lock().expect("state lock poisoned");
        state.dist_key()?;
        Ok(Roster {
            participants: state.participants().to_vec(),
            bdn_pubkeys: state.bdn_pubkeys().to_vec(),
        })
    }

    /// Run the initial DKG over the given roster and return the
    /// distributed public key. Exactly one setup is allowed.
    #[instrument(skip_all, fields(protocol = PROTOCOL_SETUP, n = addresses.len(), threshold))]
    pub fn setup(
        &self,
        addresses: &[Address],
        dkg_pubkeys: &[EdwardsPoint],
        bdn_pubkeys: &[G2Projective],
        threshold: u32,
    ) -> Result<EdwardsPoint, DkgError> {
        if self.state.lock().expect("state lock poisoned").done() {
            return Err(DkgError::SetupAlreadyDone);
        }
        validate_roster(addresses, dkg_pubkeys, Some(bdn_pubkeys), threshold)?;

        let stream = self.rpc.stream(addresses)?;
        let start = ProtocolMessage::Start(Start {
            threshold,
            addresses: addresses.to_vec(),
            dkg_pubkeys: dkg_pubkeys.to_vec(),
            bdn_pubkeys: bdn_pubkeys.to_vec(),
        });
        stream.sender.send_all(addresses, &start)?;

        let deadline = Instant::now() + SETUP_TIMEOUT;
        let mut dist_key: Option<EdwardsPoint> = None;
        for _ in 0..addresses.len() {
            let (from, message) = stream.receiver.recv_deadline(deadline)?;
            let done = match message {
                ProtocolMessage::StartDone(done) => done,
                other => {
                    return Err(DkgError::Protocol(format!(
                        "expected start-done from {from}, got {}",
                        other.label()
                    )));
                }
            };
            info!(node = %from, "node done");
            match dist_key {
                None => dist_key = Some(done.public_key),
                Some(expected) if expected == done.public_key => {}
                Some(_) => {
                    return Err(DkgError::SetupInconsistent(format!(
                        "{from} reported a different public key"
                    )));
                }
            }
        }

        Ok(dist_key.expect("roster is never empty"))
    }

    /// The cached distributed public key.
    pub fn get_public_key(&self) -> Result<EdwardsPoint, DkgError> {
        self.state.lock().expect("state lock poisoned").dist_key()
    }

    /// ElGamal-encrypt a message prefix against the distributed key.
    /// Purely local.
    #[instrument(skip_all, fields(len = message.len()))]
    pub fn encrypt(&self, message: &[u8]) -> Result<(ElGamalPair, Vec<u8>), DkgError> {
        let dist_key = self.get_public_key()?;
        elgamal::encrypt(
            &self.ctx.edwards,
            &dist_key,
            message,
            &mut rand::rngs::OsRng,
        )
    }

    /// Encrypt and prove knowledge of the ephemeral key. Purely local.
    #[instrument(skip_all, fields(len = message.len()))]
    pub fn verifiable_encrypt(
        &self,
        message: &[u8],
        gbar: &EdwardsPoint,
    ) -> Result<(VerifiableCiphertext, Vec<u8>), DkgError> {
        let dist_key = self.get_public_key()?;
        proofs::verifiable_encrypt(
            &self.ctx.edwards,
            &dist_key,
            message,
            gbar,
            &mut rand::rngs::OsRng,
        )
    }

    /// Threshold-decrypt one ciphertext.
    ///
    /// Every participant must reply; a missing share surfaces as
    /// [`DkgError::RecoveryShort`]. Accepting any `t` replies would be
    /// more robust, but the full set keeps share indices deterministic.
    #[instrument(skip_all, fields(protocol = PROTOCOL_DECRYPT))]
    pub fn decrypt(&self, pair: &ElGamalPair) -> Result<Vec<u8>, DkgError> {
        let roster = self.certified_roster()?;
        let n = roster.participants.len();

        let stream = self.rpc.stream(&roster.participants)?;
        stream.sender.send_all(
            &roster.participants,
            &ProtocolMessage::DecryptRequest(DecryptRequest {
                k: pair.k,
                c: pair.c,
            }),
        )?;

        let deadline = Instant::now() + DECRYPT_TIMEOUT;
        let mut shares = Vec::with_capacity(n);
        for _ in 0..n {
            let (from, message) = match stream.receiver.recv_deadline(deadline) {
                Ok(entry) => entry,
                Err(DkgError::Timeout(_)) | Err(DkgError::Transport(_)) => {
                    return Err(DkgError::RecoveryShort {
                        required: n,
                        provided: shares.len(),
                    });
                }
                Err(err) => return Err(err),
            };
            let reply = match message {
                ProtocolMessage::DecryptReply(reply) => reply,
                other => {
                    return Err(DkgError::Protocol(format!(
                        "expected decrypt-reply from {from}, got {}",
                        other.label()
                    )));
                }
            };
            debug!(node = %from, index = reply.i, "received decryption share");
            shares.push(PubShare {
                index: reply.i,
                value: reply.v,
            });
        }

        let blinding = recover_commit(&shares)?;
        self.ctx.edwards.point_data(&(pair.c - blinding))
    }

    /// Threshold-decrypt a batch of verifiable ciphertexts.
    ///
    /// Each reply carries one proved share per ciphertext; a worker pool
    /// verifies the proofs and recombines each ciphertext independently.
    /// One invalid proof fails the whole batch.
    #[instrument(skip_all, fields(protocol = PROTOCOL_DECRYPT, batch = ciphertexts.len()))]
    pub fn verifiable_decrypt(
        &self,
        ciphertexts: &[VerifiableCiphertext],
    ) -> Result<Vec<Vec<u8>>, DkgError> {
        if ciphertexts.is_empty() {
            return Ok(Vec::new());
        }

        // Reject a bad encryption proof before asking any node to release
        // a share; the nodes run the same check on their side.
        for ct in ciphertexts {
            proofs::verify_encryption(&self.ctx.edwards, ct)?;
        }

        let roster = self.certified_roster()?;
        let n = roster.participants.len();

        let stream = self.rpc.stream(&roster.participants)?;
        stream.sender.send_all(
            &roster.participants,
            &ProtocolMessage::VerifiableDecryptRequest(VerifiableDecryptRequest {
                ciphertexts: ciphertexts.to_vec(),
            }),
        )?;

        let deadline = Instant::now() + DECRYPT_TIMEOUT;
        let mut replies = Vec::with_capacity(n);
        for _ in 0..n {
            let (from, message) = match stream.receiver.recv_deadline(deadline) {
                Ok(entry) => entry,
                Err(DkgError::Timeout(_)) | Err(DkgError::Transport(_)) => {
                    return Err(DkgError::RecoveryShort {
                        required: n,
                        provided: replies.len(),
                    });
                }
                Err(err) => return Err(err),
            };
            let reply = match message {
                ProtocolMessage::VerifiableDecryptReply(reply) => reply,
                other => {
                    return Err(DkgError::Protocol(format!(
                        "expected verifiable-decrypt-reply from {from}, got {}",
                        other.label()
                    )));
                }
            };
            if reply.shares.len() != ciphertexts.len() {
                return Err(DkgError::Protocol(format!(
                    "{from} replied with {} shares for a batch of {}",
                    reply.shares.len(),
                    ciphertexts.len()
                )));
            }
            replies.push(reply);
        }

        let suite = self.ctx.edwards;
        parallel_for_indexed(ciphertexts.len(), |j| {
            let ct = &ciphertexts[j];
            let mut shares = Vec::with_capacity(n);
            for reply in &replies {
                let proved = &reply.shares[j];
                proofs::verify_share(&suite, proved, &ct.k, &ct.gbar)?;
                shares.push(PubShare {
                    index: proved.i,
                    value: proved.v,
                });
            }
            let blinding = recover_commit(&shares)?;
            suite.point_data(&(ct.c - blinding))
        })
    }

    /// Have every participant sign `id_hash` and aggregate the result.
    ///
    /// The dedup set lives in this coordinator's memory only; a restart
    /// forgets previously issued identities.
    #[instrument(skip_all, fields(protocol = PROTOCOL_DECRYPT))]
    pub fn issue_master_credential(
        &self,
        id_hash: &str,
    ) -> Result<(Vec<u8>, Vec<Vec<u8>>), DkgError> {
        {
            let issued = self.issued_ids.lock().expect("issued-id lock poisoned");
            if issued.contains(id_hash) {
                return Err(DkgError::DuplicateIdentity(id_hash.to_string()));
            }
        }

        let (aggregate, signatures) = self.collect_signatures(id_hash.as_bytes())?;

        self.issued_ids
            .lock()
            .expect("issued-id lock poisoned")
            .insert(id_hash.to_string());
        Ok((aggregate, signatures))
    }

    /// Issue an event credential chained to a master credential. The
    /// master signatures are re-verified against the roster first, so a
    /// forged chain is rejected before any node signs.
    #[instrument(skip_all, fields(protocol = PROTOCOL_DECRYPT, event = event_name))]
    pub fn issue_event_credential(
        &self,
        id_hash: &str,
        event_name: &str,
        _master_credential: &[u8],
        master_signatures: &[Vec<u8>],
    ) -> Result<(Vec<u8>, Vec<Vec<u8>>), DkgError> {
        let roster = self.certified_roster()?;
        self.verify_roster_signatures(&roster, id_hash.as_bytes(), master_signatures)?;

        let message = event_message(id_hash, event_name);
        self.collect_signatures(&message)
    }

    /// Verify an event credential: every roster member must have signed
    /// `idHash:eventName`.
    #[instrument(skip_all, fields(event = event_name))]
    pub fn verify_event_credential(
        &self,
        id_hash: &str,
        event_name: &str,
        _event_credential: &[u8],
        event_signatures: &[Vec<u8>],
    ) -> Result<bool, DkgError> {
        let roster = self.certified_roster()?;
        let message = event_message(id_hash, event_name);
        self.verify_roster_signatures(&roster, &message, event_signatures)?;
        Ok(true)
    }

    /// Redistribute the shares over a new roster, keeping the distributed
    /// key. Every member of the union of rosters must confirm.
    #[instrument(skip_all, fields(protocol = PROTOCOL_RESHARING, n_new = new_addresses.len(), threshold_new))]
    pub fn reshare(
        &self,
        new_addresses: &[Address],
        new_dkg_pubkeys: &[EdwardsPoint],
        threshold_new: u32,
    ) -> Result<(), DkgError> {
        validate_roster(new_addresses, new_dkg_pubkeys, None, threshold_new)?;
        let (old_addresses, old_pubkeys, threshold_old, dist_key) = {
            let state = self.state.lock().expect("state lock poisoned");
            (
                state.participants().to_vec(),
                state.dkg_pubkeys().to_vec(),
                state.threshold(),
                state.dist_key()?,
            )
        };

        // old ∪ new, old first; new-only members get the old committee
        // description since they cannot know it themselves.
        let mut union = old_addresses.clone();
        let mut joiners = Vec::new();
        for address in new_addresses {
            if !old_addresses.contains(address) {
                union.push(address.clone());
                joiners.push(address.clone());
            }
        }

        let stream = self.rpc.stream(&union)?;
        info!(members = union.len(), joiners = joiners.len(), "resharing");

        stream.sender.send_all(
            &old_addresses,
            &ProtocolMessage::StartResharing(StartResharing {
                threshold_new,
                threshold_old: 0,
                addrs_new: new_addresses.to_vec(),
                addrs_old: Vec::new(),
                pubkeys_new: new_dkg_pubkeys.to_vec(),
                pubkeys_old: Vec::new(),
            }),
        )?;
        stream.sender.send_all(
            &joiners,
            &ProtocolMessage::StartResharing(StartResharing {
                threshold_new,
                threshold_old,
                addrs_new: new_addresses.to_vec(),
                addrs_old: old_addresses.clone(),
                pubkeys_new: new_dkg_pubkeys.to_vec(),
                pubkeys_old: old_pubkeys,
            }),
        )?;

        let deadline = Instant::now() + RESHARING_TIMEOUT;
        for _ in 0..union.len() {
            let (from, message) = stream.receiver.recv_deadline(deadline)?;
            let done = match message {
                ProtocolMessage::StartDone(done) => done,
                other => {
                    return Err(DkgError::Protocol(format!(
                        "expected start-done from {from}, got {}",
                        other.label()
                    )));
                }
            };
            if done.public_key != dist_key {
                return Err(DkgError::ResharingInconsistent(format!(
                    "{from} reported a different public key"
                )));
            }
            debug!(node = %from, "resharing confirmed");
        }

        Ok(())
    }

    /// Fan a sign request out to the roster, verify each signature and
    /// aggregate with the full-roster mask.
    fn collect_signatures(&self, message: &[u8]) -> Result<(Vec<u8>, Vec<Vec<u8>>), DkgError> {
        let roster = self.certified_roster()?;
        let n = roster.participants.len();

        let stream = self.rpc.stream(&roster.participants)?;
        for (i, address) in roster.participants.iter().enumerate() {
            stream.sender.send(
                address,
                &ProtocolMessage::SignRequest(SignRequest {
                    message: message.to_vec(),
                    index: i as u32,
                }),
            )?;
        }

        let deadline = Instant::now() + DECRYPT_TIMEOUT;
        let mut signatures: Vec<Option<Vec<u8>>> = vec![None; n];
        for _ in 0..n {
            let (from, incoming) = stream.receiver.recv_deadline(deadline)?;
            let response = match incoming {
                ProtocolMessage::SignResponse(response) => response,
                other => {
                    return Err(DkgError::Protocol(format!(
                        "expected sign-response from {from}, got {}",
                        other.label()
                    )));
                }
            };
            debug!(node = %from, index = response.index, "received signature");
            let slot = signatures
                .get_mut(response.index as usize)
                .ok_or_else(|| {
                    DkgError::Protocol(format!("signature index {} out of range", response.index))
                })?;
            if slot.replace(response.signature).is_some() {
                return Err(DkgError::Protocol(format!(
                    "duplicate signature for index {}",
                    response.index
                )));
            }
        }

        let signatures: Vec<Vec<u8>> = signatures
            .into_iter()
            .map(|s| s.expect("all slots filled"))
            .collect();

        // Verify individually before aggregating; downstream verifiers
        // need the individual signatures to know which subset signed.
        self.verify_roster_signatures(&roster, message, &signatures)?;

        let decoded: Vec<_> = signatures
            .iter()
            .map(|bytes| self.ctx.pairing.g1_from_bytes(bytes))
            .collect::<Result<_, _>>()?;
        let mask = Mask::all(n);
        let aggregate =
            bdn::aggregate_signatures(&self.ctx.pairing, &roster.bdn_pubkeys, &decoded, &mask)?;

        Ok((
            self.ctx.pairing.g1_to_bytes(&aggregate).to_vec(),
            signatures,
        ))
    }

    fn verify_roster_signatures(
        &self,
        roster: &Roster,
        message: &[u8],
        signatures: &[Vec<u8>],
    ) -> Result<(), DkgError> {
        if signatures.len() != roster.bdn_pubkeys.len() {
            return Err(DkgError::CredentialInvalid(format!(
                "{} signatures for a roster of {}",
                signatures.len(),
                roster.bdn_pubkeys.len()
            )));
        }
        for (i, (public, bytes)) in roster.bdn_pubkeys.iter().zip(signatures).enumerate() {
            let signature = self
                .ctx
                .pairing
                .g1_from_bytes(bytes)
                .map_err(|_| DkgError::CredentialInvalid(format!("signature {i} malformed")))?;
            bdn::verify(public, message, &signature).map_err(|_| {
                DkgError::CredentialInvalid(format!("signature {i} does not verify"))
            })?;
        }
        Ok(())
    }
}

/// The byte-exact message signed for event credentials.
fn event_message(id_hash: &str, event_name: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(id_hash.len() + 1 + event_name.len());
    message.extend_from_slice(id_hash.as_bytes());
    message.push(b':');
    message.extend_from_slice(event_name.as_bytes());
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_message_is_colon_joined() {
        assert_eq!(event_message("alice", "gala"), b"alice:gala");
    }
}
