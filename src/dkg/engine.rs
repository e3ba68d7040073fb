//! The Pedersen DKG round engines.
//!
//! [`SetupRound`] drives one node through an initial key generation:
//! dealing, deal verification, response accounting, justification and
//! certification. [`ResharingRound`] redistributes an existing share over
//! a new roster while preserving the distributed public key. Both engines
//! are pure state machines; the stream handler feeds them messages and
//! forwards whatever they emit.

use std::collections::{BTreeMap, BTreeSet};

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::crypto::poly::{lagrange_at_zero, PriShare, PublicPoly, SecretPoly};
use crate::crypto::{schnorr, sealed};
use crate::dkg::node::NodeKeys;
use crate::dkg::state::{validate_roster, AuthState};
use crate::errors::DkgError;
use crate::network::messages::{
    Address, Deal, DealerResponse, EncryptedDeal, Reshare, Response, Start, StartResharing,
};
use crate::network::transcript::{Reader, Writer};
use crate::suite::EdwardsSuite;

/// A verified deal received from one dealer.
#[derive(Debug)]
struct DealRecord {
    share: Scalar,
    commits: PublicPoly,
}

/// The product of a certified round.
pub struct RoundOutput {
    pub dist_key: EdwardsPoint,
    pub pub_poly: PublicPoly,
    pub share: PriShare,
}

fn setup_session_id(start: &Start, suite: &EdwardsSuite) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(b"tdkg:session:v1");
    hasher.update(start.threshold.to_be_bytes());
    for (address, key) in start.addresses.iter().zip(&start.dkg_pubkeys) {
        hasher.update((address.as_str().len() as u32).to_be_bytes());
        hasher.update(address.as_str().as_bytes());
        hasher.update(suite.point_to_bytes(key));
    }
    hasher.finalize().to_vec()
}

fn encode_deal_payload(session_id: &[u8], share: &Scalar, commits: &PublicPoly) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_bytes(session_id);
    w.put_scalar(share);
    w.put_point_vec(commits.commits());
    w.finish()
}

fn decode_deal_payload(bytes: &[u8]) -> Result<(Vec<u8>, Scalar, PublicPoly), DkgError> {
    let mut r = Reader::new(bytes);
    let session_id = r.get_bytes()?;
    let share = r.get_scalar()?;
    let commits = PublicPoly::new(r.get_point_vec()?);
    r.done()?;
    Ok((session_id, share, commits))
}

/// Bytes signed by the dealer: the dealer index bound to the sealed
/// payload.
fn deal_binding(index: u32, sealed: &sealed::SealedPayload) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&index.to_be_bytes());
    out.extend_from_slice(&sealed.dh_key);
    out.extend_from_slice(&sealed.nonce);
    out.extend_from_slice(&sealed.cipher);
    out
}

/// Bytes signed by a verifier: its verdict on one dealer within one
/// session.
fn response_binding(session_id: &[u8], dealer: u32, status: bool) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(session_id);
    out.extend_from_slice(&dealer.to_be_bytes());
    out.push(status as u8);
    out
}

fn seal_share<R: RngCore + CryptoRng>(
    suite: &EdwardsSuite,
    keys: &NodeKeys,
    my_index: u32,
    recipient_key: &EdwardsPoint,
    session_id: &[u8],
    share: &Scalar,
    commits: &PublicPoly,
    rng: &mut R,
) -> Result<Deal, DkgError> {
    let payload = encode_deal_payload(session_id, share, commits);
    let sealed = sealed::seal(
        suite,
        &keys.dkg_secret,
        &keys.dkg_public,
        recipient_key,
        &payload,
        rng,
    )?;
    let signature = schnorr::sign(
        suite,
        &keys.dkg_secret,
        &keys.dkg_public,
        &deal_binding(my_index, &sealed),
        rng,
    )
    .to_bytes();
    Ok(Deal {
        index: my_index,
        signature,
        encrypted_deal: EncryptedDeal {
            dh_key: sealed.dh_key,
            signature: sealed.signature,
            nonce: sealed.nonce,
            cipher: sealed.cipher,
        },
    })
}

/// Open a sealed deal and verify it against the dealer's identity and the
/// receiver's index. Returns the verified record or `None` when the deal
/// fails cryptographically (which the caller reports as a bad response).
#[allow(clippy::too_many_arguments)]
fn open_and_verify(
    suite: &EdwardsSuite,
    deal: &Deal,
    dealer_key: &EdwardsPoint,
    my_secret: &Scalar,
    session_id: &[u8],
    expected_threshold: u32,
    my_eval_index: u32,
) -> Option<DealRecord> {
    let sealed_payload = sealed::SealedPayload {
        dh_key: deal.encrypted_deal.dh_key.clone(),
        signature: deal.encrypted_deal.signature.clone(),
        nonce: deal.encrypted_deal.nonce.clone(),
        cipher: deal.encrypted_deal.cipher.clone(),
    };

    let signature = schnorr::Signature::from_bytes(suite, &deal.signature).ok()?;
    if !schnorr::verify(
        suite,
        dealer_key,
        &deal_binding(deal.index, &sealed_payload),
        &signature,
    ) {
        return None;
    }

    let payload = sealed::open(suite, my_secret, dealer_key, &sealed_payload).ok()?;
    let (deal_session, share, commits) = decode_deal_payload(&payload).ok()?;

    if deal_session != session_id {
        return None;
    }
    if commits.threshold() != expected_threshold {
        return None;
    }
    if suite.base_mul(&share) != commits.eval(my_eval_index).value {
        return None;
    }

    Some(DealRecord { share, commits })
}

/// One node's view of an initial DKG round.
#[derive(Debug)]
pub struct SetupRound {
    my_index: u32,
    threshold: u32,
    addresses: Vec<Address>,
    dkg_pubkeys: Vec<EdwardsPoint>,
    dkg_secret: Scalar,
    dkg_public: EdwardsPoint,
    session_id: Vec<u8>,
    poly: SecretPoly,
    commits: PublicPoly,
    deals: BTreeMap<u32, DealRecord>,
    seen: BTreeSet<u32>,
    responses: BTreeMap<u32, BTreeMap<u32, bool>>,
}

impl SetupRound {
    pub fn new<R: RngCore + CryptoRng>(
        suite: &EdwardsSuite,
        keys: &NodeKeys,
        start: &Start,
        rng: &mut R,
    ) -> Result<Self, DkgError> {
        validate_roster(
            &start.addresses,
            &start.dkg_pubkeys,
            Some(&start.bdn_pubkeys),
            start.threshold,
        )?;

        let my_index = start
            .addresses
            .iter()
            .position(|a| a == &keys.address)
            .ok_or_else(|| {
                DkgError::RosterInvalid(format!("own address {} not in roster", keys.address))
            })? as u32;
        if start.dkg_pubkeys[my_index as usize] != keys.dkg_public {
            return Err(DkgError::RosterInvalid(
                "roster carries a different key for this node".into(),
            ));
        }

        let session_id = setup_session_id(start, suite);
        let poly = SecretPoly::random(start.threshold, rng);
        let commits = poly.commit();

        let mut round = Self {
            my_index,
            threshold: start.threshold,
            addresses: start.addresses.clone(),
            dkg_pubkeys: start.dkg_pubkeys.clone(),
            dkg_secret: keys.dkg_secret,
            dkg_public: keys.dkg_public,
            session_id,
            poly,
            commits,
            deals: BTreeMap::new(),
            seen: BTreeSet::new(),
            responses: BTreeMap::new(),
        };

        // Every dealer implicitly endorses its own deal, and this node's
        // own deal is processed locally.
        let n = round.addresses.len() as u32;
        for dealer in 0..n {
            round.responses.entry(dealer).or_default().insert(dealer, true);
        }
        round.seen.insert(my_index);
        round.deals.insert(
            my_index,
            DealRecord {
                share: round.poly.eval(my_index).value,
                commits: round.commits.clone(),
            },
        );

        Ok(round)
    }

    pub fn my_index(&self) -> u32 {
        self.my_index
    }

    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    /// All roster addresses except this node's own.
    pub fn peer_addresses(&self) -> Vec<Address> {
        self.addresses
            .iter()
            .enumerate()
            .filter(|(i, _)| *i as u32 != self.my_index)
            .map(|(_, a)| a.clone())
            .collect()
    }

    /// One sealed deal per peer.
    pub fn outgoing_deals<R: RngCore + CryptoRng>(
        &self,
        suite: &EdwardsSuite,
        keys: &NodeKeys,
        rng: &mut R,
    ) -> Result<Vec<(Address, Deal)>, DkgError> {
        let mut out = Vec::with_capacity(self.addresses.len() - 1);
        for (i, address) in self.addresses.iter().enumerate() {
            let index = i as u32;
            if index == self.my_index {
                continue;
            }
            let share = self.poly.eval(index).value;
            let deal = seal_share(
                suite,
                keys,
                self.my_index,
                &self.dkg_pubkeys[i],
                &self.session_id,
                &share,
                &self.commits,
                rng,
            )?;
            out.push((address.clone(), deal));
        }
        Ok(out)
    }

    /// Handle one incoming deal. Structural violations surface as
    /// [`DkgError::DealInvalid`]; cryptographic mismatches come back as a
    /// bad response to broadcast. Duplicates yield `None`.
    pub fn process_deal<R: RngCore + CryptoRng>(
        &mut self,
        suite: &EdwardsSuite,
        from: &Address,
        deal: &Deal,
        rng: &mut R,
    ) -> Result<Option<Response>, DkgError> {
        let dealer = deal.index;
        let n = self.addresses.len() as u32;
        if dealer >= n {
            return Err(DkgError::DealInvalid(format!(
                "dealer index {dealer} out of range"
            )));
        }
        if dealer == self.my_index {
            return Err(DkgError::DealInvalid("deal claims this node's index".into()));
        }
        if &self.addresses[dealer as usize] != from {
            return Err(DkgError::DealInvalid(format!(
                "deal from {from} claims index {dealer}"
            )));
        }
        if !self.seen.insert(dealer) {
            return Ok(None);
        }

        let record = open_and_verify(
            suite,
            deal,
            &self.dkg_pubkeys[dealer as usize],
            &self.dkg_secret,
            &self.session_id,
            self.threshold,
            self.my_index,
        );
        let status = record.is_some();
        if let Some(record) = record {
            self.deals.insert(dealer, record);
        } else {
            debug!(dealer, "deal failed verification, responding bad");
        }

        self.responses
            .entry(dealer)
            .or_default()
            .insert(self.my_index, status);

        Ok(Some(self.build_response(suite, dealer, status, rng)))
    }

    fn build_response<R: RngCore + CryptoRng>(
        &self,
        suite: &EdwardsSuite,
        dealer: u32,
        status: bool,
        rng: &mut R,
    ) -> Response {
        let signature = schnorr::sign(
            suite,
            &self.dkg_secret,
            &self.dkg_public,
            &response_binding(&self.session_id, dealer, status),
            rng,
        )
        .to_bytes();
        Response {
            index: dealer,
            inner: DealerResponse {
                index: self.my_index,
                status,
                session_id: self.session_id.clone(),
                signature,
            },
        }
    }

    /// Record a verifier's broadcast verdict. Responses with a bad
    /// signature, a foreign session id or a mismatched sender are ignored;
    /// a good verdict may supersede a bad one after justification.
    pub fn record_response(&mut self, suite: &EdwardsSuite, from: &Address, response: &Response) {
        let n = self.addresses.len() as u32;
        let dealer = response.index;
        let verifier = response.inner.index;
        if dealer >= n || verifier >= n {
            return;
        }
        if &self.addresses[verifier as usize] != from {
            return;
        }
        if response.inner.session_id != self.session_id {
            return;
        }
        let Ok(signature) = schnorr::Signature::from_bytes(suite, &response.inner.signature)
        else {
            return;
        };
        if !schnorr::verify(
            suite,
            &self.dkg_pubkeys[verifier as usize],
            &response_binding(&self.session_id, dealer, response.inner.status),
            &signature,
        ) {
            return;
        }

        let entry = self.responses.entry(dealer).or_default();
        match entry.get(&verifier) {
            // A justified deal upgrades a complaint; nothing downgrades.
            Some(false) if response.inner.status => {
                entry.insert(verifier, true);
            }
            Some(_) => {}
            None => {
                entry.insert(verifier, response.inner.status);
            }
        }
    }

    /// Whether every dealer's deal has been seen and every verdict is in.
    pub fn complete(&self) -> bool {
        let n = self.addresses.len();
        self.seen.len() == n
            && (0..n as u32).all(|dealer| {
                self.responses
                    .get(&dealer)
                    .map(|verdicts| verdicts.len() == n)
                    .unwrap_or(false)
            })
    }

    pub fn has_bad(&self) -> bool {
        self.responses
            .values()
            .any(|verdicts| verdicts.values().any(|status| !status))
    }

    /// Whether this node has outstanding complaints to answer.
    pub fn is_accused(&self) -> bool {
        self.responses
            .get(&self.my_index)
            .map(|verdicts| verdicts.values().any(|status| !status))
            .unwrap_or(false)
    }

    /// Re-send this dealer's deal to every complainant, together with the
    /// commitment vector, so the complaint can be re-evaluated.
    pub fn justifications<R: RngCore + CryptoRng>(
        &self,
        suite: &EdwardsSuite,
        keys: &NodeKeys,
        rng: &mut R,
    ) -> Result<Vec<(Address, Reshare)>, DkgError> {
        let Some(verdicts) = self.responses.get(&self.my_index) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for (&verifier, &status) in verdicts {
            if status {
                continue;
            }
            let share = self.poly.eval(verifier).value;
            let deal = seal_share(
                suite,
                keys,
                self.my_index,
                &self.dkg_pubkeys[verifier as usize],
                &self.session_id,
                &share,
                &self.commits,
                rng,
            )?;
            out.push((
                self.addresses[verifier as usize].clone(),
                Reshare {
                    deal,
                    public_coeffs: self.commits.commits().to_vec(),
                },
            ));
        }
        Ok(out)
    }

    /// Re-evaluate a dealer's justification. If this node was the
    /// complainant and the re-sent deal verifies, the returned superseding
    /// good response must be broadcast.
    pub fn process_justification<R: RngCore + CryptoRng>(
        &mut self,
        suite: &EdwardsSuite,
        from: &Address,
        reshare: &Reshare,
        rng: &mut R,
    ) -> Result<Option<Response>, DkgError> {
        let dealer = reshare.deal.index;
        let n = self.addresses.len() as u32;
        if dealer >= n || &self.addresses[dealer as usize] != from {
            return Ok(None);
        }
        let complained = self
            .responses
            .get(&dealer)
            .and_then(|verdicts| verdicts.get(&self.my_index))
            == Some(&false);
        if !complained {
            return Ok(None);
        }

        let Some(record) = open_and_verify(
            suite,
            &reshare.deal,
            &self.dkg_pubkeys[dealer as usize],
            &self.dkg_secret,
            &self.session_id,
            self.threshold,
            self.my_index,
        ) else {
            return Ok(None);
        };
        if PublicPoly::new(reshare.public_coeffs.clone()) != record.commits {
            return Ok(None);
        }

        self.deals.insert(dealer, record);
        self.responses
            .entry(dealer)
            .or_default()
            .insert(self.my_index, true);

        Ok(Some(self.build_response(suite, dealer, true, rng)))
    }

    /// Dealers whose good verdicts reach the threshold.
    pub fn qualified(&self) -> Vec<u32> {
        (0..self.addresses.len() as u32)
            .filter(|dealer| {
                self.responses
                    .get(dealer)
                    .map(|verdicts| {
                        verdicts.values().filter(|status| **status).count()
                            >= self.threshold as usize
                    })
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Sum the qualified dealers' contributions into this node's share,
    /// the joint committed polynomial and the distributed key.
    pub fn finalize(&self) -> Result<RoundOutput, DkgError> {
        let qualified = self.qualified();
        if qualified.len() < self.threshold as usize {
            return Err(DkgError::DkgAborted {
                qualified: qualified.len(),
                required: self.threshold as usize,
            });
        }

        let mut share = Scalar::ZERO;
        let mut pub_poly: Option<PublicPoly> = None;
        for dealer in &qualified {
            let record = self.deals.get(dealer).ok_or(DkgError::DkgAborted {
                qualified: qualified.len(),
                required: self.threshold as usize,
            })?;
            share += record.share;
            pub_poly = Some(match pub_poly {
                Some(acc) => acc.add(&record.commits)?,
                None => record.commits.clone(),
            });
        }

        let pub_poly = pub_poly.expect("threshold is at least one");
        Ok(RoundOutput {
            dist_key: pub_poly.constant(),
            pub_poly,
            share: PriShare {
                index: self.my_index,
                value: share,
            },
        })
    }
}

/// The outcome of a resharing round for one node.
pub enum ResharingOutcome {
    /// The node is part of the new committee and holds a fresh share.
    NewShare(RoundOutput),
    /// The node left the committee; it reports the unchanged distributed
    /// key and keeps its old state.
    Departed(EdwardsPoint),
}

/// One node's view of a resharing round. Dealers are the old roster,
/// verifiers the new one; a node present in both plays both roles.
pub struct ResharingRound {
    dkg_secret: Scalar,
    dkg_public: EdwardsPoint,
    session_id: Vec<u8>,
    old_addresses: Vec<Address>,
    old_pubkeys: Vec<EdwardsPoint>,
    new_addresses: Vec<Address>,
    new_pubkeys: Vec<EdwardsPoint>,
    new_threshold: u32,
    my_old_index: Option<u32>,
    my_new_index: Option<u32>,
    old_pub_poly: Option<PublicPoly>,
    old_dist_key: Option<EdwardsPoint>,
    poly: Option<SecretPoly>,
    commits: Option<PublicPoly>,
    claimed_old_poly: Option<PublicPoly>,
    deals: BTreeMap<u32, DealRecord>,
    seen: BTreeSet<u32>,
    responses: BTreeMap<u32, BTreeMap<u32, bool>>,
}

impl ResharingRound {
    pub fn new<R: RngCore + CryptoRng>(
        suite: &EdwardsSuite,
        keys: &NodeKeys,
        message: &StartResharing,
        local: &AuthState,
        rng: &mut R,
    ) -> Result<Self, DkgError> {
        validate_roster(
            &message.addrs_new,
            &message.pubkeys_new,
            None,
            message.threshold_new,
        )?;

        // Existing members use their own certified view of the old
        // committee; fresh joiners rely on what the coordinator sent.
        // The round is already marked as resharing on the local state, so
        // membership is detected by the presence of a certified key.
        let (old_addresses, old_pubkeys, old_threshold, old_pub_poly, old_dist_key) =
            if local.dist_key().is_ok() {
                (
                    local.participants().to_vec(),
                    local.dkg_pubkeys().to_vec(),
                    local.threshold(),
                    Some(local.pub_poly()?),
                    Some(local.dist_key()?),
                )
            } else {
                validate_roster(
                    &message.addrs_old,
                    &message.pubkeys_old,
                    None,
                    message.threshold_old,
                )?;
                (
                    message.addrs_old.clone(),
                    message.pubkeys_old.clone(),
                    message.threshold_old,
                    None,
                    None,
                )
            };

        let my_old_index = old_addresses
            .iter()
            .position(|a| a == &keys.address)
            .map(|i| i as u32);
        let my_new_index = message
            .addrs_new
            .iter()
            .position(|a| a == &keys.address)
            .map(|i| i as u32);
        if my_old_index.is_none() && my_new_index.is_none() {
            return Err(DkgError::RosterInvalid(
                "this node is in neither the old nor the new roster".into(),
            ));
        }

        let mut hasher = Sha256::new();
        hasher.update(b"tdkg:resharing-session:v1");
        hasher.update(old_threshold.to_be_bytes());
        hasher.update(message.threshold_new.to_be_bytes());
        for key in old_pubkeys.iter().chain(&message.pubkeys_new) {
            hasher.update(suite.point_to_bytes(key));
        }
        let session_id = hasher.finalize().to_vec();

        // Dealers redistribute their current share under a fresh
        // polynomial of the new threshold.
        let (poly, commits) = if my_old_index.is_some() {
            let share = local.private_share()?;
            let poly = SecretPoly::with_secret(share.value, message.threshold_new, rng);
            let commits = poly.commit();
            (Some(poly), Some(commits))
        } else {
            (None, None)
        };

        let mut round = Self {
            dkg_secret: keys.dkg_secret,
            dkg_public: keys.dkg_public,
            session_id,
            old_addresses,
            old_pubkeys,
            new_addresses: message.addrs_new.clone(),
            new_pubkeys: message.pubkeys_new.clone(),
            new_threshold: message.threshold_new,
            my_old_index,
            my_new_index,
            old_pub_poly,
            old_dist_key,
            poly,
            commits,
            claimed_old_poly: None,
            deals: BTreeMap::new(),
            seen: BTreeSet::new(),
            responses: BTreeMap::new(),
        };

        // Process this node's own deal locally when it plays both roles.
        if let (Some(old_index), Some(new_index)) = (round.my_old_index, round.my_new_index) {
            let share = round
                .poly
                .as_ref()
                .expect("dealer polynomial present")
                .eval(new_index)
                .value;
            round.deals.insert(
                old_index,
                DealRecord {
                    share,
                    commits: round.commits.clone().expect("dealer commitments present"),
                },
            );
            round.seen.insert(old_index);
            round
                .responses
                .entry(old_index)
                .or_default()
                .insert(new_index, true);
        }

        Ok(round)
    }

    pub fn is_verifier(&self) -> bool {
        self.my_new_index.is_some()
    }

    /// Everyone participating in the session except this node.
    pub fn session_addresses(&self) -> Vec<Address> {
        let mut out: Vec<Address> = Vec::new();
        for address in self.old_addresses.iter().chain(&self.new_addresses) {
            if address != &self.my_address() && !out.contains(address) {
                out.push(address.clone());
            }
        }
        out
    }

    fn my_address(&self) -> Address {
        if let Some(i) = self.my_old_index {
            self.old_addresses[i as usize].clone()
        } else {
            self.new_addresses[self.my_new_index.expect("member of one roster") as usize].clone()
        }
    }

    /// One reshare deal per new-roster verifier (other than this node).
    pub fn outgoing_deals<R: RngCore + CryptoRng>(
        &self,
        suite: &EdwardsSuite,
        keys: &NodeKeys,
        rng: &mut R,
    ) -> Result<Vec<(Address, Reshare)>, DkgError> {
        let Some(old_index) = self.my_old_index else {
            return Ok(Vec::new());
        };
        let poly = self.poly.as_ref().expect("dealer polynomial present");
        let commits = self.commits.as_ref().expect("dealer commitments present");
        let old_coeffs = self
            .old_pub_poly
            .as_ref()
            .expect("dealers know the old polynomial")
            .commits()
            .to_vec();

        let mut out = Vec::new();
        for (i, address) in self.new_addresses.iter().enumerate() {
            let index = i as u32;
            if Some(index) == self.my_new_index {
                continue;
            }
            let share = poly.eval(index).value;
            let deal = seal_share(
                suite,
                keys,
                old_index,
                &self.new_pubkeys[i],
                &self.session_id,
                &share,
                commits,
                rng,
            )?;
            out.push((
                address.clone(),
                Reshare {
                    deal,
                    public_coeffs: old_coeffs.clone(),
                },
            ));
        }
        Ok(out)
    }

    /// Handle one incoming reshare deal (verifiers only).
    pub fn process_reshare<R: RngCore + CryptoRng>(
        &mut self,
        suite: &EdwardsSuite,
        from: &Address,
        reshare: &Reshare,
        rng: &mut R,
    ) -> Result<Option<Response>, DkgError> {
        let Some(my_new_index) = self.my_new_index else {
            return Ok(None);
        };
        let dealer = reshare.deal.index;
        let n_old = self.old_addresses.len() as u32;
        if dealer >= n_old {
            return Err(DkgError::DealInvalid(format!(
                "dealer index {dealer} out of range"
            )));
        }
        if &self.old_addresses[dealer as usize] != from {
            return Err(DkgError::DealInvalid(format!(
                "reshare deal from {from} claims index {dealer}"
            )));
        }
        if !self.seen.insert(dealer) {
            return Ok(None);
        }

        let status = self.verify_reshare(suite, dealer, reshare, my_new_index);
        self.responses
            .entry(dealer)
            .or_default()
            .insert(my_new_index, status);

        Ok(Some(self.build_response(suite, dealer, status, my_new_index, rng)))
    }

    fn verify_reshare(
        &mut self,
        suite: &EdwardsSuite,
        dealer: u32,
        reshare: &Reshare,
        my_new_index: u32,
    ) -> bool {
        let Some(record) = open_and_verify(
            suite,
            &reshare.deal,
            &self.old_pubkeys[dealer as usize],
            &self.dkg_secret,
            &self.session_id,
            self.new_threshold,
            my_new_index,
        ) else {
            return false;
        };

        // The dealer's fresh constant term must commit to its old share,
        // i.e. match the old committed polynomial at the dealer's index.
        let claimed = PublicPoly::new(reshare.public_coeffs.clone());
        let reference = match &self.old_pub_poly {
            Some(known) => {
                if known != &claimed {
                    return false;
                }
                known.clone()
            }
            None => match &self.claimed_old_poly {
                Some(previous) => {
                    if previous != &claimed {
                        return false;
                    }
                    claimed
                }
                None => {
                    self.claimed_old_poly = Some(claimed.clone());
                    claimed
                }
            },
        };
        if record.commits.constant() != reference.eval(dealer).value {
            return false;
        }

        self.deals.insert(dealer, record);
        true
    }

    fn build_response<R: RngCore + CryptoRng>(
        &self,
        suite: &EdwardsSuite,
        dealer: u32,
        status: bool,
        my_new_index: u32,
        rng: &mut R,
    ) -> Response {
        let signature = schnorr::sign(
            suite,
            &self.dkg_secret,
            &self.dkg_public,
            &response_binding(&self.session_id, dealer, status),
            rng,
        )
        .to_bytes();
        Response {
            index: dealer,
            inner: DealerResponse {
                index: my_new_index,
                status,
                session_id: self.session_id.clone(),
                signature,
            },
        }
    }

    /// Record a new-roster verifier's verdict on one old dealer.
    pub fn record_response(&mut self, suite: &EdwardsSuite, from: &Address, response: &Response) {
        let dealer = response.index;
        let verifier = response.inner.index;
        if dealer >= self.old_addresses.len() as u32
            || verifier >= self.new_addresses.len() as u32
        {
            return;
        }
        if &self.new_addresses[verifier as usize] != from {
            return;
        }
        if response.inner.session_id != self.session_id {
            return;
        }
        let Ok(signature) = schnorr::Signature::from_bytes(suite, &response.inner.signature)
        else {
            return;
        };
        if !schnorr::verify(
            suite,
            &self.new_pubkeys[verifier as usize],
            &response_binding(&self.session_id, dealer, response.inner.status),
            &signature,
        ) {
            return;
        }

        self.responses
            .entry(dealer)
            .or_default()
            .entry(verifier)
            .or_insert(response.inner.status);
    }

    /// Whether every dealer has a verdict from every verifier (and, for
    /// verifiers, every deal has arrived).
    pub fn complete(&self) -> bool {
        let n_old = self.old_addresses.len();
        let n_new = self.new_addresses.len();
        if self.is_verifier() && self.seen.len() != n_old {
            return false;
        }
        (0..n_old as u32).all(|dealer| {
            self.responses
                .get(&dealer)
                .map(|verdicts| verdicts.len() == n_new)
                .unwrap_or(false)
        })
    }

    /// Recombine the dealers' contributions. The redistribution requires
    /// every old dealer to be endorsed by the whole new committee.
    pub fn finalize(&self) -> Result<ResharingOutcome, DkgError> {
        let n_old = self.old_addresses.len();
        let good_dealers = (0..n_old as u32)
            .filter(|dealer| {
                self.responses
                    .get(dealer)
                    .map(|verdicts| verdicts.values().all(|status| *status))
                    .unwrap_or(false)
            })
            .count();
        if good_dealers != n_old {
            return Err(DkgError::DkgAborted {
                qualified: good_dealers,
                required: n_old,
            });
        }

        let Some(my_new_index) = self.my_new_index else {
            // A departing member only confirms that the key survived.
            return Ok(ResharingOutcome::Departed(
                self.old_dist_key.expect("departing members are certified"),
            ));
        };

        let dealer_indices: Vec<u32> = (0..n_old as u32).collect();
        let basis = lagrange_at_zero(&dealer_indices)?;

        let mut share = Scalar::ZERO;
        let mut pub_poly: Option<PublicPoly> = None;
        for (dealer, lambda) in dealer_indices.iter().zip(&basis) {
            let record = self.deals.get(dealer).ok_or(DkgError::DkgAborted {
                qualified: good_dealers,
                required: n_old,
            })?;
            share += record.share * lambda;
            let scaled = record.commits.scale(lambda);
            pub_poly = Some(match pub_poly {
                Some(acc) => acc.add(&scaled)?,
                None => scaled,
            });
        }

        let pub_poly = pub_poly.expect("old roster is never empty");
        let dist_key = pub_poly.constant();
        if let Some(previous) = self.old_dist_key {
            if previous != dist_key {
                return Err(DkgError::ResharingInconsistent(
                    "recombined key differs from the certified key".into(),
                ));
            }
        }

        Ok(ResharingOutcome::NewShare(RoundOutput {
            dist_key,
            pub_poly,
            share: PriShare {
                index: my_new_index,
                value: share,
            },
        }))
    }

    pub fn new_roster(&self) -> (Vec<Address>, Vec<EdwardsPoint>, u32) {
        (
            self.new_addresses.clone(),
            self.new_pubkeys.clone(),
            self.new_threshold,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::poly::recover_secret;
    use crate::suite::CurveContext;
    use rand::rngs::OsRng;

    fn committee(n: usize) -> (Vec<NodeKeys>, Start) {
        let ctx = CurveContext::new();
        let keys: Vec<NodeKeys> = (0..n)
            .map(|i| NodeKeys::generate(&ctx, Address::new(format!("node-{i}")), &mut OsRng))
            .collect();
        let start = Start {
            threshold: n as u32,
            addresses: keys.iter().map(|k| k.address.clone()).collect(),
            dkg_pubkeys: keys.iter().map(|k| k.dkg_public).collect(),
            bdn_pubkeys: keys.iter().map(|k| k.bdn.public).collect(),
        };
        (keys, start)
    }

    /// Run a full round by hand, exchanging deals and responses directly.
    fn run_round(keys: &[NodeKeys], start: &Start) -> Vec<RoundOutput> {
        let suite = EdwardsSuite;
        let mut rounds: Vec<SetupRound> = keys
            .iter()
            .map(|k| SetupRound::new(&suite, k, start, &mut OsRng).unwrap())
            .collect();

        let mut deals = Vec::new();
        for (i, round) in rounds.iter().enumerate() {
            for (to, deal) in round.outgoing_deals(&suite, &keys[i], &mut OsRng).unwrap() {
                deals.push((keys[i].address.clone(), to, deal));
            }
        }

        let mut responses = Vec::new();
        for (from, to, deal) in &deals {
            let target = rounds
                .iter_mut()
                .enumerate()
                .find(|(i, _)| &keys[*i].address == to)
                .map(|(_, r)| r)
                .unwrap();
            if let Some(response) = target.process_deal(&suite, from, deal, &mut OsRng).unwrap()
            {
                responses.push((to.clone(), response));
            }
        }

        for (from, response) in &responses {
            for (i, round) in rounds.iter_mut().enumerate() {
                if &keys[i].address != from {
                    round.record_response(&suite, from, response);
                }
            }
        }

        rounds
            .iter()
            .for_each(|round| assert!(round.complete() && !round.has_bad()));
        rounds.iter().map(|r| r.finalize().unwrap()).collect()
    }

    #[test]
    fn full_round_certifies_one_key() {
        let (keys, start) = committee(3);
        let outputs = run_round(&keys, &start);

        let dist_key = outputs[0].dist_key;
        assert!(outputs.iter().all(|o| o.dist_key == dist_key));

        // Any threshold-sized subset of shares reconstructs the secret
        // behind the distributed key.
        let shares: Vec<PriShare> = outputs.iter().map(|o| o.share.clone()).collect();
        let secret = recover_secret(&shares).unwrap();
        assert_eq!(EdwardsPoint::mul_base(&secret), dist_key);
    }

    #[test]
    fn own_address_missing_from_roster_fails() {
        let (keys, start) = committee(3);
        let outsider = NodeKeys::generate(
            &CurveContext::new(),
            Address::new("outsider"),
            &mut OsRng,
        );
        let err = SetupRound::new(&EdwardsSuite, &outsider, &start, &mut OsRng).unwrap_err();
        assert!(matches!(err, DkgError::RosterInvalid(_)));
    }

    #[test]
    fn tampered_deal_draws_a_bad_response_then_justification_repairs_it() {
        let suite = EdwardsSuite;
        let (keys, start) = committee(3);
        let mut rounds: Vec<SetupRound> = keys
            .iter()
            .map(|k| SetupRound::new(&suite, k, &start, &mut OsRng).unwrap())
            .collect();

        let mut deals: Vec<(Address, Address, Deal)> = Vec::new();
        for (i, round) in rounds.iter().enumerate() {
            for (to, deal) in round.outgoing_deals(&suite, &keys[i], &mut OsRng).unwrap() {
                deals.push((keys[i].address.clone(), to, deal));
            }
        }

        // Corrupt the ciphertext of node 0's deal to node 1 in transit.
        let victim = deals
            .iter_mut()
            .find(|(from, to, _)| from == &keys[0].address && to == &keys[1].address)
            .unwrap();
        victim.2.encrypted_deal.cipher[0] ^= 0xFF;

        let mut responses = Vec::new();
        for (from, to, deal) in &deals {
            let idx = keys.iter().position(|k| &k.address == to).unwrap();
            if let Some(response) =
                rounds[idx].process_deal(&suite, from, deal, &mut OsRng).unwrap()
            {
                responses.push((to.clone(), response));
            }
        }
        for (from, response) in &responses {
            for (i, round) in rounds.iter_mut().enumerate() {
                if &keys[i].address != from {
                    round.record_response(&suite, from, response);
                }
            }
        }

        assert!(rounds.iter().all(|r| r.complete()));
        assert!(rounds.iter().all(|r| r.has_bad()));
        assert!(rounds[0].is_accused());

        // Dealer 0 justifies towards the complainant; the superseding good
        // response clears the complaint everywhere.
        let justifications = rounds[0].justifications(&suite, &keys[0], &mut OsRng).unwrap();
        assert_eq!(justifications.len(), 1);
        let (to, reshare) = &justifications[0];
        assert_eq!(to, &keys[1].address);

        let superseding = rounds[1]
            .process_justification(&suite, &keys[0].address, reshare, &mut OsRng)
            .unwrap()
            .expect("complainant accepts the justification");
        for (i, round) in rounds.iter_mut().enumerate() {
            if i != 1 {
                round.record_response(&suite, &keys[1].address, &superseding);
            }
        }

        assert!(rounds.iter().all(|r| !r.has_bad()));
        let outputs: Vec<RoundOutput> = rounds.iter().map(|r| r.finalize().unwrap()).collect();
        let dist_key = outputs[0].dist_key;
        assert!(outputs.iter().all(|o| o.dist_key == dist_key));
    }

    #[test]
    fn resharing_preserves_the_distributed_key() {
        let suite = EdwardsSuite;
        let ctx = CurveContext::new();
        let (keys, start) = committee(3);
        let outputs = run_round(&keys, &start);
        let dist_key = outputs[0].dist_key;

        // One fresh joiner; everyone else stays.
        let joiner = NodeKeys::generate(&ctx, Address::new("node-3"), &mut OsRng);
        let mut all_keys: Vec<&NodeKeys> = keys.iter().collect();
        all_keys.push(&joiner);

        let states: Vec<AuthState> = outputs
            .iter()
            .map(|o| {
                AuthState::restore(
                    start.addresses.clone(),
                    start.dkg_pubkeys.clone(),
                    start.bdn_pubkeys.clone(),
                    start.threshold,
                    o.dist_key,
                    o.pub_poly.clone(),
                    o.share.clone(),
                )
            })
            .collect();
        let joiner_state = AuthState::new();

        let new_addresses: Vec<Address> =
            all_keys.iter().map(|k| k.address.clone()).collect();
        let new_pubkeys: Vec<EdwardsPoint> = all_keys.iter().map(|k| k.dkg_public).collect();

        let to_old = StartResharing {
            threshold_new: 3,
            threshold_old: 0,
            addrs_new: new_addresses.clone(),
            addrs_old: Vec::new(),
            pubkeys_new: new_pubkeys.clone(),
            pubkeys_old: Vec::new(),
        };
        let to_new = StartResharing {
            threshold_new: 3,
            threshold_old: start.threshold,
            addrs_new: new_addresses.clone(),
            addrs_old: start.addresses.clone(),
            pubkeys_new: new_pubkeys.clone(),
            pubkeys_old: start.dkg_pubkeys.clone(),
        };

        let mut rounds: Vec<ResharingRound> = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            rounds.push(ResharingRound::new(&suite, key, &to_old, &states[i], &mut OsRng).unwrap());
        }
        rounds.push(ResharingRound::new(&suite, &joiner, &to_new, &joiner_state, &mut OsRng).unwrap());

        let mut deals = Vec::new();
        for (i, round) in rounds.iter().enumerate() {
            for (to, reshare) in round.outgoing_deals(&suite, all_keys[i], &mut OsRng).unwrap() {
                deals.push((all_keys[i].address.clone(), to, reshare));
            }
        }

        let mut responses = Vec::new();
        for (from, to, reshare) in &deals {
            let idx = all_keys.iter().position(|k| &k.address == to).unwrap();
            if let Some(response) =
                rounds[idx].process_reshare(&suite, from, reshare, &mut OsRng).unwrap()
            {
                responses.push((to.clone(), response));
            }
        }
        for (from, response) in &responses {
            for (i, round) in rounds.iter_mut().enumerate() {
                if &all_keys[i].address != from {
                    round.record_response(&suite, from, response);
                }
            }
        }

        assert!(rounds.iter().all(|r| r.complete()));

        let mut new_shares = Vec::new();
        for round in &rounds {
            match round.finalize().unwrap() {
                ResharingOutcome::NewShare(output) => {
                    assert_eq!(output.dist_key, dist_key);
                    new_shares.push(output.share);
                }
                ResharingOutcome::Departed(key) => assert_eq!(key, dist_key),
            }
        }
        assert_eq!(new_shares.len(), 4);

        // Any three of the four new shares still reconstruct the secret.
        let secret = recover_secret(&new_shares[..3]).unwrap();
        assert_eq!(EdwardsPoint::mul_base(&secret), dist_key);
    }
}
