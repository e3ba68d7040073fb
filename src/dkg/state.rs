//! Per-node long-lived DKG state.
//!
//! One [`AuthState`] lives behind a mutex on every node, shared between
//! the stream handlers and the local coordinator handle. It is created in
//! `Initial`, moves to `Sharing` on a start message, reaches `Certified`
//! when the round completes and may re-enter `Resharing` later. A node
//! never rolls a certified state back.

use blstrs::G2Projective;
use curve25519_dalek::edwards::EdwardsPoint;

use crate::crypto::poly::{PriShare, PublicPoly};
use crate::errors::DkgError;
use crate::network::messages::Address;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DkgState {
    Initial,
    Sharing,
    Certified,
    Resharing,
}

/// Validate a roster against the shared invariants: parallel key lists,
/// unique addresses and a threshold within `1..=n`.
pub fn validate_roster(
    addresses: &[Address],
    dkg_pubkeys: &[EdwardsPoint],
    bdn_pubkeys: Option<&[G2Projective]>,
    threshold: u32,
) -> Result<(), DkgError> {
    let n = addresses.len();
    if n == 0 {
        return Err(DkgError::RosterInvalid("empty roster".into()));
    }
    if dkg_pubkeys.len() != n {
        return Err(DkgError::RosterInvalid(format!(
            "{} addresses but {} dkg keys",
            n,
            dkg_pubkeys.len()
        )));
    }
    if let Some(bdn) = bdn_pubkeys {
        if bdn.len() != n {
            return Err(DkgError::RosterInvalid(format!(
                "{} addresses but {} bdn keys",
                n,
                bdn.len()
            )));
        }
    }
    for (i, address) in addresses.iter().enumerate() {
        if addresses[..i].contains(address) {
            return Err(DkgError::RosterInvalid(format!(
                "duplicate address {address}"
            )));
        }
    }
    if threshold == 0 || threshold as usize > n {
        return Err(DkgError::RosterInvalid(format!(
            "threshold {threshold} out of range for {n} participants"
        )));
    }
    Ok(())
}

pub struct AuthState {
    state: DkgState,
    threshold: u32,
    participants: Vec<Address>,
    dkg_pubkeys: Vec<EdwardsPoint>,
    bdn_pubkeys: Vec<G2Projective>,
    dist_key: Option<EdwardsPoint>,
    pub_poly: Option<PublicPoly>,
    private_share: Option<PriShare>,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            state: DkgState::Initial,
            threshold: 0,
            participants: Vec::new(),
            dkg_pubkeys: Vec::new(),
            bdn_pubkeys: Vec::new(),
            dist_key: None,
            pub_poly: None,
            private_share: None,
        }
    }

    pub fn state(&self) -> DkgState {
        self.state
    }

    /// Whether a distributed key is available.
    pub fn done(&self) -> bool {
        self.state == DkgState::Certified
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn participants(&self) -> &[Address] {
        &self.participants
    }

    pub fn dkg_pubkeys(&self) -> &[EdwardsPoint] {
        &self.dkg_pubkeys
    }

    pub fn bdn_pubkeys(&self) -> &[G2Projective] {
        &self.bdn_pubkeys
    }

    pub fn index_of(&self, address: &Address) -> Option<u32> {
        self.participants
            .iter()
            .position(|a| a == address)
            .map(|i| i as u32)
    }

    pub fn dist_key(&self) -> Result<EdwardsPoint, DkgError> {
        self.dist_key.ok_or_else(|| {
            DkgError::State("dkg has not been initialized, call setup first".into())
        })
    }

    pub fn pub_poly(&self) -> Result<PublicPoly, DkgError> {
        self.pub_poly.clone().ok_or_else(|| {
            DkgError::State("dkg has not been initialized, call setup first".into())
        })
    }

    pub fn private_share(&self) -> Result<PriShare, DkgError> {
        self.private_share.clone().ok_or_else(|| {
            DkgError::State("dkg has not been initialized, call setup first".into())
        })
    }

    /// Enter the sharing phase of the initial round.
    pub fn begin_sharing(&mut self) -> Result<(), DkgError> {
        match self.state {
            DkgState::Initial => {
                self.state = DkgState::Sharing;
                Ok(())
            }
            other => Err(DkgError::State(format!(
                "cannot start sharing from {other:?}"
            ))),
        }
    }

    /// Enter a resharing round, either as an existing member or as a node
    /// joining the committee fresh.
    pub fn begin_resharing(&mut self) -> Result<(), DkgError> {
        match self.state {
            DkgState::Initial | DkgState::Certified => {
                self.state = DkgState::Resharing;
                Ok(())
            }
            other => Err(DkgError::State(format!(
                "cannot start resharing from {other:?}"
            ))),
        }
    }

    /// Drop an in-flight round after a failure. A previously certified key
    /// survives; a first-round failure returns to `Initial`.
    pub fn abort_round(&mut self) {
        self.state = if self.dist_key.is_some() {
            DkgState::Certified
        } else {
            DkgState::Initial
        };
    }

    /// Commit the outcome of a certified round.
    ///
    /// Resharing only refreshes the Edwards-side roster; the BDN roster
    /// from the original setup is kept when the caller passes no
    /// replacement.
    pub fn certify(
        &mut self,
        participants: Vec<Address>,
        dkg_pubkeys: Vec<EdwardsPoint>,
        bdn_pubkeys: Option<Vec<G2Projective>>,
        threshold: u32,
        dist_key: EdwardsPoint,
        pub_poly: PublicPoly,
        private_share: PriShare,
    ) {
        self.participants = participants;
        self.dkg_pubkeys = dkg_pubkeys;
        if let Some(bdn) = bdn_pubkeys {
            self.bdn_pubkeys = bdn;
        }
        self.threshold = threshold;
        self.dist_key = Some(dist_key);
        self.pub_poly = Some(pub_poly);
        self.private_share = Some(private_share);
        self.state = DkgState::Certified;
    }

    /// Rebuild a certified state from persisted key material.
    pub fn restore(
        participants: Vec<Address>,
        dkg_pubkeys: Vec<EdwardsPoint>,
        bdn_pubkeys: Vec<G2Projective>,
        threshold: u32,
        dist_key: EdwardsPoint,
        pub_poly: PublicPoly,
        private_share: PriShare,
    ) -> Self {
        let mut state = Self::new();
        state.certify(
            participants,
            dkg_pubkeys,
            Some(bdn_pubkeys),
            threshold,
            dist_key,
            pub_poly,
            private_share,
        );
        state
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::poly::SecretPoly;
    use crate::suite::EdwardsSuite;
    use rand::rngs::OsRng;

    fn roster(n: usize) -> (Vec<Address>, Vec<EdwardsPoint>) {
        let suite = EdwardsSuite;
        let addresses = (0..n).map(|i| Address::new(format!("node-{i}"))).collect();
        let keys = (0..n)
            .map(|_| suite.base_mul(&suite.random_scalar(&mut OsRng)))
            .collect();
        (addresses, keys)
    }

    #[test]
    fn roster_validation() {
        let (addresses, keys) = roster(3);
        validate_roster(&addresses, &keys, None, 3).unwrap();
        validate_roster(&addresses, &keys, None, 1).unwrap();

        assert!(validate_roster(&addresses, &keys, None, 0).is_err());
        assert!(validate_roster(&addresses, &keys, None, 4).is_err());
        assert!(validate_roster(&addresses, &keys[..2], None, 2).is_err());

        let mut dup = addresses.clone();
        dup[2] = dup[0].clone();
        assert!(validate_roster(&dup, &keys, None, 2).is_err());
    }

    #[test]
    fn lifecycle_never_rolls_back() {
        let mut state = AuthState::new();
        assert_eq!(state.state(), DkgState::Initial);
        assert!(state.dist_key().is_err());

        state.begin_sharing().unwrap();
        assert!(state.begin_sharing().is_err());

        let (addresses, keys) = roster(2);
        let poly = SecretPoly::random(2, &mut OsRng);
        state.certify(
            addresses,
            keys,
            None,
            2,
            poly.commit().constant(),
            poly.commit(),
            poly.eval(0),
        );
        assert!(state.done());

        // A failed later round falls back to the certified key.
        state.begin_resharing().unwrap();
        state.abort_round();
        assert!(state.done());
        assert!(state.dist_key().is_ok());
    }
}
