//! A participant node: long-term identity keys, shared state and the
//! listening loop that turns incoming streams into handler sessions.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use blstrs::G2Projective;
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use rand::{CryptoRng, RngCore};
use tracing::{debug, warn};

use crate::crypto::bdn::BdnKeyPair;
use crate::dkg::actor::Actor;
use crate::dkg::handler::NodeHandler;
use crate::dkg::state::AuthState;
use crate::network::memory::MemoryRouter;
use crate::network::messages::Address;
use crate::network::transport::Rpc;
use crate::suite::CurveContext;

/// A node's long-term key material.
pub struct NodeKeys {
    pub address: Address,
    pub dkg_secret: Scalar,
    pub dkg_public: EdwardsPoint,
    pub bdn: BdnKeyPair,
}

impl NodeKeys {
    pub fn generate<R: RngCore + CryptoRng>(
        ctx: &CurveContext,
        address: Address,
        rng: &mut R,
    ) -> Self {
        let (dkg_secret, dkg_public) = ctx.edwards.keygen(rng);
        let bdn = BdnKeyPair::generate(&ctx.pairing, rng);
        Self {
            address,
            dkg_secret,
            dkg_public,
            bdn,
        }
    }
}

/// One DKG participant.
pub struct DkgNode {
    ctx: CurveContext,
    keys: Arc<NodeKeys>,
    state: Arc<Mutex<AuthState>>,
}

impl DkgNode {
    /// Create a node with fresh identity keys.
    pub fn new<R: RngCore + CryptoRng>(ctx: CurveContext, address: Address, rng: &mut R) -> Self {
        let keys = NodeKeys::generate(&ctx, address, rng);
        Self::with_keys(ctx, keys)
    }

    /// Create a node from existing key material (restored identities).
    pub fn with_keys(ctx: CurveContext, keys: NodeKeys) -> Self {
        Self {
            ctx,
            keys: Arc::new(keys),
            state: Arc::new(Mutex::new(AuthState::new())),
        }
    }

    pub fn address(&self) -> &Address {
        &self.keys.address
    }

    pub fn keys(&self) -> &NodeKeys {
        &self.keys
    }

    pub fn dkg_public_key(&self) -> EdwardsPoint {
        self.keys.dkg_public
    }

    pub fn bdn_public_key(&self) -> G2Projective {
        self.keys.bdn.public
    }

    /// The node's shared protocol state, also mutated by its handlers.
    pub fn state(&self) -> Arc<Mutex<AuthState>> {
        self.state.clone()
    }

    /// Replace the node's state with a restored one (operator tooling).
    pub fn restore_state(&self, state: AuthState) {
        *self.state.lock().expect("state lock poisoned") = state;
    }

    /// Start serving streams from the router and return the local
    /// coordinator handle.
    ///
    /// Every incoming stream gets its own handler session; handlers share
    /// the node's [`AuthState`] behind the mutex. The returned
    /// [`Actor`] drives protocol operations through the same router.
    pub fn listen(&self, router: &MemoryRouter) -> Actor {
        let sessions: mpsc::Receiver<_> = router.register(self.keys.address.clone());

        let ctx = self.ctx;
        let keys = self.keys.clone();
        let state = self.state.clone();
        let address = self.keys.address.clone();
        thread::spawn(move || {
            while let Ok(stream) = sessions.recv() {
                let handler = NodeHandler::new(ctx, keys.clone(), state.clone());
                let address = address.clone();
                thread::spawn(move || {
                    debug!(node = %address, "handler session started");
                    if let Err(err) = handler.serve(stream) {
                        warn!(node = %address, %err, "handler session failed");
                    }
                });
            }
        });

        let rpc: Arc<dyn Rpc> = Arc::new(router.clone());
        Actor::new(self.ctx, rpc, self.state.clone())
    }
}
