//! Helpers for spinning an in-process committee.

use blstrs::G2Projective;
use curve25519_dalek::edwards::EdwardsPoint;
use rand::rngs::OsRng;
use rand::RngCore;

use tdkg::{Actor, Address, CurveContext, DkgError, DkgNode, MemoryRouter};

/// A committee of nodes listening on one in-memory router.
pub struct Committee {
    pub ctx: CurveContext,
    pub router: MemoryRouter,
    pub nodes: Vec<DkgNode>,
    pub actors: Vec<Actor>,
}

impl Committee {
    /// Spin up `n` nodes with fresh identities.
    pub fn spin(n: usize) -> Self {
        let ctx = CurveContext::new();
        let router = MemoryRouter::new();
        let nodes: Vec<DkgNode> = (0..n)
            .map(|i| DkgNode::new(ctx, Address::new(format!("127.0.0.1:{}", 2000 + i)), &mut OsRng))
            .collect();
        let actors: Vec<Actor> = nodes.iter().map(|n| n.listen(&router)).collect();
        Self {
            ctx,
            router,
            nodes,
            actors,
        }
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.nodes.iter().map(|n| n.address().clone()).collect()
    }

    pub fn dkg_pubkeys(&self) -> Vec<EdwardsPoint> {
        self.nodes.iter().map(|n| n.dkg_public_key()).collect()
    }

    pub fn bdn_pubkeys(&self) -> Vec<G2Projective> {
        self.nodes.iter().map(|n| n.bdn_public_key()).collect()
    }

    /// Run the initial DKG through the first actor.
    pub fn setup(&self, threshold: u32) -> Result<EdwardsPoint, DkgError> {
        self.actors[0].setup(
            &self.addresses(),
            &self.dkg_pubkeys(),
            &self.bdn_pubkeys(),
            threshold,
        )
    }

    /// Add a fresh node to the router without touching the roster.
    pub fn join_node(&mut self, address: &str) -> usize {
        let node = DkgNode::new(self.ctx, Address::new(address), &mut OsRng);
        let actor = node.listen(&self.router);
        self.nodes.push(node);
        self.actors.push(actor);
        self.nodes.len() - 1
    }
}

/// A second generator for verifiable encryption, independent of the base
/// point.
pub fn gbar(ctx: &CurveContext) -> EdwardsPoint {
    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let (point, _) = ctx.edwards.embed(&seed, &mut OsRng).expect("embedding succeeds");
    point
}
