//! Pedersen DKG with threshold ElGamal decryption and BDN credentials.
//!
//! A committee of nodes jointly generates an ElGamal key pair whose
//! private key never exists in one place: each node holds a share of a
//! random polynomial's secret. Any client can encrypt against the
//! distributed key locally; decryption streams the ciphertext to the
//! committee and recombines the nodes' shares by Lagrange interpolation.
//! The same committee issues aggregate BDN credentials over a pairing
//! curve, with rogue-key-safe aggregation.
//!
//! # Layout
//!
//! - [`suite`]: the two curve suites behind one [`CurveContext`]
//! - [`crypto`]: polynomials, Schnorr, deal sealing, ElGamal, proofs, BDN
//! - [`dkg`]: node state machine, round engines, the coordinator
//! - [`network`]: wire messages, transcript codec, stream transport
//! - [`scheduler`]: bounded worker pool for batch decryption
//! - [`store`]: snapshot surface consumed by the external contracts
//! - [`cli`]: the operator tool
//!
//! # Quick start
//!
//! ```no_run
//! use rand::rngs::OsRng;
//! use tdkg::{Address, CurveContext, DkgNode, MemoryRouter};
//!
//! let ctx = CurveContext::new();
//! let router = MemoryRouter::new();
//!
//! let nodes: Vec<DkgNode> = (0..3)
//!     .map(|i| DkgNode::new(ctx, Address::new(format!("node-{i}")), &mut OsRng))
//!     .collect();
//! let actors: Vec<_> = nodes.iter().map(|n| n.listen(&router)).collect();
//!
//! let addresses: Vec<Address> = nodes.iter().map(|n| n.address().clone()).collect();
//! let dkg_keys: Vec<_> = nodes.iter().map(|n| n.dkg_public_key()).collect();
//! let bdn_keys: Vec<_> = nodes.iter().map(|n| n.bdn_public_key()).collect();
//!
//! let public_key = actors[0].setup(&addresses, &dkg_keys, &bdn_keys, 3)?;
//! let (ciphertext, _) = actors[0].encrypt(b"Hello world")?;
//! assert_eq!(actors[0].decrypt(&ciphertext)?, b"Hello world");
//! # let _ = public_key;
//! # Ok::<(), tdkg::DkgError>(())
//! ```

pub mod cli;
pub mod constants;
pub mod crypto;
pub mod dkg;
pub mod errors;
pub mod network;
pub mod scheduler;
pub mod store;
pub mod suite;

pub use crypto::bdn::{BdnKeyPair, Mask};
pub use crypto::elgamal::ElGamalPair;
pub use crypto::poly::{PriShare, PubShare, PublicPoly, SecretPoly};
pub use crypto::proofs::{ShareAndProof, VerifiableCiphertext};
pub use dkg::actor::Actor;
pub use dkg::node::{DkgNode, NodeKeys};
pub use dkg::state::{AuthState, DkgState};
pub use errors::{DkgError, ErrorKind};
pub use network::memory::MemoryRouter;
pub use network::messages::{Address, ProtocolMessage};
pub use store::{MemorySnapshot, Snapshot};
pub use suite::{CurveContext, EMBED_LEN};
