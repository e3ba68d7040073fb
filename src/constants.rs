//! Protocol-wide constants.

use std::time::Duration;

/// Hard deadline for a full DKG setup round.
pub const SETUP_TIMEOUT: Duration = Duration::from_secs(50 * 60);
/// Hard deadline for a decryption or signing fan-out.
pub const DECRYPT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Hard deadline for a resharing round.
pub const RESHARING_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// How long nodes wait for accused dealers to justify before disqualifying.
pub const JUSTIFICATION_WINDOW: Duration = Duration::from_secs(5);

/// Protocol labels recorded on the coordinator's operation spans.
pub const PROTOCOL_SETUP: &str = "dkg-setup";
pub const PROTOCOL_DECRYPT: &str = "dkg-decrypt";
pub const PROTOCOL_RESHARING: &str = "dkg-resharing";

/// Domain separation tags.
pub const DEAL_SEAL_INFO: &[u8] = b"tdkg:deal-seal:v1";
pub const BDN_COEFF_TAG: &[u8] = b"tdkg:bdn-coeff:v1";
pub const BDN_SIG_DST: &[u8] = b"TDKG-BDN-SIG:BLS12381G1_XMD:SHA-256_SSWU_RO_";
