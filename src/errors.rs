//! Error type shared across the DKG service.

use std::error::Error;
use std::fmt;

/// Coarse error classification. Operations report a [`DkgError`]; callers
/// that only care about the family of failure can branch on the kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed roster, missing argument, bad encoding.
    Config,
    /// Deal/response/justification semantic violations.
    Protocol,
    /// Signature or proof verification failures, recovery failures.
    Crypto,
    /// Operation attempted in the wrong state.
    State,
    /// Phase deadline exceeded; no partial result.
    Timeout,
    /// Stream creation, send or receive failures.
    Transport,
}

/// DKG-specific error type.
#[derive(Debug)]
pub enum DkgError {
    Config(String),
    Protocol(String),
    RosterInvalid(String),
    DealInvalid(String),
    DkgAborted { qualified: usize, required: usize },
    Crypto(String),
    ProofInvalid(String),
    CredentialInvalid(String),
    RecoveryShort { required: usize, provided: usize },
    State(String),
    SetupAlreadyDone,
    SetupInconsistent(String),
    ResharingInconsistent(String),
    DuplicateIdentity(String),
    Timeout(&'static str),
    Transport(String),
}

impl DkgError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DkgError::Config(_) => ErrorKind::Config,
            DkgError::Protocol(_)
            | DkgError::RosterInvalid(_)
            | DkgError::DealInvalid(_)
            | DkgError::DkgAborted { .. } => ErrorKind::Protocol,
            DkgError::Crypto(_)
            | DkgError::ProofInvalid(_)
            | DkgError::CredentialInvalid(_)
            | DkgError::RecoveryShort { .. } => ErrorKind::Crypto,
            DkgError::State(_)
            | DkgError::SetupAlreadyDone
            | DkgError::SetupInconsistent(_)
            | DkgError::ResharingInconsistent(_)
            | DkgError::DuplicateIdentity(_) => ErrorKind::State,
            DkgError::Timeout(_) => ErrorKind::Timeout,
            DkgError::Transport(_) => ErrorKind::Transport,
        }
    }
}

impl fmt::Display for DkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DkgError::Config(msg) => write!(f, "invalid configuration: {msg}"),
            DkgError::Protocol(msg) => write!(f, "protocol violation: {msg}"),
            DkgError::RosterInvalid(msg) => write!(f, "invalid roster: {msg}"),
            DkgError::DealInvalid(msg) => write!(f, "invalid deal: {msg}"),
            DkgError::DkgAborted {
                qualified,
                required,
            } => write!(
                f,
                "dkg aborted: {qualified} qualified dealers, {required} required"
            ),
            DkgError::Crypto(msg) => write!(f, "crypto failure: {msg}"),
            DkgError::ProofInvalid(msg) => write!(f, "invalid proof: {msg}"),
            DkgError::CredentialInvalid(msg) => write!(f, "invalid credential: {msg}"),
            DkgError::RecoveryShort {
                required,
                provided,
            } => write!(
                f,
                "not enough shares to recover: {provided} provided, {required} required"
            ),
            DkgError::State(msg) => write!(f, "wrong state: {msg}"),
            DkgError::SetupAlreadyDone => {
                write!(f, "setup already done, only one setup call is allowed")
            }
            DkgError::SetupInconsistent(msg) => {
                write!(f, "setup inconsistent: {msg}")
            }
            DkgError::ResharingInconsistent(msg) => {
                write!(f, "resharing inconsistent: {msg}")
            }
            DkgError::DuplicateIdentity(id) => {
                write!(f, "identity already holds a master credential: {id}")
            }
            DkgError::Timeout(phase) => write!(f, "{phase} deadline exceeded"),
            DkgError::Transport(msg) => write!(f, "transport failure: {msg}"),
        }
    }
}

impl Error for DkgError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(
            DkgError::RosterInvalid("empty".into()).kind(),
            ErrorKind::Protocol
        );
        assert_eq!(
            DkgError::RecoveryShort {
                required: 3,
                provided: 1
            }
            .kind(),
            ErrorKind::Crypto
        );
        assert_eq!(DkgError::SetupAlreadyDone.kind(), ErrorKind::State);
        assert_eq!(DkgError::Timeout("setup").kind(), ErrorKind::Timeout);
    }
}
