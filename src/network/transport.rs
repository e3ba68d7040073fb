//! Stream transport abstraction.
//!
//! A stream connects one coordinator with a set of participant nodes.
//! Messages from a single sender arrive in FIFO order; there is no
//! ordering across senders. The production transport is out of scope; the
//! in-memory router in [`crate::network::memory`] implements these traits
//! for tests and the operator tool.

use std::time::Instant;

use crate::errors::DkgError;
use crate::network::messages::{Address, ProtocolMessage};

/// Outbound half of a stream session. Each endpoint is driven by a
/// single thread; senders only need to move there.
pub trait StreamSender: Send {
    fn send(&self, to: &Address, message: &ProtocolMessage) -> Result<(), DkgError>;

    /// Send the same message to several recipients, stopping at the first
    /// failure.
    fn send_all(&self, recipients: &[Address], message: &ProtocolMessage) -> Result<(), DkgError> {
        for recipient in recipients {
            self.send(recipient, message)?;
        }
        Ok(())
    }
}

/// Inbound half of a stream session.
pub trait StreamReceiver: Send {
    /// Block until a message arrives or the deadline passes.
    fn recv_deadline(&self, deadline: Instant)
        -> Result<(Address, ProtocolMessage), DkgError>;
}

/// One endpoint of a stream session.
pub struct StreamPair {
    pub sender: Box<dyn StreamSender>,
    pub receiver: Box<dyn StreamReceiver>,
}

impl std::fmt::Debug for StreamPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPair").finish_non_exhaustive()
    }
}

/// Stream factory held by the coordinator.
pub trait Rpc: Send + Sync {
    /// Open a stream to `players`. Every player's node is handed its own
    /// endpoint of the same session.
    fn stream(&self, players: &[Address]) -> Result<StreamPair, DkgError>;
}
