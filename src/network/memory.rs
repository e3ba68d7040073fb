//! In-process stream router.
//!
//! Carries encoded frames between session endpoints over unbounded
//! channels, so the transcript codec is exercised end to end. Each
//! registered node owns a service channel; opening a stream delivers one
//! [`StreamPair`] per player on that channel and returns the coordinator's
//! endpoint.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::trace;

use crate::errors::DkgError;
use crate::network::messages::{Address, ProtocolMessage};
use crate::network::transcript;
use crate::network::transport::{Rpc, StreamPair, StreamReceiver, StreamSender};

type Frame = (Address, Vec<u8>);

#[derive(Default)]
struct RouterInner {
    services: HashMap<Address, mpsc::Sender<StreamPair>>,
    next_session: u64,
}

/// Shared in-memory message router.
#[derive(Clone, Default)]
pub struct MemoryRouter {
    inner: Arc<Mutex<RouterInner>>,
}

impl MemoryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and return the channel on which its stream
    /// endpoints arrive.
    pub fn register(&self, address: Address) -> mpsc::Receiver<StreamPair> {
        let (tx, rx) = mpsc::channel();
        self.inner
            .lock()
            .expect("router lock poisoned")
            .services
            .insert(address, tx);
        rx
    }
}

impl Rpc for MemoryRouter {
    fn stream(&self, players: &[Address]) -> Result<StreamPair, DkgError> {
        let mut inner = self.inner.lock().expect("router lock poisoned");
        let session = inner.next_session;
        inner.next_session += 1;

        let coordinator = Address::new(format!("coordinator#{session}"));

        let mut routes: HashMap<Address, mpsc::Sender<Frame>> = HashMap::new();
        let mut inboxes: Vec<(Address, mpsc::Receiver<Frame>)> = Vec::new();
        for player in players.iter().chain(std::iter::once(&coordinator)) {
            if routes.contains_key(player) {
                return Err(DkgError::RosterInvalid(format!(
                    "duplicate address {player}"
                )));
            }
            let (tx, rx) = mpsc::channel();
            routes.insert(player.clone(), tx);
            inboxes.push((player.clone(), rx));
        }

        let (_, coordinator_rx) = inboxes.pop().expect("coordinator inbox present");

        for (player, rx) in inboxes {
            let service = inner.services.get(&player).ok_or_else(|| {
                DkgError::Transport(format!("no node listening on {player}"))
            })?;
            let pair = StreamPair {
                sender: Box::new(MemorySender {
                    from: player.clone(),
                    routes: routes.clone(),
                }),
                receiver: Box::new(MemoryReceiver { rx }),
            };
            service
                .send(pair)
                .map_err(|_| DkgError::Transport(format!("node {player} is gone")))?;
        }

        Ok(StreamPair {
            sender: Box::new(MemorySender {
                from: coordinator,
                routes,
            }),
            receiver: Box::new(MemoryReceiver { rx: coordinator_rx }),
        })
    }
}

struct MemorySender {
    from: Address,
    routes: HashMap<Address, mpsc::Sender<Frame>>,
}

impl StreamSender for MemorySender {
    fn send(&self, to: &Address, message: &ProtocolMessage) -> Result<(), DkgError> {
        trace!(from = %self.from, to = %to, label = message.label(), "send");
        let route = self
            .routes
            .get(to)
            .ok_or_else(|| DkgError::Transport(format!("{to} is not in this stream")))?;
        route
            .send((self.from.clone(), transcript::encode(message)))
            .map_err(|_| DkgError::Transport(format!("stream to {to} is closed")))
    }
}

struct MemoryReceiver {
    rx: mpsc::Receiver<Frame>,
}

impl StreamReceiver for MemoryReceiver {
    fn recv_deadline(
        &self,
        deadline: Instant,
    ) -> Result<(Address, ProtocolMessage), DkgError> {
        let timeout = deadline.saturating_duration_since(Instant::now());
        let (from, frame) = self.rx.recv_timeout(timeout).map_err(|err| match err {
            mpsc::RecvTimeoutError::Timeout => DkgError::Timeout("stream receive"),
            mpsc::RecvTimeoutError::Disconnected => {
                DkgError::Transport("stream stopped unexpectedly".into())
            }
        })?;
        Ok((from, transcript::decode(&frame)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::messages::{SignRequest, StartDone};
    use crate::suite::EdwardsSuite;
    use rand::rngs::OsRng;
    use std::time::Duration;

    #[test]
    fn frames_route_between_endpoints() {
        let router = MemoryRouter::new();
        let node = Address::new("node-a");
        let service = router.register(node.clone());

        let coordinator_pair = router.stream(&[node.clone()]).unwrap();
        let node_pair = service.recv().unwrap();

        let request = ProtocolMessage::SignRequest(SignRequest {
            message: b"hello".to_vec(),
            index: 0,
        });
        coordinator_pair.sender.send(&node, &request).unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        let (from, received) = node_pair.receiver.recv_deadline(deadline).unwrap();
        assert_eq!(received, request);

        let suite = EdwardsSuite;
        let done = ProtocolMessage::StartDone(StartDone {
            public_key: suite.base_mul(&suite.random_scalar(&mut OsRng)),
        });
        node_pair.sender.send(&from, &done).unwrap();

        let (_, received) = coordinator_pair.receiver.recv_deadline(deadline).unwrap();
        assert_eq!(received, done);
    }

    #[test]
    fn streaming_to_an_unknown_node_fails() {
        let router = MemoryRouter::new();
        let err = router.stream(&[Address::new("nobody")]).unwrap_err();
        assert!(matches!(err, DkgError::Transport(_)));
    }

    #[test]
    fn receive_deadline_expires() {
        let router = MemoryRouter::new();
        let node = Address::new("node-a");
        let _service = router.register(node.clone());

        let pair = router.stream(&[node]).unwrap();
        let err = pair
            .receiver
            .recv_deadline(Instant::now() + Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, DkgError::Timeout(_)));
    }
}
