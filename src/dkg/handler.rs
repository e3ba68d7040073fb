//! Per-stream node handler.
//!
//! Each stream session is served by one handler on one thread: the first
//! message decides what the session is (a DKG round, a resharing round, a
//! decryption, a signing request) and the handler drives it to completion
//! in arrival order. Handlers never share a stream.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rand::rngs::OsRng;
use tracing::{debug, info, instrument};

use crate::constants::{JUSTIFICATION_WINDOW, RESHARING_TIMEOUT, SETUP_TIMEOUT};
use crate::crypto::bdn;
use crate::crypto::proofs;
use crate::dkg::engine::{ResharingOutcome, ResharingRound, SetupRound};
use crate::dkg::node::NodeKeys;
use crate::dkg::state::AuthState;
use crate::errors::DkgError;
use crate::network::messages::{
    Address, DecryptReply, DecryptRequest, ProtocolMessage, SignRequest, SignResponse, Start,
    StartDone, StartResharing, VerifiableDecryptReply, VerifiableDecryptRequest,
};
use crate::network::transport::StreamPair;
use crate::suite::CurveContext;

type Buffered = VecDeque<(Address, ProtocolMessage)>;

pub struct NodeHandler {
    ctx: CurveContext,
    keys: Arc<NodeKeys>,
    state: Arc<Mutex<AuthState>>,
}

impl NodeHandler {
    pub fn new(ctx: CurveContext, keys: Arc<NodeKeys>, state: Arc<Mutex<AuthState>>) -> Self {
        Self { ctx, keys, state }
    }

    /// Serve one stream session to completion.
    pub fn serve(&self, stream: StreamPair) -> Result<(), DkgError> {
        // Deals or responses from fast peers can outrun the coordinator's
        // start message; buffer them until the session type is known.
        let mut buffered: Buffered = VecDeque::new();
        let deadline = Instant::now() + SETUP_TIMEOUT;

        loop {
            let (from, message) = stream.receiver.recv_deadline(deadline)?;
            match message {
                ProtocolMessage::Start(start) => {
                    return self.run_setup(&stream, from, start, buffered);
                }
                ProtocolMessage::StartResharing(resharing) => {
                    return self.run_resharing(&stream, from, resharing, buffered);
                }
                ProtocolMessage::DecryptRequest(request) => {
                    return self.handle_decrypt(&stream, from, request);
                }
                ProtocolMessage::VerifiableDecryptRequest(request) => {
                    return self.handle_verifiable_decrypt(&stream, from, request);
                }
                ProtocolMessage::SignRequest(request) => {
                    return self.handle_sign(&stream, from, request);
                }
                ProtocolMessage::Deal(_)
                | ProtocolMessage::Response(_)
                | ProtocolMessage::Reshare(_) => {
                    buffered.push_back((from, message));
                }
                other => {
                    return Err(DkgError::Protocol(format!(
                        "unexpected {} before session start",
                        other.label()
                    )));
                }
            }
        }
    }

    #[instrument(skip_all, fields(node = %self.keys.address, n = start.addresses.len(), t = start.threshold))]
    fn run_setup(
        &self,
        stream: &StreamPair,
        coordinator: Address,
        start: Start,
        buffered: Buffered,
    ) -> Result<(), DkgError> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .begin_sharing()?;

        let result = self.setup_inner(stream, &coordinator, &start, buffered);
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.state.lock().expect("state lock poisoned").abort_round();
                Err(err)
            }
        }
    }

    fn setup_inner(
        &self,
        stream: &StreamPair,
        coordinator: &Address,
        start: &Start,
        mut buffered: Buffered,
    ) -> Result<(), DkgError> {
        let suite = &self.ctx.edwards;
        let mut round = SetupRound::new(suite, &self.keys, start, &mut OsRng)?;
        let peers = round.peer_addresses();
        let deadline = Instant::now() + SETUP_TIMEOUT;

        for (to, deal) in round.outgoing_deals(suite, &self.keys, &mut OsRng)? {
            stream.sender.send(&to, &ProtocolMessage::Deal(deal))?;
        }

        // Collection phase: feed the round until every verdict is in.
        while !round.complete() {
            let (from, message) = match buffered.pop_front() {
                Some(entry) => entry,
                None => stream.receiver.recv_deadline(deadline)?,
            };
            match message {
                ProtocolMessage::Deal(deal) => {
                    if let Some(response) =
                        round.process_deal(suite, &from, &deal, &mut OsRng)?
                    {
                        stream
                            .sender
                            .send_all(&peers, &ProtocolMessage::Response(response))?;
                    }
                }
                ProtocolMessage::Response(response) => {
                    round.record_response(suite, &from, &response);
                }
                ProtocolMessage::Reshare(reshare) => {
                    if let Some(superseding) =
                        round.process_justification(suite, &from, &reshare, &mut OsRng)?
                    {
                        stream
                            .sender
                            .send_all(&peers, &ProtocolMessage::Response(superseding))?;
                    }
                }
                other => {
                    debug!(label = other.label(), "ignoring message during sharing");
                }
            }
        }

        // Justification phase: accused dealers answer their complaints,
        // everyone re-evaluates until clean or the window closes.
        if round.has_bad() {
            if round.is_accused() {
                info!("answering complaints with justifications");
                for (to, reshare) in round.justifications(suite, &self.keys, &mut OsRng)? {
                    stream.sender.send(&to, &ProtocolMessage::Reshare(reshare))?;
                }
            }

            let window = Instant::now() + JUSTIFICATION_WINDOW;
            while round.has_bad() {
                let received = stream.receiver.recv_deadline(window.min(deadline));
                let (from, message) = match received {
                    Ok(entry) => entry,
                    Err(DkgError::Timeout(_)) => break,
                    Err(err) => return Err(err),
                };
                match message {
                    ProtocolMessage::Reshare(reshare) => {
                        if let Some(superseding) =
                            round.process_justification(suite, &from, &reshare, &mut OsRng)?
                        {
                            stream
                                .sender
                                .send_all(&peers, &ProtocolMessage::Response(superseding))?;
                        }
                    }
                    ProtocolMessage::Response(response) => {
                        round.record_response(suite, &from, &response);
                    }
                    other => {
                        debug!(label = other.label(), "ignoring message during justification");
                    }
                }
            }
        }

        let output = round.finalize()?;
        info!(qualified = round.qualified().len(), "dkg round certified");

        self.state.lock().expect("state lock poisoned").certify(
            start.addresses.clone(),
            start.dkg_pubkeys.clone(),
            Some(start.bdn_pubkeys.clone()),
            start.threshold,
            output.dist_key,
            output.pub_poly,
            output.share,
        );

        stream.sender.send(
            coordinator,
            &ProtocolMessage::StartDone(StartDone {
                public_key: output.dist_key,
            }),
        )
    }

    #[instrument(skip_all, fields(node = %self.keys.address, n_new = resharing.addrs_new.len(), t_new = resharing.threshold_new))]
    fn run_resharing(
        &self,
        stream: &StreamPair,
        coordinator: Address,
        resharing: StartResharing,
        buffered: Buffered,
    ) -> Result<(), DkgError> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .begin_resharing()?;

        let result = self.resharing_inner(stream, &coordinator, &resharing, buffered);
        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                self.state.lock().expect("state lock poisoned").abort_round();
                Err(err)
            }
        }
    }

    fn resharing_inner(
        &self,
        stream: &StreamPair,
        coordinator: &Address,
        message: &StartResharing,
        mut buffered: Buffered,
    ) -> Result<(), DkgError> {
        let suite = &self.ctx.edwards;
        let mut round = {
            let state = self.state.lock().expect("state lock poisoned");
            ResharingRound::new(suite, &self.keys, message, &state, &mut OsRng)?
        };
        let session_peers = round.session_addresses();
        let deadline = Instant::now() + RESHARING_TIMEOUT;

        for (to, reshare) in round.outgoing_deals(suite, &self.keys, &mut OsRng)? {
            stream.sender.send(&to, &ProtocolMessage::Reshare(reshare))?;
        }

        while !round.complete() {
            let (from, incoming) = match buffered.pop_front() {
                Some(entry) => entry,
                None => stream.receiver.recv_deadline(deadline)?,
            };
            match incoming {
                ProtocolMessage::Reshare(reshare) => {
                    if let Some(response) =
                        round.process_reshare(suite, &from, &reshare, &mut OsRng)?
                    {
                        stream
                            .sender
                            .send_all(&session_peers, &ProtocolMessage::Response(response))?;
                    }
                }
                ProtocolMessage::Response(response) => {
                    round.record_response(suite, &from, &response);
                }
                other => {
                    debug!(label = other.label(), "ignoring message during resharing");
                }
            }
        }

        let dist_key = match round.finalize()? {
            ResharingOutcome::NewShare(output) => {
                let (addresses, pubkeys, threshold) = round.new_roster();
                let dist_key = output.dist_key;
                info!("resharing certified, new share installed");
                self.state.lock().expect("state lock poisoned").certify(
                    addresses,
                    pubkeys,
                    None,
                    threshold,
                    output.dist_key,
                    output.pub_poly,
                    output.share,
                );
                dist_key
            }
            ResharingOutcome::Departed(dist_key) => {
                info!("resharing certified, node left the committee");
                self.state.lock().expect("state lock poisoned").abort_round();
                dist_key
            }
        };

        stream.sender.send(
            coordinator,
            &ProtocolMessage::StartDone(StartDone {
                public_key: dist_key,
            }),
        )
    }

    #[instrument(skip_all, fields(node = %self.keys.address))]
    fn handle_decrypt(
        &self,
        stream: &StreamPair,
        from: Address,
        request: DecryptRequest,
    ) -> Result<(), DkgError> {
        let share = self
            .state
            .lock()
            .expect("state lock poisoned")
            .private_share()?;

        let reply = DecryptReply {
            i: share.index,
            v: request.k * share.value,
        };
        debug!(index = share.index, "produced decryption share");
        stream.sender.send(&from, &ProtocolMessage::DecryptReply(reply))
    }

    #[instrument(skip_all, fields(node = %self.keys.address, batch = request.ciphertexts.len()))]
    fn handle_verifiable_decrypt(
        &self,
        stream: &StreamPair,
        from: Address,
        request: VerifiableDecryptRequest,
    ) -> Result<(), DkgError> {
        let share = self
            .state
            .lock()
            .expect("state lock poisoned")
            .private_share()?;
        let suite = &self.ctx.edwards;

        // No share leaves this node for a ciphertext whose encryption
        // proof does not check out.
        for ct in &request.ciphertexts {
            proofs::verify_encryption(suite, ct)?;
        }

        let shares: Vec<_> = request
            .ciphertexts
            .iter()
            .map(|ct| proofs::prove_share(suite, &share, ct, &mut OsRng))
            .collect();

        stream.sender.send(
            &from,
            &ProtocolMessage::VerifiableDecryptReply(VerifiableDecryptReply { shares }),
        )
    }

    #[instrument(skip_all, fields(node = %self.keys.address, index = request.index))]
    fn handle_sign(
        &self,
        stream: &StreamPair,
        from: Address,
        request: SignRequest,
    ) -> Result<(), DkgError> {
        if !self.state.lock().expect("state lock poisoned").done() {
            return Err(DkgError::State(
                "dkg has not been initialized, call setup first".into(),
            ));
        }

        let signature = bdn::sign(&self.keys.bdn.secret, &request.message);
        stream.sender.send(
            &from,
            &ProtocolMessage::SignResponse(SignResponse {
                signature: self.ctx.pairing.g1_to_bytes(&signature).to_vec(),
                index: request.index,
                pubkey: self.keys.bdn.public,
            }),
        )
    }
}
