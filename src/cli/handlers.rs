//! Command handlers for the operator tool.
//!
//! The tool drives a whole committee in-process over the in-memory
//! router: `listen` creates node identities on disk, `setup` runs the DKG
//! and persists the committee state, and the remaining commands restore
//! the committee from that state file and run one protocol operation.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use blstrs::G2Projective;
use curve25519_dalek::edwards::EdwardsPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::crypto::bdn::BdnKeyPair;
use crate::crypto::elgamal::ElGamalPair;
use crate::crypto::poly::{PriShare, PublicPoly};
use crate::crypto::proofs::VerifiableCiphertext;
use crate::dkg::actor::Actor;
use crate::dkg::node::{DkgNode, NodeKeys};
use crate::dkg::state::AuthState;
use crate::errors::DkgError;
use crate::network::memory::MemoryRouter;
use crate::network::messages::Address;
use crate::suite::CurveContext;

use super::commands::Commands;
use super::output;

const IDENTITY_FILE: &str = "identity.json";
const AUTHORITY_FILE: &str = "dkgauthority";
const SEPARATOR: &str = ":";

type CliError = Box<dyn std::error::Error>;

/// A node identity at rest. Secrets stay in the node's config directory.
#[derive(Serialize, Deserialize)]
struct IdentityFile {
    address: String,
    dkg_secret: String,
    bdn_secret: String,
}

/// The committee state written by `setup` and updated by `reshare`.
#[derive(Serialize, Deserialize)]
struct StateFile {
    threshold: u32,
    dist_key: String,
    pub_poly: Vec<String>,
    bdn_pubkeys: Vec<String>,
    members: Vec<MemberRecord>,
}

#[derive(Serialize, Deserialize)]
struct MemberRecord {
    address: String,
    index: u32,
    dkg_secret: String,
    bdn_secret: String,
    share: String,
}

/// Execute a CLI command.
pub fn execute(command: Commands) -> Result<(), CliError> {
    let ctx = CurveContext::new();
    match command {
        Commands::Listen { config, address } => listen(&ctx, &config, &address),
        Commands::Setup {
            threshold,
            authority,
            member,
            state,
        } => setup(&ctx, threshold, &authority, &member, &state),
        Commands::Encrypt { message, state } => encrypt(&ctx, &message, &state),
        Commands::Decrypt { encrypted, state } => decrypt(&ctx, &encrypted, &state),
        Commands::VerifiableEncrypt {
            gbar,
            message,
            state,
        } => verifiable_encrypt(&ctx, &gbar, &message, &state),
        Commands::VerifiableDecrypt {
            gbar,
            ciphertexts,
            state,
        } => verifiable_decrypt(&ctx, &gbar, &ciphertexts, &state),
        Commands::Reshare {
            threshold_new,
            authority,
            member,
            state,
        } => reshare(&ctx, threshold_new, &authority, &member, &state),
        Commands::IssueMaster { id_hash, state } => issue_master(&ctx, &id_hash, &state),
        Commands::IssueEvent {
            id_hash,
            event_name,
            master_credential,
            master_signatures,
            state,
        } => issue_event(
            &ctx,
            &id_hash,
            &event_name,
            &master_credential,
            &master_signatures,
            &state,
        ),
        Commands::VerifyEvent {
            id_hash,
            event_name,
            event_credential,
            event_signatures,
            state,
        } => verify_event(
            &ctx,
            &id_hash,
            &event_name,
            &event_credential,
            &event_signatures,
            &state,
        ),
    }
}

fn listen(ctx: &CurveContext, config: &Path, address: &str) -> Result<(), CliError> {
    fs::create_dir_all(config)?;
    let keys = NodeKeys::generate(ctx, Address::new(address), &mut OsRng);

    let identity = IdentityFile {
        address: address.to_string(),
        dkg_secret: hex::encode(ctx.edwards.scalar_to_bytes(&keys.dkg_secret)),
        bdn_secret: hex::encode(ctx.pairing.scalar_to_bytes(&keys.bdn.secret)),
    };
    output::write_json(&config.join(IDENTITY_FILE), &identity)?;

    let line = authority_line(ctx, &keys);
    fs::write(config.join(AUTHORITY_FILE), &line)?;

    output::success("LISTEN", &line);
    Ok(())
}

fn setup(
    ctx: &CurveContext,
    threshold: u32,
    authority: &[String],
    member_dirs: &[PathBuf],
    state_path: &Path,
) -> Result<(), CliError> {
    if member_dirs.is_empty() {
        return Err(Box::new(DkgError::Config(
            "setup needs at least one --member config".into(),
        )));
    }
    let mut members: Vec<NodeKeys> = member_dirs
        .iter()
        .map(|dir| load_identity(ctx, dir))
        .collect::<Result<_, _>>()?;

    // Authority lines fix the roster order; without them the member
    // configs are taken in the order given.
    if !authority.is_empty() {
        members = order_by_authority(ctx, members, authority)?;
    }

    let router = MemoryRouter::new();
    let nodes: Vec<DkgNode> = members
        .into_iter()
        .map(|keys| DkgNode::with_keys(*ctx, keys))
        .collect();
    let actors: Vec<Actor> = nodes.iter().map(|n| n.listen(&router)).collect();

    let addresses: Vec<Address> = nodes.iter().map(|n| n.address().clone()).collect();
    let dkg_pubkeys: Vec<EdwardsPoint> = nodes.iter().map(|n| n.dkg_public_key()).collect();
    let bdn_pubkeys: Vec<G2Projective> = nodes.iter().map(|n| n.bdn_public_key()).collect();

    let dist_key = actors[0].setup(&addresses, &dkg_pubkeys, &bdn_pubkeys, threshold)?;

    let state = snapshot_committee(ctx, &nodes, &bdn_pubkeys)?;
    output::write_json(state_path, &state)?;

    output::success(
        "SETUP",
        &hex::encode(ctx.edwards.point_to_bytes(&dist_key)),
    );
    Ok(())
}

fn encrypt(ctx: &CurveContext, message_hex: &str, state_path: &Path) -> Result<(), CliError> {
    let message = hex::decode(message_hex)?;
    let (_, _, actors) = restore_committee(ctx, state_path)?;

    let (pair, remainder) = actors[0].encrypt(&message)?;
    let payload = [
        hex::encode(ctx.edwards.point_to_bytes(&pair.k)),
        hex::encode(ctx.edwards.point_to_bytes(&pair.c)),
        hex::encode(&remainder),
    ]
    .join(SEPARATOR);

    output::success("ENCRYPT", &payload);
    Ok(())
}

fn decrypt(ctx: &CurveContext, encrypted: &str, state_path: &Path) -> Result<(), CliError> {
    let parts: Vec<&str> = encrypted.split(SEPARATOR).collect();
    if parts.len() < 2 {
        return Err(Box::new(DkgError::Config(format!(
            "malformed ciphertext: {encrypted}"
        ))));
    }
    let pair = ElGamalPair {
        k: ctx.edwards.point_from_bytes(&hex::decode(parts[0])?)?,
        c: ctx.edwards.point_from_bytes(&hex::decode(parts[1])?)?,
    };

    let (_, _, actors) = restore_committee(ctx, state_path)?;
    let decrypted = actors[0].decrypt(&pair)?;

    output::success("DECRYPT", &hex::encode(decrypted));
    Ok(())
}

fn verifiable_encrypt(
    ctx: &CurveContext,
    gbar_hex: &str,
    message_hex: &str,
    state_path: &Path,
) -> Result<(), CliError> {
    let gbar = ctx.edwards.point_from_bytes(&hex::decode(gbar_hex)?)?;
    let message = hex::decode(message_hex)?;

    let (_, _, actors) = restore_committee(ctx, state_path)?;
    let (ct, remainder) = actors[0].verifiable_encrypt(&message, &gbar)?;

    let payload = [
        hex::encode(ctx.edwards.point_to_bytes(&ct.k)),
        hex::encode(ctx.edwards.point_to_bytes(&ct.c)),
        hex::encode(ctx.edwards.point_to_bytes(&ct.ubar)),
        hex::encode(ctx.edwards.scalar_to_bytes(&ct.e)),
        hex::encode(ctx.edwards.scalar_to_bytes(&ct.f)),
        hex::encode(&remainder),
    ]
    .join(SEPARATOR);

    output::success("VERIFIABLE-ENCRYPT", &payload);
    Ok(())
}

fn verifiable_decrypt(
    ctx: &CurveContext,
    gbar_hex: &str,
    ciphertexts: &str,
    state_path: &Path,
) -> Result<(), CliError> {
    let gbar = ctx.edwards.point_from_bytes(&hex::decode(gbar_hex)?)?;

    let parts: Vec<&str> = ciphertexts.split(SEPARATOR).collect();
    if parts.len() % 5 != 0 {
        return Err(Box::new(DkgError::Config(format!(
            "malformed ciphertext batch: {ciphertexts}"
        ))));
    }
    let batch: Vec<VerifiableCiphertext> = parts
        .chunks(5)
        .map(|chunk| -> Result<VerifiableCiphertext, CliError> {
            Ok(VerifiableCiphertext {
                k: ctx.edwards.point_from_bytes(&hex::decode(chunk[0])?)?,
                c: ctx.edwards.point_from_bytes(&hex::decode(chunk[1])?)?,
                ubar: ctx.edwards.point_from_bytes(&hex::decode(chunk[2])?)?,
                e: ctx.edwards.scalar_from_bytes(&hex::decode(chunk[3])?)?,
                f: ctx.edwards.scalar_from_bytes(&hex::decode(chunk[4])?)?,
                gbar,
            })
        })
        .collect::<Result<_, _>>()?;

    let (_, _, actors) = restore_committee(ctx, state_path)?;
    let decrypted = actors[0].verifiable_decrypt(&batch)?;

    let payload = decrypted
        .iter()
        .map(hex::encode)
        .collect::<Vec<_>>()
        .join(SEPARATOR);
    output::success("VERIFIABLE-DECRYPT", &payload);
    Ok(())
}

fn reshare(
    ctx: &CurveContext,
    threshold_new: u32,
    authority: &[String],
    member_dirs: &[PathBuf],
    state_path: &Path,
) -> Result<(), CliError> {
    let state: StateFile = output::read_json(state_path)?;
    let (router, old_nodes, actors) = spawn_committee(ctx, &state)?;

    // The new roster comes from the authority lines; members already in
    // the committee reuse their stored identity, fresh joiners bring
    // their config directory.
    if authority.is_empty() {
        return Err(Box::new(DkgError::Config(
            "reshare needs the new roster as --authority lines".into(),
        )));
    }

    let mut joiner_identities: Vec<NodeKeys> = member_dirs
        .iter()
        .map(|dir| load_identity(ctx, dir))
        .collect::<Result<_, _>>()?;

    let mut new_addresses = Vec::new();
    let mut new_pubkeys = Vec::new();
    let mut joiner_nodes: Vec<DkgNode> = Vec::new();
    for line in authority {
        let (address, dkg_pubkey, _) = parse_authority(ctx, line)?;
        new_addresses.push(address.clone());
        new_pubkeys.push(dkg_pubkey);

        let known = old_nodes.iter().any(|n| n.address() == &address);
        if !known {
            let position = joiner_identities
                .iter()
                .position(|k| k.address == address)
                .ok_or_else(|| {
                    DkgError::Config(format!("no --member config for joiner {address}"))
                })?;
            let keys = joiner_identities.swap_remove(position);
            let node = DkgNode::with_keys(*ctx, keys);
            node.listen(&router);
            joiner_nodes.push(node);
        }
    }

    actors[0].reshare(&new_addresses, &new_pubkeys, threshold_new)?;

    // Persist the refreshed shares of every new-roster member; the BDN
    // credential roster from the original setup is carried over.
    let bdn_pubkeys: Vec<G2Projective> = state
        .bdn_pubkeys
        .iter()
        .map(|s| Ok(ctx.pairing.g2_from_bytes(&hex::decode(s)?)?))
        .collect::<Result<_, CliError>>()?;
    let mut new_committee: Vec<&DkgNode> = Vec::new();
    for address in &new_addresses {
        let node = old_nodes
            .iter()
            .chain(joiner_nodes.iter())
            .find(|n| n.address() == address)
            .expect("every new-roster member is running");
        new_committee.push(node);
    }
    let updated = snapshot_refs(ctx, &new_committee, &bdn_pubkeys)?;
    output::write_json(state_path, &updated)?;

    output::success("RESHARE", &state.dist_key);
    Ok(())
}

fn issue_master(ctx: &CurveContext, id_hash: &str, state_path: &Path) -> Result<(), CliError> {
    let (_, _, actors) = restore_committee(ctx, state_path)?;
    let (credential, signatures) = actors[0].issue_master_credential(id_hash)?;

    output::success("ISSUE-MASTER", &encode_credential(&credential, &signatures));
    Ok(())
}

fn issue_event(
    ctx: &CurveContext,
    id_hash: &str,
    event_name: &str,
    master_credential: &str,
    master_signatures: &str,
    state_path: &Path,
) -> Result<(), CliError> {
    let credential = BASE64.decode(master_credential)?;
    let signatures = decode_signatures(master_signatures)?;

    let (_, _, actors) = restore_committee(ctx, state_path)?;
    let (event_credential, event_signatures) =
        actors[0].issue_event_credential(id_hash, event_name, &credential, &signatures)?;

    output::success(
        "ISSUE-EVENT",
        &encode_credential(&event_credential, &event_signatures),
    );
    Ok(())
}

fn verify_event(
    ctx: &CurveContext,
    id_hash: &str,
    event_name: &str,
    event_credential: &str,
    event_signatures: &str,
    state_path: &Path,
) -> Result<(), CliError> {
    let credential = BASE64.decode(event_credential)?;
    let signatures = decode_signatures(event_signatures)?;

    let (_, _, actors) = restore_committee(ctx, state_path)?;
    let verdict =
        match actors[0].verify_event_credential(id_hash, event_name, &credential, &signatures) {
            Ok(verified) => verified,
            Err(DkgError::CredentialInvalid(_)) => false,
            Err(err) => return Err(Box::new(err)),
        };

    output::success("VERIFY-EVENT", &verdict.to_string());
    Ok(())
}

// ---------------------------------------------------------------------------
// Identity and state plumbing

fn authority_line(ctx: &CurveContext, keys: &NodeKeys) -> String {
    [
        BASE64.encode(keys.address.as_str().as_bytes()),
        BASE64.encode(ctx.edwards.point_to_bytes(&keys.dkg_public)),
        BASE64.encode(ctx.pairing.g2_to_bytes(&keys.bdn.public)),
    ]
    .join(SEPARATOR)
}

fn parse_authority(
    ctx: &CurveContext,
    line: &str,
) -> Result<(Address, EdwardsPoint, G2Projective), CliError> {
    let parts: Vec<&str> = line.trim().split(SEPARATOR).collect();
    if parts.len() != 3 {
        return Err(Box::new(DkgError::Config(format!(
            "invalid authority line: {line}"
        ))));
    }
    let address = String::from_utf8(BASE64.decode(parts[0])?)
        .map_err(|_| DkgError::Config("authority address is not UTF-8".into()))?;
    let dkg_pubkey = ctx.edwards.point_from_bytes(&BASE64.decode(parts[1])?)?;
    let bdn_pubkey = ctx.pairing.g2_from_bytes(&BASE64.decode(parts[2])?)?;
    Ok((Address::new(address), dkg_pubkey, bdn_pubkey))
}

fn load_identity(ctx: &CurveContext, dir: &Path) -> Result<NodeKeys, CliError> {
    let identity: IdentityFile = output::read_json(&dir.join(IDENTITY_FILE))?;
    keys_from_secrets(
        ctx,
        &identity.address,
        &identity.dkg_secret,
        &identity.bdn_secret,
    )
}

fn keys_from_secrets(
    ctx: &CurveContext,
    address: &str,
    dkg_secret_hex: &str,
    bdn_secret_hex: &str,
) -> Result<NodeKeys, CliError> {
    let dkg_secret = ctx.edwards.scalar_from_bytes(&hex::decode(dkg_secret_hex)?)?;
    let bdn_secret = ctx.pairing.scalar_from_bytes(&hex::decode(bdn_secret_hex)?)?;
    Ok(NodeKeys {
        address: Address::new(address),
        dkg_public: ctx.edwards.base_mul(&dkg_secret),
        dkg_secret,
        bdn: BdnKeyPair {
            public: ctx.pairing.g2_generator() * bdn_secret,
            secret: bdn_secret,
        },
    })
}

fn order_by_authority(
    ctx: &CurveContext,
    mut members: Vec<NodeKeys>,
    authority: &[String],
) -> Result<Vec<NodeKeys>, CliError> {
    let mut ordered = Vec::with_capacity(authority.len());
    for line in authority {
        let (address, dkg_pubkey, bdn_pubkey) = parse_authority(ctx, line)?;
        let position = members
            .iter()
            .position(|k| k.address == address)
            .ok_or_else(|| {
                DkgError::Config(format!("no --member config for authority {address}"))
            })?;
        let keys = members.swap_remove(position);
        if keys.dkg_public != dkg_pubkey || keys.bdn.public != bdn_pubkey {
            return Err(Box::new(DkgError::Config(format!(
                "authority line for {address} does not match its identity"
            ))));
        }
        ordered.push(keys);
    }
    Ok(ordered)
}

/// Restore the whole committee from the state file and start serving.
fn restore_committee(
    ctx: &CurveContext,
    state_path: &Path,
) -> Result<(MemoryRouter, Vec<DkgNode>, Vec<Actor>), CliError> {
    let state: StateFile = output::read_json(state_path)?;
    spawn_committee(ctx, &state)
}

fn spawn_committee(
    ctx: &CurveContext,
    state: &StateFile,
) -> Result<(MemoryRouter, Vec<DkgNode>, Vec<Actor>), CliError> {
    let dist_key = ctx.edwards.point_from_bytes(&hex::decode(&state.dist_key)?)?;
    let pub_poly = PublicPoly::new(
        state
            .pub_poly
            .iter()
            .map(|s| Ok(ctx.edwards.point_from_bytes(&hex::decode(s)?)?))
            .collect::<Result<Vec<_>, CliError>>()?,
    );
    let bdn_pubkeys: Vec<G2Projective> = state
        .bdn_pubkeys
        .iter()
        .map(|s| Ok(ctx.pairing.g2_from_bytes(&hex::decode(s)?)?))
        .collect::<Result<_, CliError>>()?;

    let mut keys = Vec::new();
    for member in &state.members {
        keys.push(keys_from_secrets(
            ctx,
            &member.address,
            &member.dkg_secret,
            &member.bdn_secret,
        )?);
    }
    let participants: Vec<Address> = keys.iter().map(|k| k.address.clone()).collect();
    let dkg_pubkeys: Vec<EdwardsPoint> = keys.iter().map(|k| k.dkg_public).collect();

    let router = MemoryRouter::new();
    let mut nodes = Vec::new();
    let mut actors = Vec::new();
    for (member, node_keys) in state.members.iter().zip(keys) {
        let share = PriShare {
            index: member.index,
            value: ctx.edwards.scalar_from_bytes(&hex::decode(&member.share)?)?,
        };
        let node = DkgNode::with_keys(*ctx, node_keys);
        node.restore_state(AuthState::restore(
            participants.clone(),
            dkg_pubkeys.clone(),
            bdn_pubkeys.clone(),
            state.threshold,
            dist_key,
            pub_poly.clone(),
            share,
        ));
        actors.push(node.listen(&router));
        nodes.push(node);
    }

    Ok((router, nodes, actors))
}

/// Serialize the committee after a certified round.
fn snapshot_committee(
    ctx: &CurveContext,
    nodes: &[DkgNode],
    bdn_pubkeys: &[G2Projective],
) -> Result<StateFile, CliError> {
    let refs: Vec<&DkgNode> = nodes.iter().collect();
    snapshot_refs(ctx, &refs, bdn_pubkeys)
}

fn snapshot_refs(
    ctx: &CurveContext,
    nodes: &[&DkgNode],
    bdn_pubkeys: &[G2Projective],
) -> Result<StateFile, CliError> {
    let first = nodes.first().ok_or_else(|| {
        Box::new(DkgError::Config("empty committee".into())) as CliError
    })?;
    let state = first.state();
    let state = state.lock().expect("state lock poisoned");
    let dist_key = state.dist_key()?;
    let pub_poly = state.pub_poly()?;
    let threshold = state.threshold();
    drop(state);

    let mut members = Vec::new();
    for node in nodes {
        let shared = node.state();
        let locked = shared.lock().expect("state lock poisoned");
        let share = locked.private_share()?;
        members.push(MemberRecord {
            address: node.address().as_str().to_string(),
            index: share.index,
            dkg_secret: hex::encode(ctx.edwards.scalar_to_bytes(&node.keys().dkg_secret)),
            bdn_secret: hex::encode(ctx.pairing.scalar_to_bytes(&node.keys().bdn.secret)),
            share: hex::encode(ctx.edwards.scalar_to_bytes(&share.value)),
        });
    }

    Ok(StateFile {
        threshold,
        dist_key: hex::encode(ctx.edwards.point_to_bytes(&dist_key)),
        pub_poly: pub_poly
            .commits()
            .iter()
            .map(|p| hex::encode(ctx.edwards.point_to_bytes(p)))
            .collect(),
        bdn_pubkeys: bdn_pubkeys
            .iter()
            .map(|p| hex::encode(ctx.pairing.g2_to_bytes(p)))
            .collect(),
        members,
    })
}

fn encode_credential(credential: &[u8], signatures: &[Vec<u8>]) -> String {
    let mut out = vec![BASE64.encode(credential)];
    out.extend(signatures.iter().map(|s| BASE64.encode(s)));
    out.join(SEPARATOR)
}

fn decode_signatures(joined: &str) -> Result<Vec<Vec<u8>>, CliError> {
    joined
        .split(SEPARATOR)
        .map(|part| Ok(BASE64.decode(part)?))
        .collect()
}
