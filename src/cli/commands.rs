//! Command-line argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tdkg")]
#[command(about = "Threshold DKG operator tool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a node identity and write its authority line
    Listen {
        /// Node configuration directory
        #[arg(long, default_value = ".")]
        config: PathBuf,

        /// Node address
        #[arg(long, default_value = "127.0.0.1:2000")]
        address: String,
    },

    /// Run the initial DKG over a committee of local node configs
    Setup {
        /// Threshold of shares needed to decrypt
        #[arg(long)]
        threshold: u32,

        /// Authority line BASE64(addr):BASE64(dkgPk):BASE64(bdnPk), one
        /// per member in roster order (defaults to the member configs)
        #[arg(long)]
        authority: Vec<String>,

        /// Member configuration directory, one per committee member
        #[arg(long)]
        member: Vec<PathBuf>,

        /// Committee state file to write
        #[arg(long, default_value = "dkg_state.json")]
        state: PathBuf,
    },

    /// Encrypt a message against the distributed key
    Encrypt {
        /// Message bytes in hex
        #[arg(long)]
        message: String,

        /// Committee state file
        #[arg(long, default_value = "dkg_state.json")]
        state: PathBuf,
    },

    /// Threshold-decrypt a ciphertext
    Decrypt {
        /// Ciphertext as KHEX:CHEX:REMAINDERHEX
        #[arg(long)]
        encrypted: String,

        /// Committee state file
        #[arg(long, default_value = "dkg_state.json")]
        state: PathBuf,
    },

    /// Encrypt with a knowledge proof of the ephemeral key
    VerifiableEncrypt {
        /// Second generator point in hex
        #[arg(long = "gbar")]
        gbar: String,

        /// Message bytes in hex
        #[arg(long)]
        message: String,

        /// Committee state file
        #[arg(long, default_value = "dkg_state.json")]
        state: PathBuf,
    },

    /// Threshold-decrypt a batch of proved ciphertexts
    VerifiableDecrypt {
        /// Second generator point in hex
        #[arg(long = "gbar")]
        gbar: String,

        /// Colon-joined hex groups of five per ciphertext: K:C:UBar:E:F
        #[arg(long)]
        ciphertexts: String,

        /// Committee state file
        #[arg(long, default_value = "dkg_state.json")]
        state: PathBuf,
    },

    /// Redistribute the shares over a new committee
    Reshare {
        /// New threshold
        #[arg(long = "threshold-new")]
        threshold_new: u32,

        /// Authority line of each new-roster member, in roster order
        #[arg(long)]
        authority: Vec<String>,

        /// Member configuration directory for every new-roster member
        #[arg(long)]
        member: Vec<PathBuf>,

        /// Committee state file to update
        #[arg(long, default_value = "dkg_state.json")]
        state: PathBuf,
    },

    /// Issue a master credential over an identity hash
    IssueMaster {
        /// Identity hash
        #[arg(long = "idhash")]
        id_hash: String,

        /// Committee state file
        #[arg(long, default_value = "dkg_state.json")]
        state: PathBuf,
    },

    /// Issue an event credential chained to a master credential
    IssueEvent {
        /// Identity hash
        #[arg(long = "idhash")]
        id_hash: String,

        /// Event name
        #[arg(long = "event-name")]
        event_name: String,

        /// Master credential in base64
        #[arg(long = "master-credential")]
        master_credential: String,

        /// Colon-joined base64 master signatures
        #[arg(long = "master-signatures")]
        master_signatures: String,

        /// Committee state file
        #[arg(long, default_value = "dkg_state.json")]
        state: PathBuf,
    },

    /// Verify an event credential
    VerifyEvent {
        /// Identity hash
        #[arg(long = "idhash")]
        id_hash: String,

        /// Event name
        #[arg(long = "event-name")]
        event_name: String,

        /// Event credential in base64
        #[arg(long = "event-credential")]
        event_credential: String,

        /// Colon-joined base64 event signatures
        #[arg(long = "event-signatures")]
        event_signatures: String,

        /// Committee state file
        #[arg(long, default_value = "dkg_state.json")]
        state: PathBuf,
    },
}
