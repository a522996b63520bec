//! Command-line front end for the token key service

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use eyre::Result;
use tks_scp::{SoftToken, Status, TksConfig, TokenKeyService};
use tracing::{error, info};

mod commands;
mod utils;

use commands::*;
use utils::{AlgorithmArg, CardArgs, ProtocolArg};

#[derive(Parser)]
#[command(version, about = "Token key service tool for GlobalPlatform secure channels")]
struct Cli {
    /// Configuration file (TOML); `TKS_` environment variables override it
    #[arg(short, long, global = true, default_value = "tks.toml")]
    config: PathBuf,

    /// Debug level output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute SCP01 or SCP03 session keys and the host cryptogram
    SessionKeys {
        #[command(flatten)]
        card: CardArgs,

        /// Secure channel protocol
        #[arg(long, value_enum, default_value_t = ProtocolArg::Scp03)]
        protocol: ProtocolArg,

        /// Card challenge, in hex
        #[arg(long)]
        card_challenge: String,

        /// Host challenge, in hex
        #[arg(long)]
        host_challenge: String,

        /// Card cryptogram to verify, in hex
        #[arg(long)]
        card_cryptogram: Option<String>,

        /// Also derive the response MAC key
        #[arg(long)]
        rmac: bool,

        /// Generate a key on the server side
        #[arg(long)]
        keygen: bool,
    },

    /// Compute one SCP02 session key
    Scp02SessionKey {
        #[command(flatten)]
        card: CardArgs,

        /// Sequence counter and card challenge, in hex
        #[arg(long)]
        card_challenge: String,

        /// Host challenge, in hex
        #[arg(long)]
        host_challenge: Option<String>,

        /// Derivation constant (0101, 0102, 0182 or 0181)
        #[arg(long)]
        constant: String,

        /// Card cryptogram to verify, in hex
        #[arg(long)]
        card_cryptogram: Option<String>,

        /// Generate a key on the server side (DEK only)
        #[arg(long)]
        keygen: bool,
    },

    /// Build PUT KEY key set data for a key change
    KeySetData {
        #[command(flatten)]
        card: CardArgs,

        /// Secure channel protocol
        #[arg(long, value_enum, default_value_t = ProtocolArg::Scp02)]
        protocol: ProtocolArg,

        /// Key info of the replacement keys, in hex
        #[arg(long)]
        new_key_info: String,

        /// SCP02 sequence counter, in hex
        #[arg(long)]
        sequence_counter: Option<String>,
    },

    /// Encrypt data under the card KEK
    EncryptData {
        #[command(flatten)]
        card: CardArgs,

        /// Secure channel protocol
        #[arg(long, value_enum, default_value_t = ProtocolArg::Scp02)]
        protocol: ProtocolArg,

        /// Data to encrypt, in hex (random when omitted)
        #[arg(long)]
        data: Option<String>,
    },

    /// Generate random data
    Random {
        /// Number of bytes
        #[arg(default_value_t = 16)]
        len: usize,
    },

    /// Compute the key check value of a key
    Kcv {
        /// Key, in hex
        key: String,

        /// Key algorithm
        #[arg(long, value_enum, default_value_t = AlgorithmArg::Des3)]
        algorithm: AlgorithmArg,
    },

    /// Print the card keys derived for one card
    Diversify {
        #[command(flatten)]
        card: CardArgs,

        /// Secure channel protocol
        #[arg(long, value_enum, default_value_t = ProtocolArg::Scp02)]
        protocol: ProtocolArg,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let status = err
                .downcast_ref::<tks_scp::Error>()
                .map_or(Status::MissingParameters, tks_scp::Error::status);
            error!(status = status.code(), "{err:#}");
            ExitCode::from(status.code())
        }
    }
}

fn load_service(path: &Path) -> Result<TokenKeyService<SoftToken>> {
    let config = TksConfig::load(path)?;
    let token = SoftToken::from_config(&config)?;
    let service = TokenKeyService::new(config, token)?;
    info!(config = %path.display(), "loaded configuration");
    Ok(service)
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        // Key check values need no configuration
        Commands::Kcv { key, algorithm } => kcv_command(key, *algorithm),
        Commands::SessionKeys {
            card,
            protocol,
            card_challenge,
            host_challenge,
            card_cryptogram,
            rmac,
            keygen,
        } => session_keys_command(
            &load_service(&cli.config)?,
            card,
            *protocol,
            card_challenge,
            host_challenge,
            card_cryptogram.as_deref(),
            *rmac,
            *keygen,
        ),
        Commands::Scp02SessionKey {
            card,
            card_challenge,
            host_challenge,
            constant,
            card_cryptogram,
            keygen,
        } => scp02_session_key_command(
            &load_service(&cli.config)?,
            card,
            card_challenge,
            host_challenge.as_deref(),
            constant,
            card_cryptogram.as_deref(),
            *keygen,
        ),
        Commands::KeySetData {
            card,
            protocol,
            new_key_info,
            sequence_counter,
        } => key_set_data_command(
            &load_service(&cli.config)?,
            card,
            *protocol,
            new_key_info,
            sequence_counter.as_deref(),
        ),
        Commands::EncryptData {
            card,
            protocol,
            data,
        } => encrypt_data_command(&load_service(&cli.config)?, card, *protocol, data.as_deref()),
        Commands::Random { len } => random_command(&load_service(&cli.config)?, *len),
        Commands::Diversify { card, protocol } => {
            diversify_command(&load_service(&cli.config)?, card, *protocol)
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .init();
}
