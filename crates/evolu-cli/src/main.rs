//! Command-line entry point: start a local owner's sync loop against its
//! configured transports, or mint a fresh mnemonic and owner triple.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use evolu_cli::{Config, TransportConfig};
use evolu_crypto::{derive_from_mnemonic, mnemonic_generate, mnemonic_to_seed, OwnerKeyMaterial};
use evolu_storage::{MemoryDriver, StorageEngine};
use evolu_sync::SyncSession;
use evolu_transport::WebSocketTransport;

#[derive(Parser)]
#[command(name = "evolu")]
#[command(about = "Local-first data sync core: run a sync loop, or mint owner key material", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a local owner and reconcile against every configured transport.
    Run {
        /// Path to a TOML configuration file.
        #[arg(short, long, default_value = "evolu.toml")]
        config: PathBuf,
    },
    /// Print a freshly generated mnemonic and its derived owner triple.
    Keygen,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { config } => run(&config).await?,
        Command::Keygen => keygen(),
    }

    Ok(())
}

fn keygen() {
    let phrase = mnemonic_generate();
    let material = derive_from_mnemonic(&phrase).expect("freshly generated mnemonic always derives");
    println!("mnemonic: {phrase}");
    println!("owner_id: {}", hex::encode(material.owner_id));
    println!("write_key: {}", hex::encode(material.write_key));
}

async fn run(config_path: &PathBuf) -> evolu_cli::Result<()> {
    let config = Config::load(config_path)?;

    if config.enable_logging {
        tracing_subscriber::fmt::try_init().ok();
    }

    let material = owner_material(&config)?;
    tracing::info!(owner_id = %hex::encode(material.owner_id), name = %config.name, "starting local owner");

    let driver = Arc::new(MemoryDriver::new());
    let engine = Arc::new(StorageEngine::new(driver));
    engine.init(material.owner_id, material.encryption_key, config.max_drift_ms).await?;

    if config.in_memory {
        tracing::info!("running with a non-persistent store; state is lost on exit");
    }

    if config.transports.is_empty() {
        tracing::info!("no transports configured, running local-only");
        tokio::signal::ctrl_c().await.ok();
        return Ok(());
    }

    let mut handles = Vec::with_capacity(config.transports.len());
    for transport_config in &config.transports {
        let TransportConfig::WebSocket { url } = transport_config.clone();
        let engine = engine.clone();
        let write_key = material.write_key;
        let owner_id = material.owner_id;
        let transport = Arc::new(WebSocketTransport::new());
        let session = SyncSession::new(engine, transport);

        handles.push(tokio::spawn(async move {
            let cancel = async {
                tokio::signal::ctrl_c().await.ok();
            };
            if let Err(err) = session.run(&url, owner_id, write_key, cancel).await {
                tracing::error!(%url, error = %err, "sync session ended with an error");
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

fn owner_material(config: &Config) -> evolu_cli::Result<OwnerKeyMaterial> {
    match &config.external_app_owner {
        Some(hex_seed) => {
            let seed = hex::decode(hex_seed)
                .map_err(|e| evolu_cli::CliError::Config(format!("externalAppOwner is not valid hex: {e}")))?;
            Ok(evolu_crypto::derive_owner_material(&seed)?)
        }
        None => {
            let phrase = mnemonic_generate();
            let seed = mnemonic_to_seed(&phrase)?;
            Ok(evolu_crypto::derive_owner_material(&seed)?)
        }
    }
}
