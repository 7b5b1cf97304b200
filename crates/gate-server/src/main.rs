mod rpc;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use streamgate::{
    authorizer_from_config, canonical_string, generate_private_key_pem, ChainLookup, GateConfig,
    GateError, MapLookup, SecretLookup, Services, StaticPlaybackUrl,
};

#[derive(Parser, Debug)]
#[command(
    name = "streamgate-server",
    version,
    about = "Playback authorization and stream admission gate"
)]
struct Cli {
    /// JSON config file; built-in defaults are used when omitted
    #[arg(long, env = "STREAMGATE_CONFIG")]
    config: Option<PathBuf>,

    /// JSON document holding secret values, consulted before the environment
    #[arg(long, env = "STREAMGATE_SECRETS_FILE")]
    secrets_file: Option<PathBuf>,

    /// Dotted path of the secrets object inside the secrets file
    #[arg(long, default_value = "")]
    secrets_path: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve JSON-RPC requests over stdin/stdout
    Serve,
    /// Print a new Ed25519 signing key as PKCS#8 PEM
    Keygen,
    /// Sign a playback request with the configured shared secret
    Sign {
        #[arg(long)]
        table: String,
        #[arg(long)]
        service: String,
        #[arg(long)]
        user: String,
    },
}

fn load_config(cli: &Cli) -> Result<GateConfig, GateError> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            GateConfig::from_file(path)?
        }
        None => GateConfig::default(),
    };

    let mut chain = ChainLookup::from_env();
    if let Some(path) = &cli.secrets_file {
        let document = std::fs::read_to_string(path).map_err(streamgate::ConfigError::from)?;
        chain.prepend(Box::new(MapLookup::from_json(&document, &cli.secrets_path)?));
    }
    config.resolve_secrets(&chain);
    chain.erase();
    Ok(config)
}

fn report(err: &GateError) {
    error!("{}", err);
    if let Some(hint) = err.suggestion() {
        error!("hint: {}", hint);
    }
}

async fn run(cli: Cli) -> Result<(), GateError> {
    match cli.command {
        Some(Command::Keygen) => {
            let pem = generate_private_key_pem()?;
            print!("{}", pem.as_str());
            Ok(())
        }
        Some(Command::Sign {
            ref table,
            ref service,
            ref user,
        }) => {
            let config = load_config(&cli)?;
            let authorizer = authorizer_from_config(&config.authorization)?;
            let signature = authorizer.sign(&canonical_string(table, service, user))?;
            println!("signature: {}", signature);
            println!("timestamp: {}", chrono::Utc::now().timestamp_millis());
            Ok(())
        }
        Some(Command::Serve) | None => {
            let config = load_config(&cli)?;
            let source = Arc::new(StaticPlaybackUrl::new(config.playback.base_url.clone()));
            let services = Arc::new(Services::from_config(&config, source)?);
            info!("streamgate server ready on stdio");

            let reader = BufReader::new(tokio::io::stdin());
            if let Err(e) = server::serve(services, reader, tokio::io::stdout()).await {
                error!("Error on stdio: {}. Exiting.", e);
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        report(&e);
        std::process::exit(1);
    }
}
