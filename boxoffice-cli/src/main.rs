//! Command line front end for the boxoffice ticket marketplace

use clap::{Parser, Subcommand};

/// Settings file and secrets
pub mod context;

/// Settings file layout
pub mod settings;

/// Wallet and script addresses
pub mod address;

/// Listing search
pub mod listings;

/// New listings
pub mod lock;

/// Minting under the wallet key
pub mod mint;

/// Artwork pinning
pub mod pin;

/// Spending listings
pub mod unlock;

/// CLI commands available
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Lists `quantity` of `unit` at the marketplace script
    Lock(lock::Args),

    /// Spends a listing with one of buy, cancel, update-price, relock or burn
    Unlock(unlock::Args),

    /// Shows listings at the marketplace script, optionally filtered
    Listings(listings::Args),

    /// Mints tokens under a policy held by the wallet key, without metadata
    Mint(mint::Args),

    /// Pins a file to IPFS and prints its CID
    Pin(pin::Args),

    /// Prints the wallet and script addresses
    Address,
}

#[derive(Debug, Parser)]
#[clap(name = "boxoffice")]
#[clap(bin_name = "boxoffice")]
#[clap(version=env!("CARGO_PKG_VERSION"))]
#[clap(about = "Lists, buys and manages Cardano event tickets held by the marketplace validator")]
#[clap(long_about = None)]
pub struct Cli {
    #[command(flatten)]
    globals: context::Globals,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if dotenv.is_err() {
        tracing::debug!("no .env file found");
    }

    let args = Cli::parse();
    let ctx = context::Context::load(args.globals)?;

    match args.command {
        Command::Lock(args) => lock::run(&ctx, args).await,
        Command::Unlock(args) => unlock::run(&ctx, args).await,
        Command::Listings(args) => listings::run(&ctx, args).await,
        Command::Mint(args) => mint::run(&ctx, args).await,
        Command::Pin(args) => pin::run(&ctx, args).await,
        Command::Address => address::run(&ctx),
    }
}
