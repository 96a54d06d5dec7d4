//! Chain-facing half of the boxoffice marketplace: the ledger model, the
//! provider contract with its Blockfrost implementation, polling for
//! freshly submitted outputs, and file pinning for ticket artwork.

use thiserror::Error;

pub mod blockfrost;
pub mod locator;
pub mod model;
pub mod network;
pub mod pinata;
pub mod provider;
pub mod retry;

pub use blockfrost::BlockfrostClient;
pub use locator::{resolve_datum, Locator};
pub use model::{parse_unit, Asset, OutputRef, RawAsset, RawUtxo, ScriptUtxo, Utxo, Value, LOVELACE};
pub use network::Network;
pub use pinata::PinataClient;
pub use provider::{ChainProvider, ProtocolParams, ProviderError, Ratio};
pub use retry::{retry, RetryError, RetryPolicy};

#[derive(Debug, Error)]
pub enum Error {
    #[error("no output found for {tx_hash} after {attempts} attempts")]
    NotFound {
        tx_hash: String,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("invalid utxo: {0}")]
    InvalidUtxo(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("cancelled")]
    Cancelled,
}
