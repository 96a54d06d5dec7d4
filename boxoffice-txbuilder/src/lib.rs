//! Off-chain transaction assembly for the boxoffice marketplace.
//!
//! A listing is a script output holding ticket tokens and an inline datum.
//! Unlocking one goes through four steps, each its own module:
//! [`boxoffice_chain::Locator`] finds the output, [`collateral`] makes sure a
//! pure-lovelace collateral exists, [`action`] lays out the outputs for the
//! chosen action and [`balance`] turns that into a balanced Conway
//! transaction, and [`submit`] signs and broadcasts it. [`workflow`] ties
//! them together, and also mints fresh tokens under a policy held by the
//! wallet key.

use boxoffice_chain::ProviderError;
use thiserror::Error;

pub mod action;
pub mod balance;
pub mod collateral;
pub mod config;
pub mod submit;
pub mod wallet;
pub mod workflow;

pub use action::{key_policy, ActionBuilder, ActionParams};
pub use balance::{
    Balancer, NativeMint, OutputRole, PlannedOutput, ScriptSpend, TxPlan, UnsignedTransaction,
};
pub use collateral::CollateralResolver;
pub use config::{ExBudget, MarketConfig};
pub use submit::SubmissionPipeline;
pub use wallet::{KeyWallet, Wallet, WalletError, WalletSnapshot};
pub use workflow::{LockRequest, Marketplace, MintRequest, Stage, UnlockRequest, WorkflowError};

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

    #[error("invalid quantity {requested}, listing holds {available}")]
    InvalidQuantity { requested: u64, available: u64 },

    #[error("listing holds no asset besides lovelace")]
    NoAssetFound,

    #[error("{0} unavailable")]
    ResourceUnavailable(String),

    #[error("no collateral showed up after {attempts} attempts")]
    CollateralUnavailable { attempts: u32 },

    #[error("signing rejected: {0}")]
    SigningRejected(#[source] WalletError),

    #[error("submission rejected: {0}")]
    SubmissionRejected(#[source] WalletError),

    #[error("unsupported datum: {0}")]
    UnsupportedDatum(String),

    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("invalid asset unit {0}")]
    InvalidUnit(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("wallet error: {0}")]
    Wallet(#[source] WalletError),

    #[error("datum encoding failed: {0}")]
    Datum(#[from] boxoffice_codec::Error),

    #[error("transaction assembly failed: {0}")]
    Assembly(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<boxoffice_chain::Error> for Error {
    fn from(value: boxoffice_chain::Error) -> Self {
        match value {
            boxoffice_chain::Error::NotFound {
                tx_hash,
                attempts,
                last_error,
            } => Self::NotFound {
                tx_hash,
                attempts,
                last_error,
            },
            boxoffice_chain::Error::InvalidUtxo(x) => Self::InvalidUtxo(x),
            boxoffice_chain::Error::Provider(x) => Self::Provider(x),
            boxoffice_chain::Error::Cancelled => Self::Cancelled,
        }
    }
}
