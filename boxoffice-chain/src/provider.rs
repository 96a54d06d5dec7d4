use std::future::Future;

use thiserror::Error;

use crate::model::RawUtxo;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected response ({code}): {text}")]
    Status { code: u16, text: String },

    #[error("transaction rejected: {0}")]
    Submit(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An exact fraction, as the ledger prices execution units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    pub numerator: u64,
    pub denominator: u64,
}

impl Ratio {
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Providers report prices as decimals; ten decimal places is more
    /// precision than any published price uses.
    pub fn from_decimal(x: f64) -> Self {
        const SCALE: u64 = 10_000_000_000;
        Self::new((x * SCALE as f64).round() as u64, SCALE)
    }
}

/// Protocol parameters the transaction builder needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolParams {
    pub min_fee_a: u64,
    pub min_fee_b: u64,
    pub price_mem: Ratio,
    pub price_step: Ratio,
    pub coins_per_utxo_byte: u64,
    pub max_tx_size: u64,
    pub plutus_v3_cost_model: Option<Vec<i64>>,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            min_fee_a: 44,
            min_fee_b: 155_381,
            price_mem: Ratio::new(577, 10_000),
            price_step: Ratio::new(721, 10_000_000),
            coins_per_utxo_byte: 4_310,
            max_tx_size: 16_384,
            plutus_v3_cost_model: None,
        }
    }
}

impl ProtocolParams {
    /// Lovelace charged for running a script with the given budget.
    pub fn execution_cost(&self, mem: u64, steps: u64) -> u64 {
        let (pm, ps) = (self.price_mem, self.price_step);

        let numerator = mem as u128 * pm.numerator as u128 * ps.denominator as u128
            + steps as u128 * ps.numerator as u128 * pm.denominator as u128;
        let denominator = (pm.denominator as u128 * ps.denominator as u128).max(1);

        numerator.div_ceil(denominator) as u64
    }

    /// `a * size + b`
    pub fn size_fee(&self, size: u64) -> u64 {
        self.min_fee_a * size + self.min_fee_b
    }
}

/// Read and submit access to the chain.
pub trait ChainProvider: Send + Sync {
    /// Outputs created by a transaction. Empty while the transaction is not
    /// yet indexed.
    fn utxos_by_tx_hash(
        &self,
        tx_hash: &str,
    ) -> impl Future<Output = Result<Vec<RawUtxo>, ProviderError>> + Send;

    fn utxos_by_address(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Vec<RawUtxo>, ProviderError>> + Send;

    fn datum_by_hash(
        &self,
        datum_hash: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, ProviderError>> + Send;

    fn protocol_params(&self) -> impl Future<Output = Result<ProtocolParams, ProviderError>> + Send;

    /// Broadcasts a signed transaction, returning its id.
    fn submit_tx(&self, cbor: &[u8]) -> impl Future<Output = Result<String, ProviderError>> + Send;
}
