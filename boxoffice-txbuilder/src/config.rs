use boxoffice_chain::{Network, RetryPolicy};
use pallas_addresses::{Address, ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart};
use pallas_crypto::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Execution budget attached to the spend redeemer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExBudget {
    pub mem: u64,
    pub steps: u64,
}

impl Default for ExBudget {
    fn default() -> Self {
        Self {
            mem: 7_000_000,
            steps: 3_000_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub network: Network,

    /// Hex of the validator's compiled code, as found in the blueprint
    pub script_cbor: String,

    /// Where burned tickets go; burning is refused while unset
    pub burn_address: Option<String>,

    /// Exact lovelace of a synthesized collateral output, and the minimum an
    /// existing one must hold
    pub collateral_lovelace: u64,

    /// Lovelace attached to outputs that carry tokens
    pub min_output_lovelace: u64,

    /// Lovelace sent back to the script when a listing is bought out
    pub filler_lovelace: u64,

    /// Smallest lovelace-only change output
    pub min_change_lovelace: u64,

    /// Bytes reserved per expected signature while estimating the fee
    pub witness_allowance: u64,

    pub ex_units: ExBudget,

    pub retry: RetryPolicy,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            network: Network::Preprod,
            script_cbor: String::new(),
            burn_address: None,
            collateral_lovelace: 2_000_000,
            min_output_lovelace: 2_000_000,
            filler_lovelace: 1_000_000,
            min_change_lovelace: 1_000_000,
            witness_allowance: 128,
            ex_units: ExBudget::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl MarketConfig {
    pub fn script_bytes(&self) -> Result<Vec<u8>, Error> {
        if self.script_cbor.is_empty() {
            return Err(Error::MissingParameter("script_cbor"));
        }

        hex::decode(&self.script_cbor).map_err(|_| Error::MissingParameter("script_cbor"))
    }

    /// Plutus V3 script hash, blake2b-224 over the language tag and script.
    pub fn script_hash(&self) -> Result<Hash<28>, Error> {
        Ok(Hasher::<224>::hash_tagged(&self.script_bytes()?, 3))
    }

    pub fn script_address(&self) -> Result<String, Error> {
        let address = ShelleyAddress::new(
            self.network.address_network(),
            ShelleyPaymentPart::Script(self.script_hash()?),
            ShelleyDelegationPart::Null,
        );

        Address::Shelley(address)
            .to_bech32()
            .map_err(|e| Error::InvalidAddress(e.to_string()))
    }
}

/// Payment key hash of a bech32 address with a key payment part.
pub fn payment_key_hash(address: &str) -> Result<Hash<28>, Error> {
    let parsed =
        Address::from_bech32(address).map_err(|_| Error::InvalidAddress(address.to_string()))?;

    match parsed {
        Address::Shelley(x) => match x.payment() {
            ShelleyPaymentPart::Key(hash) => Ok(*hash),
            ShelleyPaymentPart::Script(_) => Err(Error::InvalidAddress(format!(
                "{address} is a script address"
            ))),
        },
        _ => Err(Error::InvalidAddress(address.to_string())),
    }
}
