use std::{fmt, str::FromStr};

use boxoffice_codec::ListingDatum;
use pallas_crypto::hash::Hash;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::Error;

pub const LOVELACE: &str = "lovelace";

/// A transaction output reference, displayed as `<tx hash>#<index>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputRef {
    pub tx_hash: Hash<32>,
    pub index: u64,
}

impl OutputRef {
    pub fn new(tx_hash: Hash<32>, index: u64) -> Self {
        Self { tx_hash, index }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.index)
    }
}

impl FromStr for OutputRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, index) = s
            .split_once('#')
            .ok_or_else(|| Error::InvalidUtxo(format!("output reference without index: {s}")))?;

        let tx_hash = Hash::<32>::from_str(hash)
            .map_err(|_| Error::InvalidUtxo(format!("bad transaction hash: {hash}")))?;
        let index = index
            .parse()
            .map_err(|_| Error::InvalidUtxo(format!("bad output index: {index}")))?;

        Ok(Self { tx_hash, index })
    }
}

/// Splits a `policy ++ asset name` unit into its parts.
pub fn parse_unit(unit: &str) -> Option<(Hash<28>, Vec<u8>)> {
    let bytes = hex::decode(unit).ok()?;

    if bytes.len() < 28 || bytes.len() > 28 + 32 {
        return None;
    }

    Some((Hash::from(&bytes[..28]), bytes[28..].to_vec()))
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub unit: String,
    #[serde_as(as = "DisplayFromStr")]
    pub quantity: u64,
}

impl Asset {
    pub fn new(unit: impl Into<String>, quantity: u64) -> Self {
        Self {
            unit: unit.into(),
            quantity,
        }
    }

    pub fn lovelace(quantity: u64) -> Self {
        Self::new(LOVELACE, quantity)
    }

    pub fn is_lovelace(&self) -> bool {
        self.unit == LOVELACE
    }
}

/// A multi-asset amount that keeps assets in the order they were observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(Vec<Asset>);

impl Value {
    pub fn new(assets: Vec<Asset>) -> Self {
        Self(assets)
    }

    pub fn lovelace_only(quantity: u64) -> Self {
        Self(vec![Asset::lovelace(quantity)])
    }

    pub fn assets(&self) -> &[Asset] {
        &self.0
    }

    pub fn into_assets(self) -> Vec<Asset> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|x| x.quantity == 0)
    }

    pub fn lovelace(&self) -> u64 {
        self.quantity_of(LOVELACE)
    }

    pub fn quantity_of(&self, unit: &str) -> u64 {
        self.0
            .iter()
            .filter(|x| x.unit == unit)
            .fold(0u64, |acc, x| acc.saturating_add(x.quantity))
    }

    /// Every non-lovelace asset with a positive quantity, in order.
    pub fn tokens(&self) -> impl Iterator<Item = &Asset> {
        self.0.iter().filter(|x| !x.is_lovelace() && x.quantity > 0)
    }

    pub fn first_token(&self) -> Option<&Asset> {
        self.tokens().next()
    }

    /// Exactly one entry, and that entry is lovelace.
    pub fn is_pure_lovelace(&self) -> bool {
        matches!(self.0.as_slice(), [only] if only.is_lovelace())
    }

    /// Adds `quantity` of `unit`, appending the unit if it is new. Totals
    /// saturate at `u64::MAX`, which no single output can hold anyway.
    pub fn add(&mut self, unit: &str, quantity: u64) {
        match self.0.iter_mut().find(|x| x.unit == unit) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(quantity),
            None => self.0.push(Asset::new(unit, quantity)),
        }
    }

    pub fn merge(&mut self, other: &Value) {
        for asset in other.assets() {
            self.add(&asset.unit, asset.quantity);
        }
    }

    /// Per-unit subtraction; `None` if any unit would go negative.
    /// Units that reach zero are dropped, except lovelace.
    pub fn checked_sub(&self, other: &Value) -> Option<Value> {
        let mut out = self.clone();

        for asset in other.assets() {
            let entry = out.0.iter_mut().find(|x| x.unit == asset.unit);

            match entry {
                Some(x) if x.quantity >= asset.quantity => x.quantity -= asset.quantity,
                None if asset.quantity == 0 => (),
                _ => return None,
            }
        }

        out.0.retain(|x| x.quantity > 0 || x.is_lovelace());
        Some(out)
    }

    /// What `available` lacks to cover `self`, unit by unit.
    pub fn shortfall(&self, available: &Value) -> Value {
        let mut missing = Value::default();

        for asset in self.assets() {
            let have = available.quantity_of(&asset.unit);
            let need = self.quantity_of(&asset.unit);

            if need > have && missing.quantity_of(&asset.unit) == 0 {
                missing.add(&asset.unit, need - have);
            }
        }

        missing
    }
}

impl FromIterator<Asset> for Value {
    fn from_iter<T: IntoIterator<Item = Asset>>(iter: T) -> Self {
        let mut value = Value::default();
        for asset in iter {
            value.add(&asset.unit, asset.quantity);
        }
        value
    }
}

/// An unspent output as seen on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub input: OutputRef,
    pub address: String,
    pub amount: Value,
    pub inline_datum: Option<Vec<u8>>,
    pub data_hash: Option<String>,
}

/// A listing at the marketplace script address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptUtxo {
    pub utxo: Utxo,
    /// Datum bytes, inline or fetched by hash
    pub raw_datum: Option<Vec<u8>>,
    pub datum: Option<ListingDatum>,
}

impl ScriptUtxo {
    pub fn input(&self) -> OutputRef {
        self.utxo.input
    }

    pub fn value(&self) -> &Value {
        &self.utxo.amount
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAsset {
    pub unit: String,
    pub quantity: String,
}

/// An output in the shape the provider returns it, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUtxo {
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub output_index: Option<u64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub amount: Option<Vec<RawAsset>>,
    #[serde(default)]
    pub data_hash: Option<String>,
    #[serde(default)]
    pub inline_datum: Option<String>,
    #[serde(default)]
    pub collateral: bool,
}

impl TryFrom<RawUtxo> for Utxo {
    type Error = Error;

    fn try_from(raw: RawUtxo) -> Result<Self, Self::Error> {
        let tx_hash = raw
            .tx_hash
            .ok_or_else(|| Error::InvalidUtxo("output has no tx_hash".into()))?;
        let index = raw
            .output_index
            .ok_or_else(|| Error::InvalidUtxo(format!("output of {tx_hash} has no output_index")))?;
        let amount = raw
            .amount
            .ok_or_else(|| Error::InvalidUtxo(format!("{tx_hash}#{index} has no amount list")))?;
        let address = raw
            .address
            .ok_or_else(|| Error::InvalidUtxo(format!("{tx_hash}#{index} has no address")))?;

        let tx_hash = Hash::<32>::from_str(&tx_hash)
            .map_err(|_| Error::InvalidUtxo(format!("bad transaction hash {tx_hash}")))?;

        let amount = amount
            .into_iter()
            .map(|x| match x.quantity.parse::<u64>() {
                Ok(quantity) => Ok(Asset::new(x.unit, quantity)),
                Err(_) => Err(Error::InvalidUtxo(format!(
                    "bad quantity `{}` for unit {}",
                    x.quantity, x.unit
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        // undecodable hex is kept as text so the datum classifies as malformed
        let inline_datum = raw
            .inline_datum
            .map(|x| hex::decode(&x).unwrap_or_else(|_| x.into_bytes()));

        Ok(Utxo {
            input: OutputRef::new(tx_hash, index),
            address,
            amount: Value::new(amount),
            inline_datum,
            data_hash: raw.data_hash,
        })
    }
}
