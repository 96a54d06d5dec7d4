use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    plutus::{self, as_bytes, as_constr, as_int, bytes, constr, int, PlutusData},
    Error,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TicketStatus {
    Listed,
    Sold,
}

impl TicketStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Listed => 0,
            Self::Sold => 1,
        }
    }
}

impl TryFrom<u8> for TicketStatus {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from(value as i128)
    }
}

impl TryFrom<i128> for TicketStatus {
    type Error = Error;

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Listed),
            1 => Ok(Self::Sold),
            x => Err(Error::UnknownStatus(x)),
        }
    }
}

impl From<TicketStatus> for u8 {
    fn from(value: TicketStatus) -> Self {
        value.code()
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listed => f.write_str("listed"),
            Self::Sold => f.write_str("sold"),
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "listed" | "0" => Ok(Self::Listed),
            "sold" | "1" => Ok(Self::Sold),
            _ => Err(Error::UnknownStatusName(s.to_string())),
        }
    }
}

/// The structural listing datum, `Constr 0 [seller, status]` with an
/// optional trailing price in lovelace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketDatum {
    pub seller: Vec<u8>,
    pub status: TicketStatus,
    pub price: Option<u64>,
}

impl TicketDatum {
    pub fn new(seller: impl Into<Vec<u8>>, status: TicketStatus) -> Self {
        Self {
            seller: seller.into(),
            status,
            price: None,
        }
    }

    pub fn with_price(mut self, price: u64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn to_plutus_data(&self) -> PlutusData {
        let mut datum = constr(0)
            .field(bytes(self.seller.clone()))
            .field(int(self.status.code()));

        if let Some(price) = self.price {
            datum = datum.field(int(price));
        }

        datum.into()
    }

    pub fn from_plutus_data(data: &PlutusData) -> Option<Self> {
        let fields = as_constr(data, 0)?;

        let (seller, status, price) = match fields {
            [seller, status] => (seller, status, None),
            [seller, status, price] => (seller, status, Some(price)),
            _ => return None,
        };

        let seller = as_bytes(seller)?.to_vec();
        let status = TicketStatus::try_from(as_int(status)?).ok()?;
        let price = match price {
            Some(p) => Some(u64::try_from(as_int(p)?).ok()?),
            None => None,
        };

        Some(Self {
            seller,
            status,
            price,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        plutus::to_cbor(&self.to_plutus_data())
    }
}

/// The JSON ticket record, stored on chain as `Constr 0 [bytes(json)]`.
///
/// Key order is not preserved through a decode and re-encode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub event_id: String,
    pub seller: String,
    pub price: u64,
    pub ticket_number: String,
    pub event_date: u64,
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl TicketRecord {
    pub fn to_plutus_data(&self) -> Result<PlutusData, Error> {
        let json = serde_json::to_vec(self)?;
        Ok(constr(0).field(bytes(json)).into())
    }

    pub fn from_plutus_data(data: &PlutusData) -> Option<Self> {
        match as_constr(data, 0)? {
            [json] => serde_json::from_slice(as_bytes(json)?).ok(),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        plutus::to_cbor(&self.to_plutus_data()?)
    }
}

/// What a listing's inline datum turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingDatum {
    Structural(TicketDatum),
    Record(TicketRecord),
    /// Valid plutus data of a shape this crate does not know
    Opaque(Vec<u8>),
    /// Bytes that are not plutus data at all
    Malformed(Vec<u8>),
}

impl ListingDatum {
    /// Classifies raw datum bytes. Never fails, unknown or broken payloads
    /// end up as [`ListingDatum::Opaque`] or [`ListingDatum::Malformed`].
    ///
    /// Data nested past [`plutus::MAX_DEPTH`] is kept as opaque without
    /// being decoded.
    pub fn decode(raw: &[u8]) -> Self {
        let data = match plutus::from_cbor(raw) {
            Ok(x) => x,
            Err(Error::TooDeep(_)) => return Self::Opaque(raw.to_vec()),
            Err(_) => return Self::Malformed(raw.to_vec()),
        };

        if let Some(datum) = TicketDatum::from_plutus_data(&data) {
            return Self::Structural(datum);
        }

        if let Some(record) = TicketRecord::from_plutus_data(&data) {
            return Self::Record(record);
        }

        Self::Opaque(raw.to_vec())
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        match self {
            Self::Structural(x) => x.encode(),
            Self::Record(x) => x.encode(),
            Self::Opaque(raw) => Ok(raw.clone()),
            Self::Malformed(_) => Err(Error::Malformed),
        }
    }

    /// Parses the JSON form accepted on the command line: either a ticket
    /// record object, or `{"seller": "<hex>", "status": 0, "price": 1}`.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        if let Ok(record) = serde_json::from_str::<TicketRecord>(json) {
            return Ok(Self::Record(record));
        }

        #[derive(Deserialize)]
        struct Structural {
            seller: String,
            status: TicketStatus,
            price: Option<u64>,
        }

        let raw: Structural = serde_json::from_str(json)?;
        let seller = hex::decode(&raw.seller)
            .map_err(|_| Error::UnexpectedShape("seller must be a hex key hash"))?;

        Ok(Self::Structural(TicketDatum {
            seller,
            status: raw.status,
            price: raw.price,
        }))
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Structural(_) | Self::Record(_))
    }

    pub fn status(&self) -> Option<TicketStatus> {
        match self {
            Self::Structural(x) => Some(x.status),
            Self::Record(x) => Some(x.status),
            _ => None,
        }
    }

    pub fn price(&self) -> Option<u64> {
        match self {
            Self::Structural(x) => x.price,
            Self::Record(x) => Some(x.price),
            _ => None,
        }
    }

    /// Seller as shown to users: hex key hash for structural datums, the
    /// recorded string (usually a bech32 address) for records.
    pub fn seller(&self) -> Option<String> {
        match self {
            Self::Structural(x) => Some(hex::encode(&x.seller)),
            Self::Record(x) => Some(x.seller.clone()),
            _ => None,
        }
    }

    /// Same datum with its price replaced; fails for shapes without a price.
    pub fn with_price(&self, price: u64) -> Result<Self, Error> {
        match self {
            Self::Structural(x) => Ok(Self::Structural(x.clone().with_price(price))),
            Self::Record(x) => Ok(Self::Record(TicketRecord {
                price,
                ..x.clone()
            })),
            Self::Opaque(_) => Err(Error::UnexpectedShape("opaque datum has no price")),
            Self::Malformed(_) => Err(Error::Malformed),
        }
    }
}
