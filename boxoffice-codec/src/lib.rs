//! Plutus data codec for the boxoffice marketplace validator.
//!
//! Listings carry an inline datum in one of two shapes: the structural
//! `Constr 0 [seller, status, price?]` layout written by the command line
//! tool, or a JSON ticket record wrapped in a single byte string field.
//! Anything else is kept around verbatim so it can be passed through
//! untouched.

use thiserror::Error;

pub mod datum;
pub mod plutus;
pub mod redeemer;

pub use datum::{ListingDatum, TicketDatum, TicketRecord, TicketStatus};
pub use redeemer::{Action, ActionRedeemer};

#[derive(Debug, Error)]
pub enum Error {
    #[error("cbor decoding failed: {0}")]
    Decode(#[from] pallas_codec::minicbor::decode::Error),

    #[error("cbor encoding failed: {0}")]
    Encode(String),

    #[error("plutus data nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("{0} trailing bytes after plutus data")]
    TrailingBytes(usize),

    #[error("unexpected plutus data shape: {0}")]
    UnexpectedShape(&'static str),

    #[error("unknown ticket status {0}")]
    UnknownStatus(i128),

    #[error("unknown ticket status `{0}`")]
    UnknownStatusName(String),

    #[error("unknown action {0}")]
    UnknownAction(String),

    #[error("invalid ticket record: {0}")]
    Record(#[from] serde_json::Error),

    #[error("datum bytes are not valid plutus data")]
    Malformed,
}
