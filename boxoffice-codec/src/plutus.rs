//! Helpers over the ledger's plutus data type.
//!
//! Constructor tags follow the compact encoding (121..127 for the first
//! seven alternatives, 1280..1400 for the next 121, and the general
//! `102 [index, fields]` form for everything else).

use pallas_codec::{
    minicbor::{self, data::Type, decode, Decoder},
    utils::Int,
};
pub use pallas_primitives::{BigInt, BoundedBytes, Constr, MaybeIndefArray, PlutusData};

use crate::Error;

/// Deepest nesting of arrays and maps accepted before decoding.
pub const MAX_DEPTH: usize = 64;

/// Decodes a single plutus data item, rejecting trailing bytes and anything
/// nested deeper than [`MAX_DEPTH`].
pub fn from_cbor(raw: &[u8]) -> Result<PlutusData, Error> {
    check_depth(raw, MAX_DEPTH)?;

    let mut d = Decoder::new(raw);
    let data: PlutusData = d.decode()?;

    let rest = raw.len() - d.position();
    if rest > 0 {
        return Err(Error::TrailingBytes(rest));
    }

    Ok(data)
}

pub fn to_cbor(data: &PlutusData) -> Result<Vec<u8>, Error> {
    minicbor::to_vec(data).map_err(|e| Error::Encode(e.to_string()))
}

/// Walks the item headers without recursing and fails once arrays and maps
/// nest deeper than `limit`.
pub fn check_depth(raw: &[u8], limit: usize) -> Result<(), Error> {
    let mut d = Decoder::new(raw);

    // items left in each open container, `None` while indefinite
    let mut open: Vec<Option<u64>> = Vec::new();

    loop {
        match d.datatype()? {
            Type::Break => {
                if !matches!(open.pop(), Some(None)) {
                    return Err(decode::Error::message("unexpected break").into());
                }

                d.set_position(d.position() + 1);
            }
            // a tag prefixes the item that follows it
            Type::Tag => {
                d.tag()?;
                continue;
            }
            Type::Array | Type::ArrayIndef => {
                take_slot(&mut open);
                open.push(d.array()?);
            }
            Type::Map | Type::MapIndef => {
                take_slot(&mut open);
                open.push(d.map()?.map(|n| n.saturating_mul(2)));
            }
            _ => {
                take_slot(&mut open);
                d.skip()?;
            }
        }

        if open.len() > limit {
            return Err(Error::TooDeep(limit));
        }

        while let Some(Some(0)) = open.last() {
            open.pop();
        }

        if open.is_empty() {
            return Ok(());
        }
    }
}

fn take_slot(open: &mut [Option<u64>]) {
    if let Some(Some(left)) = open.last_mut() {
        *left -= 1;
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ConstrBuilder {
    index: u64,
    fields: Vec<PlutusData>,
}

impl ConstrBuilder {
    pub fn field(mut self, item: PlutusData) -> Self {
        self.fields.push(item);
        self
    }
}

impl From<ConstrBuilder> for PlutusData {
    fn from(value: ConstrBuilder) -> Self {
        let (tag, any_constructor) = match value.index {
            i @ 0..=6 => (121 + i, None),
            i @ 7..=127 => (1280 + i - 7, None),
            i => (102, Some(i)),
        };

        // empty lists are definite, everything else indefinite, like the ledger
        let fields = if value.fields.is_empty() {
            MaybeIndefArray::Def(value.fields)
        } else {
            MaybeIndefArray::Indef(value.fields)
        };

        PlutusData::Constr(Constr {
            tag,
            any_constructor,
            fields,
        })
    }
}

pub fn constr(index: u64) -> ConstrBuilder {
    ConstrBuilder {
        index,
        fields: vec![],
    }
}

/// Integer item; values past the cbor int range become bignums.
pub fn int(v: impl Into<i128>) -> PlutusData {
    let v = v.into();

    let big = match Int::try_from(v) {
        Ok(x) => BigInt::Int(x),
        Err(_) if v >= 0 => BigInt::BigUInt(magnitude(v as u128).into()),
        Err(_) => BigInt::BigNInt(magnitude((-1 - v) as u128).into()),
    };

    PlutusData::BigInt(big)
}

pub fn bytes(v: impl Into<Vec<u8>>) -> PlutusData {
    PlutusData::BoundedBytes(v.into().into())
}

fn magnitude(v: u128) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);

    bytes[first..].to_vec()
}

/// Constructor index, whichever tag form carried it.
pub fn constr_index(constr: &Constr<PlutusData>) -> Option<u64> {
    match constr.tag {
        121..=127 => Some(constr.tag - 121),
        1280..=1400 => Some(constr.tag - 1280 + 7),
        102 => constr.any_constructor,
        _ => None,
    }
}

/// Fields of `data` if it is alternative `index`.
pub fn as_constr(data: &PlutusData, index: u64) -> Option<&[PlutusData]> {
    match data {
        PlutusData::Constr(x) if constr_index(x) == Some(index) => Some(x.fields.as_slice()),
        _ => None,
    }
}

pub fn as_bytes(data: &PlutusData) -> Option<&[u8]> {
    match data {
        PlutusData::BoundedBytes(b) => Some(b.as_slice()),
        _ => None,
    }
}

/// Value of a small integer; bignums are not unpacked.
pub fn as_int(data: &PlutusData) -> Option<i128> {
    match data {
        PlutusData::BigInt(BigInt::Int(x)) => Some(i128::from(x.0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_constructor_tags() {
        let data: PlutusData = constr(0).field(bytes(vec![0xab])).field(int(1)).into();
        let cbor = to_cbor(&data).unwrap();

        // tag 121, indefinite array, bytes(1) ab, int 1, break
        assert_eq!(hex::encode(&cbor), "d8799f41ab01ff");
        assert_eq!(from_cbor(&cbor).unwrap(), data);
    }

    #[test]
    fn extended_and_general_constructor_tags() {
        let seventh: PlutusData = constr(7).into();
        let cbor = to_cbor(&seventh).unwrap();
        assert_eq!(hex::encode(&cbor), "d9050080");
        assert_eq!(as_constr(&seventh, 7), Some(&[][..]));

        let general: PlutusData = constr(500).field(int(-3)).into();
        let cbor = to_cbor(&general).unwrap();
        assert_eq!(&cbor[..2], &[0xd8, 0x66]);

        let decoded = from_cbor(&cbor).unwrap();
        assert_eq!(as_constr(&decoded, 500).map(|x| x.len()), Some(1));
    }

    #[test]
    fn ints_beyond_cbor_range_become_bignums() {
        let big = int(u64::MAX as i128 + 1);
        let cbor = to_cbor(&big).unwrap();
        assert_eq!(&cbor[..2], &[0xc2, 0x49]);
        assert_eq!(as_int(&big), None);

        assert_eq!(as_int(&int(-7)), Some(-7));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let err = from_cbor(&hex::decode("0101").unwrap()).unwrap_err();
        assert!(matches!(err, Error::TrailingBytes(1)));
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert!(from_cbor(&hex::decode("d8650101").unwrap()).is_err());
    }

    #[test]
    fn shallow_nesting_passes_the_depth_check() {
        // [[1, {2: [_ 3]}]]
        let raw = hex::decode("818201a1029f03ff").unwrap();
        assert!(check_depth(&raw, 4).is_ok());
        assert!(matches!(check_depth(&raw, 3), Err(Error::TooDeep(3))));
    }

    #[test]
    fn deep_nesting_is_refused_before_decoding() {
        let mut raw = vec![0x81; 10_000];
        raw.push(0x00);

        assert!(matches!(from_cbor(&raw), Err(Error::TooDeep(MAX_DEPTH))));
    }

    #[test]
    fn stray_break_is_rejected() {
        assert!(check_depth(&[0xff], MAX_DEPTH).is_err());
        assert!(check_depth(&[0x82, 0x01, 0xff], MAX_DEPTH).is_err());
    }
}
