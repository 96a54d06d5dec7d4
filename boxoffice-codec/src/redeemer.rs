use std::{fmt, str::FromStr};

use pallas_crypto::hash::Hash;

use crate::{
    plutus::{self, as_bytes, as_constr, as_int, bytes, constr, int, PlutusData},
    Error,
};

/// Spend actions understood by the marketplace validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Buy,
    Cancel,
    UpdatePrice,
    Relock,
    Burn,
}

impl Action {
    pub fn code(self) -> u8 {
        match self {
            Self::Buy => 0,
            Self::Cancel => 1,
            Self::UpdatePrice => 2,
            Self::Relock => 3,
            Self::Burn => 4,
        }
    }

    pub fn from_code(code: i128) -> Option<Self> {
        match code {
            0 => Some(Self::Buy),
            1 => Some(Self::Cancel),
            2 => Some(Self::UpdatePrice),
            3 => Some(Self::Relock),
            4 => Some(Self::Burn),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Buy => "buy",
            Self::Cancel => "cancel",
            Self::UpdatePrice => "update-price",
            Self::Relock => "relock",
            Self::Burn => "burn",
        };

        f.write_str(name)
    }
}

impl FromStr for Action {
    type Err = Error;

    /// Accepts the action name or its numeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "buy" => Some(Self::Buy),
            "cancel" => Some(Self::Cancel),
            "update-price" | "update" => Some(Self::UpdatePrice),
            "relock" => Some(Self::Relock),
            "burn" => Some(Self::Burn),
            other => other.parse::<i128>().ok().and_then(Self::from_code),
        };

        action.ok_or_else(|| Error::UnknownAction(s.to_string()))
    }
}

/// Redeemer passed to the validator, `Constr 0 [int action, bytes actor]`.
///
/// `extra` carries the buy quantity or new price for the caller that builds
/// the outputs. It never reaches the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRedeemer {
    pub action: Action,
    pub actor: Hash<28>,
    pub extra: Option<u64>,
}

impl ActionRedeemer {
    pub fn new(action: Action, actor: Hash<28>) -> Self {
        Self {
            action,
            actor,
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: u64) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn to_plutus_data(&self) -> PlutusData {
        constr(0)
            .field(int(self.action.code()))
            .field(bytes(self.actor.to_vec()))
            .into()
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        plutus::to_cbor(&self.to_plutus_data())
    }

    pub fn decode(raw: &[u8]) -> Result<Self, Error> {
        let data = plutus::from_cbor(raw)?;

        let fields = as_constr(&data, 0)
            .ok_or(Error::UnexpectedShape("redeemer must be constructor 0"))?;

        let [action, actor] = fields else {
            return Err(Error::UnexpectedShape("redeemer must have two fields"));
        };

        let code = as_int(action)
            .ok_or(Error::UnexpectedShape("redeemer action must be an int"))?;
        let action = Action::from_code(code).ok_or_else(|| Error::UnknownAction(code.to_string()))?;

        let actor = as_bytes(actor)
            .filter(|x| x.len() == 28)
            .ok_or(Error::UnexpectedShape("redeemer actor must be a 28 byte key hash"))?;

        Ok(Self::new(action, Hash::from(actor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_action_then_actor() {
        let redeemer = ActionRedeemer::new(Action::UpdatePrice, Hash::new([0x11; 28]));
        let cbor = redeemer.encode().unwrap();

        // d879 9f 02 581c <28 bytes> ff
        assert_eq!(&cbor[..5], &[0xd8, 0x79, 0x9f, 0x02, 0x58]);
        assert_eq!(cbor[5], 28);
        assert_eq!(*cbor.last().unwrap(), 0xff);
    }

    #[test]
    fn extra_is_not_serialized() {
        let plain = ActionRedeemer::new(Action::Buy, Hash::new([3; 28]));
        let with_extra = plain.clone().with_extra(4);

        assert_eq!(plain.encode().unwrap(), with_extra.encode().unwrap());
        assert_eq!(ActionRedeemer::decode(&with_extra.encode().unwrap()).unwrap(), plain);
    }

    #[test]
    fn action_names_and_codes_parse() {
        assert_eq!("buy".parse::<Action>().unwrap(), Action::Buy);
        assert_eq!("update_price".parse::<Action>().unwrap(), Action::UpdatePrice);
        assert_eq!("4".parse::<Action>().unwrap(), Action::Burn);
        assert!("9".parse::<Action>().is_err());
        assert!("steal".parse::<Action>().is_err());
    }

    #[test]
    fn short_actor_is_rejected() {
        let data: PlutusData = constr(0).field(int(0)).field(bytes(vec![1, 2])).into();
        assert!(ActionRedeemer::decode(&plutus::to_cbor(&data).unwrap()).is_err());
    }
}
