//! Output layouts for each marketplace action.

use boxoffice_chain::{ProtocolParams, ScriptUtxo, Utxo, Value, LOVELACE};
use boxoffice_codec::{Action, ActionRedeemer, ListingDatum, TicketDatum};
use pallas_codec::minicbor;
use pallas_crypto::hash::{Hash, Hasher};
use pallas_primitives::conway::NativeScript;
use tracing::{debug, instrument, warn};

use crate::{
    balance::{
        Balancer, NativeMint, OutputRole, PlannedOutput, ScriptSpend, TxPlan, UnsignedTransaction,
    },
    config::{payment_key_hash, MarketConfig},
    wallet::WalletSnapshot,
    Error,
};

/// A native script that only the holder of `key_hash` can satisfy, and its
/// policy id.
pub fn key_policy(key_hash: Hash<28>) -> Result<(Vec<u8>, Hash<28>), Error> {
    let script = NativeScript::ScriptPubkey(key_hash);
    let bytes = minicbor::to_vec(&script).map_err(|e| Error::Assembly(e.to_string()))?;

    // native scripts hash under tag 0
    let policy = Hasher::<224>::hash_tagged(&bytes, 0);

    Ok((bytes, policy))
}

/// Per-action inputs supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct ActionParams {
    /// Units to buy; a buy without one takes a single unit
    pub quantity: Option<u64>,
    /// New price for [`Action::UpdatePrice`]
    pub price: Option<u64>,
    /// Replacement datum for [`Action::Relock`]
    pub datum: Option<ListingDatum>,
}

impl ActionParams {
    pub fn quantity(quantity: u64) -> Self {
        Self {
            quantity: Some(quantity),
            ..Default::default()
        }
    }

    pub fn price(price: u64) -> Self {
        Self {
            price: Some(price),
            ..Default::default()
        }
    }

    pub fn datum(datum: ListingDatum) -> Self {
        Self {
            datum: Some(datum),
            ..Default::default()
        }
    }
}

pub struct ActionBuilder<'a> {
    config: &'a MarketConfig,
    params: &'a ProtocolParams,
}

impl<'a> ActionBuilder<'a> {
    pub fn new(config: &'a MarketConfig, params: &'a ProtocolParams) -> Self {
        Self { config, params }
    }

    /// Lays out the outputs spending `script` with `action`. Nothing is
    /// balanced yet.
    pub fn plan(
        &self,
        script: &ScriptUtxo,
        action: Action,
        params: &ActionParams,
        wallet: &WalletSnapshot,
        collateral: Option<&Utxo>,
    ) -> Result<TxPlan, Error> {
        let value = script.value();
        let token = value.first_token().ok_or(Error::NoAssetFound)?;

        let quantity = params.quantity.unwrap_or(1);

        if action == Action::Buy && (quantity == 0 || quantity > token.quantity) {
            return Err(Error::InvalidQuantity {
                requested: quantity,
                available: token.quantity,
            });
        }

        let collateral =
            collateral.ok_or_else(|| Error::ResourceUnavailable("collateral".into()))?;

        if wallet.utxos.is_empty() {
            return Err(Error::ResourceUnavailable("wallet utxos".into()));
        }

        let actor = payment_key_hash(&wallet.change_address)?;
        let script_address = self.config.script_address()?;

        let outputs = match action {
            Action::Buy => self.buy_outputs(script, quantity, &wallet.change_address, &script_address),
            Action::Cancel => vec![PlannedOutput::new(
                OutputRole::Seller,
                wallet.change_address.clone(),
                value.clone(),
            )],
            Action::UpdatePrice => {
                let datum = match &script.datum {
                    Some(x) if x.is_known() => x,
                    Some(ListingDatum::Opaque(_)) => {
                        return Err(Error::UnsupportedDatum("datum of unknown shape".into()))
                    }
                    Some(_) => return Err(Error::UnsupportedDatum("malformed datum".into())),
                    None => return Err(Error::UnsupportedDatum("listing has no datum".into())),
                };

                let price = params.price.ok_or(Error::MissingParameter("price"))?;
                let updated = datum.with_price(price)?.encode()?;

                vec![
                    PlannedOutput::new(OutputRole::Relisting, script_address, value.clone())
                        .with_datum(updated),
                ]
            }
            Action::Relock => {
                let datum = params
                    .datum
                    .as_ref()
                    .ok_or(Error::MissingParameter("datum"))?;

                vec![
                    PlannedOutput::new(OutputRole::Relisting, script_address, value.clone())
                        .with_datum(datum.encode()?),
                ]
            }
            Action::Burn => {
                let sink = self
                    .config
                    .burn_address
                    .clone()
                    .ok_or(Error::MissingParameter("burn_address"))?;

                vec![PlannedOutput::new(OutputRole::Sink, sink, value.clone())]
            }
        };

        let mut redeemer = ActionRedeemer::new(action, actor);

        match action {
            Action::Buy => redeemer = redeemer.with_extra(quantity),
            Action::UpdatePrice => redeemer = redeemer.with_extra(params.price.unwrap_or_default()),
            _ => (),
        }

        debug!(%action, actor = %actor, outputs = outputs.len(), "planned action");

        let spend = ScriptSpend {
            utxo: script.utxo.clone(),
            redeemer: redeemer.encode()?,
            script: self.config.script_bytes()?,
            ex_units: self.config.ex_units,
        };

        let plan = outputs
            .into_iter()
            .fold(TxPlan::new().spend(spend), TxPlan::output)
            .collateral(collateral.clone())
            .signer(actor);

        Ok(plan)
    }

    fn buy_outputs(
        &self,
        script: &ScriptUtxo,
        quantity: u64,
        buyer: &str,
        script_address: &str,
    ) -> Vec<PlannedOutput> {
        let value = script.value();

        // plan() already checked there is a token
        let (unit, total) = match value.first_token() {
            Some(x) => (x.unit.clone(), x.quantity),
            None => return vec![],
        };

        let others: Vec<_> = value.tokens().filter(|x| x.unit != unit).collect();
        let remaining = total - quantity;

        let mut bought = Value::lovelace_only(self.config.min_output_lovelace);
        bought.add(&unit, quantity);

        if remaining > 0 {
            let mut kept = Value::lovelace_only(value.lovelace().max(self.config.min_output_lovelace));
            kept.add(&unit, remaining);
            for asset in &others {
                kept.add(&asset.unit, asset.quantity);
            }

            let mut redeposit = PlannedOutput::new(OutputRole::Redeposit, script_address, kept);

            match (&script.raw_datum, &script.datum) {
                (_, Some(ListingDatum::Malformed(_))) | (None, _) => {
                    warn!(input = %script.input(), "no usable datum, redeposit goes without one");
                }
                (Some(raw), _) => redeposit = redeposit.with_datum(raw.clone()),
            }

            vec![PlannedOutput::new(OutputRole::Buyer, buyer, bought), redeposit]
        } else {
            for asset in &others {
                bought.add(&asset.unit, asset.quantity);
            }

            vec![
                PlannedOutput::new(OutputRole::Buyer, buyer, bought),
                PlannedOutput::new(
                    OutputRole::Filler,
                    script_address,
                    Value::lovelace_only(self.config.filler_lovelace),
                ),
            ]
        }
    }

    /// Plans and balances the spend of `script`.
    #[instrument(skip_all, fields(input = %script.input(), %action))]
    pub fn build(
        &self,
        script: &ScriptUtxo,
        action: Action,
        params: &ActionParams,
        wallet: &WalletSnapshot,
        collateral: Option<&Utxo>,
    ) -> Result<UnsignedTransaction, Error> {
        let plan = self.plan(script, action, params, wallet, collateral)?;

        Balancer::new(self.config, self.params).balance(plan, &wallet.utxos, &wallet.change_address)
    }

    /// Plans a new listing of `quantity` of `unit` carrying `datum`.
    pub fn plan_lock(&self, unit: &str, quantity: u64, datum: &TicketDatum) -> Result<TxPlan, Error> {
        if quantity == 0 {
            return Err(Error::InvalidQuantity {
                requested: 0,
                available: 0,
            });
        }

        let value = if unit == LOVELACE {
            Value::lovelace_only(quantity)
        } else {
            let mut value = Value::lovelace_only(self.config.min_output_lovelace);
            value.add(unit, quantity);
            value
        };

        let listing = PlannedOutput::new(OutputRole::Listing, self.config.script_address()?, value)
            .with_datum(datum.encode()?);

        Ok(TxPlan::new().output(listing))
    }

    /// Plans minting `quantity` tokens named `name` under the key policy of
    /// `owner` and paying them back to `owner`. No metadata is attached.
    pub fn plan_mint(&self, name: &[u8], quantity: u64, owner: &str) -> Result<TxPlan, Error> {
        if quantity == 0 || i64::try_from(quantity).is_err() {
            return Err(Error::InvalidQuantity {
                requested: quantity,
                available: i64::MAX as u64,
            });
        }

        if name.len() > 32 {
            return Err(Error::InvalidUnit(hex::encode(name)));
        }

        let (script, policy) = key_policy(payment_key_hash(owner)?)?;

        let mint = NativeMint {
            script,
            policy,
            name: name.to_vec(),
            quantity,
        };

        let mut value = Value::lovelace_only(self.config.min_output_lovelace);
        value.add(&mint.unit(), quantity);

        debug!(unit = %mint.unit(), quantity, "minting");

        Ok(TxPlan::new()
            .output(PlannedOutput::new(OutputRole::Minted, owner, value))
            .mint(mint))
    }

    pub fn build_mint(
        &self,
        name: &[u8],
        quantity: u64,
        wallet: &WalletSnapshot,
    ) -> Result<UnsignedTransaction, Error> {
        let plan = self.plan_mint(name, quantity, &wallet.change_address)?;

        Balancer::new(self.config, self.params).balance(plan, &wallet.utxos, &wallet.change_address)
    }

    pub fn build_lock(
        &self,
        unit: &str,
        quantity: u64,
        datum: &TicketDatum,
        wallet: &WalletSnapshot,
    ) -> Result<UnsignedTransaction, Error> {
        let plan = self.plan_lock(unit, quantity, datum)?;

        Balancer::new(self.config, self.params).balance(plan, &wallet.utxos, &wallet.change_address)
    }
}
