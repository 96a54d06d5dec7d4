//! Turning an output plan into a balanced Conway transaction.
//!
//! The fee depends on the serialized size, which depends on the inputs picked
//! to pay that fee, so the balancer goes round: pick inputs, stage, measure,
//! raise the fee, repeat until the staged fee covers what the size demands.

use std::{cmp::Reverse, fmt, iter};

use boxoffice_chain::{parse_unit, OutputRef, ProtocolParams, Utxo, Value, LOVELACE};
use pallas_addresses::Address as PallasAddress;
use pallas_crypto::hash::Hash;
use pallas_txbuilder::{
    BuildConway, BuiltTransaction, ExUnits, Input, Output, ScriptKind, StagingTransaction,
};
use tracing::{debug, warn};

use crate::{
    config::{ExBudget, MarketConfig},
    Error,
};

const MAX_ROUNDS: usize = 10;

/// What an output is for, so callers and tests can find it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputRole {
    Listing,
    Buyer,
    Redeposit,
    Filler,
    Seller,
    Relisting,
    Sink,
    Collateral,
    Minted,
    Change,
}

impl fmt::Display for OutputRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Listing => "listing",
            Self::Buyer => "buyer",
            Self::Redeposit => "redeposit",
            Self::Filler => "filler",
            Self::Seller => "seller",
            Self::Relisting => "relisting",
            Self::Sink => "sink",
            Self::Collateral => "collateral",
            Self::Minted => "minted",
            Self::Change => "change",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOutput {
    pub role: OutputRole,
    pub address: String,
    pub value: Value,
    /// Inline datum bytes, attached verbatim
    pub datum: Option<Vec<u8>>,
}

impl PlannedOutput {
    pub fn new(role: OutputRole, address: impl Into<String>, value: Value) -> Self {
        Self {
            role,
            address: address.into(),
            value,
            datum: None,
        }
    }

    pub fn with_datum(mut self, datum: Vec<u8>) -> Self {
        self.datum = Some(datum);
        self
    }
}

/// The script input of a plan, with everything its witness needs.
#[derive(Debug, Clone)]
pub struct ScriptSpend {
    pub utxo: Utxo,
    pub redeemer: Vec<u8>,
    pub script: Vec<u8>,
    pub ex_units: ExBudget,
}

/// Tokens minted under a native policy, with the script that authorises them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeMint {
    pub script: Vec<u8>,
    pub policy: Hash<28>,
    pub name: Vec<u8>,
    pub quantity: u64,
}

impl NativeMint {
    pub fn unit(&self) -> String {
        format!("{}{}", self.policy, hex::encode(&self.name))
    }
}

/// Outputs a transaction must produce, before any wallet input or fee is
/// decided.
#[derive(Debug, Clone, Default)]
pub struct TxPlan {
    pub script_spend: Option<ScriptSpend>,
    pub outputs: Vec<PlannedOutput>,
    pub collateral: Option<Utxo>,
    pub required_signers: Vec<Hash<28>>,
    pub mint: Option<NativeMint>,
}

impl TxPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spend(mut self, spend: ScriptSpend) -> Self {
        self.script_spend = Some(spend);
        self
    }

    pub fn output(mut self, output: PlannedOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn collateral(mut self, utxo: Utxo) -> Self {
        self.collateral = Some(utxo);
        self
    }

    pub fn mint(mut self, mint: NativeMint) -> Self {
        self.mint = Some(mint);
        self
    }

    pub fn signer(mut self, key_hash: Hash<28>) -> Self {
        if !self.required_signers.contains(&key_hash) {
            self.required_signers.push(key_hash);
        }
        self
    }

    fn output_value(&self) -> Value {
        let mut total = Value::default();

        for output in &self.outputs {
            total.merge(&output.value);
        }

        total
    }

    /// What the transaction brings in besides wallet inputs.
    fn provided_value(&self) -> Value {
        let mut total = self
            .script_spend
            .as_ref()
            .map(|x| x.utxo.amount.clone())
            .unwrap_or_default();

        if let Some(mint) = &self.mint {
            total.add(&mint.unit(), mint.quantity);
        }

        total
    }

    /// Inputs already part of the transaction. The collateral is not one of
    /// them, the ledger lets it be spent as a regular input too.
    fn reserved_inputs(&self) -> Vec<OutputRef> {
        self.script_spend.iter().map(|x| x.utxo.input).collect()
    }
}

/// A balanced, not yet signed transaction.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    /// Every output in ledger order, change last
    pub outputs: Vec<PlannedOutput>,
    pub script_input: Option<OutputRef>,
    /// Wallet inputs picked to pay for the outputs and the fee
    pub inputs: Vec<Utxo>,
    pub collateral: Option<OutputRef>,
    pub fee: u64,
    pub tx: BuiltTransaction,
}

impl UnsignedTransaction {
    pub fn tx_hash(&self) -> String {
        hex::encode(self.tx.tx_hash.0)
    }

    pub fn cbor(&self) -> &[u8] {
        &self.tx.tx_bytes.0
    }

    pub fn outputs_with(&self, role: OutputRole) -> impl Iterator<Item = &PlannedOutput> {
        self.outputs.iter().filter(move |x| x.role == role)
    }

    pub fn output_with(&self, role: OutputRole) -> Option<&PlannedOutput> {
        self.outputs_with(role).next()
    }
}

pub struct Balancer<'a> {
    config: &'a MarketConfig,
    params: &'a ProtocolParams,
}

impl<'a> Balancer<'a> {
    pub fn new(config: &'a MarketConfig, params: &'a ProtocolParams) -> Self {
        Self { config, params }
    }

    fn execution_cost(&self, plan: &TxPlan) -> u64 {
        plan.script_spend
            .as_ref()
            .map(|x| self.params.execution_cost(x.ex_units.mem, x.ex_units.steps))
            .unwrap_or(0)
    }

    fn required_fee(&self, plan: &TxPlan, size: u64) -> u64 {
        let signers = plan.required_signers.len().max(1) as u64;
        let witnesses = signers * self.config.witness_allowance;

        self.params.size_fee(size + witnesses) + self.execution_cost(plan)
    }

    /// Picks wallet inputs, adds change and settles the fee.
    pub fn balance(
        &self,
        plan: TxPlan,
        wallet_utxos: &[Utxo],
        change_address: &str,
    ) -> Result<UnsignedTransaction, Error> {
        if plan.script_spend.is_some() && self.params.plutus_v3_cost_model.is_none() {
            warn!("no PlutusV3 cost model known, script data hash left out");
        }

        let reserved = plan.reserved_inputs();
        let candidates: Vec<&Utxo> = wallet_utxos
            .iter()
            .filter(|x| !reserved.contains(&x.input))
            .collect();

        let outputs = plan.output_value();
        let provided = plan.provided_value();

        let mut fee = self.required_fee(&plan, 0);
        let mut reserve = self.config.min_change_lovelace;

        for round in 0..MAX_ROUNDS {
            let mut target = outputs.clone();
            target.add(LOVELACE, fee + reserve);

            let inputs = select_inputs(&candidates, &target.shortfall(&provided))?;

            let mut available = provided.clone();
            for utxo in &inputs {
                available.merge(&utxo.amount);
            }

            let mut spent = outputs.clone();
            spent.add(LOVELACE, fee);

            let change = available
                .checked_sub(&spent)
                .ok_or_else(|| Error::ResourceUnavailable("wallet funds".into()))?;

            let floor = if change.first_token().is_some() {
                self.config.min_output_lovelace
            } else {
                self.config.min_change_lovelace
            };

            if change.lovelace() < floor {
                debug!(round, floor, "change below minimum, selecting more");
                reserve = floor;
                continue;
            }

            let change = PlannedOutput::new(OutputRole::Change, change_address, change);
            let tx = self.stage(&plan, &inputs, &change, fee)?;

            let size = tx.tx_bytes.0.len() as u64;
            let required = self.required_fee(&plan, size);

            debug!(round, size, fee, required, "fee round");

            if required <= fee {
                let mut all = plan.outputs;
                all.push(change);

                return Ok(UnsignedTransaction {
                    outputs: all,
                    script_input: plan.script_spend.as_ref().map(|x| x.utxo.input),
                    inputs,
                    collateral: plan.collateral.as_ref().map(|x| x.input),
                    fee,
                    tx,
                });
            }

            fee = required;
        }

        Err(Error::Assembly("fee did not settle".into()))
    }

    fn stage(
        &self,
        plan: &TxPlan,
        inputs: &[Utxo],
        change: &PlannedOutput,
        fee: u64,
    ) -> Result<BuiltTransaction, Error> {
        let mut tx = StagingTransaction::new();

        if let Some(spend) = &plan.script_spend {
            let input = to_input(&spend.utxo);
            let ex_units = ExUnits {
                mem: spend.ex_units.mem,
                steps: spend.ex_units.steps,
            };

            tx = tx
                .input(input.clone())
                .add_spend_redeemer(input, spend.redeemer.clone(), Some(ex_units))
                .script(ScriptKind::PlutusV3, spend.script.clone());

            if let Some(cost_model) = &self.params.plutus_v3_cost_model {
                tx = tx.language_view(ScriptKind::PlutusV3, cost_model.clone());
            }
        }

        for utxo in inputs {
            tx = tx.input(to_input(utxo));
        }

        if let Some(collateral) = &plan.collateral {
            tx = tx.collateral_input(to_input(collateral));
        }

        if let Some(mint) = &plan.mint {
            let quantity = i64::try_from(mint.quantity)
                .map_err(|_| Error::Assembly(format!("cannot mint {} units", mint.quantity)))?;

            tx = tx
                .mint_asset(mint.policy, mint.name.clone(), quantity)
                .map_err(|e| Error::Assembly(e.to_string()))?
                .script(ScriptKind::Native, mint.script.clone());
        }

        for signer in &plan.required_signers {
            tx = tx.disclosed_signer(*signer);
        }

        for output in plan.outputs.iter().chain(iter::once(change)) {
            tx = tx.output(to_output(output)?);
        }

        tx.fee(fee)
            .network_id(self.config.network.network_id())
            .change_address(parse_address(&change.address)?)
            .build_conway_raw()
            .map_err(|e| Error::Assembly(e.to_string()))
    }
}

/// Covers `need` from `candidates`: holders of each missing token first,
/// biggest holding first, then lovelace from pure-lovelace outputs before
/// mixed ones, largest first.
pub fn select_inputs(candidates: &[&Utxo], need: &Value) -> Result<Vec<Utxo>, Error> {
    let mut chosen: Vec<&Utxo> = vec![];
    let mut gathered = Value::default();

    for token in need.tokens() {
        let mut holders: Vec<&Utxo> = candidates
            .iter()
            .copied()
            .filter(|x| x.amount.quantity_of(&token.unit) > 0)
            .filter(|x| !chosen.iter().any(|c| c.input == x.input))
            .collect();

        holders.sort_by_key(|x| Reverse(x.amount.quantity_of(&token.unit)));

        for holder in holders {
            if gathered.quantity_of(&token.unit) >= token.quantity {
                break;
            }

            gathered.merge(&holder.amount);
            chosen.push(holder);
        }

        if gathered.quantity_of(&token.unit) < token.quantity {
            return Err(Error::ResourceUnavailable("wallet funds".into()));
        }
    }

    let wanted = need.lovelace();

    if gathered.lovelace() < wanted {
        let mut rest: Vec<&Utxo> = candidates
            .iter()
            .copied()
            .filter(|x| !chosen.iter().any(|c| c.input == x.input))
            .collect();

        rest.sort_by_key(|x| (!x.amount.is_pure_lovelace(), Reverse(x.amount.lovelace())));

        for utxo in rest {
            if gathered.lovelace() >= wanted {
                break;
            }

            gathered.merge(&utxo.amount);
            chosen.push(utxo);
        }

        if gathered.lovelace() < wanted {
            return Err(Error::ResourceUnavailable("wallet funds".into()));
        }
    }

    Ok(chosen.into_iter().cloned().collect())
}

fn to_input(utxo: &Utxo) -> Input {
    Input::new(utxo.input.tx_hash, utxo.input.index)
}

fn parse_address(address: &str) -> Result<PallasAddress, Error> {
    PallasAddress::from_bech32(address).map_err(|_| Error::InvalidAddress(address.to_string()))
}

fn to_output(planned: &PlannedOutput) -> Result<Output, Error> {
    let mut output = Output::new(parse_address(&planned.address)?, planned.value.lovelace());

    for asset in planned.value.tokens() {
        let (policy, name) =
            parse_unit(&asset.unit).ok_or_else(|| Error::InvalidUnit(asset.unit.clone()))?;

        output = output
            .add_asset(policy, name, asset.quantity)
            .map_err(|_| Error::InvalidUnit(asset.unit.clone()))?;
    }

    if let Some(datum) = &planned.datum {
        output = output.set_inline_datum(datum.clone());
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use boxoffice_chain::Asset;
    use pallas_addresses::{Network, ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart};

    use super::*;

    const POLICY: &str = "c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00";

    fn address(n: u8) -> String {
        let address = ShelleyAddress::new(
            Network::Testnet,
            ShelleyPaymentPart::Key(Hash::new([n; 28])),
            ShelleyDelegationPart::Null,
        );

        PallasAddress::Shelley(address).to_bech32().unwrap()
    }

    fn utxo(n: u8, assets: Vec<Asset>) -> Utxo {
        Utxo {
            input: OutputRef::new(Hash::new([n; 32]), 0),
            address: address(1),
            amount: Value::new(assets),
            inline_datum: None,
            data_hash: None,
        }
    }

    fn unit() -> String {
        format!("{POLICY}746b74")
    }

    #[test]
    fn tokens_are_selected_first() {
        let plain = utxo(1, vec![Asset::lovelace(50_000_000)]);
        let small = utxo(2, vec![Asset::lovelace(2_000_000), Asset::new(unit(), 1)]);
        let large = utxo(3, vec![Asset::lovelace(2_000_000), Asset::new(unit(), 5)]);

        let mut need = Value::lovelace_only(1_000_000);
        need.add(&unit(), 3);

        let picked = select_inputs(&[&plain, &small, &large], &need).unwrap();

        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].input, large.input);
    }

    #[test]
    fn lovelace_prefers_pure_outputs() {
        let mixed = utxo(1, vec![Asset::lovelace(90_000_000), Asset::new(unit(), 1)]);
        let small = utxo(2, vec![Asset::lovelace(3_000_000)]);
        let big = utxo(3, vec![Asset::lovelace(10_000_000)]);

        let picked = select_inputs(&[&mixed, &small, &big], &Value::lovelace_only(12_000_000))
            .unwrap();

        let picked: Vec<_> = picked.iter().map(|x| x.input).collect();
        assert_eq!(picked, vec![big.input, small.input]);
    }

    #[test]
    fn short_wallet_is_unavailable() {
        let only = utxo(1, vec![Asset::lovelace(1_000_000)]);

        let err = select_inputs(&[&only], &Value::lovelace_only(5_000_000)).unwrap_err();
        assert!(matches!(err, Error::ResourceUnavailable(x) if x == "wallet funds"));
    }

    #[test]
    fn balanced_payment_conserves_value() {
        let config = MarketConfig::default();
        let params = ProtocolParams::default();

        let wallet = vec![
            utxo(1, vec![Asset::lovelace(20_000_000)]),
            utxo(2, vec![Asset::lovelace(4_000_000), Asset::new(unit(), 2)]),
        ];

        let plan = TxPlan::new()
            .output(PlannedOutput::new(
                OutputRole::Collateral,
                address(1),
                Value::lovelace_only(2_000_000),
            ))
            .signer(Hash::new([1; 28]));

        let tx = Balancer::new(&config, &params)
            .balance(plan, &wallet, &address(1))
            .unwrap();

        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.inputs[0].input, wallet[0].input);

        let change = tx.output_with(OutputRole::Change).unwrap();
        assert_eq!(change.value.lovelace() + tx.fee + 2_000_000, 20_000_000);

        let size = tx.cbor().len() as u64;
        assert!(tx.fee >= params.size_fee(size + config.witness_allowance));
        assert!(tx.fee < params.size_fee(size + config.witness_allowance) + 10_000);
    }

    #[test]
    fn token_change_gets_min_output_lovelace() {
        let config = MarketConfig::default();
        let params = ProtocolParams::default();

        let wallet = vec![
            utxo(1, vec![Asset::lovelace(2_500_000), Asset::new(unit(), 3)]),
            utxo(2, vec![Asset::lovelace(10_000_000)]),
        ];

        let mut sent = Value::lovelace_only(2_000_000);
        sent.add(&unit(), 1);

        let plan = TxPlan::new().output(PlannedOutput::new(OutputRole::Listing, address(9), sent));

        let tx = Balancer::new(&config, &params)
            .balance(plan, &wallet, &address(1))
            .unwrap();

        let change = tx.output_with(OutputRole::Change).unwrap();
        assert_eq!(change.value.quantity_of(&unit()), 2);
        assert!(change.value.lovelace() >= config.min_output_lovelace);
        assert_eq!(tx.inputs.len(), 2);
    }

    #[test]
    fn collateral_output_can_also_fund() {
        let config = MarketConfig::default();
        let params = ProtocolParams::default();

        let collateral = utxo(1, vec![Asset::lovelace(5_000_000)]);
        let wallet = vec![collateral.clone()];

        let plan = TxPlan::new()
            .output(PlannedOutput::new(
                OutputRole::Seller,
                address(2),
                Value::lovelace_only(2_000_000),
            ))
            .collateral(collateral.clone());

        let unsigned = Balancer::new(&config, &params)
            .balance(plan, &wallet, &address(1))
            .unwrap();

        assert_eq!(unsigned.collateral, Some(collateral.input));
        assert_eq!(unsigned.inputs, vec![collateral]);
        assert!(unsigned.output_with(OutputRole::Change).is_some());
    }

    #[test]
    fn bad_unit_is_reported() {
        let config = MarketConfig::default();
        let params = ProtocolParams::default();

        let wallet = vec![
            utxo(1, vec![Asset::lovelace(10_000_000), Asset::new("abcd", 1)]),
        ];

        let mut value = Value::lovelace_only(2_000_000);
        value.add("abcd", 1);

        let plan = TxPlan::new().output(PlannedOutput::new(OutputRole::Seller, address(2), value));

        let err = Balancer::new(&config, &params)
            .balance(plan, &wallet, &address(1))
            .unwrap_err();

        assert!(matches!(err, Error::InvalidUnit(x) if x == "abcd"));
    }
}
