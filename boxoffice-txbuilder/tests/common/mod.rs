#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use boxoffice_chain::{
    Asset, ChainProvider, OutputRef, ProtocolParams, ProviderError, RawAsset, RawUtxo,
    RetryPolicy, Utxo, Value,
};
use boxoffice_txbuilder::{MarketConfig, UnsignedTransaction, Wallet, WalletError};
use pallas_addresses::{Address, Network, ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart};
use pallas_crypto::hash::Hash;
use pallas_txbuilder::BuiltTransaction;

pub const SCRIPT: &str = "4e4d01000033222220051200120011";
pub const POLICY: &str = "c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00c0ffee00";

pub fn address(n: u8) -> String {
    let address = ShelleyAddress::new(
        Network::Testnet,
        ShelleyPaymentPart::Key(Hash::new([n; 28])),
        ShelleyDelegationPart::Null,
    );

    Address::Shelley(address).to_bech32().unwrap()
}

pub fn ticket() -> String {
    format!("{POLICY}7469636b6574")
}

pub fn config() -> MarketConfig {
    MarketConfig {
        script_cbor: SCRIPT.into(),
        burn_address: Some(address(0xbb)),
        retry: RetryPolicy::immediate(3),
        ..Default::default()
    }
}

pub fn utxo(seed: u8, owner: &str, assets: Vec<Asset>) -> Utxo {
    Utxo {
        input: OutputRef::new(Hash::new([seed; 32]), 0),
        address: owner.to_string(),
        amount: Value::new(assets),
        inline_datum: None,
        data_hash: None,
    }
}

pub fn raw_output(
    tx_hash: &str,
    index: u64,
    address: &str,
    value: &Value,
    datum: Option<&[u8]>,
) -> RawUtxo {
    RawUtxo {
        tx_hash: Some(tx_hash.to_string()),
        output_index: Some(index),
        address: Some(address.to_string()),
        amount: Some(
            value
                .assets()
                .iter()
                .map(|x| RawAsset {
                    unit: x.unit.clone(),
                    quantity: x.quantity.to_string(),
                })
                .collect(),
        ),
        data_hash: None,
        inline_datum: datum.map(hex::encode),
        collateral: false,
    }
}

/// In-memory chain shared by every clone. Outputs only show up once a test
/// confirms them.
#[derive(Clone, Default)]
pub struct FakeChain {
    state: Arc<ChainState>,
}

#[derive(Default)]
struct ChainState {
    txs: Mutex<HashMap<String, Vec<RawUtxo>>>,
    addresses: Mutex<HashMap<String, Vec<RawUtxo>>>,
    params: ProtocolParams,
    tx_queries: AtomicU32,
}

impl FakeChain {
    pub fn publish(&self, output: RawUtxo) {
        let tx_hash = output.tx_hash.clone().unwrap_or_default();
        let address = output.address.clone().unwrap_or_default();

        self.state
            .txs
            .lock()
            .unwrap()
            .entry(tx_hash)
            .or_default()
            .push(output.clone());

        self.state
            .addresses
            .lock()
            .unwrap()
            .entry(address)
            .or_default()
            .push(output);
    }

    /// Makes every output of `tx` visible, indexed in ledger order.
    pub fn confirm(&self, tx: &UnsignedTransaction) {
        let tx_hash = tx.tx_hash();

        for (index, output) in tx.outputs.iter().enumerate() {
            self.publish(raw_output(
                &tx_hash,
                index as u64,
                &output.address,
                &output.value,
                output.datum.as_deref(),
            ));
        }
    }

    pub fn tx_queries(&self) -> u32 {
        self.state.tx_queries.load(Ordering::SeqCst)
    }
}

impl ChainProvider for FakeChain {
    async fn utxos_by_tx_hash(&self, tx_hash: &str) -> Result<Vec<RawUtxo>, ProviderError> {
        self.state.tx_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .txs
            .lock()
            .unwrap()
            .get(tx_hash)
            .cloned()
            .unwrap_or_default())
    }

    async fn utxos_by_address(&self, address: &str) -> Result<Vec<RawUtxo>, ProviderError> {
        Ok(self
            .state
            .addresses
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn datum_by_hash(&self, _: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        Ok(None)
    }

    async fn protocol_params(&self) -> Result<ProtocolParams, ProviderError> {
        Ok(self.state.params.clone())
    }

    async fn submit_tx(&self, _: &[u8]) -> Result<String, ProviderError> {
        Err(ProviderError::Submit("submit through the wallet".into()))
    }
}

/// A wallet that signs nothing and records what it is asked to submit.
///
/// With `collateral_after` set, every submission makes a 2 ada output at
/// index 0 of the submitted transaction, and a larger change output at
/// index 1 listed ahead of it, appear once that many further `utxos` calls
/// have gone by.
pub struct FakeWallet {
    pub address: String,
    pub utxos: Mutex<Vec<Utxo>>,
    pub collateral: Vec<Utxo>,
    pub submitted: Mutex<Vec<BuiltTransaction>>,
    pub collateral_after: Option<u32>,
    pub reject_signing: bool,
    pub reject_submission: bool,
    pending: Mutex<Option<(Vec<Utxo>, u32)>>,
    pub utxo_queries: AtomicU32,
}

impl FakeWallet {
    pub fn new(address: String, utxos: Vec<Utxo>) -> Self {
        Self {
            address,
            utxos: Mutex::new(utxos),
            collateral: vec![],
            submitted: Mutex::new(vec![]),
            collateral_after: None,
            reject_signing: false,
            reject_submission: false,
            pending: Mutex::new(None),
            utxo_queries: AtomicU32::new(0),
        }
    }

    /// Marks `utxo` as collateral. Like a real wallet it stays spendable.
    pub fn with_collateral(mut self, utxo: Utxo) -> Self {
        self.utxos.get_mut().unwrap().push(utxo.clone());
        self.collateral.push(utxo);
        self
    }

    pub fn submissions(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

impl Wallet for FakeWallet {
    async fn utxos(&self) -> Result<Vec<Utxo>, WalletError> {
        self.utxo_queries.fetch_add(1, Ordering::SeqCst);

        let mut pending = self.pending.lock().unwrap();

        if let Some((outputs, left)) = pending.take() {
            if left == 0 {
                self.utxos.lock().unwrap().extend(outputs);
            } else {
                *pending = Some((outputs, left - 1));
            }
        }

        Ok(self.utxos.lock().unwrap().clone())
    }

    async fn change_address(&self) -> Result<String, WalletError> {
        Ok(self.address.clone())
    }

    async fn collateral(&self) -> Result<Vec<Utxo>, WalletError> {
        Ok(self.collateral.clone())
    }

    async fn sign_tx(&self, tx: BuiltTransaction) -> Result<BuiltTransaction, WalletError> {
        if self.reject_signing {
            return Err(WalletError::Signing("user declined".into()));
        }

        Ok(tx)
    }

    async fn submit_tx(&self, tx: &BuiltTransaction) -> Result<String, WalletError> {
        if self.reject_submission {
            return Err(WalletError::Rejected("BadInputsUTxO".into()));
        }

        if let Some(polls) = self.collateral_after {
            let output = |index, lovelace| Utxo {
                input: OutputRef::new(Hash::new(tx.tx_hash.0), index),
                address: self.address.clone(),
                amount: Value::lovelace_only(lovelace),
                inline_datum: None,
                data_hash: None,
            };

            let outputs = vec![output(1, 20_000_000), output(0, 2_000_000)];
            *self.pending.lock().unwrap() = Some((outputs, polls));
        }

        self.submitted.lock().unwrap().push(tx.clone());

        Ok(hex::encode(tx.tx_hash.0))
    }
}
