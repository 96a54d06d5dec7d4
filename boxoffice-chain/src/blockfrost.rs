//! [`ChainProvider`] over the Blockfrost REST API.

use std::collections::HashMap;

use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_with::{serde_as, DisplayFromStr};
use tracing::{debug, instrument};

use crate::{
    model::RawUtxo,
    network::Network,
    provider::{ChainProvider, ProtocolParams, ProviderError, Ratio},
};

const PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct BlockfrostClient {
    client: Client,
    base_url: String,
    project_id: String,
}

#[derive(Debug, Deserialize)]
struct TxUtxos {
    hash: String,
    outputs: Vec<RawUtxo>,
}

#[derive(Debug, Deserialize)]
struct DatumCbor {
    cbor: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct EpochParameters {
    min_fee_a: u64,
    min_fee_b: u64,
    #[serde(default)]
    price_mem: Option<f64>,
    #[serde(default)]
    price_step: Option<f64>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    coins_per_utxo_size: Option<u64>,
    max_tx_size: u64,
    #[serde(default)]
    cost_models_raw: Option<HashMap<String, Vec<i64>>>,
}

impl From<EpochParameters> for ProtocolParams {
    fn from(value: EpochParameters) -> Self {
        let defaults = ProtocolParams::default();

        Self {
            min_fee_a: value.min_fee_a,
            min_fee_b: value.min_fee_b,
            price_mem: value
                .price_mem
                .map(Ratio::from_decimal)
                .unwrap_or(defaults.price_mem),
            price_step: value
                .price_step
                .map(Ratio::from_decimal)
                .unwrap_or(defaults.price_step),
            coins_per_utxo_byte: value
                .coins_per_utxo_size
                .unwrap_or(defaults.coins_per_utxo_byte),
            max_tx_size: value.max_tx_size,
            plutus_v3_cost_model: value
                .cost_models_raw
                .and_then(|mut x| x.remove("PlutusV3"))
                .filter(|x| !x.is_empty()),
        }
    }
}

impl BlockfrostClient {
    pub fn new(base_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
        }
    }

    pub fn for_network(network: Network, project_id: impl Into<String>) -> Self {
        Self::new(network.blockfrost_url(), project_id)
    }

    /// GET `path`, mapping 404 to `None`.
    async fn get(&self, path: &str) -> Result<Option<Response>, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "get");

        let response = self
            .client
            .get(&url)
            .header("project_id", &self.project_id)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response)),
            StatusCode::NOT_FOUND => Ok(None),
            code => Err(ProviderError::Status {
                code: code.as_u16(),
                text: response.text().await?,
            }),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ProviderError> {
        match self.get(path).await? {
            Some(response) => {
                let text = response.text().await?;
                Ok(Some(serde_json::from_str(&text)?))
            }
            None => Ok(None),
        }
    }
}

impl ChainProvider for BlockfrostClient {
    #[instrument(skip(self))]
    async fn utxos_by_tx_hash(&self, tx_hash: &str) -> Result<Vec<RawUtxo>, ProviderError> {
        let Some(tx) = self
            .get_json::<TxUtxos>(&format!("/txs/{tx_hash}/utxos"))
            .await?
        else {
            return Ok(vec![]);
        };

        let outputs = tx
            .outputs
            .into_iter()
            .filter(|x| !x.collateral)
            .map(|mut x| {
                x.tx_hash.get_or_insert_with(|| tx.hash.clone());
                x
            })
            .collect();

        Ok(outputs)
    }

    #[instrument(skip(self))]
    async fn utxos_by_address(&self, address: &str) -> Result<Vec<RawUtxo>, ProviderError> {
        let mut all = vec![];

        for page in 1.. {
            let path = format!("/addresses/{address}/utxos?count={PAGE_SIZE}&page={page}");

            let Some(batch) = self.get_json::<Vec<RawUtxo>>(&path).await? else {
                break;
            };

            let done = batch.len() < PAGE_SIZE;
            all.extend(batch);

            if done {
                break;
            }
        }

        Ok(all)
    }

    async fn datum_by_hash(&self, datum_hash: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        let found = self
            .get_json::<DatumCbor>(&format!("/scripts/datum/{datum_hash}/cbor"))
            .await?;

        match found {
            Some(x) => hex::decode(&x.cbor).map(Some).map_err(|_| ProviderError::Status {
                code: 200,
                text: format!("datum {datum_hash} is not hex"),
            }),
            None => Ok(None),
        }
    }

    async fn protocol_params(&self) -> Result<ProtocolParams, ProviderError> {
        let params = self
            .get_json::<EpochParameters>("/epochs/latest/parameters")
            .await?
            .ok_or_else(|| ProviderError::Status {
                code: 404,
                text: "no protocol parameters".into(),
            })?;

        Ok(params.into())
    }

    #[instrument(skip_all, fields(size = cbor.len()))]
    async fn submit_tx(&self, cbor: &[u8]) -> Result<String, ProviderError> {
        let url = format!("{}/tx/submit", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("project_id", &self.project_id)
            .header("Content-Type", "application/cbor")
            .body(cbor.to_vec())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Submit(text));
        }

        Ok(serde_json::from_str::<String>(&text)?)
    }
}
