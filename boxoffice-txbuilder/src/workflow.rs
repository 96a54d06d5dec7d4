//! The marketplace operations end to end: locate, collateral, build, sign
//! and submit.
//!
//! Runs are sequential and take no locks. Two runs spending the same listing
//! race on chain and one of them is rejected at submission.

use std::fmt;

use boxoffice_chain::{resolve_datum, ChainProvider, Locator, ProtocolParams, ScriptUtxo, Utxo};
use boxoffice_codec::{Action, ListingDatum, TicketDatum, TicketStatus};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    action::{ActionBuilder, ActionParams},
    balance::UnsignedTransaction,
    collateral::CollateralResolver,
    config::{payment_key_hash, MarketConfig},
    submit::SubmissionPipeline,
    wallet::{Wallet, WalletSnapshot},
    Error,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Locate,
    Collateral,
    Build,
    Sign,
    Submit,
    Query,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Locate => "locate",
            Self::Collateral => "collateral",
            Self::Build => "build",
            Self::Sign => "sign",
            Self::Submit => "submit",
            Self::Query => "query",
        };

        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {error}")]
pub struct WorkflowError {
    pub stage: Stage,
    #[source]
    pub error: Error,
}

impl WorkflowError {
    pub fn new(stage: Stage, error: impl Into<Error>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

fn at<E: Into<Error>>(stage: Stage) -> impl FnOnce(E) -> WorkflowError {
    move |error| WorkflowError::new(stage, error)
}

/// A new listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    /// Seller key hash; the wallet's own when unset
    pub seller: Option<Vec<u8>>,
    pub status: Option<TicketStatus>,
    pub price: Option<u64>,
    /// `lovelace` or `policy ++ asset name` in hex
    pub unit: String,
    pub quantity: u64,
}

/// New tokens under the wallet's own key policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintRequest {
    /// Asset name bytes, at most 32
    pub name: Vec<u8>,
    pub quantity: u64,
}

/// Spending an existing listing.
#[derive(Debug, Clone)]
pub struct UnlockRequest {
    /// Transaction that created the listing
    pub tx_hash: String,
    pub action: Action,
    pub quantity: Option<u64>,
    pub price: Option<u64>,
    pub datum: Option<ListingDatum>,
}

impl UnlockRequest {
    pub fn new(tx_hash: impl Into<String>, action: Action) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            action,
            quantity: None,
            price: None,
            datum: None,
        }
    }

    fn params(&self) -> ActionParams {
        ActionParams {
            quantity: self.quantity,
            price: self.price,
            datum: self.datum.clone(),
        }
    }
}

pub struct Marketplace<P, W> {
    provider: P,
    wallet: W,
    config: MarketConfig,
    script_address: String,
}

impl<P: ChainProvider, W: Wallet> Marketplace<P, W> {
    pub fn new(provider: P, wallet: W, config: MarketConfig) -> Result<Self, Error> {
        let script_address = config.script_address()?;

        Ok(Self {
            provider,
            wallet,
            config,
            script_address,
        })
    }

    pub fn script_address(&self) -> &str {
        &self.script_address
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    async fn protocol_params(&self, stage: Stage) -> Result<ProtocolParams, WorkflowError> {
        self.provider.protocol_params().await.map_err(at(stage))
    }

    async fn snapshot(&self, stage: Stage) -> Result<WalletSnapshot, WorkflowError> {
        WalletSnapshot::take(&self.wallet)
            .await
            .map_err(|e| WorkflowError::new(stage, Error::Wallet(e)))
    }

    #[instrument(skip(self), fields(unit = %request.unit, quantity = request.quantity))]
    pub async fn prepare_lock(
        &self,
        request: &LockRequest,
    ) -> Result<UnsignedTransaction, WorkflowError> {
        let params = self.protocol_params(Stage::Build).await?;
        let wallet = self.snapshot(Stage::Build).await?;

        let seller = match &request.seller {
            Some(x) => x.clone(),
            None => payment_key_hash(&wallet.change_address)
                .map_err(at(Stage::Build))?
                .to_vec(),
        };

        let mut datum = TicketDatum::new(seller, request.status.unwrap_or(TicketStatus::Listed));
        if let Some(price) = request.price {
            datum = datum.with_price(price);
        }

        ActionBuilder::new(&self.config, &params)
            .build_lock(&request.unit, request.quantity, &datum, &wallet)
            .map_err(at(Stage::Build))
    }

    pub async fn lock(&self, request: &LockRequest) -> Result<String, WorkflowError> {
        let unsigned = self.prepare_lock(request).await?;
        self.submit(unsigned).await
    }

    #[instrument(skip(self), fields(quantity = request.quantity))]
    pub async fn prepare_mint(
        &self,
        request: &MintRequest,
    ) -> Result<UnsignedTransaction, WorkflowError> {
        let params = self.protocol_params(Stage::Build).await?;
        let wallet = self.snapshot(Stage::Build).await?;

        ActionBuilder::new(&self.config, &params)
            .build_mint(&request.name, request.quantity, &wallet)
            .map_err(at(Stage::Build))
    }

    pub async fn mint(&self, request: &MintRequest) -> Result<String, WorkflowError> {
        let unsigned = self.prepare_mint(request).await?;
        self.submit(unsigned).await
    }

    /// Locates the listing, secures collateral and builds the spend, stopping
    /// short of signing.
    #[instrument(skip(self, cancel), fields(tx_hash = %request.tx_hash, action = %request.action))]
    pub async fn prepare_unlock(
        &self,
        request: &UnlockRequest,
        cancel: &CancellationToken,
    ) -> Result<UnsignedTransaction, WorkflowError> {
        let script = Locator::new(&self.provider, self.config.retry)
            .at_address(self.script_address.clone())
            .locate(&request.tx_hash, cancel)
            .await
            .map_err(at(Stage::Locate))?;

        info!(input = %script.input(), "listing located");

        let params = self.protocol_params(Stage::Collateral).await?;

        let existing = self
            .wallet
            .collateral()
            .await
            .map_err(|e| WorkflowError::new(Stage::Collateral, Error::Wallet(e)))?;

        let collateral = CollateralResolver::new(&self.wallet, &self.config, &params, cancel)
            .resolve(&existing)
            .await
            .map_err(at(Stage::Collateral))?;

        let wallet = self.snapshot(Stage::Build).await?;

        ActionBuilder::new(&self.config, &params)
            .build(
                &script,
                request.action,
                &request.params(),
                &wallet,
                Some(&collateral),
            )
            .map_err(at(Stage::Build))
    }

    pub async fn unlock(
        &self,
        request: &UnlockRequest,
        cancel: &CancellationToken,
    ) -> Result<String, WorkflowError> {
        let unsigned = self.prepare_unlock(request, cancel).await?;
        self.submit(unsigned).await
    }

    pub async fn submit(&self, unsigned: UnsignedTransaction) -> Result<String, WorkflowError> {
        SubmissionPipeline::new(&self.wallet)
            .submit(unsigned)
            .await
            .map_err(|e| match e {
                Error::SigningRejected(_) => WorkflowError::new(Stage::Sign, e),
                _ => WorkflowError::new(Stage::Submit, e),
            })
    }

    /// Every output at the script address, datums decoded.
    pub async fn listings(&self) -> Result<Vec<ScriptUtxo>, WorkflowError> {
        let raw = self
            .provider
            .utxos_by_address(&self.script_address)
            .await
            .map_err(at(Stage::Query))?;

        let mut listings = Vec::with_capacity(raw.len());

        for x in raw {
            match Utxo::try_from(x) {
                Ok(utxo) => listings.push(resolve_datum(&self.provider, utxo).await),
                Err(error) => warn!(%error, "skipping unreadable script output"),
            }
        }

        Ok(listings)
    }

    /// Listings whose datum names `seller` (hex key hash, or the record's
    /// seller string) and carries `status`. Unset filters match anything.
    pub async fn tickets_of(
        &self,
        seller: Option<&str>,
        status: Option<TicketStatus>,
    ) -> Result<Vec<ScriptUtxo>, WorkflowError> {
        let listings = self.listings().await?;

        let matching = listings
            .into_iter()
            .filter(|x| {
                let Some(datum) = &x.datum else {
                    return seller.is_none() && status.is_none();
                };

                let seller_ok = match seller {
                    Some(wanted) => datum
                        .seller()
                        .is_some_and(|s| s.eq_ignore_ascii_case(wanted)),
                    None => true,
                };

                let status_ok = match status {
                    Some(wanted) => datum.status() == Some(wanted),
                    None => true,
                };

                seller_ok && status_ok
            })
            .collect();

        Ok(matching)
    }
}
