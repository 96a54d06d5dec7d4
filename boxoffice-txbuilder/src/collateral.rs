//! Finding, or paying into existence, a collateral output.

use boxoffice_chain::{retry, ProtocolParams, RetryError, Utxo, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    balance::{Balancer, OutputRole, PlannedOutput, TxPlan},
    config::MarketConfig,
    submit::SubmissionPipeline,
    wallet::{Wallet, WalletSnapshot},
    Error,
};

/// A single lovelace entry of at least `min` lovelace.
pub fn is_collateral(utxo: &Utxo, min: u64) -> bool {
    utxo.amount.is_pure_lovelace() && utxo.amount.lovelace() >= min
}

pub struct CollateralResolver<'a, W> {
    wallet: &'a W,
    config: &'a MarketConfig,
    params: &'a ProtocolParams,
    cancel: &'a CancellationToken,
}

impl<'a, W: Wallet> CollateralResolver<'a, W> {
    pub fn new(
        wallet: &'a W,
        config: &'a MarketConfig,
        params: &'a ProtocolParams,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            wallet,
            config,
            params,
            cancel,
        }
    }

    /// Picks the first of `existing` that qualifies, then the smallest
    /// qualifying wallet output, and as a last resort submits a self-payment
    /// and waits for it to land. The payment's change may qualify too, so the
    /// output holding exactly `collateral_lovelace` wins over it.
    #[instrument(skip_all)]
    pub async fn resolve(&self, existing: &[Utxo]) -> Result<Utxo, Error> {
        let min = self.config.collateral_lovelace;

        if let Some(found) = existing.iter().find(|x| is_collateral(x, min)) {
            debug!(input = %found.input, "using wallet collateral");
            return Ok(found.clone());
        }

        let snapshot = WalletSnapshot::take(self.wallet)
            .await
            .map_err(Error::Wallet)?;

        let smallest = snapshot
            .utxos
            .iter()
            .filter(|x| is_collateral(x, min))
            .min_by_key(|x| x.amount.lovelace());

        if let Some(found) = smallest {
            debug!(input = %found.input, "using wallet output as collateral");
            return Ok(found.clone());
        }

        let tx_id = self.pay_self(&snapshot).await?;
        self.await_output(&snapshot.change_address, &tx_id).await
    }

    async fn pay_self(&self, snapshot: &WalletSnapshot) -> Result<String, Error> {
        let plan = TxPlan::new().output(PlannedOutput::new(
            OutputRole::Collateral,
            snapshot.change_address.clone(),
            Value::lovelace_only(self.config.collateral_lovelace),
        ));

        let unsigned = Balancer::new(self.config, self.params).balance(
            plan,
            &snapshot.utxos,
            &snapshot.change_address,
        )?;

        let tx_id = SubmissionPipeline::new(self.wallet).submit(unsigned).await?;
        info!(%tx_id, "collateral self-payment submitted");

        Ok(tx_id)
    }

    async fn await_output(&self, owner: &str, tx_id: &str) -> Result<Utxo, Error> {
        let min = self.config.collateral_lovelace;

        let found = retry(&self.config.retry, self.cancel, |attempt| async move {
            let utxos = match self.wallet.utxos().await {
                Ok(x) => x,
                Err(error) => {
                    warn!(attempt, %error, "wallet query failed, treating as empty");
                    return Err(error.to_string());
                }
            };

            // the exact self-payment first, then anything else it produced
            let pick = utxos
                .into_iter()
                .filter(|x| x.address == owner && is_collateral(x, min))
                .min_by_key(|x| {
                    (
                        x.amount.lovelace() != min,
                        x.input.tx_hash.to_string() != tx_id,
                        x.amount.lovelace(),
                    )
                });

            Ok(pick)
        })
        .await;

        match found {
            Ok(x) => {
                debug!(input = %x.input, "collateral output arrived");
                Ok(x)
            }
            Err(RetryError::Exhausted { attempts, .. }) => {
                Err(Error::CollateralUnavailable { attempts })
            }
            Err(RetryError::Cancelled) => Err(Error::Cancelled),
        }
    }
}
