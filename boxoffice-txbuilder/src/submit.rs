use tracing::{info, instrument};

use crate::{balance::UnsignedTransaction, wallet::Wallet, Error};

/// Signs with the wallet, then broadcasts through it.
pub struct SubmissionPipeline<'a, W> {
    wallet: &'a W,
}

impl<'a, W: Wallet> SubmissionPipeline<'a, W> {
    pub fn new(wallet: &'a W) -> Self {
        Self { wallet }
    }

    /// Returns the id the wallet reports for the broadcast transaction.
    #[instrument(skip_all, fields(tx_hash = %unsigned.tx_hash(), fee = unsigned.fee))]
    pub async fn submit(&self, unsigned: UnsignedTransaction) -> Result<String, Error> {
        let signed = self
            .wallet
            .sign_tx(unsigned.tx)
            .await
            .map_err(Error::SigningRejected)?;

        let tx_id = self
            .wallet
            .submit_tx(&signed)
            .await
            .map_err(Error::SubmissionRejected)?;

        info!(%tx_id, "transaction submitted");

        Ok(tx_id)
    }
}
