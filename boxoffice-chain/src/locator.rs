//! Finding the output a just-submitted transaction created.
//!
//! Providers index transactions a few seconds after they hit the mempool, so
//! a lookup right after submission usually comes back empty. The locator
//! polls with a [`RetryPolicy`] until something shows up.

use boxoffice_codec::ListingDatum;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{
    model::{RawUtxo, ScriptUtxo, Utxo},
    provider::ChainProvider,
    retry::{retry, RetryError, RetryPolicy},
    Error,
};

pub struct Locator<'a, P> {
    provider: &'a P,
    policy: RetryPolicy,
    script_address: Option<String>,
}

impl<'a, P: ChainProvider> Locator<'a, P> {
    pub fn new(provider: &'a P, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            script_address: None,
        }
    }

    /// Only consider outputs sitting at `address`.
    pub fn at_address(mut self, address: impl Into<String>) -> Self {
        self.script_address = Some(address.into());
        self
    }

    fn accepts(&self, raw: &RawUtxo) -> bool {
        match &self.script_address {
            Some(wanted) => raw.address.as_deref() == Some(wanted.as_str()),
            None => true,
        }
    }

    #[instrument(skip(self, cancel))]
    pub async fn locate(
        &self,
        tx_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<ScriptUtxo, Error> {
        let found = retry(&self.policy, cancel, |attempt| async move {
            match self.provider.utxos_by_tx_hash(tx_hash).await {
                Ok(outputs) => {
                    let candidates: Vec<_> =
                        outputs.into_iter().filter(|x| self.accepts(x)).collect();

                    debug!(attempt, candidates = candidates.len(), "polled provider");
                    Ok((!candidates.is_empty()).then_some(candidates))
                }
                Err(error) => {
                    warn!(attempt, %error, "provider query failed, treating as empty");
                    Err(error.to_string())
                }
            }
        })
        .await;

        let not_found = |attempts, last_error| Error::NotFound {
            tx_hash: tx_hash.to_string(),
            attempts,
            last_error,
        };

        let candidates = match found {
            Ok(x) => x,
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => return Err(not_found(attempts, last_error)),
            Err(RetryError::Cancelled) => return Err(Error::Cancelled),
        };

        let Some(first) = candidates.into_iter().next() else {
            return Err(not_found(self.policy.attempts, None));
        };

        let utxo = Utxo::try_from(first)?;
        debug!(input = %utxo.input, "located output");

        Ok(resolve_datum(self.provider, utxo).await)
    }
}

/// Attaches the decoded datum to an output, fetching it by hash when it is
/// not inline. Lookup failures leave the datum absent.
pub async fn resolve_datum<P: ChainProvider>(provider: &P, utxo: Utxo) -> ScriptUtxo {
    let raw_datum = match (&utxo.inline_datum, &utxo.data_hash) {
        (Some(inline), _) => Some(inline.clone()),
        (None, Some(hash)) => match provider.datum_by_hash(hash).await {
            Ok(found) => found,
            Err(error) => {
                warn!(%hash, %error, "datum lookup failed");
                None
            }
        },
        (None, None) => None,
    };

    let datum = raw_datum.as_deref().map(ListingDatum::decode);

    if let Some(ListingDatum::Malformed(_)) = datum {
        warn!(input = %utxo.input, "datum is not valid plutus data");
    }

    ScriptUtxo {
        utxo,
        raw_datum,
        datum,
    }
}
