use std::future::Future;

use boxoffice_chain::{ChainProvider, Network, ProviderError, Utxo};
use pallas_addresses::{Address, ShelleyAddress, ShelleyDelegationPart, ShelleyPaymentPart};
use pallas_crypto::hash::{Hash, Hasher};
use pallas_txbuilder::BuiltTransaction;
use pallas_wallet::hd::Bip32PrivateKey;
use thiserror::Error;
use tracing::{debug, warn};

const HARDENED: u32 = 0x8000_0000;

/// Smallest output a key wallet offers as collateral on its own.
const SET_ASIDE_LOVELACE: u64 = 5_000_000;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid mnemonic: {0}")]
    Mnemonic(String),

    #[error("address error: {0}")]
    Address(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Rejected(String),
}

/// What the marketplace needs from a wallet.
pub trait Wallet: Send + Sync {
    fn utxos(&self) -> impl Future<Output = Result<Vec<Utxo>, WalletError>> + Send;

    fn change_address(&self) -> impl Future<Output = Result<String, WalletError>> + Send;

    /// Outputs the wallet already set aside as collateral, possibly none.
    fn collateral(&self) -> impl Future<Output = Result<Vec<Utxo>, WalletError>> + Send;

    fn sign_tx(
        &self,
        tx: BuiltTransaction,
    ) -> impl Future<Output = Result<BuiltTransaction, WalletError>> + Send;

    fn submit_tx(
        &self,
        tx: &BuiltTransaction,
    ) -> impl Future<Output = Result<String, WalletError>> + Send;
}

/// Wallet state read once and used for a single build.
#[derive(Debug, Clone, Default)]
pub struct WalletSnapshot {
    pub utxos: Vec<Utxo>,
    pub change_address: String,
}

impl WalletSnapshot {
    pub async fn take<W: Wallet>(wallet: &W) -> Result<Self, WalletError> {
        Ok(Self {
            utxos: wallet.utxos().await?,
            change_address: wallet.change_address().await?,
        })
    }
}

/// A single-key wallet derived from a BIP39 mnemonic, reading and submitting
/// through a chain provider.
///
/// Only the first payment key of account 0 (`m/1852'/1815'/0'/0/0`) is used
/// and the address carries no stake part.
pub struct KeyWallet<P> {
    provider: P,
    payment_key: Bip32PrivateKey,
    key_hash: Hash<28>,
    address: String,
}

impl<P: ChainProvider> KeyWallet<P> {
    pub fn from_mnemonic(
        mnemonic: &str,
        password: &str,
        network: Network,
        provider: P,
    ) -> Result<Self, WalletError> {
        let root = Bip32PrivateKey::from_bip39_mnenomic(mnemonic.to_string(), password.to_string())
            .map_err(|e| WalletError::Mnemonic(e.to_string()))?;

        let payment_key = root
            .derive(HARDENED | 1852)
            .derive(HARDENED | 1815)
            .derive(HARDENED)
            .derive(0)
            .derive(0);

        let public_key = payment_key.to_ed25519_private_key().public_key();
        let key_hash = Hasher::<224>::hash(public_key.as_ref());

        let address = ShelleyAddress::new(
            network.address_network(),
            ShelleyPaymentPart::Key(key_hash),
            ShelleyDelegationPart::Null,
        );

        let address = Address::Shelley(address)
            .to_bech32()
            .map_err(|e| WalletError::Address(e.to_string()))?;

        debug!(%address, "wallet loaded");

        Ok(Self {
            provider,
            payment_key,
            key_hash,
            address,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn key_hash(&self) -> Hash<28> {
        self.key_hash
    }
}

impl<P: ChainProvider> Wallet for KeyWallet<P> {
    async fn utxos(&self) -> Result<Vec<Utxo>, WalletError> {
        let raw = self.provider.utxos_by_address(&self.address).await?;

        let utxos = raw
            .into_iter()
            .filter_map(|x| match Utxo::try_from(x) {
                Ok(utxo) => Some(utxo),
                Err(error) => {
                    warn!(%error, "skipping unreadable wallet output");
                    None
                }
            })
            .collect();

        Ok(utxos)
    }

    async fn change_address(&self) -> Result<String, WalletError> {
        Ok(self.address.clone())
    }

    /// The smallest pure-lovelace output holding at least 5 ada, the way
    /// browser wallets pick theirs.
    async fn collateral(&self) -> Result<Vec<Utxo>, WalletError> {
        let mut candidates: Vec<_> = self
            .utxos()
            .await?
            .into_iter()
            .filter(|x| x.amount.is_pure_lovelace() && x.amount.lovelace() >= SET_ASIDE_LOVELACE)
            .collect();

        candidates.sort_by_key(|x| x.amount.lovelace());
        candidates.truncate(1);

        Ok(candidates)
    }

    async fn sign_tx(&self, tx: BuiltTransaction) -> Result<BuiltTransaction, WalletError> {
        tx.sign(self.payment_key.to_ed25519_private_key())
            .map_err(|e| WalletError::Signing(e.to_string()))
    }

    async fn submit_tx(&self, tx: &BuiltTransaction) -> Result<String, WalletError> {
        self.provider
            .submit_tx(&tx.tx_bytes.0)
            .await
            .map_err(|e| WalletError::Rejected(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use boxoffice_chain::{ProtocolParams, RawUtxo};

    use super::*;
    use crate::config::payment_key_hash;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    struct Offline;

    impl ChainProvider for Offline {
        async fn utxos_by_tx_hash(&self, _: &str) -> Result<Vec<RawUtxo>, ProviderError> {
            Ok(vec![])
        }

        async fn utxos_by_address(&self, _: &str) -> Result<Vec<RawUtxo>, ProviderError> {
            Ok(vec![])
        }

        async fn datum_by_hash(&self, _: &str) -> Result<Option<Vec<u8>>, ProviderError> {
            Ok(None)
        }

        async fn protocol_params(&self) -> Result<ProtocolParams, ProviderError> {
            Ok(ProtocolParams::default())
        }

        async fn submit_tx(&self, _: &[u8]) -> Result<String, ProviderError> {
            Err(ProviderError::Submit("offline".into()))
        }
    }

    #[test]
    fn derives_enterprise_address() {
        let wallet = KeyWallet::from_mnemonic(MNEMONIC, "", Network::Preprod, Offline).unwrap();

        assert!(wallet.address().starts_with("addr_test1v"));
        assert_eq!(payment_key_hash(wallet.address()).unwrap(), wallet.key_hash());

        let again = KeyWallet::from_mnemonic(MNEMONIC, "", Network::Preprod, Offline).unwrap();
        assert_eq!(again.address(), wallet.address());

        let mainnet = KeyWallet::from_mnemonic(MNEMONIC, "", Network::Mainnet, Offline).unwrap();
        assert!(mainnet.address().starts_with("addr1v"));
        assert_eq!(mainnet.key_hash(), wallet.key_hash());
    }

    #[test]
    fn bad_mnemonic_is_rejected() {
        let err = KeyWallet::from_mnemonic("not a mnemonic", "", Network::Preprod, Offline);
        assert!(matches!(err, Err(WalletError::Mnemonic(_))));
    }

    #[tokio::test]
    async fn offline_wallet_has_nothing_to_spend() {
        let wallet = KeyWallet::from_mnemonic(MNEMONIC, "", Network::Preprod, Offline).unwrap();
        assert!(wallet.utxos().await.unwrap().is_empty());
        assert!(wallet.collateral().await.unwrap().is_empty());
    }
}
