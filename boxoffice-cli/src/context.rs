use std::path::PathBuf;

use anyhow::{anyhow, Context as _};
use boxoffice_chain::{BlockfrostClient, PinataClient};
use boxoffice_txbuilder::{KeyWallet, Marketplace};

use crate::settings::Settings;

pub type Market = Marketplace<BlockfrostClient, KeyWallet<BlockfrostClient>>;

#[derive(Debug, clap::Args)]
pub struct Globals {
    /// Settings file
    #[arg(long, short, env = "BOXOFFICE_CONFIG", global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Blockfrost project id
    #[arg(long, env = "BLOCKFROST_PROJECT_ID", global = true, hide_env_values = true)]
    project_id: Option<String>,

    /// BIP39 mnemonic of the wallet paying and signing
    #[arg(long, env = "MNEMONIC", global = true, hide_env_values = true)]
    mnemonic: Option<String>,

    /// Pinata API token
    #[arg(long, env = "PINATA_JWT", global = true, hide_env_values = true)]
    pinata_jwt: Option<String>,
}

/// Settings plus secrets, turned into clients on demand.
pub struct Context {
    pub settings: Settings,
    globals: Globals,
}

impl Context {
    pub fn load(globals: Globals) -> anyhow::Result<Self> {
        let settings = match &globals.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        Ok(Self { settings, globals })
    }

    pub fn provider(&self) -> anyhow::Result<BlockfrostClient> {
        let project_id = self
            .globals
            .project_id
            .clone()
            .ok_or_else(|| anyhow!("BLOCKFROST_PROJECT_ID is not set"))?;

        let network = self.settings.market.network;

        let client = match &self.settings.blockfrost.base_url {
            Some(url) => BlockfrostClient::new(url.clone(), project_id),
            None => BlockfrostClient::for_network(network, project_id),
        };

        Ok(client)
    }

    pub fn wallet<P>(&self, provider: P) -> anyhow::Result<KeyWallet<P>>
    where
        P: boxoffice_chain::ChainProvider,
    {
        let mnemonic = self
            .globals
            .mnemonic
            .as_deref()
            .ok_or_else(|| anyhow!("MNEMONIC is not set"))?;

        KeyWallet::from_mnemonic(mnemonic, "", self.settings.market.network, provider)
            .context("loading wallet")
    }

    pub fn market(&self) -> anyhow::Result<Market> {
        let provider = self.provider()?;
        let wallet = self.wallet(provider.clone())?;

        Marketplace::new(provider, wallet, self.settings.market.clone())
            .context("setting up the marketplace")
    }

    pub fn pinata(&self) -> anyhow::Result<PinataClient> {
        let jwt = self
            .globals
            .pinata_jwt
            .clone()
            .ok_or_else(|| anyhow!("PINATA_JWT is not set"))?;

        let client = match &self.settings.pinata.upload_url {
            Some(url) => PinataClient::with_upload_url(jwt, url.clone()),
            None => PinataClient::new(jwt),
        };

        Ok(client)
    }
}
