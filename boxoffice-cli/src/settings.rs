use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context as _};
use boxoffice_chain::pinata::DEFAULT_GATEWAY;
use boxoffice_txbuilder::MarketConfig;
use serde::Deserialize;

/// Everything read from the settings file. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Plutus blueprint to take the validator from when `market.script_cbor`
    /// is unset, relative to the settings file
    pub blueprint: Option<PathBuf>,

    pub market: MarketConfig,

    pub blockfrost: BlockfrostSettings,

    pub pinata: PinataSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BlockfrostSettings {
    /// Overrides the public endpoint of the configured network
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PinataSettings {
    pub gateway: String,
    pub upload_url: Option<String>,
}

impl Default for PinataSettings {
    fn default() -> Self {
        Self {
            gateway: DEFAULT_GATEWAY.to_string(),
            upload_url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Blueprint {
    validators: Vec<BlueprintValidator>,
}

#[derive(Debug, Deserialize)]
struct BlueprintValidator {
    title: String,
    #[serde(rename = "compiledCode")]
    compiled_code: String,
}

impl Settings {
    /// Load settings from a TOML file, pulling the script out of the
    /// blueprint when needed.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading settings {}", path.display()))?;

        let mut settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("parsing settings {}", path.display()))?;

        let base = path.parent().unwrap_or(Path::new("."));
        settings.resolve_script(base)?;

        Ok(settings)
    }

    fn resolve_script(&mut self, base: &Path) -> anyhow::Result<()> {
        if !self.market.script_cbor.is_empty() {
            return Ok(());
        }

        let Some(blueprint) = &self.blueprint else {
            return Ok(());
        };

        self.market.script_cbor = read_blueprint(&base.join(blueprint))?;
        Ok(())
    }
}

/// Compiled code of the first validator in a blueprint.
pub fn read_blueprint(path: &Path) -> anyhow::Result<String> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading blueprint {}", path.display()))?;

    let blueprint: Blueprint = serde_json::from_str(&contents)
        .with_context(|| format!("parsing blueprint {}", path.display()))?;

    let Some(validator) = blueprint.validators.into_iter().next() else {
        bail!("blueprint {} has no validators", path.display());
    };

    tracing::debug!(title = %validator.title, "validator loaded from blueprint");

    Ok(validator.compiled_code)
}
