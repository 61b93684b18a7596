// cli/src/config.rs
use anyhow::{anyhow, bail};
use deployer::{EvmVersion, NetworkSettings, ReceiptPolicy};
use devchain::LocalChainConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Network used when none is given on the command line
    pub default_network: String,
    /// Ruleset artifacts are assumed to target when they don't say
    pub target_evm_version: EvmVersion,
    /// Where deployment records are written
    #[serde(default = "default_deployments_dir")]
    pub deployments_dir: String,
    #[serde(default)]
    pub receipt: ReceiptPolicy,
    pub networks: BTreeMap<String, NetworkConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint of an external node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Options of the in-process development chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devchain: Option<LocalChainConfig>,
    #[serde(default)]
    pub settings: NetworkSettings,
}

/// How to reach a network
pub enum Endpoint<'a> {
    Host(&'a str),
    Devchain(&'a LocalChainConfig),
}

fn default_deployments_dir() -> String {
    "./deployments".into()
}

impl NetworkConfig {
    pub fn endpoint(&self) -> anyhow::Result<Endpoint<'_>> {
        match (&self.host, &self.devchain) {
            (Some(host), None) => Ok(Endpoint::Host(host)),
            (None, Some(devchain)) => Ok(Endpoint::Devchain(devchain)),
            (Some(_), Some(_)) => bail!("a network has either a host or a devchain, not both"),
            (None, None) => bail!("a network needs a host or a devchain section"),
        }
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            "development".to_string(),
            NetworkConfig {
                host: None,
                devchain: Some(LocalChainConfig::default()),
                settings: NetworkSettings::development(),
            },
        );
        networks.insert(
            "mainnet".to_string(),
            NetworkConfig {
                host: Some("http://127.0.0.1:8545".into()),
                devchain: None,
                settings: NetworkSettings::default(),
            },
        );

        Self {
            default_network: "development".into(),
            target_evm_version: EvmVersion::Istanbul,
            deployments_dir: default_deployments_dir(),
            receipt: ReceiptPolicy::default(),
            networks,
        }
    }
}

impl ProjectConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load `path`, falling back to the defaults when it doesn't exist
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::debug!("{} not found, using default configuration", path);
            Ok(Self::default())
        }
    }

    pub fn network(&self, name: Option<&str>) -> anyhow::Result<(&str, &NetworkConfig)> {
        let name = name.unwrap_or(&self.default_network);
        self.networks
            .get_key_value(name)
            .map(|(name, network)| (name.as_str(), network))
            .ok_or_else(|| anyhow!("Unknown network '{}'", name))
    }
}
