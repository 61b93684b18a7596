// cli/src/runtime.rs
use crate::config::{Endpoint, ProjectConfig};
use anyhow::{anyhow, bail, Context};
use chain_client::{ChainClient, HttpChainClient};
use deployer::{
    Account, ContractArtifact, Deployment, ExecutionMode, Network, SharedSettings,
    TransactionReceipt, TxOverrides,
};
use devchain::LocalChain;
use ethers_core::abi::token::{LenientTokenizer, Tokenizer};
use ethers_core::abi::Token;
use ethers_core::types::{Address, H256};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Which key signs
#[derive(Debug, Clone)]
pub enum Signer {
    /// Funded development account by index
    Index(usize),
    PrivateKey(H256),
}

impl FromStr for Signer {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = text.parse::<usize>() {
            return Ok(Signer::Index(index));
        }
        let key = H256::from_str(text).map_err(|e| anyhow!("Invalid private key: {}", e))?;
        Ok(Signer::PrivateKey(key))
    }
}

/// A network connection opened from the project configuration
pub struct Session {
    pub network: Network,
    /// Present when the network is an in-process development chain
    pub devchain: Option<Arc<LocalChain>>,
}

impl Session {
    pub async fn open(
        config: &ProjectConfig,
        name: Option<&str>,
        mode: ExecutionMode,
    ) -> anyhow::Result<Self> {
        let (name, network_config) = config.network(name)?;

        let (client, devchain) = match network_config.endpoint()? {
            Endpoint::Host(url) => {
                let client = HttpChainClient::connect(url)
                    .await
                    .with_context(|| format!("connecting to {}", url))?;
                (Arc::new(client) as Arc<dyn ChainClient>, None)
            }
            Endpoint::Devchain(devchain_config) => {
                let chain = Arc::new(LocalChain::new(devchain_config.clone()));
                tracing::info!(
                    "Launched development chain ({})",
                    chain.launch_args().join(" ")
                );
                (chain.clone() as Arc<dyn ChainClient>, Some(chain))
            }
        };

        let settings = SharedSettings::new(network_config.settings.clone());
        let network = Network::connect(name, client, settings)
            .await?
            .with_mode(mode)
            .with_target_evm_version(config.target_evm_version)
            .with_receipt_policy(config.receipt);

        Ok(Self { network, devchain })
    }

    pub fn account(&self, signer: &Signer) -> anyhow::Result<Account> {
        let secret = match signer {
            Signer::PrivateKey(key) => *key,
            Signer::Index(index) => {
                let chain = self.devchain.as_ref().ok_or_else(|| {
                    anyhow!(
                        "Network '{}' has no development accounts, use a private key",
                        self.network.name()
                    )
                })?;
                chain
                    .accounts()
                    .get(*index)
                    .map(|account| account.secret)
                    .ok_or_else(|| anyhow!("No development account {}", index))?
            }
        };
        Ok(self.network.account(secret)?)
    }
}

/// Tokenize command-line constructor arguments against the artifact's ABI
pub fn constructor_args(artifact: &ContractArtifact, args: &[String]) -> anyhow::Result<Vec<Token>> {
    let inputs = artifact
        .abi
        .constructor
        .as_ref()
        .map(|constructor| constructor.inputs.as_slice())
        .unwrap_or_default();

    if inputs.len() != args.len() {
        bail!(
            "{} takes {} constructor arguments, {} given",
            artifact.name,
            inputs.len(),
            args.len()
        );
    }

    inputs
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            LenientTokenizer::tokenize(&param.kind, arg)
                .map_err(|e| anyhow!("argument '{}' ({}): {}", param.name, param.kind, e))
        })
        .collect()
}

/// What gets written after a deployment attempt
#[derive(Debug, Serialize)]
pub struct DeploymentRecord {
    pub contract: String,
    pub network: String,
    pub chain_id: u64,
    pub address: Option<Address>,
    pub deployed_at: String,
    pub receipt: TransactionReceipt,
}

impl DeploymentRecord {
    pub fn new(artifact: &ContractArtifact, network: &Network, deployment: &Deployment) -> Self {
        Self {
            contract: artifact.name.clone(),
            network: network.name().to_string(),
            chain_id: network.chain_id(),
            address: deployment.contract().map(|contract| contract.address()),
            deployed_at: chrono::Utc::now().to_rfc3339(),
            receipt: deployment.receipt().clone(),
        }
    }

    /// Write to `<dir>/<chain id>/<contract>.json`
    pub fn save(&self, dir: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
        let dir = dir.as_ref().join(self.chain_id.to_string());
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", self.contract));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

/// Deploy `artifact` and record the outcome
pub async fn deploy(
    session: &Session,
    signer: &Signer,
    artifact: &ContractArtifact,
    args: &[String],
    overrides: TxOverrides,
) -> anyhow::Result<DeploymentRecord> {
    let account = session.account(signer)?;
    let tokens = constructor_args(artifact, args)?;
    let deployment = account.deploy(artifact, &tokens, overrides).await?;
    Ok(DeploymentRecord::new(artifact, &session.network, &deployment))
}
