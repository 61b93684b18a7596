// deployer/src/evm.rs

use crate::{DeployError, DeployResult};
use chain_client::{ChainClient, EvmVersion};

/// Fail when the node's ruleset predates `target`.
///
/// A node whose ruleset cannot be determined is allowed through.
pub fn check(node: Option<EvmVersion>, target: EvmVersion) -> DeployResult<()> {
    match node {
        Some(node) if node < target => Err(DeployError::IncompatibleEvmVersion { node, target }),
        Some(_) => Ok(()),
        None => {
            tracing::warn!(
                "Could not determine the node's EVM version, assuming it supports {}",
                target
            );
            Ok(())
        }
    }
}

/// Query the node's ruleset and check it against `target`
pub async fn verify(client: &dyn ChainClient, target: EvmVersion) -> DeployResult<Option<EvmVersion>> {
    let node = client.evm_version().await?;
    check(node, target)?;
    Ok(node)
}
