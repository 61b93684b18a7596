// deployer/src/gas.rs

use crate::settings::{GasSetting, RevertingGasLimit, SharedSettings};
use chain_client::{ChainClient, RpcResult};
use ethers_core::types::{TransactionRequest, U256};
use std::future::Future;
use std::sync::Arc;

/// Where a resolved gas value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasSource {
    /// Passed for this one transaction
    Explicit(U256),
    /// Fixed in the network settings
    Settings(U256),
    /// Ask the node at submission time
    Node,
}

impl GasSource {
    /// Precedence: explicit argument, then a fixed setting, then the node.
    /// Zero is a value at every level.
    pub fn select(explicit: Option<U256>, setting: &GasSetting) -> Self {
        match (explicit, setting) {
            (Some(value), _) => GasSource::Explicit(value),
            (None, GasSetting::Fixed(value)) => GasSource::Settings(*value),
            (None, GasSetting::Auto | GasSetting::Unset) => GasSource::Node,
        }
    }

    async fn resolve<F, Fut>(self, fallback: F) -> RpcResult<U256>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RpcResult<U256>>,
    {
        match self {
            GasSource::Explicit(value) | GasSource::Settings(value) => Ok(value),
            GasSource::Node => fallback().await,
        }
    }
}

/// Gas price from `explicit`, else `setting`, else `query`
pub async fn resolve_gas_price<F, Fut>(
    explicit: Option<U256>,
    setting: &GasSetting,
    query: F,
) -> RpcResult<U256>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = RpcResult<U256>>,
{
    GasSource::select(explicit, setting).resolve(query).await
}

/// Gas limit from `explicit`, else `setting`, else `estimate`
pub async fn resolve_gas_limit<F, Fut>(
    explicit: Option<U256>,
    setting: &GasSetting,
    estimate: F,
) -> RpcResult<U256>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = RpcResult<U256>>,
{
    GasSource::select(explicit, setting).resolve(estimate).await
}

/// Resolves gas values against the active network's settings and node.
///
/// Settings are read and the node is queried on every call.
#[derive(Clone)]
pub struct GasResolver {
    client: Arc<dyn ChainClient>,
    settings: SharedSettings,
}

impl GasResolver {
    pub fn new(client: Arc<dyn ChainClient>, settings: SharedSettings) -> Self {
        Self { client, settings }
    }

    pub async fn gas_price(&self, explicit: Option<U256>) -> RpcResult<U256> {
        let settings = self.settings.get().await;
        let source = GasSource::select(explicit, &settings.gas_price);
        let price = source.resolve(|| self.client.gas_price()).await?;
        tracing::debug!("Gas price {} ({:?})", price, source);
        Ok(price)
    }

    /// Gas limit for `tx`, which should already carry the resolved price
    pub async fn gas_limit(&self, explicit: Option<U256>, tx: &TransactionRequest) -> RpcResult<U256> {
        let settings = self.settings.get().await;
        let source = GasSource::select(explicit, &settings.gas_limit);
        let limit = source
            .resolve(|| self.estimate(tx, settings.reverting_tx_gas_limit))
            .await?;
        tracing::debug!("Gas limit {} ({:?})", limit, source);
        Ok(limit)
    }

    async fn estimate(&self, tx: &TransactionRequest, reverting: RevertingGasLimit) -> RpcResult<U256> {
        match self.client.estimate_gas(tx).await {
            Ok(gas) => Ok(gas),
            Err(e) if e.is_execution_failure() => match reverting {
                RevertingGasLimit::Disabled => Err(e),
                RevertingGasLimit::Max => {
                    tracing::warn!("Gas estimation failed ({}), using block gas limit", e);
                    self.client.block_gas_limit().await
                }
                RevertingGasLimit::Fixed(limit) => {
                    tracing::warn!("Gas estimation failed ({}), using {}", e, limit);
                    Ok(limit)
                }
            },
            Err(e) => Err(e),
        }
    }
}
