// chain-client/src/http.rs
use crate::{
    ChainClient, NodeReceipt, ResetNotifier, ResetSignal, RpcError, RpcRequest, RpcResponse,
    RpcResult,
};
use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, TransactionRequest, H256, U256, U64};
use hyper::client::HttpConnector;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Method, Request, Uri};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// JSON-RPC 2.0 over HTTP, limited to the calls the deployer makes
pub struct HttpChainClient {
    uri: Uri,
    client: Client<HttpConnector>,
    next_id: AtomicU64,
    /// Snapshot taken at connect time, used by `reset`
    snapshot: Mutex<Option<serde_json::Value>>,
    resets: ResetNotifier,
}

impl HttpChainClient {
    pub fn new(url: &str) -> RpcResult<Self> {
        let uri = url
            .parse::<Uri>()
            .map_err(|e| RpcError::InvalidParams(format!("Invalid node URL {}: {}", url, e)))?;

        Ok(Self {
            uri,
            client: Client::new(),
            next_id: AtomicU64::new(1),
            snapshot: Mutex::new(None),
            resets: ResetNotifier::new(),
        })
    }

    /// Connect and take the baseline snapshot if the node supports it
    pub async fn connect(url: &str) -> RpcResult<Self> {
        let client = Self::new(url)?;
        let version = client.client_version().await?;
        tracing::info!("Connected to {} ({})", url, version);

        match client.request::<serde_json::Value>("evm_snapshot", serde_json::json!([])).await {
            Ok(id) => *client.snapshot.lock().await = Some(id),
            Err(e) => tracing::debug!("Node does not support snapshots: {}", e),
        }

        Ok(client)
    }

    pub fn url(&self) -> String {
        self.uri.to_string()
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> RpcResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_vec(&RpcRequest::new(method, params, id))
            .map_err(|e| RpcError::InvalidParams(e.to_string()))?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.uri.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        tracing::trace!("-> {} (id {})", method, id);

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RpcError::Transport(format!(
                "HTTP {} from {}",
                status, self.uri
            )));
        }

        let response: RpcResponse =
            serde_json::from_slice(&bytes).map_err(|e| RpcError::Decode(e.to_string()))?;
        response.into_result()
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn chain_id(&self) -> RpcResult<u64> {
        let id: U64 = self.request("eth_chainId", serde_json::json!([])).await?;
        Ok(id.as_u64())
    }

    async fn gas_price(&self) -> RpcResult<U256> {
        self.request("eth_gasPrice", serde_json::json!([])).await
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> RpcResult<U256> {
        self.request("eth_estimateGas", serde_json::json!([tx])).await
    }

    async fn transaction_count(&self, address: Address) -> RpcResult<U256> {
        self.request(
            "eth_getTransactionCount",
            serde_json::json!([address, "latest"]),
        )
        .await
    }

    async fn balance(&self, address: Address) -> RpcResult<U256> {
        self.request("eth_getBalance", serde_json::json!([address, "latest"]))
            .await
    }

    async fn block_gas_limit(&self) -> RpcResult<U256> {
        let block: serde_json::Value = self
            .request("eth_getBlockByNumber", serde_json::json!(["latest", false]))
            .await?;
        let limit = block
            .get("gasLimit")
            .cloned()
            .ok_or_else(|| RpcError::Decode("latest block has no gasLimit".into()))?;
        serde_json::from_value(limit).map_err(|e| RpcError::Decode(e.to_string()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> RpcResult<H256> {
        self.request("eth_sendRawTransaction", serde_json::json!([raw]))
            .await
    }

    async fn transaction_receipt(&self, hash: H256) -> RpcResult<Option<NodeReceipt>> {
        self.request("eth_getTransactionReceipt", serde_json::json!([hash]))
            .await
    }

    async fn call(&self, tx: &TransactionRequest) -> RpcResult<Bytes> {
        self.request("eth_call", serde_json::json!([tx, "latest"])).await
    }

    async fn client_version(&self) -> RpcResult<String> {
        self.request("web3_clientVersion", serde_json::json!([])).await
    }

    async fn reset(&self) -> RpcResult<()> {
        let mut snapshot = self.snapshot.lock().await;
        let id = snapshot
            .clone()
            .ok_or_else(|| RpcError::Unsupported("reset without a baseline snapshot".into()))?;

        let reverted: bool = self.request("evm_revert", serde_json::json!([id])).await?;
        if !reverted {
            return Err(RpcError::rejected("evm_revert refused the baseline snapshot"));
        }

        // The node has rolled back and the snapshot id is consumed
        *snapshot = None;
        self.resets.notify();

        match self.request("evm_snapshot", serde_json::json!([])).await {
            Ok(id) => *snapshot = Some(id),
            Err(e) => tracing::warn!("Chain reset, but taking a new baseline snapshot failed: {}", e),
        }
        Ok(())
    }

    fn reset_signal(&self) -> ResetSignal {
        self.resets.subscribe()
    }
}
