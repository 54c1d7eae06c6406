// JSON-RPC 2.0 client for the chain node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use vigil_core::PolicyConstants;

use crate::client::ChainClient;
use crate::error::ChainError;
use crate::types::{ActiveValidator, Block, Inherent};

/// Connection settings for the node endpoint.
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for RpcSettings {
    fn default() -> Self {
        RpcSettings {
            url: "http://127.0.0.1:8648".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcFailure>,
}

#[derive(Debug, Deserialize)]
struct RpcFailure {
    code: i64,
    message: String,
}

/// HTTP implementation of [`ChainClient`] over a pooled reqwest client.
pub struct JsonRpcClient {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(settings: &RpcSettings) -> Result<Self, ChainError> {
        let http = ClientBuilder::new()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(16)
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(JsonRpcClient {
            http,
            url: settings.url.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!("rpc {} (id {})", method, id);
        let response = self.http.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Http {
                status: status.as_u16(),
            });
        }

        // Parse in two steps so a malformed body is a Decode error, not a
        // transport error that would be retried.
        let body = response.text().await?;
        let envelope: RpcResponse =
            serde_json::from_str(&body).map_err(|source| ChainError::Decode { method, source })?;

        if let Some(failure) = envelope.error {
            return Err(ChainError::Rpc {
                code: failure.code,
                message: failure.message,
            });
        }
        let result = envelope.result.ok_or(ChainError::MissingResult { method })?;
        serde_json::from_value(result).map_err(|source| ChainError::Decode { method, source })
    }
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    async fn get_policy_constants(&self) -> Result<PolicyConstants, ChainError> {
        let policy: PolicyConstants = self.call("getPolicyConstants", json!([])).await?;
        policy.validate()?;
        Ok(policy)
    }

    async fn get_epoch_number(&self) -> Result<u64, ChainError> {
        self.call("getEpochNumber", json!([])).await
    }

    async fn get_block_number(&self) -> Result<u64, ChainError> {
        self.call("getBlockNumber", json!([])).await
    }

    async fn get_block_by_number(
        &self,
        number: u64,
        include_body: bool,
    ) -> Result<Block, ChainError> {
        self.call("getBlockByNumber", json!([number, include_body]))
            .await
    }

    async fn get_inherents_by_batch_number(
        &self,
        batch: u64,
    ) -> Result<Vec<Inherent>, ChainError> {
        self.call("getInherentsByBatchNumber", json!([batch])).await
    }

    async fn get_active_validators(&self) -> Result<Vec<ActiveValidator>, ChainError> {
        self.call("getActiveValidators", json!([])).await
    }
}
