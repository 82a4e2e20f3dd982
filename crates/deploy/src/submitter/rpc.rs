//! JSON-RPC backed transaction submitter.

use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::{
    dyn_abi::DynSolValue,
    json_abi::JsonAbi,
    primitives::{Address, B256, Bytes, TxKind, U64, U256},
    sol_types::decode_revert_reason,
};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_signer_local::PrivateKeySigner;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{DeploymentReceipt, LogEntry, TransactionSubmitter, TxStatus, encode};
use crate::{
    artifact::Artifact,
    config::SubmitterConfig,
    error::DeployError,
    rpc::{self, RpcError},
    signer::SignerContext,
};

/// Submits transactions to the node behind the signer's RPC URL.
#[derive(Debug, Clone)]
pub struct RpcSubmitter {
    client: reqwest::Client,
    config: SubmitterConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    block_number: U64,
    status: Option<U64>,
    contract_address: Option<Address>,
    #[serde(default)]
    logs: Vec<LogEntry>,
}

impl From<RawReceipt> for DeploymentReceipt {
    fn from(raw: RawReceipt) -> Self {
        // Pre-Byzantium receipts carry no status; treat them as successful.
        let status = match raw.status {
            Some(status) if status.is_zero() => TxStatus::Reverted,
            _ => TxStatus::Success,
        };

        Self {
            tx_hash: raw.transaction_hash,
            block_number: raw.block_number.to::<u64>(),
            status,
            contract_address: raw.contract_address,
            logs: raw.logs,
        }
    }
}

impl RpcSubmitter {
    pub fn new(config: SubmitterConfig) -> Result<Self, DeployError> {
        let client = rpc::create_client(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &SubmitterConfig {
        &self.config
    }

    async fn send(
        &self,
        to: Option<Address>,
        input: Bytes,
        signer: &SignerContext,
    ) -> Result<DeploymentReceipt, DeployError> {
        let url = signer.rpc_url().as_str();
        let request = transaction_request(signer.address(), to, &input);

        let gas: U64 = self
            .call_rpc(url, "eth_estimateGas", vec![request.clone()])
            .await
            .map_err(reverted_before_broadcast)?;
        let gas_limit = gas.to::<u64>() * self.config.gas_multiplier_percent / 100;

        tracing::debug!(from = %signer.address(), ?to, gas_limit, "Broadcasting transaction");

        let tx_hash = match signer.key() {
            Some(key) => self.send_signed(url, key, to, input, gas_limit).await?,
            None => {
                let mut request = request.clone();
                request["gas"] = json!(U64::from(gas_limit));
                self.call_rpc(url, "eth_sendTransaction", vec![request])
                    .await
                    .map_err(reverted_before_broadcast)?
            }
        };

        tracing::info!(%tx_hash, "Transaction sent, waiting for confirmation");

        let receipt = self.wait_for_receipt(url, tx_hash).await?;

        if receipt.status == TxStatus::Reverted {
            let reason = self
                .replay_revert_reason(url, &request, receipt.block_number)
                .await;
            return Err(DeployError::TransactionReverted {
                tx_hash: Some(tx_hash),
                reason,
            });
        }

        Ok(receipt)
    }

    async fn send_signed(
        &self,
        url: &str,
        key: &PrivateKeySigner,
        to: Option<Address>,
        input: Bytes,
        gas_limit: u64,
    ) -> Result<B256, DeployError> {
        let from = key.address();
        let chain_id: U64 = self.call_rpc(url, "eth_chainId", vec![]).await?;
        let nonce: U64 = self
            .call_rpc(url, "eth_getTransactionCount", vec![json!(from), json!("pending")])
            .await?;
        let gas_price: U256 = self.call_rpc(url, "eth_gasPrice", vec![]).await?;

        let mut tx = TxLegacy {
            chain_id: Some(chain_id.to::<u64>()),
            nonce: nonce.to::<u64>(),
            gas_price: gas_price.saturating_to::<u128>(),
            gas_limit,
            to: to.map_or(TxKind::Create, TxKind::Call),
            value: U256::ZERO,
            input,
        };

        let signature = key
            .sign_transaction_sync(&mut tx)
            .map_err(|e| DeployError::Signing(e.to_string()))?;
        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        let raw = Bytes::from(envelope.encoded_2718());

        Ok(self
            .call_rpc(url, "eth_sendRawTransaction", vec![json!(raw)])
            .await?)
    }

    /// Wait for the receipt and the configured confirmation depth.
    async fn wait_for_receipt(
        &self,
        url: &str,
        tx_hash: B256,
    ) -> Result<DeploymentReceipt, DeployError> {
        let timeout = Duration::from_secs(self.config.receipt_timeout_secs);
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let confirmations = self.config.confirmations.max(1);

        let receipt = rpc::poll_until("transaction receipt", timeout, interval, || async move {
            let receipt: Option<RawReceipt> = self
                .call_rpc(url, "eth_getTransactionReceipt", vec![json!(tx_hash)])
                .await?;
            let Some(receipt) = receipt else {
                return Ok(None);
            };

            if confirmations > 1 {
                let head: U64 = self.call_rpc(url, "eth_blockNumber", vec![]).await?;
                let depth = head
                    .to::<u64>()
                    .saturating_sub(receipt.block_number.to::<u64>())
                    + 1;
                if depth < confirmations {
                    tracing::trace!(%tx_hash, depth, confirmations, "Waiting for more confirmations");
                    return Ok(None);
                }
            }

            Ok(Some(receipt))
        })
        .await
        .ok_or(DeployError::TransactionTimeout {
            tx_hash,
            waited_secs: self.config.receipt_timeout_secs,
        })?;

        Ok(receipt.into())
    }

    /// Re-run a reverted transaction with `eth_call` at its inclusion block to
    /// recover the revert reason.
    async fn replay_revert_reason(
        &self,
        url: &str,
        request: &Value,
        block_number: u64,
    ) -> Option<String> {
        let block = json!(U64::from(block_number));
        match self
            .call_rpc::<Bytes>(url, "eth_call", vec![request.clone(), block])
            .await
        {
            Ok(_) => None,
            Err(e) => revert_reason(&e),
        }
    }

    async fn call_rpc<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, RpcError> {
        rpc::json_rpc_call(&self.client, url, method, params).await
    }
}

impl TransactionSubmitter for RpcSubmitter {
    async fn submit(
        &self,
        artifact: &Artifact,
        args: &[DynSolValue],
        signer: &SignerContext,
    ) -> Result<DeploymentReceipt, DeployError> {
        let input = encode::deployment_data(artifact, args)?;
        tracing::debug!(contract = %artifact.contract_name, "Submitting deployment");
        self.send(None, input, signer).await
    }

    async fn call(
        &self,
        contract: Address,
        abi: &JsonAbi,
        method: &str,
        args: &[DynSolValue],
        signer: &SignerContext,
    ) -> Result<DeploymentReceipt, DeployError> {
        let input = encode::call_data(abi, method, args)?;
        tracing::debug!(%contract, method, "Submitting call");
        self.send(Some(contract), input, signer).await
    }
}

fn transaction_request(from: Address, to: Option<Address>, input: &Bytes) -> Value {
    let mut request = json!({
        "from": from,
        "data": input,
    });
    if let Some(to) = to {
        request["to"] = json!(to);
    }
    request
}

/// Decoded `Error(string)` / `Panic(uint256)` payload, or the node's message.
fn revert_reason(err: &RpcError) -> Option<String> {
    if !err.is_revert() {
        return None;
    }
    err.revert_data()
        .and_then(|data| decode_revert_reason(&data))
        .or_else(|| err.server_message().map(str::to_string))
}

fn reverted_before_broadcast(err: RpcError) -> DeployError {
    if err.is_revert() {
        DeployError::TransactionReverted {
            tx_hash: None,
            reason: revert_reason(&err),
        }
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_receipt_conversion() {
        let raw: RawReceipt = serde_json::from_value(json!({
            "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "blockNumber": "0x2a",
            "status": "0x0",
            "contractAddress": null,
            "gasUsed": "0x5208",
            "logs": [{
                "address": "0x2222222222222222222222222222222222222222",
                "topics": ["0x3333333333333333333333333333333333333333333333333333333333333333"],
                "data": "0x",
                "logIndex": "0x0"
            }]
        }))
        .unwrap();

        let receipt = DeploymentReceipt::from(raw);
        assert_eq!(receipt.block_number, 42);
        assert_eq!(receipt.status, TxStatus::Reverted);
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].address, Address::repeat_byte(0x22));
    }

    #[test]
    fn test_revert_reason_decodes_error_string() {
        // Error("Errors.NotAllowed")
        let data = "0x08c379a0\
            0000000000000000000000000000000000000000000000000000000000000020\
            0000000000000000000000000000000000000000000000000000000000000011\
            4572726f72732e4e6f74416c6c6f776564000000000000000000000000000000";
        let err = RpcError::Server {
            method: "eth_call".to_string(),
            code: 3,
            message: "execution reverted".to_string(),
            data: Some(Value::String(data.to_string())),
        };

        let reason = revert_reason(&err).unwrap();
        assert!(reason.contains("Errors.NotAllowed"), "{reason}");
    }

    #[test]
    fn test_estimate_revert_maps_to_reverted_without_hash() {
        let err = RpcError::Server {
            method: "eth_estimateGas".to_string(),
            code: -32000,
            message: "execution reverted: paused".to_string(),
            data: None,
        };

        match reverted_before_broadcast(err) {
            DeployError::TransactionReverted { tx_hash, reason } => {
                assert!(tx_hash.is_none());
                assert_eq!(reason.as_deref(), Some("execution reverted: paused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_revert_errors_stay_rpc_errors() {
        let err = RpcError::MissingResult {
            method: "eth_sendTransaction".to_string(),
        };
        assert!(matches!(reverted_before_broadcast(err), DeployError::Rpc(_)));
    }

    /// Local JSON-RPC node answering each method with a fixed result.
    async fn fake_node(results: Vec<(&'static str, Value)>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let results = results.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let request = loop {
                        let n = stream.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        let text = String::from_utf8_lossy(&buf).to_string();
                        let Some(split) = text.find("\r\n\r\n") else {
                            continue;
                        };
                        let length = text[..split]
                            .lines()
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())?
                            })
                            .unwrap_or(0);
                        if buf.len() >= split + 4 + length {
                            break serde_json::from_slice::<Value>(&buf[split + 4..split + 4 + length])
                                .unwrap_or(Value::Null);
                        }
                    };

                    let result = results
                        .iter()
                        .find(|(method, _)| request["method"] == *method)
                        .map(|(_, result)| result.clone())
                        .unwrap_or(Value::Null);
                    let body = json!({"jsonrpc": "2.0", "id": request["id"], "result": result}).to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    stream.write_all(response.as_bytes()).await.ok();
                });
            }
        });

        url
    }

    fn quick_submitter(confirmations: u64) -> RpcSubmitter {
        RpcSubmitter::new(SubmitterConfig {
            confirmations,
            receipt_timeout_secs: 1,
            poll_interval_ms: 50,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_receipt_times_out() {
        let url = fake_node(vec![("eth_getTransactionReceipt", Value::Null)]).await;
        let tx_hash = B256::repeat_byte(0x11);

        let err = quick_submitter(1)
            .wait_for_receipt(&url, tx_hash)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::TransactionTimeout { tx_hash: hash, waited_secs: 1 } if hash == tx_hash
        ));
    }

    #[tokio::test]
    async fn test_shallow_receipt_times_out_waiting_for_confirmations() {
        let tx_hash = B256::repeat_byte(0x22);
        let url = fake_node(vec![
            (
                "eth_getTransactionReceipt",
                json!({
                    "transactionHash": tx_hash,
                    "blockNumber": "0x10",
                    "status": "0x1",
                    "contractAddress": "0x2222222222222222222222222222222222222222",
                    "logs": []
                }),
            ),
            ("eth_blockNumber", json!("0x11")),
        ])
        .await;

        // Depth 2 is enough for two confirmations but not for three.
        let receipt = quick_submitter(2).wait_for_receipt(&url, tx_hash).await.unwrap();
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.contract_address, Some(Address::repeat_byte(0x22)));

        let err = quick_submitter(3)
            .wait_for_receipt(&url, tx_hash)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::TransactionTimeout { waited_secs: 1, .. }));
    }

    #[test]
    fn test_transaction_request_omits_to_for_creations() {
        let request = transaction_request(Address::repeat_byte(1), None, &Bytes::from_static(&[0x60]));
        assert!(request.get("to").is_none());
        assert_eq!(request["data"], json!("0x60"));
    }
}
