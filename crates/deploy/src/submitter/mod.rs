//! Transaction submission: encode, sign, broadcast and wait for inclusion.

use std::future::Future;

use alloy_core::{
    dyn_abi::DynSolValue,
    json_abi::JsonAbi,
    primitives::{Address, B256, Bytes},
};
use serde::{Deserialize, Serialize};

use crate::{artifact::Artifact, error::DeployError, signer::SignerContext};

pub mod encode;
mod rpc;

pub use rpc::RpcSubmitter;

/// Execution status of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TxStatus {
    Success,
    Reverted,
}

/// A raw event log as attached to a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// The mined result of one submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentReceipt {
    pub tx_hash: B256,
    pub block_number: u64,
    pub status: TxStatus,
    /// Set for contract-creation transactions.
    pub contract_address: Option<Address>,
    /// Logs in receipt order.
    pub logs: Vec<LogEntry>,
}

impl DeploymentReceipt {
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }
}

/// Sends deployment and call transactions and blocks until they are confirmed.
///
/// Arguments are checked against the ABI before anything touches the network;
/// a mismatch fails with [`DeployError::Encoding`].
pub trait TransactionSubmitter: Send + Sync {
    /// Deploy `artifact` with the given constructor arguments.
    fn submit(
        &self,
        artifact: &Artifact,
        args: &[DynSolValue],
        signer: &SignerContext,
    ) -> impl Future<Output = Result<DeploymentReceipt, DeployError>> + Send;

    /// Call `method` on an already deployed contract.
    fn call(
        &self,
        contract: Address,
        abi: &JsonAbi,
        method: &str,
        args: &[DynSolValue],
        signer: &SignerContext,
    ) -> impl Future<Output = Result<DeploymentReceipt, DeployError>> + Send;
}
