//! Error taxonomy of the deployment pipeline.

use alloy_core::primitives::{Address, B256};
use thiserror::Error;

use crate::rpc::RpcError;

/// Errors raised while preparing, submitting or resolving a deployment task.
///
/// Every variant is fatal for the run: the orchestrator halts the remaining
/// queue as soon as one is returned. Verification problems are not represented
/// here, they are recorded as [`crate::VerificationOutcome::Failed`].
#[derive(Debug, Error)]
pub enum DeployError {
    /// The artifact provider has no artifact under the requested name.
    #[error("artifact `{name}` not found: {reason}")]
    ArtifactNotFound { name: String, reason: String },

    /// Arguments do not type-check against the constructor or method ABI.
    #[error("cannot encode arguments for `{target}`: {reason}")]
    Encoding { target: String, reason: String },

    /// No receipt (or not enough confirmations) within the configured wait.
    #[error("transaction {tx_hash} not confirmed after {waited_secs}s")]
    TransactionTimeout { tx_hash: B256, waited_secs: u64 },

    /// The transaction reverted, either on-chain or during gas estimation.
    #[error("transaction reverted{}", revert_details(.tx_hash, .reason))]
    TransactionReverted {
        tx_hash: Option<B256>,
        reason: Option<String>,
    },

    /// A log carries the expected topic hash but its payload does not decode.
    #[error("log #{log_index} from {emitter} matches `{event}` but does not decode: {reason}")]
    MalformedEvent {
        event: String,
        emitter: Address,
        log_index: usize,
        reason: String,
    },

    /// None of the decoded events carries the requested role label.
    #[error("no event in the receipt carries role `{role}`")]
    RoleNotFound { role: String },

    /// A task references a role that no earlier task produces.
    #[error("role `{role}` is not produced by any earlier task")]
    UnresolvedDependency { role: String },

    /// Two tasks publish the same ledger role.
    #[error("role `{role}` is published more than once")]
    DuplicateRole { role: String },

    /// A task is structurally unusable (e.g. a call without an event label).
    #[error("invalid task definition: {0}")]
    InvalidPlan(String),

    /// The local signer could not produce a signature.
    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

fn revert_details(tx_hash: &Option<B256>, reason: &Option<String>) -> String {
    let mut details = String::new();
    if let Some(hash) = tx_hash {
        details.push_str(&format!(" in {hash}"));
    }
    match reason {
        Some(reason) => details.push_str(&format!(": {reason}")),
        None => details.push_str(" (no reason)"),
    }
    details
}
