//! Best-effort source verification of deployed contracts.
//!
//! Verification never fails a deployment run: every error ends up as a
//! [`VerificationOutcome::Failed`] entry in the ledger.

use std::{
    collections::HashSet,
    fmt,
    future::Future,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use alloy_core::primitives::{Address, B256, Bytes};
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::Artifact;

mod http;

pub use http::HttpVerifier;

/// Result of one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum VerificationOutcome {
    Verified,
    AlreadyVerified,
    /// Accepted but not finished within the status poll budget.
    Pending,
    Failed(String),
}

impl VerificationOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified | Self::AlreadyVerified)
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified => f.write_str("verified"),
            Self::AlreadyVerified => f.write_str("already-verified"),
            Self::Pending => f.write_str("pending"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Errors reported by a [`Verifier`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// Network failure, rate limit or server error. Retried.
    #[error("transient verifier failure: {0}")]
    Transient(String),
    /// The verifier refused the request. Not retried.
    #[error("verifier rejected the request: {0}")]
    Rejected(String),
}

impl VerificationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Everything a verifier needs to match source to deployed bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub address: Address,
    /// `path/To.sol:Name`.
    pub contract_source_id: String,
    pub source_name: String,
    pub contract_name: String,
    pub constructor_args: Bytes,
    pub bytecode: Bytes,
    pub bytecode_digest: B256,
}

impl VerificationRequest {
    pub fn new(address: Address, artifact: &Artifact, constructor_args: Bytes) -> Self {
        Self {
            address,
            contract_source_id: artifact.source_id(),
            source_name: artifact.source_name.clone(),
            contract_name: artifact.contract_name.clone(),
            constructor_args,
            bytecode: artifact.bytecode.clone(),
            bytecode_digest: artifact.bytecode_digest(),
        }
    }
}

/// A verification backend, e.g. an explorer API.
pub trait Verifier: Send + Sync + 'static {
    fn submit(
        &self,
        request: &VerificationRequest,
    ) -> impl Future<Output = Result<VerificationOutcome, VerificationError>> + Send;
}

/// Bounded exponential backoff for transient verifier failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }
}

/// Wraps a [`Verifier`] with retries and per-address idempotence.
pub struct VerificationSubmitter<V> {
    verifier: V,
    policy: RetryPolicy,
    verified: Mutex<HashSet<Address>>,
}

impl<V: Verifier> VerificationSubmitter<V> {
    pub fn new(verifier: V, policy: RetryPolicy) -> Self {
        Self {
            verifier,
            policy,
            verified: Mutex::new(HashSet::new()),
        }
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Submit `request`, retrying transient failures.
    ///
    /// An address already verified through this submitter short-circuits to
    /// [`VerificationOutcome::AlreadyVerified`] without contacting the backend.
    pub async fn verify(&self, request: &VerificationRequest) -> VerificationOutcome {
        if self.is_verified(&request.address) {
            tracing::debug!(address = %request.address, "Already verified, skipping");
            return VerificationOutcome::AlreadyVerified;
        }

        let result = (|| self.verifier.submit(request))
            .retry(self.policy.backoff())
            .when(VerificationError::is_transient)
            .notify(|err, delay| {
                tracing::warn!(
                    address = %request.address,
                    error = %err,
                    ?delay,
                    "Verification attempt failed, retrying"
                );
            })
            .await;

        match result {
            Ok(outcome) => {
                if outcome.is_verified() {
                    self.verified
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(request.address);
                }
                tracing::info!(
                    address = %request.address,
                    contract = %request.contract_source_id,
                    %outcome,
                    "Verification finished"
                );
                outcome
            }
            Err(e) => {
                tracing::warn!(
                    address = %request.address,
                    contract = %request.contract_source_id,
                    error = %e,
                    "Verification failed"
                );
                VerificationOutcome::Failed(e.to_string())
            }
        }
    }

    fn is_verified(&self, address: &Address) -> bool {
        self.verified
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address)
    }
}
