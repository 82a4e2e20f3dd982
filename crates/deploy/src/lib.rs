//! lens-deploy - Deployment library for the Lens protocol contracts.
//!
//! This crate deploys a graph of interdependent contracts in declaration
//! order, discovers the addresses of factory-created contracts from receipt
//! events, submits them to a verification service in the background and
//! records every produced address in a ledger.

mod artifact;
pub use artifact::{Artifact, ArtifactProvider, ArtifactStore, StaticArtifacts};

mod config;
pub use config::{
    CONFIG_FILENAME, DEFAULT_RPC_URL, DEFAULT_VERIFIER_URL, DeployerConfig, LensPlanConfig,
    SubmitterConfig, VerifierConfig,
};

mod error;
pub use error::DeployError;

pub mod events;
pub use events::DecodedEvent;

mod ledger;
pub use ledger::{
    DeploymentLedger, LedgerEntry, LedgerSnapshot, VerificationRecord, parse_env_lines,
};

pub mod lens;

mod orchestrator;
pub use orchestrator::{Orchestrator, RunFailure, TaskFailure, TaskStage};

pub mod resolver;
pub use resolver::{AddressSource, EventBinding, RoleAddressMap, RoleSelector};

pub mod rpc;

mod signer;
pub use signer::SignerContext;

pub mod submitter;
pub use submitter::{DeploymentReceipt, LogEntry, RpcSubmitter, TransactionSubmitter, TxStatus};

mod task;
pub use task::{
    ArgsBuilder, Companion, DeploymentPlan, DeploymentTask, Resolution, SolArgs, TaskAction,
    TaskInputs, Verification, VerifyArgsBuilder, VerifyInputs,
};

pub mod verification;
pub use verification::{
    HttpVerifier, RetryPolicy, VerificationError, VerificationOutcome, VerificationRequest,
    VerificationSubmitter, Verifier,
};
