//! In-process fakes of the chain and the verifier shared by the integration tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_core::{
    dyn_abi::DynSolValue,
    json_abi::JsonAbi,
    primitives::{Address, B256, Bytes, keccak256},
};
use lens_deploy::{
    Artifact, DeployError, DeploymentReceipt, LogEntry, Orchestrator, RetryPolicy, SignerContext,
    StaticArtifacts, TransactionSubmitter, TxStatus, VerificationError, VerificationOutcome,
    VerificationRequest, VerificationSubmitter, Verifier, lens, submitter::encode,
};
use url::Url;

pub fn deployer() -> Address {
    Address::repeat_byte(0xde)
}

pub fn signer() -> SignerContext {
    SignerContext::unlocked(deployer(), Url::parse("http://localhost:8545").unwrap())
}

/// Initialize tracing for tests (idempotent).
pub fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

/// A transaction the fake chain accepted, reverted or not.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    /// Contract name for creations, method name for calls.
    pub name: String,
    pub target: Option<Address>,
    pub args: Vec<DynSolValue>,
}

struct ChainState {
    next_address: u8,
    block: u64,
    broadcasts: Vec<Broadcast>,
    revert_on: HashSet<String>,
    reverted_receipts: HashSet<String>,
    emits: HashMap<String, Vec<String>>,
    unrelated_logs: bool,
    created: Vec<(String, Address)>,
    emitted: Vec<(String, Address)>,
}

/// Deterministic chain: every creation or announced contract gets the next
/// address `0x00..10`, `0x00..11`, ...
pub struct FakeChain {
    state: Mutex<ChainState>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState {
                next_address: 0x10,
                block: 100,
                broadcasts: Vec::new(),
                revert_on: HashSet::new(),
                reverted_receipts: HashSet::new(),
                emits: HashMap::new(),
                unrelated_logs: false,
                created: Vec::new(),
                emitted: Vec::new(),
            }),
        }
    }

    /// Revert the creation of `name` (contract) or any call to `name` (method).
    pub fn revert_on(self, name: &str) -> Self {
        self.state.lock().unwrap().revert_on.insert(name.to_string());
        self
    }

    /// Mine `name` (contract or method) but return a receipt with status 0.
    pub fn reverted_receipt_on(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .reverted_receipts
            .insert(name.to_string());
        self
    }

    /// Calls to `method` create one contract per label, each announcing itself.
    pub fn emit(self, method: &str, labels: &[&str]) -> Self {
        self.state.lock().unwrap().emits.insert(
            method.to_string(),
            labels.iter().map(|label| label.to_string()).collect(),
        );
        self
    }

    /// Surround announcement logs with unrelated `Transfer` logs.
    pub fn with_unrelated_logs(self) -> Self {
        self.state.lock().unwrap().unrelated_logs = true;
        self
    }

    pub fn broadcasts(&self) -> Vec<Broadcast> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    pub fn created(&self, contract: &str) -> Option<Address> {
        self.state
            .lock()
            .unwrap()
            .created
            .iter()
            .find(|(name, _)| name == contract)
            .map(|(_, address)| *address)
    }

    /// Addresses announced under `label`, in emission order.
    pub fn emitted(&self, label: &str) -> Vec<Address> {
        self.state
            .lock()
            .unwrap()
            .emitted
            .iter()
            .filter(|(emitted, _)| emitted == label)
            .map(|(_, address)| *address)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }
}

impl ChainState {
    fn next_address(&mut self) -> Address {
        let address = Address::with_last_byte(self.next_address);
        self.next_address += 1;
        address
    }

    fn mine(&mut self, contract_address: Option<Address>, logs: Vec<LogEntry>) -> DeploymentReceipt {
        self.block += 1;
        DeploymentReceipt {
            tx_hash: keccak256(self.block.to_be_bytes()),
            block_number: self.block,
            status: TxStatus::Success,
            contract_address,
            logs,
        }
    }

    fn mine_reverted(&mut self) -> DeploymentReceipt {
        DeploymentReceipt {
            status: TxStatus::Reverted,
            ..self.mine(None, Vec::new())
        }
    }

    fn revert(&mut self) -> DeployError {
        self.block += 1;
        DeployError::TransactionReverted {
            tx_hash: Some(keccak256(self.block.to_be_bytes())),
            reason: Some("Errors.NotAllowed".to_string()),
        }
    }
}

impl TransactionSubmitter for FakeChain {
    async fn submit(
        &self,
        artifact: &Artifact,
        args: &[DynSolValue],
        _signer: &SignerContext,
    ) -> Result<DeploymentReceipt, DeployError> {
        encode::deployment_data(artifact, args)?;

        let mut state = self.lock();
        state.broadcasts.push(Broadcast {
            name: artifact.contract_name.clone(),
            target: None,
            args: args.to_vec(),
        });

        if state.revert_on.contains(&artifact.contract_name) {
            return Err(state.revert());
        }
        if state.reverted_receipts.contains(&artifact.contract_name) {
            return Ok(state.mine_reverted());
        }

        let address = state.next_address();
        state.created.push((artifact.contract_name.clone(), address));
        Ok(state.mine(Some(address), Vec::new()))
    }

    async fn call(
        &self,
        contract: Address,
        abi: &JsonAbi,
        method: &str,
        args: &[DynSolValue],
        _signer: &SignerContext,
    ) -> Result<DeploymentReceipt, DeployError> {
        encode::call_data(abi, method, args)?;

        let mut state = self.lock();
        state.broadcasts.push(Broadcast {
            name: method.to_string(),
            target: Some(contract),
            args: args.to_vec(),
        });

        if state.revert_on.contains(method) {
            return Err(state.revert());
        }
        if state.reverted_receipts.contains(method) {
            return Ok(state.mine_reverted());
        }

        let labels = state.emits.get(method).cloned().unwrap_or_default();
        let mut logs = Vec::new();
        if state.unrelated_logs {
            logs.push(transfer_log(contract));
        }
        for label in labels {
            let address = state.next_address();
            state.emitted.push((label.clone(), address));
            logs.push(lens_log(address, &label));
            if state.unrelated_logs {
                logs.push(transfer_log(address));
            }
        }

        Ok(state.mine(None, logs))
    }
}

/// `Lens_Contract_Deployed(label, "lens", label, "lens")` emitted by `emitter`.
pub fn lens_log(emitter: Address, label: &str) -> LogEntry {
    LogEntry {
        address: emitter,
        topics: vec![
            lens::deployed_event().selector(),
            keccak256(label),
            keccak256("lens"),
        ],
        data: DynSolValue::Tuple(vec![
            DynSolValue::String(label.to_string()),
            DynSolValue::String("lens".to_string()),
        ])
        .abi_encode_params()
        .into(),
    }
}

/// An ERC-20 `Transfer` log, irrelevant to address resolution.
pub fn transfer_log(emitter: Address) -> LogEntry {
    LogEntry {
        address: emitter,
        topics: vec![
            keccak256("Transfer(address,address,uint256)"),
            B256::ZERO,
            B256::left_padding_from(emitter.as_slice()),
        ],
        data: Bytes::from(vec![0u8; 32]),
    }
}

struct VerifierState {
    requests: Vec<VerificationRequest>,
    reject: HashSet<String>,
    transient_failures: usize,
}

/// Verifier that accepts everything unless told otherwise. Clones share state.
#[derive(Clone)]
pub struct FakeVerifier {
    state: Arc<Mutex<VerifierState>>,
}

impl Default for FakeVerifier {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(VerifierState {
                requests: Vec::new(),
                reject: HashSet::new(),
                transient_failures: 0,
            })),
        }
    }
}

impl FakeVerifier {
    /// Reject every request for `contract` (bare contract name).
    pub fn rejecting(self, contract: &str) -> Self {
        self.state.lock().unwrap().reject.insert(contract.to_string());
        self
    }

    /// Fail the next `count` submissions with a transient error.
    pub fn failing_transiently(self, count: usize) -> Self {
        self.state.lock().unwrap().transient_failures = count;
        self
    }

    pub fn requests(&self) -> Vec<VerificationRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_for(&self, contract: &str) -> Option<VerificationRequest> {
        self.requests()
            .into_iter()
            .find(|request| request.contract_name == contract)
    }
}

impl Verifier for FakeVerifier {
    async fn submit(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, VerificationError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(VerificationError::Transient(
                "503 Service Unavailable".to_string(),
            ));
        }
        if state.reject.contains(&request.contract_name) {
            return Err(VerificationError::Rejected("bytecode mismatch".to_string()));
        }
        Ok(VerificationOutcome::Verified)
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        min_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}

pub fn orchestrator(
    chain: FakeChain,
    artifacts: StaticArtifacts,
    verifier: &FakeVerifier,
) -> Orchestrator<FakeChain, StaticArtifacts, FakeVerifier> {
    Orchestrator::new(chain, artifacts, lens::binding())
        .with_verifier(VerificationSubmitter::new(verifier.clone(), fast_retry()))
}

/// An artifact with a human-readable ABI and dummy bytecode.
pub fn artifact(name: &str, abi: &[&str]) -> Artifact {
    Artifact::new(
        name,
        format!("contracts/{name}.sol"),
        JsonAbi::parse(abi.iter().copied()).unwrap(),
        Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]),
    )
}

const RULES: &str = "(address,bytes,bool)[] rules";
const EXTRA_DATA: &str = "(bytes32,bytes)[] extraData";

/// Every artifact the Lens plan touches, with the ABI shapes it encodes against.
pub fn lens_artifacts() -> StaticArtifacts {
    let primitive_call = |method: &str| {
        format!(
            "function {method}(string metadataURI, address owner, address[] admins, {RULES}, {EXTRA_DATA}) returns (address)"
        )
    };
    let deploy_feed = primitive_call("deployFeed");
    let deploy_group = primitive_call("deployGroup");
    let deploy_graph = primitive_call("deployGraph");
    let deploy_username = format!(
        "function deployUsername(string namespace, string metadataURI, address owner, address[] admins, {RULES}, {EXTRA_DATA}, string nftName, string nftSymbol) returns (address)"
    );
    let deploy_app = format!(
        "function deployApp(string metadataURI, bool sourceStampVerificationEnabled, address owner, address[] admins, (address,address[],address,address[],address,address[],address,address) initialProperties, {EXTRA_DATA}) returns (address)"
    );

    StaticArtifacts::new()
        .with(artifact("AccountFactory", &[]))
        .with(artifact("AppFactory", &[]))
        .with(artifact("GroupFactory", &[]))
        .with(artifact("FeedFactory", &[]))
        .with(artifact("GraphFactory", &[]))
        .with(artifact("UsernameFactory", &[]))
        .with(artifact(
            "LensFactory",
            &[
                "constructor(address accountFactory, address appFactory, address groupFactory, address feedFactory, address graphFactory, address usernameFactory)",
                "function deployAccount(string metadataURI, address owner, address[] accountManagers, (bool,bool,bool,bool)[] accountManagersPermissions, (address,uint256,uint256,bytes) sourceStamp) returns (address)",
                &deploy_feed,
                &deploy_group,
                &deploy_graph,
                &deploy_username,
                &deploy_app,
            ],
        ))
        .with(artifact(
            "AccessControlFactory",
            &["function deployOwnerAdminOnlyAccessControl(address owner) returns (address)"],
        ))
        .with(artifact(
            "Account",
            &["constructor(address owner, string metadataURI, address[] accountManagers, (bool,bool,bool,bool)[] accountManagersPermissions, (address,uint256,uint256,bytes) sourceStamp)"],
        ))
        .with(artifact("Feed", &["constructor(string metadataURI, address accessControl)"]))
        .with(artifact("Group", &["constructor(string metadataURI, address accessControl)"]))
        .with(artifact("Graph", &["constructor(string metadataURI, address accessControl)"]))
        .with(artifact("App", &["constructor(string metadataURI, address accessControl)"]))
        .with(artifact(
            "Username",
            &["constructor(string namespace, string metadataURI, address accessControl, string nftName, string nftSymbol, address tokenURIProvider)"],
        ))
        .with(artifact(
            "OwnerAdminOnlyAccessControl",
            &["constructor(address owner)"],
        ))
}

/// Method-to-labels wiring of the Lens factories.
pub fn lens_chain() -> FakeChain {
    FakeChain::new()
        .emit("deployAccount", &["account"])
        .emit("deployFeed", &["feed", "access-control"])
        .emit("deployGroup", &["group", "access-control"])
        .emit("deployGraph", &["graph", "access-control"])
        .emit(
            "deployUsername",
            &["username", "access-control", "username-token-uri-provider"],
        )
        .emit("deployApp", &["app", "access-control"])
        .emit("deployOwnerAdminOnlyAccessControl", &["access-control"])
}
