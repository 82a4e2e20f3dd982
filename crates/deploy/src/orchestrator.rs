//! Sequential execution of a [`DeploymentPlan`].
//!
//! Each task moves through `pending -> submitted -> confirmed -> resolved ->
//! verified -> done`. The first failure halts the remaining queue; the
//! ledger keeps everything recorded before it. Verification runs in the
//! background and is collected at the end of the run, successful or not.

use std::sync::Arc;

use alloy_core::{dyn_abi::DynSolValue, primitives::Address};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::{
    artifact::{Artifact, ArtifactProvider},
    error::DeployError,
    events,
    ledger::{DeploymentLedger, VerificationRecord},
    resolver::{self, EventBinding, RoleAddressMap},
    signer::SignerContext,
    submitter::{DeploymentReceipt, TransactionSubmitter, encode},
    task::{
        DeploymentPlan, DeploymentTask, Resolution, TaskAction, TaskInputs, Verification,
        VerifyInputs,
    },
    verification::{
        HttpVerifier, VerificationOutcome, VerificationRequest, VerificationSubmitter, Verifier,
    },
};

/// Lifecycle stage of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TaskStage {
    Pending,
    Submitted,
    Confirmed,
    Resolved,
    Verified,
    Done,
}

/// The task that halted a run, the stage it was in and why.
#[derive(Debug, Error)]
#[error("task `{task}` failed at stage `{stage}`")]
pub struct TaskFailure {
    pub task: String,
    pub stage: TaskStage,
    #[source]
    pub error: DeployError,
}

impl TaskFailure {
    pub fn new(task: &DeploymentTask, stage: TaskStage, error: DeployError) -> Self {
        Self {
            task: task.name.clone(),
            stage,
            error,
        }
    }
}

fn failed_at(task: &DeploymentTask, stage: TaskStage) -> impl FnOnce(DeployError) -> TaskFailure + '_ {
    move |error| TaskFailure::new(task, stage, error)
}

/// A halted run with the ledger of everything completed before the failure.
#[derive(Debug, Error)]
#[error("deployment halted after recording {} role(s)", .ledger.len())]
pub struct RunFailure {
    #[source]
    pub failure: TaskFailure,
    pub ledger: DeploymentLedger,
}

/// Drives a plan through a [`TransactionSubmitter`], resolving addresses from
/// the announcement event described by an [`EventBinding`].
pub struct Orchestrator<S, A, V = HttpVerifier> {
    submitter: S,
    artifacts: A,
    binding: EventBinding,
    verifier: Option<Arc<VerificationSubmitter<V>>>,
}

impl<S, A> Orchestrator<S, A>
where
    S: TransactionSubmitter,
    A: ArtifactProvider,
{
    /// An orchestrator that does not verify.
    pub fn new(submitter: S, artifacts: A, binding: EventBinding) -> Self {
        Self {
            submitter,
            artifacts,
            binding,
            verifier: None,
        }
    }
}

impl<S, A, V> Orchestrator<S, A, V>
where
    S: TransactionSubmitter,
    A: ArtifactProvider,
    V: Verifier,
{
    pub fn with_verifier<W: Verifier>(self, verifier: VerificationSubmitter<W>) -> Orchestrator<S, A, W> {
        Orchestrator {
            submitter: self.submitter,
            artifacts: self.artifacts,
            binding: self.binding,
            verifier: Some(Arc::new(verifier)),
        }
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    pub fn artifacts(&self) -> &A {
        &self.artifacts
    }

    pub fn verifier(&self) -> Option<&VerificationSubmitter<V>> {
        self.verifier.as_deref()
    }

    /// Check the whole plan without touching the network.
    ///
    /// Every artifact must exist, every referenced role must be produced by an
    /// earlier task and every argument list must type-check. Addresses are
    /// replaced by the zero address.
    pub fn preflight(&self, plan: &DeploymentPlan, deployer: Address) -> Result<(), TaskFailure> {
        let mut roles = RoleAddressMap::new();

        for task in plan.tasks() {
            self.check_task(task, &roles, deployer)
                .map_err(failed_at(task, TaskStage::Pending))?;

            for role in task.published_roles() {
                roles
                    .insert(role, Address::ZERO)
                    .map_err(failed_at(task, TaskStage::Pending))?;
            }
        }

        Ok(())
    }

    /// Run `plan` into a fresh ledger.
    pub async fn run(
        &self,
        plan: &DeploymentPlan,
        signer: &SignerContext,
    ) -> Result<DeploymentLedger, RunFailure> {
        let mut ledger = DeploymentLedger::new();
        match self.run_into(plan, signer, &mut ledger).await {
            Ok(()) => Ok(ledger),
            Err(failure) => Err(RunFailure { failure, ledger }),
        }
    }

    /// Run `plan`, appending to a caller-owned ledger.
    ///
    /// The ledger stays with the caller if the returned future is dropped
    /// (e.g. on interrupt), so it can still be written out.
    pub async fn run_into(
        &self,
        plan: &DeploymentPlan,
        signer: &SignerContext,
        ledger: &mut DeploymentLedger,
    ) -> Result<(), TaskFailure> {
        self.preflight(plan, signer.address())?;

        tracing::info!(
            tasks = plan.len(),
            plan_hash = %plan.fingerprint(),
            deployer = %signer.address(),
            "Starting deployment"
        );

        let mut roles = RoleAddressMap::new();
        let mut verifications = PendingVerifications::default();
        let mut result = Ok(());

        for (sequence, task) in plan.tasks().iter().enumerate() {
            let step = Step {
                sequence,
                task,
                signer,
            };
            if let Err(failure) = self
                .execute(step, &mut roles, ledger, &mut verifications)
                .await
            {
                tracing::error!(
                    task = %failure.task,
                    stage = %failure.stage,
                    error = %failure.error,
                    "Task failed, halting deployment"
                );
                result = Err(failure);
                break;
            }
        }

        for record in verifications.collect().await {
            ledger.record_verification(record);
        }

        if result.is_ok() {
            tracing::info!(roles = ledger.len(), "Deployment complete");
        }
        result
    }

    fn check_task(
        &self,
        task: &DeploymentTask,
        roles: &RoleAddressMap,
        deployer: Address,
    ) -> Result<(), DeployError> {
        let artifact = self.artifacts.get_artifact(task.artifact())?;
        let args = task.build_args(&TaskInputs { roles, deployer })?;

        match &task.action {
            TaskAction::Create { .. } => {
                encode::deployment_data(&artifact, &args)?;
            }
            TaskAction::Call { target, method, .. } => {
                roles.address(target)?;
                if task.resolution == Resolution::ContractAddress {
                    return Err(DeployError::InvalidPlan(format!(
                        "call task `{}` must resolve its address from an event label",
                        task.name
                    )));
                }
                if matches!(task.verification, Verification::Constructor) {
                    return Err(DeployError::InvalidPlan(format!(
                        "call task `{}` has no constructor to verify, name the deployed artifact",
                        task.name
                    )));
                }
                encode::call_data(&artifact.abi, method, &args)?;
            }
        }

        if self.verifier.is_some() {
            if let Err(e) = self.check_verification(task, roles, deployer) {
                tracing::warn!(
                    task = %task.name,
                    error = %e,
                    "Verification request will not build, task will be recorded as unverified"
                );
            }
        }

        Ok(())
    }

    /// Verification problems are reported, never fatal.
    fn check_verification(
        &self,
        task: &DeploymentTask,
        roles: &RoleAddressMap,
        deployer: Address,
    ) -> Result<(), DeployError> {
        let Verification::Artifact { artifact, args } = &task.verification else {
            return Ok(());
        };

        let target = self.artifacts.get_artifact(artifact)?;
        let emitted: RoleAddressMap = task
            .emitted_labels()
            .map(|label| (label.to_string(), Address::ZERO))
            .collect();
        let values = args(&VerifyInputs {
            roles,
            emitted: &emitted,
            deployer,
        })?;
        encode::constructor_args(&target, &values)?;

        Ok(())
    }

    async fn execute(
        &self,
        step: Step<'_>,
        roles: &mut RoleAddressMap,
        ledger: &mut DeploymentLedger,
        verifications: &mut PendingVerifications,
    ) -> Result<(), TaskFailure> {
        let Step { task, signer, .. } = step;
        tracing::debug!(task = %task.name, stage = %TaskStage::Pending, "Preparing task");

        let artifact = self
            .artifacts
            .get_artifact(task.artifact())
            .map_err(failed_at(task, TaskStage::Pending))?;
        let args = task
            .build_args(&TaskInputs {
                roles,
                deployer: signer.address(),
            })
            .map_err(failed_at(task, TaskStage::Pending))?;

        tracing::debug!(task = %task.name, stage = %TaskStage::Submitted, "Submitting transaction");
        let receipt = match &task.action {
            TaskAction::Create { .. } => self.submitter.submit(&artifact, &args, signer).await,
            TaskAction::Call { target, method, .. } => {
                let contract = roles
                    .address(target)
                    .map_err(failed_at(task, TaskStage::Pending))?;
                self.submitter
                    .call(contract, &artifact.abi, method, &args, signer)
                    .await
            }
        }
        .map_err(failed_at(task, TaskStage::Submitted))?;

        if !receipt.is_success() {
            return Err(TaskFailure::new(
                task,
                TaskStage::Submitted,
                DeployError::TransactionReverted {
                    tx_hash: Some(receipt.tx_hash),
                    reason: None,
                },
            ));
        }

        tracing::debug!(
            task = %task.name,
            stage = %TaskStage::Confirmed,
            tx_hash = %receipt.tx_hash,
            block = receipt.block_number,
            "Transaction confirmed"
        );

        let (address, emitted) = self
            .resolve(task, &receipt)
            .map_err(failed_at(task, TaskStage::Confirmed))?;

        let mut published = vec![(task.role.clone(), address)];
        for companion in &task.companions {
            if let Some(role) = &companion.role {
                let companion_address = emitted
                    .address(&companion.label)
                    .map_err(failed_at(task, TaskStage::Confirmed))?;
                published.push((role.clone(), companion_address));
            }
        }
        for (role, address) in &published {
            roles
                .insert(role.clone(), *address)
                .map_err(failed_at(task, TaskStage::Resolved))?;
        }
        for (role, address) in published {
            ledger.record(role, address);
        }

        tracing::debug!(task = %task.name, stage = %TaskStage::Resolved, %address, "Address resolved");

        if let Some(verifier) = &self.verifier {
            self.schedule_verification(step, verifier, &artifact, &args, address, roles, &emitted, verifications);
            tracing::debug!(task = %task.name, stage = %TaskStage::Verified, "Verification scheduled");
        }

        tracing::info!(
            task = %task.name,
            role = %task.role,
            %address,
            tx_hash = %receipt.tx_hash,
            stage = %TaskStage::Done,
            "Task complete"
        );

        Ok(())
    }

    /// Primary address and every label resolved from the receipt.
    fn resolve(
        &self,
        task: &DeploymentTask,
        receipt: &DeploymentReceipt,
    ) -> Result<(Address, RoleAddressMap), DeployError> {
        let labels: Vec<&str> = task.emitted_labels().collect();

        let emitted = if labels.is_empty() {
            RoleAddressMap::new()
        } else {
            let events = events::decode(receipt, &self.binding.event)?;
            resolver::resolve_labels(&events, labels, &self.binding.selector)?
        };

        let address = match &task.resolution {
            Resolution::ContractAddress => {
                receipt
                    .contract_address
                    .ok_or_else(|| DeployError::RoleNotFound {
                        role: task.role.clone(),
                    })?
            }
            Resolution::Event { label } => emitted.address(label)?,
        };

        Ok((address, emitted))
    }

    #[allow(clippy::too_many_arguments)]
    fn schedule_verification(
        &self,
        step: Step<'_>,
        verifier: &Arc<VerificationSubmitter<V>>,
        artifact: &Artifact,
        args: &[DynSolValue],
        address: Address,
        roles: &RoleAddressMap,
        emitted: &RoleAddressMap,
        verifications: &mut PendingVerifications,
    ) {
        let Step {
            sequence,
            task,
            signer,
        } = step;

        let request = match &task.verification {
            Verification::Skip => return,
            Verification::Constructor => encode::constructor_args(artifact, args)
                .map(|encoded| VerificationRequest::new(address, artifact, encoded)),
            Verification::Artifact {
                artifact: name,
                args: builder,
            } => self.artifacts.get_artifact(name).and_then(|target| {
                let values = builder(&VerifyInputs {
                    roles,
                    emitted,
                    deployer: signer.address(),
                })?;
                let encoded = encode::constructor_args(&target, &values)?;
                Ok(VerificationRequest::new(address, &target, encoded))
            }),
        };

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(task = %task.name, error = %e, "Cannot build verification request");
                verifications.ready.push((
                    sequence,
                    VerificationRecord {
                        task: task.name.clone(),
                        contract: verification_target(task),
                        address,
                        outcome: VerificationOutcome::Failed(e.to_string()),
                    },
                ));
                return;
            }
        };

        let verifier = Arc::clone(verifier);
        let task_name = task.name.clone();
        verifications.running.spawn(async move {
            let outcome = verifier.verify(&request).await;
            (
                sequence,
                VerificationRecord {
                    task: task_name,
                    contract: request.contract_source_id,
                    address: request.address,
                    outcome,
                },
            )
        });
    }
}

#[derive(Clone, Copy)]
struct Step<'a> {
    sequence: usize,
    task: &'a DeploymentTask,
    signer: &'a SignerContext,
}

#[derive(Default)]
struct PendingVerifications {
    running: JoinSet<(usize, VerificationRecord)>,
    ready: Vec<(usize, VerificationRecord)>,
}

impl PendingVerifications {
    /// Wait for every background verification and return the records in task order.
    async fn collect(mut self) -> Vec<VerificationRecord> {
        if !self.running.is_empty() {
            tracing::info!(pending = self.running.len(), "Waiting for verifications to finish");
        }

        while let Some(joined) = self.running.join_next().await {
            match joined {
                Ok(record) => self.ready.push(record),
                Err(e) => tracing::warn!(error = %e, "Verification task did not complete"),
            }
        }

        self.ready.sort_by_key(|(sequence, _)| *sequence);
        self.ready.into_iter().map(|(_, record)| record).collect()
    }
}

fn verification_target(task: &DeploymentTask) -> String {
    match &task.verification {
        Verification::Artifact { artifact, .. } => artifact.clone(),
        _ => task.artifact().to_string(),
    }
}
