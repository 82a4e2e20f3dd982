//! Declarative deployment tasks and ordered plans.
//!
//! A plan says what to deploy and in which order; the [`crate::Orchestrator`]
//! decides how each step executes. A task's argument builder only sees the
//! roles produced by tasks declared before it.

use std::{fmt, sync::Arc};

use alloy_core::{dyn_abi::DynSolValue, primitives::Address};
use sha2::{Digest, Sha256};

use crate::{error::DeployError, resolver::RoleAddressMap};

/// Typed constructor or call arguments.
///
/// Each contract gets its own argument struct with named fields; it is
/// flattened into ABI values only when the task runs.
pub trait SolArgs {
    fn into_values(self) -> Vec<DynSolValue>;
}

impl SolArgs for () {
    fn into_values(self) -> Vec<DynSolValue> {
        Vec::new()
    }
}

impl SolArgs for Vec<DynSolValue> {
    fn into_values(self) -> Vec<DynSolValue> {
        self
    }
}

/// What an argument builder can see.
#[derive(Debug, Clone, Copy)]
pub struct TaskInputs<'a> {
    /// Roles produced by earlier tasks.
    pub roles: &'a RoleAddressMap,
    /// The account sending every transaction.
    pub deployer: Address,
}

/// What a verification argument builder can see.
#[derive(Debug, Clone, Copy)]
pub struct VerifyInputs<'a> {
    pub roles: &'a RoleAddressMap,
    /// Labels resolved from this task's own receipt (primary and companions).
    pub emitted: &'a RoleAddressMap,
    pub deployer: Address,
}

pub type ArgsBuilder =
    Arc<dyn Fn(&TaskInputs<'_>) -> Result<Vec<DynSolValue>, DeployError> + Send + Sync>;

pub type VerifyArgsBuilder =
    Arc<dyn Fn(&VerifyInputs<'_>) -> Result<Vec<DynSolValue>, DeployError> + Send + Sync>;

fn args_builder<F>(builder: F) -> ArgsBuilder
where
    F: Fn(&TaskInputs<'_>) -> Result<Vec<DynSolValue>, DeployError> + Send + Sync + 'static,
{
    Arc::new(builder)
}

fn verify_args_builder<F>(builder: F) -> VerifyArgsBuilder
where
    F: Fn(&VerifyInputs<'_>) -> Result<Vec<DynSolValue>, DeployError> + Send + Sync + 'static,
{
    Arc::new(builder)
}

/// The transaction a task sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    /// Deploy `artifact` directly.
    Create { artifact: String },
    /// Call `method` on the contract bound to `target`, using the ABI of `artifact`.
    Call {
        target: String,
        artifact: String,
        method: String,
    },
}

/// How the task's primary address is found in its receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The receipt's `contractAddress`.
    ContractAddress,
    /// The first announcement event carrying `label`.
    Event { label: String },
}

/// Another contract created by the same transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Companion {
    pub label: String,
    /// Ledger role to publish it under, if any.
    pub role: Option<String>,
}

/// How the deployed contract is verified.
#[derive(Clone)]
pub enum Verification {
    Skip,
    /// Verify the created artifact with the arguments it was deployed with.
    Constructor,
    /// Verify a different artifact, e.g. the primitive a factory call deployed.
    Artifact {
        artifact: String,
        args: VerifyArgsBuilder,
    },
}

impl fmt::Debug for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("Skip"),
            Self::Constructor => f.write_str("Constructor"),
            Self::Artifact { artifact, .. } => {
                f.debug_struct("Artifact").field("artifact", artifact).finish()
            }
        }
    }
}

/// One step of a deployment plan.
#[derive(Clone)]
pub struct DeploymentTask {
    pub name: String,
    pub action: TaskAction,
    /// Ledger role the primary address is published under.
    pub role: String,
    pub resolution: Resolution,
    pub companions: Vec<Companion>,
    pub verification: Verification,
    args: Option<ArgsBuilder>,
}

impl DeploymentTask {
    /// Deploy `artifact` and publish its address as `role`.
    pub fn create(artifact: impl Into<String>, role: impl Into<String>) -> Self {
        let artifact = artifact.into();
        Self {
            name: artifact.clone(),
            action: TaskAction::Create { artifact },
            role: role.into(),
            resolution: Resolution::ContractAddress,
            companions: Vec::new(),
            verification: Verification::Constructor,
            args: None,
        }
    }

    /// Call `method` on the contract published as `target`.
    ///
    /// Calls must name the event label their address is announced under with
    /// [`DeploymentTask::resolve_event`].
    pub fn call(
        name: impl Into<String>,
        target: impl Into<String>,
        artifact: impl Into<String>,
        method: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            action: TaskAction::Call {
                target: target.into(),
                artifact: artifact.into(),
                method: method.into(),
            },
            role: role.into(),
            resolution: Resolution::ContractAddress,
            companions: Vec::new(),
            verification: Verification::Skip,
            args: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Build the task's arguments from earlier results.
    pub fn args<F, T>(mut self, builder: F) -> Self
    where
        F: Fn(&TaskInputs<'_>) -> Result<T, DeployError> + Send + Sync + 'static,
        T: SolArgs,
    {
        self.args = Some(args_builder(move |inputs| {
            builder(inputs).map(SolArgs::into_values)
        }));
        self
    }

    pub fn resolve_event(mut self, label: impl Into<String>) -> Self {
        self.resolution = Resolution::Event {
            label: label.into(),
        };
        self
    }

    /// Also resolve `label` from the receipt, without publishing it.
    pub fn companion(mut self, label: impl Into<String>) -> Self {
        self.companions.push(Companion {
            label: label.into(),
            role: None,
        });
        self
    }

    /// Resolve `label` from the receipt and publish it as `role`.
    pub fn publish_companion(mut self, label: impl Into<String>, role: impl Into<String>) -> Self {
        self.companions.push(Companion {
            label: label.into(),
            role: Some(role.into()),
        });
        self
    }

    pub fn verify_as<F, T>(mut self, artifact: impl Into<String>, builder: F) -> Self
    where
        F: Fn(&VerifyInputs<'_>) -> Result<T, DeployError> + Send + Sync + 'static,
        T: SolArgs,
    {
        self.verification = Verification::Artifact {
            artifact: artifact.into(),
            args: verify_args_builder(move |inputs| builder(inputs).map(SolArgs::into_values)),
        };
        self
    }

    pub fn skip_verification(mut self) -> Self {
        self.verification = Verification::Skip;
        self
    }

    /// The artifact whose ABI encodes this task's transaction.
    pub fn artifact(&self) -> &str {
        match &self.action {
            TaskAction::Create { artifact } | TaskAction::Call { artifact, .. } => artifact,
        }
    }

    /// Evaluate the argument builder; tasks without one take no arguments.
    pub fn build_args(&self, inputs: &TaskInputs<'_>) -> Result<Vec<DynSolValue>, DeployError> {
        match &self.args {
            Some(builder) => builder(inputs),
            None => Ok(Vec::new()),
        }
    }

    /// Every label resolved from this task's receipt.
    pub fn emitted_labels(&self) -> impl Iterator<Item = &str> {
        let primary = match &self.resolution {
            Resolution::Event { label } => Some(label.as_str()),
            Resolution::ContractAddress => None,
        };
        primary
            .into_iter()
            .chain(self.companions.iter().map(|companion| companion.label.as_str()))
    }

    /// Every ledger role this task publishes.
    pub fn published_roles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.role.as_str()).chain(
            self.companions
                .iter()
                .filter_map(|companion| companion.role.as_deref()),
        )
    }
}

impl fmt::Debug for DeploymentTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentTask")
            .field("name", &self.name)
            .field("action", &self.action)
            .field("role", &self.role)
            .field("resolution", &self.resolution)
            .field("companions", &self.companions)
            .field("verification", &self.verification)
            .field("has_args", &self.args.is_some())
            .finish()
    }
}

/// An ordered list of tasks, executed strictly in declaration order.
#[derive(Debug, Clone, Default)]
pub struct DeploymentPlan {
    tasks: Vec<DeploymentTask>,
}

impl DeploymentPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, task: DeploymentTask) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn push(&mut self, task: DeploymentTask) {
        self.tasks.push(task);
    }

    pub fn tasks(&self) -> &[DeploymentTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// SHA-256 over the ordered `(task, role, artifact)` triples.
    ///
    /// Two runs of plans with the same fingerprint targeted the same contracts
    /// in the same order, which is what matters when re-wiring a partial run.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for task in &self.tasks {
            for part in [task.name.as_str(), task.role.as_str(), task.artifact()] {
                hasher.update(part.as_bytes());
                hasher.update([0u8]);
            }
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

impl Extend<DeploymentTask> for DeploymentPlan {
    fn extend<I: IntoIterator<Item = DeploymentTask>>(&mut self, iter: I) {
        self.tasks.extend(iter);
    }
}

impl FromIterator<DeploymentTask> for DeploymentPlan {
    fn from_iter<I: IntoIterator<Item = DeploymentTask>>(iter: I) -> Self {
        Self {
            tasks: iter.into_iter().collect(),
        }
    }
}
