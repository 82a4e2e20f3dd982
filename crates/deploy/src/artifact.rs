//! Compiled contract artifacts and the providers that look them up.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{B256, Bytes, keccak256},
};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::error::DeployError;

/// Compiled metadata of one contract: ABI, creation bytecode and source identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl Artifact {
    pub fn new(
        contract_name: impl Into<String>,
        source_name: impl Into<String>,
        abi: JsonAbi,
        bytecode: Bytes,
    ) -> Self {
        Self {
            contract_name: contract_name.into(),
            source_name: source_name.into(),
            abi,
            bytecode,
        }
    }

    /// Fully-qualified name, `contracts/Foo.sol:Foo`.
    pub fn source_id(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    pub fn bytecode_digest(&self) -> B256 {
        keccak256(&self.bytecode)
    }
}

/// Looks up compiled artifacts by contract name.
///
/// Implementations accept either a bare contract name (`Feed`) or a
/// fully-qualified one (`contracts/primitives/feed/Feed.sol:Feed`).
pub trait ArtifactProvider: Send + Sync {
    fn get_artifact(&self, name: &str) -> Result<Arc<Artifact>, DeployError>;
}

impl<P: ArtifactProvider + ?Sized> ArtifactProvider for Arc<P> {
    fn get_artifact(&self, name: &str) -> Result<Arc<Artifact>, DeployError> {
        (**self).get_artifact(name)
    }
}

/// In-memory artifact provider.
#[derive(Debug, Clone, Default)]
pub struct StaticArtifacts {
    by_name: HashMap<String, Arc<Artifact>>,
}

impl StaticArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact under both its bare and fully-qualified names.
    pub fn insert(&mut self, artifact: Artifact) {
        let artifact = Arc::new(artifact);
        self.by_name
            .insert(artifact.source_id(), Arc::clone(&artifact));
        self.by_name
            .insert(artifact.contract_name.clone(), artifact);
    }

    pub fn with(mut self, artifact: Artifact) -> Self {
        self.insert(artifact);
        self
    }
}

impl ArtifactProvider for StaticArtifacts {
    fn get_artifact(&self, name: &str) -> Result<Arc<Artifact>, DeployError> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| DeployError::ArtifactNotFound {
                name: name.to_string(),
                reason: "not registered".to_string(),
            })
    }
}

/// Artifact store backed by a hardhat (`artifacts/`, `artifacts-zk/`) or forge
/// (`out/`) build directory.
///
/// The directory is indexed once on open; later lookups never touch the disk.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    by_source_id: HashMap<String, Arc<Artifact>>,
    by_name: HashMap<String, Vec<Arc<Artifact>>>,
    /// Artifacts that were found but cannot be deployed, by name and source id.
    unusable: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    contract_name: Option<String>,
    source_name: Option<String>,
    abi: JsonAbi,
    bytecode: RawBytecode,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

impl RawBytecode {
    fn as_str(&self) -> &str {
        match self {
            Self::Hex(hex) | Self::Object { object: hex } => hex,
        }
    }
}

impl ArtifactStore {
    /// Walk `root` recursively and index every artifact JSON file.
    ///
    /// Files that are not artifacts (build-info, debug files, caches) are skipped.
    /// Artifacts whose bytecode cannot be parsed, such as unlinked libraries,
    /// are skipped with a warning and reported on lookup.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            anyhow::bail!("Artifacts directory does not exist: {}", root.display());
        }

        let mut store = Self {
            root: root.clone(),
            by_source_id: HashMap::new(),
            by_name: HashMap::new(),
            unusable: HashMap::new(),
        };

        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir)
                .context(format!("Failed to read artifacts directory {}", dir.display()))?;

            for entry in entries {
                let path = entry
                    .context(format!("Failed to read entry in {}", dir.display()))?
                    .path();

                if path.is_dir() {
                    pending.push(path);
                } else if is_artifact_file(&path) {
                    store.index_file(&path)?;
                }
            }
        }

        tracing::debug!(
            root = %store.root.display(),
            artifacts = store.by_source_id.len(),
            "Indexed contract artifacts"
        );

        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.by_source_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source_id.is_empty()
    }

    fn index_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read artifact file {}", path.display()))?;

        let raw: RawArtifact = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::trace!(path = %path.display(), error = %e, "Skipping non-artifact JSON file");
                return Ok(());
            }
        };

        let Some((source_name, contract_name)) = artifact_identity(path, &raw) else {
            tracing::trace!(path = %path.display(), "Skipping artifact without a contract name");
            return Ok(());
        };

        let bytecode: Bytes = match raw.bytecode.as_str().parse() {
            Ok(bytecode) => bytecode,
            Err(e) => {
                let reason = if raw.bytecode.as_str().contains("__") {
                    "bytecode has unlinked library placeholders".to_string()
                } else {
                    format!("invalid bytecode: {e}")
                };
                tracing::warn!(
                    contract = %contract_name,
                    path = %path.display(),
                    %reason,
                    "Skipping undeployable artifact"
                );
                self.unusable
                    .insert(format!("{source_name}:{contract_name}"), reason.clone());
                self.unusable.insert(contract_name, reason);
                return Ok(());
            }
        };

        let artifact = Arc::new(Artifact::new(contract_name, source_name, raw.abi, bytecode));
        let source_id = artifact.source_id();

        if self.by_source_id.contains_key(&source_id) {
            tracing::warn!(%source_id, path = %path.display(), "Duplicate artifact, keeping the first one");
            return Ok(());
        }

        self.by_name
            .entry(artifact.contract_name.clone())
            .or_default()
            .push(Arc::clone(&artifact));
        self.by_source_id.insert(source_id, artifact);

        Ok(())
    }
}

impl ArtifactProvider for ArtifactStore {
    fn get_artifact(&self, name: &str) -> Result<Arc<Artifact>, DeployError> {
        if name.contains(':') {
            return self
                .by_source_id
                .get(name)
                .cloned()
                .ok_or_else(|| self.not_found(name));
        }

        match self.by_name.get(name).map(Vec::as_slice) {
            Some([artifact]) => Ok(Arc::clone(artifact)),
            Some(candidates) if candidates.len() > 1 => {
                let ids: Vec<String> = candidates.iter().map(|a| a.source_id()).collect();
                Err(DeployError::ArtifactNotFound {
                    name: name.to_string(),
                    reason: format!("ambiguous name, use one of: {}", ids.join(", ")),
                })
            }
            _ => Err(self.not_found(name)),
        }
    }
}

impl ArtifactStore {
    fn not_found(&self, name: &str) -> DeployError {
        let reason = self
            .unusable
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("no artifact in {}", self.root.display()));
        DeployError::ArtifactNotFound {
            name: name.to_string(),
            reason,
        }
    }
}

fn is_artifact_file(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    file_name.ends_with(".json") && !file_name.ends_with(".dbg.json")
}

/// Hardhat artifacts name themselves; forge ones only carry the source path in
/// the compilation target of their metadata.
fn artifact_identity(path: &Path, raw: &RawArtifact) -> Option<(String, String)> {
    if let (Some(source), Some(contract)) = (&raw.source_name, &raw.contract_name) {
        return Some((source.clone(), contract.clone()));
    }

    let stem = path.file_stem()?.to_str()?.to_string();
    let target = raw
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.pointer("/settings/compilationTarget"))
        .and_then(Value::as_object)
        .and_then(|targets| targets.iter().next());

    match target {
        Some((source, contract)) => Some((source.clone(), contract.as_str()?.to_string())),
        None => {
            let parent = path.parent()?.file_name()?.to_str()?.to_string();
            Some((parent, raw.contract_name.clone().unwrap_or(stem)))
        }
    }
}
