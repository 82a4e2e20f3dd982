//! The ordered record of what a run deployed.
//!
//! The primary output is a newline-delimited `ROLE=address` file consumed by
//! indexer and service configuration. A JSON snapshot with verification
//! outcomes and the plan fingerprint can be written next to it to support
//! manual re-wiring of a partial run.

use std::path::Path;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{task::DeploymentPlan, verification::VerificationOutcome};

/// One published role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub role: String,
    pub address: Address,
}

/// Outcome of the verification scheduled for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub task: String,
    /// Fully-qualified contract name submitted to the verifier.
    pub contract: String,
    pub address: Address,
    pub outcome: VerificationOutcome,
}

/// Append-only record of a run, in task completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentLedger {
    entries: Vec<LedgerEntry>,
    verifications: Vec<VerificationRecord>,
}

impl DeploymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, role: impl Into<String>, address: Address) {
        self.entries.push(LedgerEntry {
            role: role.into(),
            address,
        });
    }

    pub fn record_verification(&mut self, record: VerificationRecord) {
        self.verifications.push(record);
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn verifications(&self) -> &[VerificationRecord] {
        &self.verifications
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn address(&self, role: &str) -> Option<Address> {
        self.entries
            .iter()
            .find(|entry| entry.role == role)
            .map(|entry| entry.address)
    }

    /// `ROLE=0xChecksummed` lines in deployment order.
    pub fn render_env(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("{}={}\n", entry.role, entry.address.to_checksum(None)))
            .collect()
    }

    pub fn write_env(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render_env())
            .context(format!("Failed to write deployed addresses to {}", path.display()))?;

        tracing::info!(path = %path.display(), entries = self.len(), "Deployment ledger written");
        Ok(())
    }

    pub fn snapshot(&self, plan: &DeploymentPlan) -> LedgerSnapshot {
        LedgerSnapshot {
            plan_hash: plan.fingerprint(),
            created_at: chrono::Utc::now().timestamp(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            entries: self.entries.clone(),
            verifications: self.verifications.clone(),
        }
    }
}

impl From<LedgerSnapshot> for DeploymentLedger {
    fn from(snapshot: LedgerSnapshot) -> Self {
        Self {
            entries: snapshot.entries,
            verifications: snapshot.verifications,
        }
    }
}

/// Parse `ROLE=address` lines, skipping blank lines and `#` comments.
pub fn parse_env_lines(content: &str) -> Result<Vec<LedgerEntry>> {
    content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_number, line)| -> Result<LedgerEntry> {
            let (role, address) = line
                .split_once('=')
                .context(format!("Line {line_number}: expected ROLE=address"))?;
            let address = address
                .trim()
                .parse::<Address>()
                .context(format!("Line {line_number}: invalid address `{}`", address.trim()))?;
            Ok(LedgerEntry {
                role: role.trim().to_string(),
                address,
            })
        })
        .collect()
}

/// Machine-readable record of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Fingerprint of the plan that produced the entries.
    pub plan_hash: String,
    /// Unix timestamp of the snapshot.
    pub created_at: i64,
    pub tool_version: String,
    pub entries: Vec<LedgerEntry>,
    pub verifications: Vec<VerificationRecord>,
}

impl LedgerSnapshot {
    /// Save the snapshot as pretty-printed JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize ledger snapshot")?;

        std::fs::write(path, json)
            .context(format!("Failed to write ledger snapshot to {}", path.display()))?;

        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Ledger snapshot does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read ledger snapshot from {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse ledger snapshot JSON")
    }
}
