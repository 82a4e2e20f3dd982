use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::verification::RetryPolicy;

/// The default name for the deployer configuration file.
pub const CONFIG_FILENAME: &str = "LensDeploy.toml";

/// Default JSON-RPC endpoint (Lens Sepolia testnet).
pub const DEFAULT_RPC_URL: &str = "https://sepolia.rpc.lens.dev";

/// Default verification endpoint (Lens Sepolia block explorer).
pub const DEFAULT_VERIFIER_URL: &str =
    "https://api-explorer-verify.staging.lens.zksync.dev/contract_verification";

/// Top-level configuration of a deployment run.
///
/// Serialized to/from TOML. Every field has a default so a partial file (or
/// none at all) is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployerConfig {
    /// JSON-RPC endpoint the signer is bound to.
    pub rpc_url: Url,
    /// Hardhat or forge build output directory.
    pub artifacts_dir: PathBuf,
    /// Where the `ROLE=address` ledger is written.
    pub output: PathBuf,
    /// Where the JSON ledger snapshot is written.
    pub ledger_snapshot: PathBuf,

    pub submitter: SubmitterConfig,
    pub verifier: VerifierConfig,
    pub lens: LensPlanConfig,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_url(DEFAULT_RPC_URL),
            artifacts_dir: PathBuf::from("artifacts-zk"),
            output: PathBuf::from("deployed-addresses.env"),
            ledger_snapshot: PathBuf::from("deployment.json"),
            submitter: SubmitterConfig::default(),
            verifier: VerifierConfig::default(),
            lens: LensPlanConfig::default(),
        }
    }
}

impl DeployerConfig {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deployer config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from `LensDeploy.toml`
    /// inside a directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config from {}", config_path.display()))?;
        let config: Self =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }
}

/// Transaction submission settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitterConfig {
    /// Blocks (including the inclusion block) to wait for.
    pub confirmations: u64,
    /// Maximum wait for a receipt with enough confirmations.
    pub receipt_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Applied to `eth_estimateGas`.
    pub gas_multiplier_percent: u64,
    pub request_timeout_secs: u64,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            confirmations: 1,
            receipt_timeout_secs: 120,
            poll_interval_ms: 1000,
            gas_multiplier_percent: 120,
            request_timeout_secs: 30,
        }
    }
}

/// Verification endpoint and retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub enabled: bool,
    pub url: Url,
    /// Total submission attempts for transient failures.
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Status polls after a request is queued before reporting `pending`.
    pub status_poll_attempts: u32,
    pub status_poll_interval_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_url(DEFAULT_VERIFIER_URL),
            max_attempts: 5,
            min_delay_ms: 500,
            max_delay_ms: 8000,
            status_poll_attempts: 10,
            status_poll_interval_ms: 3000,
            request_timeout_secs: 30,
        }
    }
}

impl VerifierConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.min_delay_ms)),
        }
    }
}

/// Parameters of the Lens primitives deployed by the full plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensPlanConfig {
    pub metadata_uri: String,
    pub username_namespace: String,
    pub username_nft_name: String,
    pub username_nft_symbol: String,
    /// Deploy the global account, feed, group, graph, username and app.
    pub deploy_primitives: bool,
    /// Deploy an owner-admin-only access control for the deployer.
    pub deploy_access_control: bool,
}

impl Default for LensPlanConfig {
    fn default() -> Self {
        Self {
            metadata_uri: "https://ipfs.io/ipfs/QmZ".to_string(),
            username_namespace: "lens".to_string(),
            username_nft_name: "nftName".to_string(),
            username_nft_symbol: "nftSymbol".to_string(),
            deploy_primitives: true,
            deploy_access_control: true,
        }
    }
}

fn default_url(url: &'static str) -> Url {
    Url::parse(url).expect("built-in URLs should always parse")
}
