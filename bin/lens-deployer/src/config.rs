//! Layered configuration: defaults, then the TOML file, then `LENS_DEPLOY_*`
//! environment variables, then command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use lens_deploy::{CONFIG_FILENAME, DeployerConfig, SignerContext};
use serde::Serialize;
use url::Url;

use crate::cli::{Cli, Command};

pub const ENV_PREFIX: &str = "LENS_DEPLOY_";
pub const PRIVATE_KEY_VAR: &str = "WALLET_PRIVATE_KEY";

/// Values set explicitly on the command line. Unset flags are omitted so
/// they do not shadow lower layers.
#[derive(Debug, Default, Serialize)]
struct FlagOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    rpc_url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifacts_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    verifier: VerifierOverrides,
    lens: LensOverrides,
}

#[derive(Debug, Default, Serialize)]
struct VerifierOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<Url>,
}

#[derive(Debug, Default, Serialize)]
struct LensOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    deploy_primitives: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deploy_access_control: Option<bool>,
}

impl FlagOverrides {
    fn from_cli(cli: &Cli) -> Self {
        let mut overrides = Self {
            rpc_url: cli.rpc_url.clone(),
            artifacts_dir: cli.artifacts.clone(),
            ..Self::default()
        };

        match cli.command() {
            Command::Deploy(args) => {
                overrides.output = args.output;
                overrides.verifier.url = args.verifier_url;
                if args.no_verify {
                    overrides.verifier.enabled = Some(false);
                }
                if args.factories_only {
                    overrides.lens.deploy_primitives = Some(false);
                    overrides.lens.deploy_access_control = Some(false);
                }
            }
            Command::Verify(args) => {
                overrides.verifier.url = args.verifier_url;
            }
            Command::Config => {}
        }

        overrides
    }
}

/// Resolve the TOML file a `--config` path points to.
fn config_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        anyhow::bail!(
            "Configuration file or directory not found: {}",
            path.display()
        );
    }

    Ok(if path.is_dir() {
        path.join(CONFIG_FILENAME)
    } else {
        path.to_path_buf()
    })
}

pub fn load(cli: &Cli) -> Result<DeployerConfig> {
    let mut figment = Figment::from(Serialized::defaults(DeployerConfig::default()));

    if let Some(path) = &cli.config {
        let path = config_file(path)?;
        tracing::debug!(path = %path.display(), "Loading configuration file");
        figment = figment.merge(Toml::file(path));
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .merge(Serialized::defaults(FlagOverrides::from_cli(cli)))
        .extract()
        .context("Invalid configuration")
}

/// Local key from the environment, else the node-unlocked `--from` account.
pub fn signer(cli: &Cli, rpc_url: Url) -> Result<SignerContext> {
    match std::env::var(PRIVATE_KEY_VAR) {
        Ok(key) if !key.trim().is_empty() => {
            let signer = SignerContext::from_private_key(key.trim(), rpc_url)?;
            tracing::info!(address = %signer.address(), "Signing locally");
            Ok(signer)
        }
        _ => {
            let address = cli.from.context(format!(
                "Set {PRIVATE_KEY_VAR} or pass --from with an account unlocked on the node"
            ))?;
            tracing::info!(%address, "Sending through the node's unlocked account");
            Ok(SignerContext::unlocked(address, rpc_url))
        }
    }
}
