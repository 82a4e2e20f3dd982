use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "lens-deployer")]
#[command(
    author,
    version,
    about = "Deploy, wire and verify the Lens protocol contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "LENS_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a LensDeploy.toml file, or a directory containing one.
    ///
    /// Values from the file are overridden by `LENS_DEPLOY_*` environment
    /// variables (`__` separates nested keys), which are overridden by flags.
    #[arg(long, alias = "conf", global = true, env = "LENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON-RPC endpoint to deploy to.
    #[arg(long, alias = "rpc", global = true)]
    pub rpc_url: Option<Url>,

    /// Hardhat or forge artifacts directory.
    #[arg(long, global = true)]
    pub artifacts: Option<PathBuf>,

    /// Node-unlocked account to send from when `WALLET_PRIVATE_KEY` is not set.
    #[arg(long, global = true)]
    pub from: Option<Address>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The subcommand to run, `deploy` when none is given.
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Deploy(DeployArgs::default()))
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Deploy the Lens contracts and write the deployed addresses (default).
    Deploy(DeployArgs),
    /// Verify a single already-deployed contract.
    Verify(VerifyArgs),
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Debug, Clone, Default, Args)]
pub struct DeployArgs {
    /// Where to write the `ROLE=address` file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip contract verification.
    #[arg(long)]
    pub no_verify: bool,

    /// Only deploy the factories.
    #[arg(long)]
    pub factories_only: bool,

    /// Verification API endpoint.
    #[arg(long)]
    pub verifier_url: Option<Url>,
}

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    /// Address of the deployed contract.
    pub address: Address,

    /// Artifact name, bare (`Feed`) or fully-qualified (`contracts/Feed.sol:Feed`).
    pub contract: String,

    /// Constructor argument, in declaration order. Repeat for each argument.
    #[arg(long = "arg", value_name = "VALUE")]
    pub args: Vec<String>,

    /// Verification API endpoint.
    #[arg(long)]
    pub verifier_url: Option<Url>,
}
