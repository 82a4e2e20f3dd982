//! lens-deployer deploys the Lens protocol contracts in dependency order,
//! verifies them and writes the deployed addresses for downstream services.

mod cli;
mod config;
mod summary;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command, VerifyArgs};
use lens_deploy::{
    ArtifactProvider, ArtifactStore, DeployerConfig, DeploymentLedger, DeploymentPlan,
    HttpVerifier, Orchestrator, RpcSubmitter, SignerContext, TransactionSubmitter,
    VerificationOutcome, VerificationRequest, VerificationSubmitter, Verifier, lens,
    submitter::encode,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = config::load(&cli)?;

    match cli.command() {
        Command::Deploy(_) => {
            let signer = config::signer(&cli, config.rpc_url.clone())?;
            deploy(&config, &signer).await
        }
        Command::Verify(args) => verify(&config, args).await,
        Command::Config => {
            let content = toml::to_string_pretty(&config)
                .context("Failed to serialize configuration to TOML")?;
            print!("{content}");
            Ok(())
        }
    }
}

async fn deploy(config: &DeployerConfig, signer: &SignerContext) -> Result<()> {
    let artifacts = ArtifactStore::open(&config.artifacts_dir)?;
    tracing::info!(
        path = %config.artifacts_dir.display(),
        artifacts = artifacts.len(),
        "Artifacts indexed"
    );

    let plan = lens::full_plan(&config.lens);
    let orchestrator = Orchestrator::new(
        RpcSubmitter::new(config.submitter.clone())?,
        artifacts,
        lens::binding(),
    );

    if config.verifier.enabled {
        let verifier = VerificationSubmitter::new(
            HttpVerifier::new(&config.verifier)?,
            config.verifier.retry_policy(),
        );
        run_plan(&orchestrator.with_verifier(verifier), &plan, signer, config).await
    } else {
        tracing::info!("Verification disabled");
        run_plan(&orchestrator, &plan, signer, config).await
    }
}

/// Run the plan until it finishes, fails or is interrupted. The ledger is
/// written in every case.
async fn run_plan<S, A, V>(
    orchestrator: &Orchestrator<S, A, V>,
    plan: &DeploymentPlan,
    signer: &SignerContext,
    config: &DeployerConfig,
) -> Result<()>
where
    S: TransactionSubmitter,
    A: ArtifactProvider,
    V: Verifier,
{
    let mut ledger = DeploymentLedger::new();

    let result = tokio::select! {
        result = orchestrator.run_into(plan, signer, &mut ledger) => result.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Received Ctrl+C, stopping deployment...");
            Err(anyhow::anyhow!("Deployment interrupted"))
        }
    };

    ledger.write_env(&config.output)?;
    ledger.snapshot(plan).save_to_file(&config.ledger_snapshot)?;

    if !ledger.is_empty() {
        println!("{}", summary::ledger_table(&ledger));
    }

    result
}

async fn verify(config: &DeployerConfig, args: VerifyArgs) -> Result<()> {
    let artifacts = ArtifactStore::open(&config.artifacts_dir)?;
    let artifact = artifacts.get_artifact(&args.contract)?;

    let values = encode::coerce_constructor_args(&artifact, &args.args)?;
    let constructor_args = encode::constructor_args(&artifact, &values)?;
    let request = VerificationRequest::new(args.address, &artifact, constructor_args);

    let verifier = VerificationSubmitter::new(
        HttpVerifier::new(&config.verifier)?,
        config.verifier.retry_policy(),
    );
    let outcome = verifier.verify(&request).await;
    println!("{}", summary::verification_table(&request, &outcome));

    if let VerificationOutcome::Failed(reason) = outcome {
        anyhow::bail!(
            "Verification of {} at {} failed: {reason}",
            request.contract_source_id,
            request.address
        );
    }

    Ok(())
}
