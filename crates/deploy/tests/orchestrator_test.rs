//! Orchestrator behaviour against an in-process chain and verifier.
//!
//! Covers ordering, dependency checks, halting on revert, event resolution
//! and background verification.

mod common;

use alloy_core::{dyn_abi::DynSolValue, primitives::Address};
use anyhow::Result;
use common::{
    FakeChain, FakeVerifier, deployer, fast_retry, init_test_tracing, lens_artifacts, lens_chain,
    orchestrator, signer,
};
use lens_deploy::{
    DeployError, DeploymentPlan, DeploymentTask, TaskStage, VerificationOutcome,
    VerificationRequest, VerificationSubmitter, lens,
    lens::{
        args::{DeployPrimitiveArgs, LensFactoryArgs},
        labels, roles,
    },
};

fn feed_call() -> DeploymentTask {
    DeploymentTask::call(
        "deployFeed",
        roles::LENS_FACTORY,
        "LensFactory",
        "deployFeed",
        roles::GLOBAL_FEED,
    )
    .resolve_event(labels::FEED)
    .args(|inputs| {
        Ok(DeployPrimitiveArgs {
            metadata_uri: "ipfs://feed".to_string(),
            owner: inputs.deployer,
        })
    })
}

#[tokio::test]
async fn test_tasks_run_in_declaration_order() -> Result<()> {
    init_test_tracing();

    let plan = DeploymentPlan::new()
        .then(DeploymentTask::create("UsernameFactory", roles::USERNAME_FACTORY))
        .then(DeploymentTask::create("GraphFactory", roles::GRAPH_FACTORY))
        .then(DeploymentTask::create("FeedFactory", roles::FEED_FACTORY));

    let orchestrator = orchestrator(FakeChain::new(), lens_artifacts(), &FakeVerifier::default());
    let ledger = orchestrator.run(&plan, &signer()).await?;

    let recorded: Vec<(&str, Address)> = ledger
        .entries()
        .iter()
        .map(|entry| (entry.role.as_str(), entry.address))
        .collect();
    assert_eq!(
        recorded,
        [
            (roles::USERNAME_FACTORY, Address::with_last_byte(0x10)),
            (roles::GRAPH_FACTORY, Address::with_last_byte(0x11)),
            (roles::FEED_FACTORY, Address::with_last_byte(0x12)),
        ]
    );

    let broadcast: Vec<String> = orchestrator
        .submitter()
        .broadcasts()
        .into_iter()
        .map(|broadcast| broadcast.name)
        .collect();
    assert_eq!(broadcast, ["UsernameFactory", "GraphFactory", "FeedFactory"]);

    Ok(())
}

#[tokio::test]
async fn test_dependency_declared_too_late_fails_before_broadcast() -> Result<()> {
    init_test_tracing();

    let mut plan = DeploymentPlan::new().then(
        DeploymentTask::create("LensFactory", roles::LENS_FACTORY)
            .args(|inputs| LensFactoryArgs::from_roles(inputs.roles)),
    );
    plan.extend(
        lens::factories_plan()
            .tasks()
            .iter()
            .filter(|task| task.role != roles::LENS_FACTORY)
            .cloned(),
    );

    let orchestrator = orchestrator(FakeChain::new(), lens_artifacts(), &FakeVerifier::default());
    let failure = orchestrator.run(&plan, &signer()).await.unwrap_err();

    assert_eq!(failure.failure.task, "LensFactory");
    assert_eq!(failure.failure.stage, TaskStage::Pending);
    assert!(matches!(
        &failure.failure.error,
        DeployError::UnresolvedDependency { role } if role == roles::ACCOUNT_FACTORY
    ));
    assert!(failure.ledger.is_empty());
    assert!(orchestrator.submitter().broadcasts().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_dependencies_receive_earlier_addresses() -> Result<()> {
    init_test_tracing();

    let orchestrator = orchestrator(FakeChain::new(), lens_artifacts(), &FakeVerifier::default());
    let ledger = orchestrator.run(&lens::factories_plan(), &signer()).await?;
    assert_eq!(ledger.len(), 8);

    let chain = orchestrator.submitter();
    let lens_factory = chain
        .broadcasts()
        .into_iter()
        .find(|broadcast| broadcast.name == "LensFactory")
        .unwrap();

    let expected: Vec<DynSolValue> = [
        "AccountFactory",
        "AppFactory",
        "GroupFactory",
        "FeedFactory",
        "GraphFactory",
        "UsernameFactory",
    ]
    .into_iter()
    .map(|name| DynSolValue::Address(chain.created(name).unwrap()))
    .collect();
    assert_eq!(lens_factory.args, expected);
    assert_eq!(
        ledger.address(roles::LENS_FACTORY),
        chain.created("LensFactory")
    );

    Ok(())
}

#[tokio::test]
async fn test_revert_halts_and_keeps_completed_entries() -> Result<()> {
    init_test_tracing();

    let chain = FakeChain::new().revert_on("GroupFactory");
    let orchestrator = orchestrator(chain, lens_artifacts(), &FakeVerifier::default());
    let failure = orchestrator
        .run(&lens::factories_plan(), &signer())
        .await
        .unwrap_err();

    assert_eq!(failure.failure.task, "GroupFactory");
    assert_eq!(failure.failure.stage, TaskStage::Submitted);
    assert!(matches!(
        &failure.failure.error,
        DeployError::TransactionReverted { tx_hash: Some(_), reason: Some(reason) }
            if reason.contains("NotAllowed")
    ));

    let roles_recorded: Vec<&str> = failure
        .ledger
        .entries()
        .iter()
        .map(|entry| entry.role.as_str())
        .collect();
    assert_eq!(roles_recorded, [roles::ACCOUNT_FACTORY, roles::APP_FACTORY]);

    // Nothing after the failing task was attempted.
    assert_eq!(orchestrator.submitter().broadcasts().len(), 3);
    // Verifications scheduled before the halt still complete.
    assert_eq!(failure.ledger.verifications().len(), 2);
    assert!(
        failure
            .ledger
            .verifications()
            .iter()
            .all(|record| record.outcome == VerificationOutcome::Verified)
    );

    Ok(())
}

#[tokio::test]
async fn test_reverted_receipt_halts_at_submitted() -> Result<()> {
    init_test_tracing();

    let chain = FakeChain::new().reverted_receipt_on("GroupFactory");
    let orchestrator = orchestrator(chain, lens_artifacts(), &FakeVerifier::default());
    let failure = orchestrator
        .run(&lens::factories_plan(), &signer())
        .await
        .unwrap_err();

    assert_eq!(failure.failure.task, "GroupFactory");
    assert_eq!(failure.failure.stage, TaskStage::Submitted);
    assert!(matches!(
        &failure.failure.error,
        DeployError::TransactionReverted { tx_hash: Some(_), reason: None }
    ));

    let roles_recorded: Vec<&str> = failure
        .ledger
        .entries()
        .iter()
        .map(|entry| entry.role.as_str())
        .collect();
    assert_eq!(roles_recorded, [roles::ACCOUNT_FACTORY, roles::APP_FACTORY]);
    assert_eq!(orchestrator.submitter().broadcasts().len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_unrelated_logs_are_ignored() -> Result<()> {
    init_test_tracing();

    let chain = FakeChain::new()
        .emit("deployFeed", &[labels::ACCESS_CONTROL, labels::FEED])
        .with_unrelated_logs();
    let plan = lens::factories_plan().then(feed_call());

    let orchestrator = orchestrator(chain, lens_artifacts(), &FakeVerifier::default());
    let ledger = orchestrator.run(&plan, &signer()).await?;

    let feed = orchestrator.submitter().emitted(labels::FEED);
    assert_eq!(feed.len(), 1);
    assert_eq!(ledger.address(roles::GLOBAL_FEED), Some(feed[0]));
    assert_ne!(ledger.address(roles::GLOBAL_FEED), ledger.address(roles::LENS_FACTORY));

    Ok(())
}

#[tokio::test]
async fn test_companions_are_published_when_asked() -> Result<()> {
    init_test_tracing();

    let chain = lens_chain();
    let plan = lens::factories_plan().then(
        feed_call()
            .publish_companion(labels::ACCESS_CONTROL, "GLOBAL_FEED_ACCESS_CONTROL")
            .skip_verification(),
    );

    let orchestrator = orchestrator(chain, lens_artifacts(), &FakeVerifier::default());
    let ledger = orchestrator.run(&plan, &signer()).await?;

    let chain = orchestrator.submitter();
    let tail: Vec<(&str, Address)> = ledger.entries()[8..]
        .iter()
        .map(|entry| (entry.role.as_str(), entry.address))
        .collect();
    assert_eq!(
        tail,
        [
            (roles::GLOBAL_FEED, chain.emitted(labels::FEED)[0]),
            (
                "GLOBAL_FEED_ACCESS_CONTROL",
                chain.emitted(labels::ACCESS_CONTROL)[0]
            ),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn test_missing_label_is_role_not_found() -> Result<()> {
    init_test_tracing();

    let chain = FakeChain::new().emit("deployFeed", &[labels::ACCESS_CONTROL]);
    let plan = lens::factories_plan().then(feed_call());

    let orchestrator = orchestrator(chain, lens_artifacts(), &FakeVerifier::default());
    let failure = orchestrator.run(&plan, &signer()).await.unwrap_err();

    assert_eq!(failure.failure.task, "deployFeed");
    assert_eq!(failure.failure.stage, TaskStage::Confirmed);
    assert!(matches!(
        &failure.failure.error,
        DeployError::RoleNotFound { role } if role == labels::FEED
    ));
    assert_eq!(failure.ledger.len(), 8);
    assert!(failure.ledger.address(roles::GLOBAL_FEED).is_none());

    Ok(())
}

#[tokio::test]
async fn test_missing_artifact_fails_preflight() -> Result<()> {
    init_test_tracing();

    let plan = DeploymentPlan::new()
        .then(DeploymentTask::create("AccountFactory", roles::ACCOUNT_FACTORY))
        .then(DeploymentTask::create("PaymasterFactory", "PAYMASTER_FACTORY"));

    let orchestrator = orchestrator(FakeChain::new(), lens_artifacts(), &FakeVerifier::default());
    let failure = orchestrator.preflight(&plan, deployer()).unwrap_err();

    assert_eq!(failure.task, "PaymasterFactory");
    assert!(matches!(
        &failure.error,
        DeployError::ArtifactNotFound { name, .. } if name == "PaymasterFactory"
    ));

    let failure = orchestrator.run(&plan, &signer()).await.unwrap_err();
    assert!(failure.ledger.is_empty());
    assert!(orchestrator.submitter().broadcasts().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_mistyped_arguments_fail_preflight() -> Result<()> {
    init_test_tracing();

    let plan = DeploymentPlan::new().then(
        DeploymentTask::create("OwnerAdminOnlyAccessControl", roles::OWNER_ADMIN_ONLY_ACCESS_CONTROL)
            .args(|_| Ok(vec![DynSolValue::String("not an address".to_string())])),
    );

    let orchestrator = orchestrator(FakeChain::new(), lens_artifacts(), &FakeVerifier::default());
    let failure = orchestrator.run(&plan, &signer()).await.unwrap_err();

    match &failure.failure.error {
        DeployError::Encoding { target, reason } => {
            assert_eq!(target, "OwnerAdminOnlyAccessControl constructor");
            assert!(reason.contains("address"), "unexpected reason: {reason}");
        }
        other => panic!("expected an encoding error, got {other:?}"),
    }
    assert!(orchestrator.submitter().broadcasts().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_plan_shape_errors_fail_preflight() -> Result<()> {
    init_test_tracing();

    let orchestrator = orchestrator(FakeChain::new(), lens_artifacts(), &FakeVerifier::default());

    let unresolvable_call = lens::factories_plan().then(DeploymentTask::call(
        "deployFeed",
        roles::LENS_FACTORY,
        "LensFactory",
        "deployFeed",
        roles::GLOBAL_FEED,
    ));
    let failure = orchestrator
        .preflight(&unresolvable_call, deployer())
        .unwrap_err();
    assert!(matches!(failure.error, DeployError::InvalidPlan(_)));

    let duplicate = DeploymentPlan::new()
        .then(DeploymentTask::create("FeedFactory", roles::FEED_FACTORY))
        .then(DeploymentTask::create("FeedFactory", roles::FEED_FACTORY).named("FeedFactoryAgain"));
    let failure = orchestrator.preflight(&duplicate, deployer()).unwrap_err();
    assert_eq!(failure.task, "FeedFactoryAgain");
    assert!(matches!(
        &failure.error,
        DeployError::DuplicateRole { role } if role == roles::FEED_FACTORY
    ));

    let unknown_method = lens::factories_plan().then(
        DeploymentTask::call(
            "deployFeedV2",
            roles::LENS_FACTORY,
            "LensFactory",
            "deployFeedV2",
            roles::GLOBAL_FEED,
        )
        .resolve_event(labels::FEED),
    );
    let failure = orchestrator
        .preflight(&unknown_method, deployer())
        .unwrap_err();
    assert!(matches!(failure.error, DeployError::InvalidPlan(_)));

    assert!(orchestrator.submitter().broadcasts().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_verification_failure_does_not_halt() -> Result<()> {
    init_test_tracing();

    let verifier = FakeVerifier::default().rejecting("GraphFactory");
    let orchestrator = orchestrator(FakeChain::new(), lens_artifacts(), &verifier);
    let ledger = orchestrator.run(&lens::factories_plan(), &signer()).await?;

    assert_eq!(ledger.len(), 8);
    let records = ledger.verifications();
    assert_eq!(records.len(), 8);

    let tasks: Vec<&str> = records.iter().map(|record| record.task.as_str()).collect();
    assert_eq!(
        tasks,
        [
            "AccountFactory",
            "AppFactory",
            "GroupFactory",
            "FeedFactory",
            "GraphFactory",
            "UsernameFactory",
            "LensFactory",
            "AccessControlFactory",
        ]
    );

    for record in records {
        if record.task == "GraphFactory" {
            assert!(matches!(&record.outcome, VerificationOutcome::Failed(reason) if reason.contains("bytecode mismatch")));
        } else {
            assert_eq!(record.outcome, VerificationOutcome::Verified, "{}", record.task);
        }
    }
    assert_eq!(
        records[4].contract,
        "contracts/GraphFactory.sol:GraphFactory"
    );

    Ok(())
}

#[tokio::test]
async fn test_transient_verification_errors_are_retried() -> Result<()> {
    init_test_tracing();

    let verifier = FakeVerifier::default().failing_transiently(2);
    let plan = DeploymentPlan::new().then(DeploymentTask::create("FeedFactory", roles::FEED_FACTORY));

    let orchestrator = orchestrator(FakeChain::new(), lens_artifacts(), &verifier);
    let ledger = orchestrator.run(&plan, &signer()).await?;

    assert_eq!(ledger.verifications()[0].outcome, VerificationOutcome::Verified);
    assert_eq!(verifier.requests().len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_verification_is_idempotent_per_address() -> Result<()> {
    init_test_tracing();

    let verifier = FakeVerifier::default();
    let submitter = VerificationSubmitter::new(verifier.clone(), fast_retry());
    let artifact = common::artifact("FeedFactory", &[]);
    let request = VerificationRequest::new(Address::with_last_byte(0x42), &artifact, Default::default());

    assert_eq!(submitter.verify(&request).await, VerificationOutcome::Verified);
    assert_eq!(
        submitter.verify(&request).await,
        VerificationOutcome::AlreadyVerified
    );
    assert_eq!(verifier.requests().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_run_without_verifier_records_no_outcomes() -> Result<()> {
    init_test_tracing();

    let orchestrator = lens_deploy::Orchestrator::new(FakeChain::new(), lens_artifacts(), lens::binding());
    let ledger = orchestrator.run(&lens::factories_plan(), &signer()).await?;

    assert_eq!(ledger.len(), 8);
    assert!(ledger.verifications().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_missing_verification_artifact_without_verifier() -> Result<()> {
    init_test_tracing();

    let plan = DeploymentPlan::new().then(
        DeploymentTask::create("FeedFactory", roles::FEED_FACTORY)
            .verify_as("NotCompiled", |_| Ok(())),
    );

    let orchestrator = lens_deploy::Orchestrator::new(FakeChain::new(), lens_artifacts(), lens::binding());
    let ledger = orchestrator.run(&plan, &signer()).await?;

    assert_eq!(ledger.address(roles::FEED_FACTORY), Some(Address::with_last_byte(0x10)));
    assert!(ledger.verifications().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_missing_verification_artifact_is_recorded_as_failed() -> Result<()> {
    init_test_tracing();

    let plan = DeploymentPlan::new()
        .then(
            DeploymentTask::create("FeedFactory", roles::FEED_FACTORY)
                .verify_as("NotCompiled", |_| Ok(())),
        )
        .then(DeploymentTask::create("GraphFactory", roles::GRAPH_FACTORY));

    let verifier = FakeVerifier::default();
    let orchestrator = orchestrator(FakeChain::new(), lens_artifacts(), &verifier);
    let ledger = orchestrator.run(&plan, &signer()).await?;

    assert_eq!(ledger.len(), 2);
    let records = ledger.verifications();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].task, "FeedFactory");
    assert_eq!(records[0].contract, "NotCompiled");
    assert!(matches!(&records[0].outcome, VerificationOutcome::Failed(reason) if reason.contains("NotCompiled")));
    assert_eq!(records[1].outcome, VerificationOutcome::Verified);
    assert_eq!(verifier.requests().len(), 1);

    Ok(())
}
