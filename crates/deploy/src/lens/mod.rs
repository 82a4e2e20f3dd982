//! The Lens protocol deployment: factories first, then the global primitives
//! created through `LensFactory`, then a standalone access control.
//!
//! Every Lens contract announces itself with
//! `Lens_Contract_Deployed(string indexed, string indexed, string contractType, string flavour)`.
//! The `contractType` field is the role label, the emitter is the contract.

use alloy_core::json_abi::{Event, EventParam};

use crate::{
    config::LensPlanConfig,
    resolver::{EventBinding, RoleSelector},
    task::{DeploymentPlan, DeploymentTask},
};

pub mod args;

use args::{
    AccountArgs, AppInitialProperties, DeployAccountArgs, DeployAppArgs, DeployPrimitiveArgs,
    DeployUsernameArgs, LensFactoryArgs, OwnerAdminArgs, PrimitiveArgs, SourceStamp, UsernameArgs,
};

/// Ledger role names.
pub mod roles {
    pub const ACCOUNT_FACTORY: &str = "ACCOUNT_FACTORY";
    pub const APP_FACTORY: &str = "APP_FACTORY";
    pub const GROUP_FACTORY: &str = "GROUP_FACTORY";
    pub const FEED_FACTORY: &str = "FEED_FACTORY";
    pub const GRAPH_FACTORY: &str = "GRAPH_FACTORY";
    pub const USERNAME_FACTORY: &str = "USERNAME_FACTORY";
    pub const LENS_FACTORY: &str = "LENS_FACTORY";
    pub const ACCESS_CONTROL_FACTORY: &str = "ACCESS_CONTROL_FACTORY";

    pub const ACCOUNT: &str = "ACCOUNT";
    pub const GLOBAL_FEED: &str = "GLOBAL_FEED";
    pub const GLOBAL_GROUP: &str = "GLOBAL_GROUP";
    pub const GLOBAL_GRAPH: &str = "GLOBAL_GRAPH";
    pub const LENS_USERNAME: &str = "LENS_USERNAME";
    pub const LENS_APP: &str = "LENS_APP";
    pub const OWNER_ADMIN_ONLY_ACCESS_CONTROL: &str = "OWNER_ADMIN_ONLY_ACCESS_CONTROL";
}

/// `contractType` values emitted by the Lens contracts.
pub mod labels {
    pub const ACCOUNT: &str = "account";
    pub const FEED: &str = "feed";
    pub const GROUP: &str = "group";
    pub const GRAPH: &str = "graph";
    pub const USERNAME: &str = "username";
    pub const APP: &str = "app";
    pub const ACCESS_CONTROL: &str = "access-control";
    pub const USERNAME_TOKEN_URI_PROVIDER: &str = "username-token-uri-provider";
}

pub const DEPLOYED_EVENT: &str = "Lens_Contract_Deployed";

/// The announcement event every Lens contract emits on construction.
pub fn deployed_event() -> Event {
    let string_param = |name: &str, indexed: bool| EventParam {
        ty: "string".to_string(),
        name: name.to_string(),
        indexed,
        components: Vec::new(),
        internal_type: None,
    };

    Event {
        name: DEPLOYED_EVENT.to_string(),
        inputs: vec![
            string_param("indexedContractType", true),
            string_param("indexedFlavour", true),
            string_param("contractType", false),
            string_param("flavour", false),
        ],
        anonymous: false,
    }
}

pub fn role_selector() -> RoleSelector {
    RoleSelector::emitter("contractType")
}

pub fn binding() -> EventBinding {
    EventBinding {
        event: deployed_event(),
        selector: role_selector(),
    }
}

/// The eight factories, `LensFactory` wired to the first six.
pub fn factories_plan() -> DeploymentPlan {
    DeploymentPlan::new()
        .then(DeploymentTask::create("AccountFactory", roles::ACCOUNT_FACTORY))
        .then(DeploymentTask::create("AppFactory", roles::APP_FACTORY))
        .then(DeploymentTask::create("GroupFactory", roles::GROUP_FACTORY))
        .then(DeploymentTask::create("FeedFactory", roles::FEED_FACTORY))
        .then(DeploymentTask::create("GraphFactory", roles::GRAPH_FACTORY))
        .then(DeploymentTask::create("UsernameFactory", roles::USERNAME_FACTORY))
        .then(
            DeploymentTask::create("LensFactory", roles::LENS_FACTORY)
                .args(|inputs| LensFactoryArgs::from_roles(inputs.roles)),
        )
        .then(DeploymentTask::create(
            "AccessControlFactory",
            roles::ACCESS_CONTROL_FACTORY,
        ))
}

/// Factories followed by the optional primitives and access control.
pub fn full_plan(config: &LensPlanConfig) -> DeploymentPlan {
    let mut plan = factories_plan();
    if config.deploy_primitives {
        plan.extend(primitive_tasks(config));
    }
    if config.deploy_access_control {
        plan.push(owner_admin_access_control_task());
    }
    plan
}

fn primitive_tasks(config: &LensPlanConfig) -> Vec<DeploymentTask> {
    vec![
        account_task(config),
        primitive_task(config, "deployFeed", labels::FEED, roles::GLOBAL_FEED, "Feed"),
        primitive_task(config, "deployGroup", labels::GROUP, roles::GLOBAL_GROUP, "Group"),
        primitive_task(config, "deployGraph", labels::GRAPH, roles::GLOBAL_GRAPH, "Graph"),
        username_task(config),
        app_task(config),
    ]
}

fn lens_factory_call(method: &str, label: &str, role: &str) -> DeploymentTask {
    DeploymentTask::call(method, roles::LENS_FACTORY, "LensFactory", method, role).resolve_event(label)
}

fn account_task(config: &LensPlanConfig) -> DeploymentTask {
    let metadata_uri = config.metadata_uri.clone();
    let deploy_args = move |owner| DeployAccountArgs {
        metadata_uri: metadata_uri.clone(),
        owner,
        account_managers: Vec::new(),
        account_manager_permissions: Vec::new(),
        source_stamp: SourceStamp::empty(),
    };
    let verify_args = deploy_args.clone();

    lens_factory_call("deployAccount", labels::ACCOUNT, roles::ACCOUNT)
        .args(move |inputs| Ok(deploy_args(inputs.deployer)))
        .verify_as("Account", move |inputs| {
            Ok(AccountArgs::from(verify_args(inputs.deployer)))
        })
}

/// Feed, group and graph share the factory call shape and constructor.
fn primitive_task(
    config: &LensPlanConfig,
    method: &str,
    label: &str,
    role: &str,
    artifact: &str,
) -> DeploymentTask {
    let metadata_uri = config.metadata_uri.clone();
    let verify_uri = config.metadata_uri.clone();

    lens_factory_call(method, label, role)
        .companion(labels::ACCESS_CONTROL)
        .args(move |inputs| {
            Ok(DeployPrimitiveArgs {
                metadata_uri: metadata_uri.clone(),
                owner: inputs.deployer,
            })
        })
        .verify_as(artifact, move |inputs| {
            Ok(PrimitiveArgs {
                metadata_uri: verify_uri.clone(),
                access_control: inputs.emitted.address(labels::ACCESS_CONTROL)?,
            })
        })
}

fn username_task(config: &LensPlanConfig) -> DeploymentTask {
    let deploy = config.clone();
    let verify = config.clone();

    lens_factory_call("deployUsername", labels::USERNAME, roles::LENS_USERNAME)
        .companion(labels::ACCESS_CONTROL)
        .companion(labels::USERNAME_TOKEN_URI_PROVIDER)
        .args(move |inputs| {
            Ok(DeployUsernameArgs {
                namespace: deploy.username_namespace.clone(),
                metadata_uri: deploy.metadata_uri.clone(),
                owner: inputs.deployer,
                nft_name: deploy.username_nft_name.clone(),
                nft_symbol: deploy.username_nft_symbol.clone(),
            })
        })
        .verify_as("Username", move |inputs| {
            Ok(UsernameArgs {
                namespace: verify.username_namespace.clone(),
                metadata_uri: verify.metadata_uri.clone(),
                access_control: inputs.emitted.address(labels::ACCESS_CONTROL)?,
                nft_name: verify.username_nft_name.clone(),
                nft_symbol: verify.username_nft_symbol.clone(),
                token_uri_provider: inputs.emitted.address(labels::USERNAME_TOKEN_URI_PROVIDER)?,
            })
        })
}

fn app_task(config: &LensPlanConfig) -> DeploymentTask {
    let metadata_uri = config.metadata_uri.clone();
    let verify_uri = config.metadata_uri.clone();

    lens_factory_call("deployApp", labels::APP, roles::LENS_APP)
        .companion(labels::ACCESS_CONTROL)
        .args(move |inputs| {
            Ok(DeployAppArgs {
                metadata_uri: metadata_uri.clone(),
                source_stamp_verification: false,
                owner: inputs.deployer,
                initial_properties: AppInitialProperties::from_roles(inputs.roles)?,
            })
        })
        .verify_as("App", move |inputs| {
            Ok(PrimitiveArgs {
                metadata_uri: verify_uri.clone(),
                access_control: inputs.emitted.address(labels::ACCESS_CONTROL)?,
            })
        })
}

fn owner_admin_access_control_task() -> DeploymentTask {
    DeploymentTask::call(
        "deployOwnerAdminOnlyAccessControl",
        roles::ACCESS_CONTROL_FACTORY,
        "AccessControlFactory",
        "deployOwnerAdminOnlyAccessControl",
        roles::OWNER_ADMIN_ONLY_ACCESS_CONTROL,
    )
    .resolve_event(labels::ACCESS_CONTROL)
    .args(|inputs| {
        Ok(OwnerAdminArgs {
            owner: inputs.deployer,
        })
    })
    .verify_as("OwnerAdminOnlyAccessControl", |inputs| {
        Ok(OwnerAdminArgs {
            owner: inputs.deployer,
        })
    })
}
