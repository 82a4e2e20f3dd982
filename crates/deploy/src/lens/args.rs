//! Typed constructor and factory-call arguments of the Lens contracts.

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes, U256},
};

use crate::{error::DeployError, resolver::RoleAddressMap, task::SolArgs};

use super::roles;

fn address(address: Address) -> DynSolValue {
    DynSolValue::Address(address)
}

fn string(value: &str) -> DynSolValue {
    DynSolValue::String(value.to_string())
}

fn addresses(addresses: &[Address]) -> DynSolValue {
    DynSolValue::Array(addresses.iter().copied().map(DynSolValue::Address).collect())
}

/// Stands in for the rule, admin and extra-data arrays, which the deployment
/// always leaves empty.
fn empty_array() -> DynSolValue {
    DynSolValue::Array(Vec::new())
}

/// `LensFactory` constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LensFactoryArgs {
    pub account_factory: Address,
    pub app_factory: Address,
    pub group_factory: Address,
    pub feed_factory: Address,
    pub graph_factory: Address,
    pub username_factory: Address,
}

impl LensFactoryArgs {
    pub fn from_roles(roles: &RoleAddressMap) -> Result<Self, DeployError> {
        Ok(Self {
            account_factory: roles.address(roles::ACCOUNT_FACTORY)?,
            app_factory: roles.address(roles::APP_FACTORY)?,
            group_factory: roles.address(roles::GROUP_FACTORY)?,
            feed_factory: roles.address(roles::FEED_FACTORY)?,
            graph_factory: roles.address(roles::GRAPH_FACTORY)?,
            username_factory: roles.address(roles::USERNAME_FACTORY)?,
        })
    }
}

impl SolArgs for LensFactoryArgs {
    fn into_values(self) -> Vec<DynSolValue> {
        vec![
            address(self.account_factory),
            address(self.app_factory),
            address(self.group_factory),
            address(self.feed_factory),
            address(self.graph_factory),
            address(self.username_factory),
        ]
    }
}

/// `SourceStamp` struct: `(address source, uint256 nonce, uint256 deadline, bytes signature)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceStamp {
    pub source: Address,
    pub nonce: U256,
    pub deadline: U256,
    pub signature: Bytes,
}

impl SourceStamp {
    /// A stamp with no source, accepted when source stamps are not enforced.
    pub fn empty() -> Self {
        Self::default()
    }

    fn into_value(self) -> DynSolValue {
        DynSolValue::Tuple(vec![
            address(self.source),
            DynSolValue::Uint(self.nonce, 256),
            DynSolValue::Uint(self.deadline, 256),
            DynSolValue::Bytes(self.signature.to_vec()),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountManagerPermissions {
    pub can_execute_transactions: bool,
    pub can_transfer_tokens: bool,
    pub can_transfer_native: bool,
    pub can_set_metadata_uri: bool,
}

impl AccountManagerPermissions {
    fn into_value(self) -> DynSolValue {
        DynSolValue::Tuple(vec![
            DynSolValue::Bool(self.can_execute_transactions),
            DynSolValue::Bool(self.can_transfer_tokens),
            DynSolValue::Bool(self.can_transfer_native),
            DynSolValue::Bool(self.can_set_metadata_uri),
        ])
    }
}

fn permissions(permissions: Vec<AccountManagerPermissions>) -> DynSolValue {
    DynSolValue::Array(
        permissions
            .into_iter()
            .map(AccountManagerPermissions::into_value)
            .collect(),
    )
}

/// `LensFactory.deployAccount(metadataURI, owner, accountManagers, permissions, sourceStamp)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployAccountArgs {
    pub metadata_uri: String,
    pub owner: Address,
    pub account_managers: Vec<Address>,
    pub account_manager_permissions: Vec<AccountManagerPermissions>,
    pub source_stamp: SourceStamp,
}

impl SolArgs for DeployAccountArgs {
    fn into_values(self) -> Vec<DynSolValue> {
        vec![
            string(&self.metadata_uri),
            address(self.owner),
            addresses(&self.account_managers),
            permissions(self.account_manager_permissions),
            self.source_stamp.into_value(),
        ]
    }
}

/// `Account` constructor; same fields as the factory call, owner first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountArgs {
    pub owner: Address,
    pub metadata_uri: String,
    pub account_managers: Vec<Address>,
    pub account_manager_permissions: Vec<AccountManagerPermissions>,
    pub source_stamp: SourceStamp,
}

impl From<DeployAccountArgs> for AccountArgs {
    fn from(args: DeployAccountArgs) -> Self {
        Self {
            owner: args.owner,
            metadata_uri: args.metadata_uri,
            account_managers: args.account_managers,
            account_manager_permissions: args.account_manager_permissions,
            source_stamp: args.source_stamp,
        }
    }
}

impl SolArgs for AccountArgs {
    fn into_values(self) -> Vec<DynSolValue> {
        vec![
            address(self.owner),
            string(&self.metadata_uri),
            addresses(&self.account_managers),
            permissions(self.account_manager_permissions),
            self.source_stamp.into_value(),
        ]
    }
}

/// `LensFactory.deployFeed` / `deployGroup` / `deployGraph`:
/// `(metadataURI, owner, admins, rules, extraData)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPrimitiveArgs {
    pub metadata_uri: String,
    pub owner: Address,
}

impl SolArgs for DeployPrimitiveArgs {
    fn into_values(self) -> Vec<DynSolValue> {
        vec![
            string(&self.metadata_uri),
            address(self.owner),
            empty_array(),
            empty_array(),
            empty_array(),
        ]
    }
}

/// `Feed`, `Group`, `Graph` and `App` constructors: `(metadataURI, accessControl)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveArgs {
    pub metadata_uri: String,
    pub access_control: Address,
}

impl SolArgs for PrimitiveArgs {
    fn into_values(self) -> Vec<DynSolValue> {
        vec![string(&self.metadata_uri), address(self.access_control)]
    }
}

/// `LensFactory.deployUsername(namespace, metadataURI, owner, admins, rules, extraData, nftName, nftSymbol)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployUsernameArgs {
    pub namespace: String,
    pub metadata_uri: String,
    pub owner: Address,
    pub nft_name: String,
    pub nft_symbol: String,
}

impl SolArgs for DeployUsernameArgs {
    fn into_values(self) -> Vec<DynSolValue> {
        vec![
            string(&self.namespace),
            string(&self.metadata_uri),
            address(self.owner),
            empty_array(),
            empty_array(),
            empty_array(),
            string(&self.nft_name),
            string(&self.nft_symbol),
        ]
    }
}

/// `Username` constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameArgs {
    pub namespace: String,
    pub metadata_uri: String,
    pub access_control: Address,
    pub nft_name: String,
    pub nft_symbol: String,
    pub token_uri_provider: Address,
}

impl SolArgs for UsernameArgs {
    fn into_values(self) -> Vec<DynSolValue> {
        vec![
            string(&self.namespace),
            string(&self.metadata_uri),
            address(self.access_control),
            string(&self.nft_name),
            string(&self.nft_symbol),
            address(self.token_uri_provider),
        ]
    }
}

/// `AppInitialProperties` struct.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppInitialProperties {
    pub graph: Address,
    pub feeds: Vec<Address>,
    pub username: Address,
    pub groups: Vec<Address>,
    pub default_feed: Address,
    pub signers: Vec<Address>,
    pub paymaster: Address,
    pub treasury: Address,
}

impl AppInitialProperties {
    /// Wire the app to the global primitives deployed earlier in the run.
    pub fn from_roles(roles: &RoleAddressMap) -> Result<Self, DeployError> {
        let feed = roles.address(roles::GLOBAL_FEED)?;
        Ok(Self {
            graph: roles.address(roles::GLOBAL_GRAPH)?,
            feeds: vec![feed],
            username: roles.address(roles::LENS_USERNAME)?,
            groups: vec![roles.address(roles::GLOBAL_GROUP)?],
            default_feed: feed,
            signers: Vec::new(),
            paymaster: Address::ZERO,
            treasury: Address::ZERO,
        })
    }

    fn into_value(self) -> DynSolValue {
        DynSolValue::Tuple(vec![
            address(self.graph),
            addresses(&self.feeds),
            address(self.username),
            addresses(&self.groups),
            address(self.default_feed),
            addresses(&self.signers),
            address(self.paymaster),
            address(self.treasury),
        ])
    }
}

/// `LensFactory.deployApp(metadataURI, sourceStampVerificationEnabled, owner, admins, initialProperties, extraData)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployAppArgs {
    pub metadata_uri: String,
    pub source_stamp_verification: bool,
    pub owner: Address,
    pub initial_properties: AppInitialProperties,
}

impl SolArgs for DeployAppArgs {
    fn into_values(self) -> Vec<DynSolValue> {
        vec![
            string(&self.metadata_uri),
            DynSolValue::Bool(self.source_stamp_verification),
            address(self.owner),
            empty_array(),
            self.initial_properties.into_value(),
            empty_array(),
        ]
    }
}

/// `AccessControlFactory.deployOwnerAdminOnlyAccessControl(owner)` and the
/// `OwnerAdminOnlyAccessControl` constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerAdminArgs {
    pub owner: Address,
}

impl SolArgs for OwnerAdminArgs {
    fn into_values(self) -> Vec<DynSolValue> {
        vec![address(self.owner)]
    }
}
