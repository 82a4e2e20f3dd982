//! Mapping decoded events to role labels and addresses.

use std::collections::HashMap;

use alloy_core::{
    dyn_abi::DynSolValue,
    json_abi::Event,
    primitives::{Address, keccak256},
};
use derive_more::Deref;

use crate::{error::DeployError, events::DecodedEvent};

/// Where the resolved address comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSource {
    /// The contract that emitted the log.
    Emitter,
    /// An `address` parameter of the event.
    Field(String),
}

/// How to read a role label and its address out of a decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSelector {
    /// Event parameter carrying the role label. Either a plain `string` or an
    /// indexed `string` (compared by hash).
    pub role_field: String,
    pub address: AddressSource,
}

impl RoleSelector {
    pub fn emitter(role_field: impl Into<String>) -> Self {
        Self {
            role_field: role_field.into(),
            address: AddressSource::Emitter,
        }
    }

    fn matches(&self, event: &DecodedEvent, role: &str) -> bool {
        match event.field(&self.role_field) {
            Some(DynSolValue::String(label)) => label == role,
            Some(DynSolValue::FixedBytes(hash, 32)) => *hash == keccak256(role),
            _ => false,
        }
    }

    fn address_of(&self, event: &DecodedEvent) -> Result<Address, DeployError> {
        match &self.address {
            AddressSource::Emitter => Ok(event.emitter),
            AddressSource::Field(name) => match event.field(name) {
                Some(DynSolValue::Address(address)) => Ok(*address),
                _ => Err(DeployError::MalformedEvent {
                    event: event.name.clone(),
                    emitter: event.emitter,
                    log_index: event.log_index,
                    reason: format!("no address parameter `{name}`"),
                }),
            },
        }
    }
}

/// The event that announces deployed contracts, and how to read it.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBinding {
    pub event: Event,
    pub selector: RoleSelector,
}

/// Address bound to `role`: the first matching event in log order wins.
pub fn resolve(
    events: &[DecodedEvent],
    role: &str,
    selector: &RoleSelector,
) -> Result<Address, DeployError> {
    let event = events
        .iter()
        .find(|event| selector.matches(event, role))
        .ok_or_else(|| DeployError::RoleNotFound {
            role: role.to_string(),
        })?;

    selector.address_of(event)
}

/// Resolve several labels from the same receipt, failing on the first missing one.
pub fn resolve_labels<'a>(
    events: &[DecodedEvent],
    labels: impl IntoIterator<Item = &'a str>,
    selector: &RoleSelector,
) -> Result<RoleAddressMap, DeployError> {
    let mut resolved = RoleAddressMap::default();
    for label in labels {
        let address = resolve(events, label, selector)?;
        resolved.insert(label, address)?;
    }
    Ok(resolved)
}

/// Role label to address, unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct RoleAddressMap(HashMap<String, Address>);

impl RoleAddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a role produced earlier in the run.
    pub fn address(&self, role: &str) -> Result<Address, DeployError> {
        self.0
            .get(role)
            .copied()
            .ok_or_else(|| DeployError::UnresolvedDependency {
                role: role.to_string(),
            })
    }

    /// Bind `role`; binding the same role twice is an error.
    pub fn insert(&mut self, role: impl Into<String>, address: Address) -> Result<(), DeployError> {
        let role = role.into();
        if self.0.contains_key(&role) {
            return Err(DeployError::DuplicateRole { role });
        }
        self.0.insert(role, address);
        Ok(())
    }
}

impl FromIterator<(String, Address)> for RoleAddressMap {
    fn from_iter<I: IntoIterator<Item = (String, Address)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
