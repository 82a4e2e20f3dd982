//! Signing account bound to an RPC endpoint.

use std::{fmt, str::FromStr};

use alloy_core::primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use url::Url;

use crate::error::DeployError;

/// The account every transaction of a run is sent from.
///
/// Passed explicitly to each submitter call. With a local key, transactions are
/// signed in-process; otherwise the node is expected to hold `address` unlocked.
#[derive(Clone)]
pub struct SignerContext {
    address: Address,
    rpc_url: Url,
    key: Option<PrivateKeySigner>,
}

impl SignerContext {
    /// An account unlocked on the node (anvil, hardhat node, era-test-node).
    pub fn unlocked(address: Address, rpc_url: Url) -> Self {
        Self {
            address,
            rpc_url,
            key: None,
        }
    }

    pub fn local(key: PrivateKeySigner, rpc_url: Url) -> Self {
        Self {
            address: key.address(),
            rpc_url,
            key: Some(key),
        }
    }

    /// Parse a hex private key (with or without `0x`).
    pub fn from_private_key(private_key: &str, rpc_url: Url) -> Result<Self, DeployError> {
        let key = PrivateKeySigner::from_str(private_key.trim())
            .map_err(|e| DeployError::Signing(format!("invalid private key: {e}")))?;
        Ok(Self::local(key, rpc_url))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }

    pub fn key(&self) -> Option<&PrivateKeySigner> {
        self.key.as_ref()
    }

    pub fn is_local(&self) -> bool {
        self.key.is_some()
    }
}

impl fmt::Debug for SignerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerContext")
            .field("address", &self.address)
            .field("rpc_url", &self.rpc_url.as_str())
            .field("local_key", &self.key.is_some())
            .finish()
    }
}
