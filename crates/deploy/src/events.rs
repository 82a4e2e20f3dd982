//! Tolerant decoding of receipt logs against one known event.
//!
//! A deployment transaction usually emits events from several contracts
//! (factories, proxies, access control). Logs whose first topic is not the
//! expected event's selector are skipped. A log that carries the selector but
//! does not decode is an ABI mismatch and fails with
//! [`DeployError::MalformedEvent`].

use std::collections::BTreeMap;

use alloy_core::{
    dyn_abi::{DynSolValue, EventExt},
    json_abi::Event,
    primitives::Address,
};

use crate::{
    error::DeployError,
    submitter::{DeploymentReceipt, LogEntry},
};

/// One log decoded against the expected event.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub name: String,
    /// Contract that emitted the log.
    pub emitter: Address,
    /// Position of the log in the receipt.
    pub log_index: usize,
    /// Indexed and non-indexed parameters by name.
    pub fields: BTreeMap<String, DynSolValue>,
}

impl DecodedEvent {
    pub fn field(&self, name: &str) -> Option<&DynSolValue> {
        self.fields.get(name)
    }

    pub fn string_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(DynSolValue::as_str)
    }
}

pub fn decode(receipt: &DeploymentReceipt, event: &Event) -> Result<Vec<DecodedEvent>, DeployError> {
    decode_logs(&receipt.logs, event)
}

/// Decode `logs` in order, keeping only those emitted as `event`.
pub fn decode_logs(logs: &[LogEntry], event: &Event) -> Result<Vec<DecodedEvent>, DeployError> {
    if event.anonymous {
        return Err(DeployError::InvalidPlan(format!(
            "event `{}` is anonymous and cannot be matched by topic",
            event.name
        )));
    }

    let selector = event.selector();
    let mut decoded = Vec::new();

    for (log_index, log) in logs.iter().enumerate() {
        if log.topics.first() != Some(&selector) {
            tracing::trace!(log_index, emitter = %log.address, "Skipping unrelated log");
            continue;
        }

        let parts = event
            .decode_log_parts(log.topics.iter().copied(), &log.data)
            .map_err(|e| DeployError::MalformedEvent {
                event: event.signature(),
                emitter: log.address,
                log_index,
                reason: e.to_string(),
            })?;

        let mut indexed = parts.indexed.into_iter();
        let mut body = parts.body.into_iter();
        let mut fields = BTreeMap::new();

        for (position, input) in event.inputs.iter().enumerate() {
            let value = if input.indexed {
                indexed.next()
            } else {
                body.next()
            };
            let name = if input.name.is_empty() {
                position.to_string()
            } else {
                input.name.clone()
            };
            if let Some(value) = value {
                fields.insert(name, value);
            }
        }

        decoded.push(DecodedEvent {
            name: event.name.clone(),
            emitter: log.address,
            log_index,
            fields,
        });
    }

    Ok(decoded)
}
