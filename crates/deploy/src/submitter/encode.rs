//! ABI encoding of deployment and call payloads.
//!
//! Everything here is pure and runs before any network access, so a badly
//! typed task fails before a transaction is broadcast.

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::{Function, JsonAbi, Param},
    primitives::Bytes,
};

use crate::{artifact::Artifact, error::DeployError};

/// Creation payload: bytecode followed by the encoded constructor arguments.
pub fn deployment_data(artifact: &Artifact, args: &[DynSolValue]) -> Result<Bytes, DeployError> {
    if artifact.bytecode.is_empty() {
        return Err(DeployError::Encoding {
            target: artifact.contract_name.clone(),
            reason: "artifact has no creation bytecode (abstract contract or interface?)"
                .to_string(),
        });
    }

    let encoded_args = constructor_args(artifact, args)?;

    let mut data = Vec::with_capacity(artifact.bytecode.len() + encoded_args.len());
    data.extend_from_slice(&artifact.bytecode);
    data.extend_from_slice(&encoded_args);
    Ok(data.into())
}

/// ABI-encoded constructor arguments, without bytecode.
///
/// This is also the payload verifiers expect next to the source.
pub fn constructor_args(artifact: &Artifact, args: &[DynSolValue]) -> Result<Bytes, DeployError> {
    let target = format!("{} constructor", artifact.contract_name);

    let Some(constructor) = artifact.abi.constructor() else {
        if args.is_empty() {
            return Ok(Bytes::new());
        }
        return Err(DeployError::Encoding {
            target,
            reason: format!("contract has no constructor but {} argument(s) given", args.len()),
        });
    };

    typecheck(&target, &constructor.inputs, args)?;

    constructor
        .abi_encode_input(args)
        .map(Bytes::from)
        .map_err(|e| DeployError::Encoding {
            target,
            reason: e.to_string(),
        })
}

/// Selector-prefixed calldata for `method`.
///
/// Overloads are resolved by arity and argument types; the first matching
/// overload in ABI order wins.
pub fn call_data(abi: &JsonAbi, method: &str, args: &[DynSolValue]) -> Result<Bytes, DeployError> {
    let function = select_overload(abi, method, args)?;

    function
        .abi_encode_input(args)
        .map(Bytes::from)
        .map_err(|e| DeployError::Encoding {
            target: function.signature(),
            reason: e.to_string(),
        })
}

fn select_overload<'a>(
    abi: &'a JsonAbi,
    method: &str,
    args: &[DynSolValue],
) -> Result<&'a Function, DeployError> {
    let overloads = abi
        .function(method)
        .filter(|overloads| !overloads.is_empty())
        .ok_or_else(|| DeployError::InvalidPlan(format!("ABI has no method `{method}`")))?;

    let mut last_error = None;
    for function in overloads {
        match typecheck(&function.signature(), &function.inputs, args) {
            Ok(()) => return Ok(function),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or_else(|| DeployError::Encoding {
        target: method.to_string(),
        reason: "no matching overload".to_string(),
    }))
}

/// Check arity and per-argument types against `params`.
pub fn typecheck(target: &str, params: &[Param], args: &[DynSolValue]) -> Result<(), DeployError> {
    if params.len() != args.len() {
        return Err(DeployError::Encoding {
            target: target.to_string(),
            reason: format!("expected {} argument(s), got {}", params.len(), args.len()),
        });
    }

    for (index, (param, value)) in params.iter().zip(args).enumerate() {
        let expected = resolve_param(target, param)?;
        if !expected.matches(value) {
            let got = value
                .sol_type_name()
                .map(|name| name.into_owned())
                .unwrap_or_else(|| "an untyped value".to_string());
            return Err(DeployError::Encoding {
                target: target.to_string(),
                reason: format!(
                    "argument #{index} `{}` expects {expected}, got {got}",
                    param.name
                ),
            });
        }
    }

    Ok(())
}

/// Parse textual constructor arguments (CLI input) against the artifact's
/// constructor types.
pub fn coerce_constructor_args(
    artifact: &Artifact,
    raw: &[String],
) -> Result<Vec<DynSolValue>, DeployError> {
    let target = format!("{} constructor", artifact.contract_name);
    let params = artifact
        .abi
        .constructor()
        .map(|constructor| constructor.inputs.as_slice())
        .unwrap_or_default();

    if params.len() != raw.len() {
        return Err(DeployError::Encoding {
            target,
            reason: format!("expected {} argument(s), got {}", params.len(), raw.len()),
        });
    }

    params
        .iter()
        .zip(raw)
        .map(|(param, value)| {
            let ty = resolve_param(&target, param)?;
            ty.coerce_str(value).map_err(|e| DeployError::Encoding {
                target: target.clone(),
                reason: format!("argument `{}` ({ty}): {e}", param.name),
            })
        })
        .collect()
}

fn resolve_param(target: &str, param: &Param) -> Result<DynSolType, DeployError> {
    param.resolve().map_err(|e| DeployError::Encoding {
        target: target.to_string(),
        reason: format!("unsupported ABI type `{}`: {e}", param.ty),
    })
}
