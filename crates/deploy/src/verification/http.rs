//! HTTP client for zkSync-style contract verification APIs.
//!
//! A submission is a JSON `POST` to the verifier URL. The service answers with
//! a request id that is then polled at `GET {url}/{id}` until it reaches a
//! terminal status.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::{VerificationError, VerificationOutcome, VerificationRequest, Verifier};
use crate::{config::VerifierConfig, error::DeployError, rpc};

/// Verifier talking to an explorer verification endpoint.
#[derive(Debug, Clone)]
pub struct HttpVerifier {
    client: reqwest::Client,
    url: Url,
    status_poll_attempts: u32,
    status_poll_interval: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    contract_address: String,
    contract_name: &'a str,
    source_name: &'a str,
    constructor_arguments: String,
    bytecode: String,
    bytecode_digest: String,
}

impl<'a> From<&'a VerificationRequest> for SubmitBody<'a> {
    fn from(request: &'a VerificationRequest) -> Self {
        Self {
            contract_address: request.address.to_checksum(None),
            contract_name: &request.contract_source_id,
            source_name: &request.source_name,
            constructor_arguments: request.constructor_args.to_string(),
            bytecode: request.bytecode.to_string(),
            bytecode_digest: request.bytecode_digest.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "compilationErrors")]
    compilation_errors: Option<Vec<String>>,
}

/// Non-terminal statuses reported by the verifier.
const IN_PROGRESS: &[&str] = &["queued", "in_progress", "pending", "processing"];

/// What a submission response tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubmitResponse {
    Done(VerificationOutcome),
    Queued(u64),
}

impl HttpVerifier {
    pub fn new(config: &VerifierConfig) -> Result<Self, DeployError> {
        let client = rpc::create_client(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self {
            client,
            url: config.url.clone(),
            status_poll_attempts: config.status_poll_attempts,
            status_poll_interval: Duration::from_millis(config.status_poll_interval_ms),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn status_url(&self, id: u64) -> String {
        format!("{}/{id}", self.url.as_str().trim_end_matches('/'))
    }

    async fn poll_status(&self, id: u64) -> VerificationOutcome {
        let url = self.status_url(id);

        for attempt in 1..=self.status_poll_attempts {
            tokio::time::sleep(self.status_poll_interval).await;

            let body = match self.client.get(&url).send().await {
                Ok(response) => response.text().await,
                Err(e) => Err(e),
            };
            let body = match body {
                Ok(body) => body,
                Err(e) => {
                    tracing::trace!(error = %e, %url, attempt, "Status poll failed, retrying...");
                    continue;
                }
            };

            if let Some(outcome) = classify_status(&body) {
                return outcome;
            }
            tracing::trace!(id, attempt, "Verification still in progress");
        }

        VerificationOutcome::Pending
    }
}

impl Verifier for HttpVerifier {
    async fn submit(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationOutcome, VerificationError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&SubmitBody::from(request))
            .send()
            .await
            .map_err(|e| VerificationError::Transient(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VerificationError::Transient(e.to_string()))?;

        match classify_response(status, &body)? {
            SubmitResponse::Done(outcome) => Ok(outcome),
            SubmitResponse::Queued(id) => {
                tracing::debug!(id, address = %request.address, "Verification request queued");
                Ok(self.poll_status(id).await)
            }
        }
    }
}

/// Map a submission response to an outcome, a queued request or an error.
pub(crate) fn classify_response(
    status: StatusCode,
    body: &str,
) -> Result<SubmitResponse, VerificationError> {
    if body.to_lowercase().contains("already verified") {
        return Ok(SubmitResponse::Done(VerificationOutcome::AlreadyVerified));
    }

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        return Err(VerificationError::Transient(format!("{status}: {body}")));
    }

    if !status.is_success() {
        return Err(VerificationError::Rejected(format!("{status}: {body}")));
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Number(id)) => id
            .as_u64()
            .map(SubmitResponse::Queued)
            .ok_or_else(|| VerificationError::Rejected(format!("invalid request id {id}"))),
        Ok(Value::Object(object)) => {
            if let Some(id) = object.get("id").and_then(Value::as_u64) {
                return Ok(SubmitResponse::Queued(id));
            }
            match object.get("status").and_then(Value::as_str) {
                Some(state) => match classify_status(body) {
                    Some(outcome) => Ok(SubmitResponse::Done(outcome)),
                    None if IN_PROGRESS.contains(&state) => {
                        Ok(SubmitResponse::Done(VerificationOutcome::Pending))
                    }
                    None => Err(VerificationError::Rejected(format!(
                        "unknown verification status `{state}`: {body}"
                    ))),
                },
                None => Err(VerificationError::Rejected(format!(
                    "unrecognised verifier response: {body}"
                ))),
            }
        }
        // Some verifiers answer with a bare id as plain text.
        _ => match body.trim().parse::<u64>() {
            Ok(id) => Ok(SubmitResponse::Queued(id)),
            // Proxies answer with an HTML page while the service is down.
            Err(_) if body.trim_start().starts_with('<') => Err(VerificationError::Transient(
                format!("{status}: unexpected HTML response"),
            )),
            Err(_) => Err(VerificationError::Rejected(format!(
                "unrecognised verifier response: {body}"
            ))),
        },
    }
}

/// Terminal outcome of a status response, `None` while in progress.
fn classify_status(body: &str) -> Option<VerificationOutcome> {
    let status: StatusBody = serde_json::from_str(body).ok()?;
    match status.status.as_str() {
        "successful" => Some(VerificationOutcome::Verified),
        "failed" => {
            let reason = status
                .error
                .or_else(|| status.compilation_errors.map(|errors| errors.join("; ")))
                .unwrap_or_else(|| "verification failed".to_string());
            if reason.to_lowercase().contains("already verified") {
                Some(VerificationOutcome::AlreadyVerified)
            } else {
                Some(VerificationOutcome::Failed(reason))
            }
        }
        _ => None,
    }
}
