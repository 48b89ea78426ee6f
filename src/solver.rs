use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{HandRecord, SolverResult};
use crate::pipeline::SolveService;

pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 300;

const SOLVER_TYPE: &str = "gto_plus";
const ANALYSIS_DEPTH: &str = "full";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    Unreachable,
    BadStatus,
    MalformedResponse,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Unreachable => "unreachable",
            Self::BadStatus => "bad_status",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed submission, surfaced exactly once to the orchestrator. `payload`
/// is the request body as sent, retained for audit logging.
#[derive(Debug, Error)]
#[error("solver submission failed ({reason}): {detail}")]
pub struct SolveFailure {
    pub reason: FailureReason,
    pub detail: String,
    pub payload: String,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    hand_id: &'a str,
    hand_history: &'a str,
    solver_type: &'static str,
    analysis_depth: &'static str,
}

/// Client for the remote solver endpoint. Probe and submit timeouts are
/// independent budgets: the probe answers in seconds, a solve can take minutes.
pub struct SolverClient {
    client: reqwest::blocking::Client,
    base_url: String,
    probe_timeout: Duration,
    submit_timeout: Duration,
}

impl SolverClient {
    pub fn new(
        base_url: &str,
        probe_timeout: Duration,
        submit_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("failed to build solver http client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            probe_timeout,
            submit_timeout,
        })
    }

    /// Liveness check against the solver endpoint. Any transport failure,
    /// non-2xx status, or timeout reads as unavailable; this never raises.
    pub fn probe(&self) -> bool {
        let url = format!("{}/health", self.base_url);

        match self.client.get(&url).timeout(self.probe_timeout).send() {
            Ok(response) => {
                let available = response.status().is_success();
                debug!(
                    url = %url,
                    status = response.status().as_u16(),
                    available,
                    "solver probe"
                );
                available
            }
            Err(err) => {
                debug!(url = %url, error = %err, "solver probe failed");
                false
            }
        }
    }

    /// Submit one hand for analysis. Missing response fields default to
    /// empty/zero; any transport or status failure comes back as a typed
    /// `SolveFailure`. No retries happen here: a solve is expensive, and the
    /// orchestrator decides what a failure means for the batch.
    pub fn submit(
        &self,
        record: &HandRecord,
        timeout: Duration,
    ) -> std::result::Result<SolverResult, SolveFailure> {
        let url = format!("{}/analyze", self.base_url);
        let request = AnalyzeRequest {
            hand_id: &record.hand_id,
            hand_history: &record.raw_text,
            solver_type: SOLVER_TYPE,
            analysis_depth: ANALYSIS_DEPTH,
        };
        let payload = serde_json::to_string(&request).unwrap_or_default();

        debug!(hand_id = %record.hand_id, url = %url, timeout_secs = timeout.as_secs(), "submitting hand");
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&request)
            .send()
            .map_err(|err| classify_transport_error(&err, timeout, &payload))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(hand_id = %record.hand_id, status = status.as_u16(), "solver rejected submission");
            return Err(SolveFailure {
                reason: FailureReason::BadStatus,
                detail: format!("status {}: {}", status.as_u16(), body),
                payload,
            });
        }

        let body: Value = response.json().map_err(|err| {
            if err.is_timeout() {
                SolveFailure {
                    reason: FailureReason::Timeout,
                    detail: format!("timed out after {}s", timeout.as_secs()),
                    payload: payload.clone(),
                }
            } else {
                SolveFailure {
                    reason: FailureReason::MalformedResponse,
                    detail: err.to_string(),
                    payload: payload.clone(),
                }
            }
        })?;

        let result = parse_solver_response(&record.hand_id, &body);
        info!(
            hand_id = %record.hand_id,
            round_trip_secs = started.elapsed().as_secs_f64(),
            solver_secs = result.latency_seconds,
            "solver analysis complete"
        );

        Ok(result)
    }
}

impl SolveService for SolverClient {
    fn probe(&self) -> bool {
        SolverClient::probe(self)
    }

    fn submit(&self, record: &HandRecord) -> std::result::Result<SolverResult, SolveFailure> {
        SolverClient::submit(self, record, self.submit_timeout)
    }
}

fn classify_transport_error(
    err: &reqwest::Error,
    timeout: Duration,
    payload: &str,
) -> SolveFailure {
    if err.is_timeout() {
        SolveFailure {
            reason: FailureReason::Timeout,
            detail: format!("timed out after {}s", timeout.as_secs()),
            payload: payload.to_string(),
        }
    } else {
        SolveFailure {
            reason: FailureReason::Unreachable,
            detail: err.to_string(),
            payload: payload.to_string(),
        }
    }
}

/// Decode the solver body once at the boundary: absent or mistyped fields
/// default to empty/zero, non-numeric map entries are dropped. Partial solver
/// output is valid output, not an error.
pub(crate) fn parse_solver_response(hand_id: &str, body: &Value) -> SolverResult {
    let narrative = body
        .get("solver_output")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let ranges = body
        .get("ranges")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|text| (key.clone(), text.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let frequencies = numeric_entries(body.get("frequencies"));
    let ev_deltas = numeric_entries(body.get("ev_analysis"));

    let latency_seconds = body
        .get("processing_time")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .max(0.0);

    SolverResult {
        hand_id: hand_id.to_string(),
        narrative,
        ranges,
        frequencies,
        ev_deltas,
        latency_seconds,
    }
}

fn numeric_entries(value: Option<&Value>) -> BTreeMap<String, f64> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(key, value)| value.as_f64().map(|number| (key.clone(), number)))
                .collect()
        })
        .unwrap_or_default()
}
