//! HTTP endpoint idle detection
//!
//! The endpoint is queried from inside the workspace container with curl,
//! so no network path from the operator to the pod is needed. Body and
//! status code come back in one exec.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use workspaces_common::crd::HttpGetProbe;
use workspaces_common::labels::WORKSPACE_CONTAINER_NAME;
use workspaces_common::Error;

use super::exec::PodExec;
use super::{is_idle_since, IdleDetectionMethod, IdleDetector, IdleTarget};

const STATUS_PREFIX: &str = "HTTP Status: ";

/// curl exit code for a refused connection
const CURL_CONNECTION_REFUSED: i32 = 7;

/// Upper bound curl spends on the request, passed as `--max-time`
const CURL_MAX_TIME_SECS: u64 = 10;

/// Deadline for the whole exec round trip, longer than curl's own limit
const IDLE_CHECK_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct IdleEndpointResponse {
    #[serde(default, rename = "lastActiveTimestamp")]
    last_active_timestamp: Option<String>,
}

/// curl invocation that prints the body followed by an `HTTP Status:` line
pub fn curl_command(probe: &HttpGetProbe) -> Vec<String> {
    let scheme = probe
        .scheme
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .unwrap_or_else(|| "http".to_string());
    let url = format!("{}://localhost:{}{}", scheme, probe.port, probe.path);
    vec![
        "curl".to_string(),
        "-s".to_string(),
        "--max-time".to_string(),
        CURL_MAX_TIME_SECS.to_string(),
        "-w".to_string(),
        r"\nHTTP Status: %{http_code}\n".to_string(),
        url,
    ]
}

/// Split curl output into (status code, body)
pub fn parse_curl_output(output: &str) -> (Option<String>, String) {
    let mut status = None;
    let mut body = Vec::new();
    for line in output.lines() {
        if let Some(code) = line.strip_prefix(STATUS_PREFIX) {
            status = Some(code.trim().to_string());
        } else if !line.is_empty() {
            body.push(line);
        }
    }
    (status, body.join("\n"))
}

/// Detector querying an idle endpoint through [`PodExec`]
pub struct HttpProbeDetector {
    exec: Arc<dyn PodExec>,
}

impl HttpProbeDetector {
    /// Create a detector running curl through `exec`
    pub fn new(exec: Arc<dyn PodExec>) -> Self {
        Self { exec }
    }

    async fn query_endpoint(
        &self,
        target: &IdleTarget,
        probe: &HttpGetProbe,
        timeout_minutes: u32,
    ) -> Result<bool, Error> {
        let ws = target.workspace.as_str();
        debug!(workspace = %ws, pod = %target.pod, port = probe.port, path = %probe.path, "calling idle endpoint");

        let exec = self.exec.exec(
            &target.namespace,
            &target.pod,
            WORKSPACE_CONTAINER_NAME,
            curl_command(probe),
        );
        let result = match tokio::time::timeout(IDLE_CHECK_TIMEOUT, exec).await {
            Ok(result) => result,
            Err(_) => {
                warn!(workspace = %ws, pod = %target.pod, "idle endpoint call timed out");
                return Err(Error::idle_retryable(
                    ws,
                    format!("idle endpoint timed out after {:?}", IDLE_CHECK_TIMEOUT),
                ));
            }
        };

        let output = match result {
            Ok(output) => output,
            Err(Error::Exec {
                exit_code: Some(CURL_CONNECTION_REFUSED),
                ..
            }) => return Err(Error::idle_retryable(ws, "connection refused")),
            Err(e) => return Err(Error::idle_retryable(ws, format!("curl execution failed: {}", e))),
        };

        let (status, body) = parse_curl_output(&output);
        match status.as_deref() {
            Some("404") => Err(Error::idle_permanent(ws, "idle endpoint not found")),
            Some("200") => {
                let response: IdleEndpointResponse = serde_json::from_str(&body).map_err(|e| {
                    Error::idle_retryable(ws, format!("failed to parse idle response: {}", e))
                })?;
                let last_active = response
                    .last_active_timestamp
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        Error::idle_retryable(ws, "idle response has no lastActiveTimestamp")
                    })?;
                Ok(idle_from_timestamp(ws, &last_active, Utc::now(), timeout_minutes))
            }
            other => Err(Error::idle_retryable(
                ws,
                format!("unexpected HTTP status: {}", other.unwrap_or("none")),
            )),
        }
    }
}

/// Unparsable timestamps count as active
fn idle_from_timestamp(ws: &str, raw: &str, now: DateTime<Utc>, timeout_minutes: u32) -> bool {
    // Some servers emit a lowercase `z`
    let normalized = raw.to_uppercase();
    let last_active = match DateTime::parse_from_rfc3339(&normalized) {
        Ok(t) => t.with_timezone(&Utc),
        Err(e) => {
            warn!(workspace = %ws, last_active = %raw, error = %e, "unparsable last activity time");
            return false;
        }
    };
    let idle = is_idle_since(last_active, now, timeout_minutes);
    if idle {
        info!(workspace = %ws, %last_active, timeout_minutes, "idle timeout reached");
    } else {
        debug!(workspace = %ws, %last_active, timeout_minutes, "workspace still active");
    }
    idle
}

#[async_trait]
impl IdleDetector for HttpProbeDetector {
    async fn detect(
        &self,
        target: &IdleTarget,
        method: &IdleDetectionMethod,
        timeout_minutes: u32,
    ) -> Result<bool, Error> {
        match method {
            IdleDetectionMethod::HttpGet(probe) => self.query_endpoint(target, probe, timeout_minutes).await,
        }
    }
}
