//! Command execution inside workspace pods

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use kube::Client;
use tokio::io::AsyncReadExt;

#[cfg(test)]
use mockall::automock;

use workspaces_common::Error;

/// Run a command in a pod container and collect its stdout
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodExec: Send + Sync {
    /// Execute `command`; a non-zero exit is an [`Error::Exec`] carrying the code
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<String, Error>;
}

/// Deadline for reading a command's output and exit status
const EXEC_STREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Exec through the Kubernetes API
pub struct KubePodExec {
    client: Client,
}

impl KubePodExec {
    /// Create an exec helper using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn exit_code(status: &k8s_openapi::apimachinery::pkg::apis::meta::v1::Status) -> Option<i32> {
    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|c| c.reason.as_deref() == Some("ExitCode"))
        .and_then(|c| c.message.as_deref())
        .and_then(|m| m.parse().ok())
}

#[async_trait]
impl PodExec for KubePodExec {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<String, Error> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams {
            container: Some(container.to_string()),
            stdin: false,
            stdout: true,
            stderr: false,
            tty: false,
            max_stdin_buf_size: None,
            max_stdout_buf_size: None,
            max_stderr_buf_size: None,
        };

        let mut attached = pods
            .exec(pod, command, &params)
            .await
            .map_err(|e| Error::exec(pod, None, e.to_string()))?;

        let collect = async move {
            let mut stdout = String::new();
            if let Some(mut reader) = attached.stdout() {
                reader
                    .read_to_string(&mut stdout)
                    .await
                    .map_err(|e| Error::exec(pod, None, format!("reading stdout: {}", e)))?;
            }

            let status = match attached.take_status() {
                Some(status) => status.await,
                None => None,
            };
            attached
                .join()
                .await
                .map_err(|e| Error::exec(pod, None, e.to_string()))?;
            Ok::<_, Error>((stdout, status))
        };

        let (stdout, status) = tokio::time::timeout(EXEC_STREAM_TIMEOUT, collect)
            .await
            .map_err(|_| {
                Error::exec(
                    pod,
                    None,
                    format!("exec stream timed out after {:?}", EXEC_STREAM_TIMEOUT),
                )
            })??;

        match status {
            Some(s) if s.status.as_deref() == Some("Failure") => {
                let code = exit_code(&s);
                Err(Error::exec(
                    pod,
                    code,
                    s.message.unwrap_or_else(|| "command failed".to_string()),
                ))
            }
            _ => Ok(stdout),
        }
    }
}
