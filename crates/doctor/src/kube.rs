//! kubectl wrapper for the abctl-managed cluster.
//!
//! abctl runs Airbyte in a local kind cluster and leaves its kubeconfig at
//! a fixed path under the operator's home directory. All pod and log
//! inspection goes through kubectl pinned to that kubeconfig and the
//! abctl install namespace.

use std::path::PathBuf;

use crate::cmd::{run_command, CommandOutput};

/// Namespace abctl installs Airbyte into.
pub const AIRBYTE_NAMESPACE: &str = "airbyte-abctl";

/// Kubeconfig written by `abctl local install`.
///
/// Falls back to a relative path when the home directory cannot be
/// resolved; callers treat a missing file as "skip cluster checks".
#[must_use]
pub fn default_kubeconfig() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".airbyte/abctl/abctl.kubeconfig")
}

/// One row of `kubectl get pods` tabular output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRow {
    pub name: String,
    pub status: String,
    pub restarts: Option<u32>,
}

/// Thin kubectl invoker pinned to one kubeconfig and namespace.
#[derive(Debug, Clone)]
pub struct KubeCli {
    kubeconfig: PathBuf,
    namespace: String,
}

impl KubeCli {
    #[must_use]
    pub fn new(kubeconfig: PathBuf, namespace: impl Into<String>) -> Self {
        Self {
            kubeconfig,
            namespace: namespace.into(),
        }
    }

    /// Whether the pinned kubeconfig exists on disk.
    #[must_use]
    pub fn kubeconfig_exists(&self) -> bool {
        self.kubeconfig.exists()
    }

    /// `kubectl get pods` raw tabular output.
    pub async fn get_pods(&self) -> CommandOutput {
        self.kubectl(&["get", "pods"]).await
    }

    /// Resolve a single pod name by label selector, if one is running.
    pub async fn find_pod(&self, selector: &str) -> Option<String> {
        let output = self
            .kubectl(&["get", "pods", "-l", selector, "-o", "name"])
            .await;
        if !output.success() {
            return None;
        }
        let name = output.stdout.lines().next()?.trim();
        if name.is_empty() {
            return None;
        }
        // kubectl -o name yields "pod/<name>"
        Some(name.rsplit('/').next().unwrap_or(name).to_string())
    }

    /// Tail the last `tail` lines of a pod's logs.
    pub async fn logs(&self, pod: &str, tail: u32) -> CommandOutput {
        let tail_arg = format!("--tail={tail}");
        self.kubectl(&["logs", pod, &tail_arg]).await
    }

    async fn kubectl(&self, args: &[&str]) -> CommandOutput {
        let kubeconfig_arg = format!("--kubeconfig={}", self.kubeconfig.display());
        let namespace_arg = format!("--namespace={}", self.namespace);

        let mut full_args: Vec<&str> = vec![kubeconfig_arg.as_str(), namespace_arg.as_str()];
        full_args.extend_from_slice(args);

        run_command("kubectl", &full_args).await
    }
}

/// Parse `kubectl get pods` output by column position, skipping the header.
///
/// Columns are NAME READY STATUS RESTARTS AGE; rows with fewer than three
/// columns are ignored. A restart cell like "3 (10m ago)" still parses as 3
/// because splitting on whitespace separates the suffix.
#[must_use]
pub fn parse_pod_rows(stdout: &str) -> Vec<PodRow> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                return None;
            }
            Some(PodRow {
                name: parts[0].to_string(),
                status: parts[2].to_string(),
                restarts: parts.get(3).and_then(|r| r.parse().ok()),
            })
        })
        .collect()
}
