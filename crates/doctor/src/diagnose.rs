//! Ordered diagnostic battery for a sync connection.
//!
//! Runs independent checks against the API, job history, and the
//! abctl-managed cluster, accumulating findings into a single report that
//! is printed once at the end. Issues are blocking defects; warnings are
//! advisory. A check that cannot run degrades in place, it never aborts
//! the remaining checks (the initial API reachability probe is the one
//! fatal exception).

use chrono::Utc;
use colored::Colorize;

use crate::api::{AirbyteClient, ApiError, Job};
use crate::cmd::run_command;
use crate::kube::{parse_pod_rows, KubeCli};
use crate::ui;

/// Label selector for the pod whose logs most often show sync errors.
const WORKLOAD_LAUNCHER_SELECTOR: &str = "app.kubernetes.io/name=airbyte-workload-launcher";
/// Log lines to tail when grepping for errors.
const LOG_TAIL_LINES: u32 = 50;
/// Cap on log content shown in the report.
const LOG_DISPLAY_LIMIT: usize = 500;
/// Jobs fetched for the history check.
const JOB_HISTORY_LIMIT: u32 = 10;
/// Restart count above which a pod is flagged.
const RESTART_WARNING_THRESHOLD: u32 = 5;

/// Substrings that mark a log line as error-like. Matching is
/// case-insensitive.
const ERROR_PATTERNS: &[&str] = &["error", "exception", "fail"];

/// Findings accumulated over a diagnostic run.
///
/// Both lists keep insertion order so the summary reads in check order.
#[derive(Debug, Default)]
pub struct DiagnosticReport {
    issues: Vec<String>,
    warnings: Vec<String>,
}

impl DiagnosticReport {
    fn issue(&mut self, finding: impl Into<String>) {
        self.issues.push(finding.into());
    }

    fn warning(&mut self, finding: impl Into<String>) {
        self.warnings.push(finding.into());
    }

    #[must_use]
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    #[must_use]
    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Severity of a still-running job based on elapsed hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningSeverity {
    Issue,
    Warning,
    Normal,
}

/// A sync running past 12 hours is stuck; past 6 hours is suspicious.
#[must_use]
pub fn classify_running_hours(hours: f64) -> RunningSeverity {
    if hours > 12.0 {
        RunningSeverity::Issue
    } else if hours > 6.0 {
        RunningSeverity::Warning
    } else {
        RunningSeverity::Normal
    }
}

/// Lines from a log dump that look error-related.
#[must_use]
pub fn error_lines(logs: &str) -> Vec<&str> {
    logs.lines()
        .filter(|line| {
            let lowered = line.to_lowercase();
            ERROR_PATTERNS.iter().any(|p| lowered.contains(p))
        })
        .collect()
}

/// Clip display text to `max_bytes` without splitting a character.
#[must_use]
pub fn truncate_for_display(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// The diagnostic battery and its accumulated findings.
pub struct SyncDiagnostics {
    api: AirbyteClient,
    kube: KubeCli,
    connection_id: String,
    report: DiagnosticReport,
}

impl SyncDiagnostics {
    #[must_use]
    pub fn new(api: AirbyteClient, kube: KubeCli, connection_id: impl Into<String>) -> Self {
        Self {
            api,
            kube,
            connection_id: connection_id.into(),
            report: DiagnosticReport::default(),
        }
    }

    #[must_use]
    pub fn report(&self) -> &DiagnosticReport {
        &self.report
    }

    /// Check that the API answers at all, then ask abctl for a second
    /// opinion. Returns false when the API is unreachable; the abctl
    /// signal only ever warns.
    pub async fn check_airbyte_health(&mut self) -> bool {
        ui::section("AIRBYTE SERVICE HEALTH");

        match self.api.workspace_count().await {
            Ok(count) => {
                ui::success("Airbyte API is accessible");
                println!("   Workspaces: {count}");
            }
            Err(e) if e.is_unreachable() => {
                ui::error(&format!(
                    "Cannot connect to Airbyte API at {}",
                    self.api.base_url()
                ));
                self.report.issue("Airbyte API is not accessible");
                return false;
            }
            Err(e) => {
                ui::error(&format!("API error: {e}"));
                self.report.issue(format!("API error: {e}"));
                return false;
            }
        }

        println!("\nChecking abctl status...");
        let status = run_command("abctl", &["local", "status"]).await;
        if status.success() {
            if status.stdout.to_lowercase().contains("deployed") {
                ui::success("Airbyte is deployed");
            } else {
                ui::warning("Airbyte status unclear");
                self.report.warning("Airbyte deployment status unclear");
            }
        } else {
            ui::warning("Cannot run abctl command");
            self.report.warning("abctl not available");
        }

        true
    }

    /// Fetch the connection and flag a non-active status or an empty
    /// stream list. A 404 is its own finding; the run continues either way.
    pub async fn check_connection_config(&mut self) {
        ui::section("CONNECTION CONFIGURATION");

        match self.api.get_connection(&self.connection_id).await {
            Ok(conn) => {
                println!("Name: {}", conn.name);
                println!("Status: {}", conn.status);

                if conn.status != "active" {
                    self.report
                        .issue(format!("Connection status is {}, not active", conn.status));
                }

                match &conn.schedule {
                    Some(schedule) => println!("Schedule: {schedule}"),
                    None => println!("Schedule: {{}}"),
                }

                let streams = &conn.configurations.streams;
                println!("\nConfigured streams: {}", streams.len());
                for stream in streams {
                    println!(
                        "  - {} ({})",
                        stream.name,
                        stream.sync_mode.as_deref().unwrap_or("unknown")
                    );
                }
                if streams.is_empty() {
                    self.report.issue("No streams configured");
                }
            }
            Err(ApiError::NotFound(_)) => {
                ui::error(&format!("Connection {} not found", self.connection_id));
                self.report.issue("Connection does not exist");
            }
            Err(e) => {
                ui::error(&format!("Error fetching connection: {e}"));
                self.report.issue(format!("Cannot fetch connection: {e}"));
            }
        }
    }

    /// Flag long-running syncs and count recent failures.
    pub async fn check_recent_jobs(&mut self) {
        ui::section("RECENT SYNC JOBS");

        let jobs = match self
            .api
            .list_jobs(&self.connection_id, JOB_HISTORY_LIMIT)
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                ui::error(&format!("Error fetching jobs: {e}"));
                self.report.issue(format!("Cannot fetch jobs: {e}"));
                return;
            }
        };

        if jobs.is_empty() {
            ui::warning("No sync jobs found");
            self.report.warning("No job history available");
            return;
        }

        println!("Found {} recent jobs\n", jobs.len());

        let now = Utc::now();
        for job in jobs.iter().filter(|j| j.status == "running") {
            println!("Job {}: RUNNING", job.job_id);
            if let Some(raw) = job.start_time_display() {
                println!("  Started: {raw}");
            }

            // Jobs with an unparseable start time are skipped silently.
            if let Some(started) = job.started_at() {
                let hours = (now - started).num_seconds() as f64 / 3600.0;
                println!("  Duration: {hours:.1} hours");

                match classify_running_hours(hours) {
                    RunningSeverity::Issue => self.report.issue(format!(
                        "Job {} has been running for {hours:.1} hours",
                        job.job_id
                    )),
                    RunningSeverity::Warning => self.report.warning(format!(
                        "Job {} running for {hours:.1} hours (may be normal)",
                        job.job_id
                    )),
                    RunningSeverity::Normal => {}
                }
            }
            println!();
        }

        let failed: Vec<&Job> = jobs.iter().filter(|j| j.status == "failed").collect();
        if !failed.is_empty() {
            println!();
            ui::warning(&format!("{} failed jobs found", failed.len()));
            for job in failed.iter().take(3) {
                println!("  Job {}: {}", job.job_id, job.status);
            }
            self.report
                .warning(format!("{} recent failed jobs", failed.len()));
        }
    }

    /// Check pod health by parsing kubectl's tabular output.
    pub async fn check_kubernetes_pods(&mut self) {
        ui::section("KUBERNETES POD STATUS");

        if !self.kube.kubeconfig_exists() {
            ui::warning("Kubeconfig not found, skipping pod checks");
            self.report
                .warning("Cannot check pod status (kubeconfig missing)");
            return;
        }

        let output = self.kube.get_pods().await;
        if !output.success() {
            ui::warning("Cannot check pod status");
            if !output.stderr.is_empty() {
                println!("{}", output.stderr);
            }
            self.report.warning("kubectl command failed");
            return;
        }

        println!("{}", output.stdout);

        for pod in parse_pod_rows(&output.stdout) {
            if pod.status != "Running" && pod.status != "Completed" {
                self.report
                    .issue(format!("Pod {} is in {} state", pod.name, pod.status));
            }
            if let Some(restarts) = pod.restarts {
                if restarts > RESTART_WARNING_THRESHOLD {
                    self.report
                        .warning(format!("Pod {} has {restarts} restarts", pod.name));
                }
            }
        }
    }

    /// Tail the workload launcher's logs and grep for error keywords.
    /// Lookup or log failures only print a note; matches warn.
    pub async fn check_logs_for_errors(&mut self) {
        ui::section("CHECKING LOGS FOR ERRORS");

        if !self.kube.kubeconfig_exists() {
            ui::warning("Skipping log check (kubeconfig missing)");
            self.report.warning("Cannot check logs (kubeconfig missing)");
            return;
        }

        let Some(pod) = self.kube.find_pod(WORKLOAD_LAUNCHER_SELECTOR).await else {
            ui::warning("Cannot fetch pod logs");
            return;
        };

        println!("Checking logs for pod: {pod}");
        let output = self.kube.logs(&pod, LOG_TAIL_LINES).await;
        if !output.success() {
            ui::warning("Cannot fetch pod logs");
            return;
        }

        let matched = error_lines(&output.stdout);
        if matched.is_empty() {
            ui::success("No obvious errors in recent logs");
        } else {
            println!();
            ui::warning("Found potential errors in logs:");
            let joined = matched.join("\n");
            println!("{}", truncate_for_display(&joined, LOG_DISPLAY_LIMIT));
            self.report.warning("Errors found in recent pod logs");
        }
    }

    /// Print the accumulated findings and recommended follow-ups.
    pub fn print_summary(&self) {
        ui::section("DIAGNOSTIC SUMMARY");

        let issues = self.report.issues();
        let warnings = self.report.warnings();

        if issues.is_empty() && warnings.is_empty() {
            ui::success("No issues detected");
            println!(
                "\nIf sync is still not working, check:\
                 \n  1. Source API credentials (may be expired)\
                 \n  2. Destination credentials (AWS keys, bucket permissions)\
                 \n  3. Network connectivity to external services\
                 \n  4. Detailed logs in Airbyte UI (http://localhost:8000)"
            );
            return;
        }

        if !issues.is_empty() {
            println!("\n{}", format!("❌ {} ISSUES FOUND:", issues.len()).red());
            for (i, issue) in issues.iter().enumerate() {
                println!("  {}. {issue}", i + 1);
            }
        }

        if !warnings.is_empty() {
            println!("\n{}", format!("⚠️  {} WARNINGS:", warnings.len()).yellow());
            for (i, warning) in warnings.iter().enumerate() {
                println!("  {}. {warning}", i + 1);
            }
        }

        println!("\nRECOMMENDED ACTIONS:");
        println!("  1. Check detailed logs: abctl local deployments");
        println!(
            "  2. View pod events: kubectl --kubeconfig ~/.airbyte/abctl/abctl.kubeconfig \
             --namespace airbyte-abctl describe pod <pod-name>"
        );
        println!("  3. Review connection config in UI: http://localhost:8000");
        println!("  4. Check S3 destination: aws s3 ls s3://<bucket>/<prefix> --recursive");
    }
}

/// Run the ordered battery and print the summary. Returns true when no
/// blocking issues were found.
pub async fn run(api: AirbyteClient, kube: KubeCli, connection_id: &str) -> bool {
    let mut diag = SyncDiagnostics::new(api, kube, connection_id);

    println!("Running diagnostics for connection: {connection_id}\n");

    if !diag.check_airbyte_health().await {
        println!();
        ui::error("Airbyte is not accessible. Start it with: abctl local install");
        return false;
    }

    diag.check_connection_config().await;
    diag.check_recent_jobs().await;
    diag.check_kubernetes_pods().await;
    diag.check_logs_for_errors().await;
    diag.print_summary();

    !diag.report.has_issues()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kube::AIRBYTE_NAMESPACE;
    use serde_json::json;
    use std::path::PathBuf;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_kube() -> KubeCli {
        KubeCli::new(
            PathBuf::from("/definitely/not/a/real/kubeconfig"),
            AIRBYTE_NAMESPACE,
        )
    }

    fn diagnostics_for(server: &MockServer) -> SyncDiagnostics {
        let api = AirbyteClient::new(server.uri(), "secret").unwrap();
        SyncDiagnostics::new(api, test_kube(), "conn-1")
    }

    #[test]
    fn running_job_thresholds() {
        assert_eq!(classify_running_hours(13.0), RunningSeverity::Issue);
        assert_eq!(classify_running_hours(7.0), RunningSeverity::Warning);
        assert_eq!(classify_running_hours(2.0), RunningSeverity::Normal);
    }

    #[test]
    fn error_lines_match_case_insensitively() {
        let logs = "INFO starting\nWARN Exception in thread\njob FAILED hard\nall good";
        let matched = error_lines(logs);
        assert_eq!(matched, ["WARN Exception in thread", "job FAILED hard"]);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_for_display("short", 500), "short");

        let long = "x".repeat(600);
        assert_eq!(truncate_for_display(&long, 500).len(), 500);

        // 'é' is two bytes; the cut must not land inside it.
        let accented = "é".repeat(10);
        let clipped = truncate_for_display(&accented, 5);
        assert_eq!(clipped, "éé");
    }

    #[test]
    fn report_keeps_insertion_order() {
        let mut report = DiagnosticReport::default();
        report.issue("first");
        report.issue("second");
        report.warning("third");

        assert!(report.has_issues());
        assert_eq!(report.issues(), ["first", "second"]);
        assert_eq!(report.warnings(), ["third"]);
    }

    #[tokio::test]
    async fn missing_connection_records_issue_and_continues() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/connections/conn-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut diag = diagnostics_for(&server);
        diag.check_connection_config().await;

        assert_eq!(diag.report().issues(), ["Connection does not exist"]);
    }

    #[tokio::test]
    async fn inactive_connection_without_streams_is_two_issues() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/connections/conn-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "connectionId": "conn-1",
                "name": "postgres-to-s3",
                "status": "inactive",
                "configurations": {"streams": []}
            })))
            .mount(&server)
            .await;

        let mut diag = diagnostics_for(&server);
        diag.check_connection_config().await;

        assert_eq!(
            diag.report().issues(),
            [
                "Connection status is inactive, not active",
                "No streams configured"
            ]
        );
    }

    #[tokio::test]
    async fn long_running_job_is_an_issue() {
        let started = Utc::now() - chrono::Duration::hours(13);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "jobId": 7,
                    "status": "running",
                    "startTime": started.timestamp_millis()
                }]
            })))
            .mount(&server)
            .await;

        let mut diag = diagnostics_for(&server);
        diag.check_recent_jobs().await;

        assert_eq!(diag.report().issues().len(), 1);
        assert!(diag.report().issues()[0].starts_with("Job 7 has been running for 13.0 hours"));
    }

    #[tokio::test]
    async fn seven_hour_job_is_a_warning() {
        let started = Utc::now() - chrono::Duration::hours(7);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "jobId": 8,
                    "status": "running",
                    "startTime": started.timestamp_millis()
                }]
            })))
            .mount(&server)
            .await;

        let mut diag = diagnostics_for(&server);
        diag.check_recent_jobs().await;

        assert!(diag.report().issues().is_empty());
        assert_eq!(diag.report().warnings().len(), 1);
        assert!(diag.report().warnings()[0].contains("may be normal"));
    }

    #[tokio::test]
    async fn short_job_and_failures_only_warn_on_failures() {
        let started = Utc::now() - chrono::Duration::hours(2);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"jobId": 9, "status": "running", "startTime": started.timestamp_millis()},
                    {"jobId": 5, "status": "failed"},
                    {"jobId": 4, "status": "failed"}
                ]
            })))
            .mount(&server)
            .await;

        let mut diag = diagnostics_for(&server);
        diag.check_recent_jobs().await;

        assert!(diag.report().issues().is_empty());
        assert_eq!(diag.report().warnings(), ["2 recent failed jobs"]);
    }

    #[tokio::test]
    async fn empty_job_history_is_a_warning() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let mut diag = diagnostics_for(&server);
        diag.check_recent_jobs().await;

        assert_eq!(diag.report().warnings(), ["No job history available"]);
    }

    #[tokio::test]
    async fn missing_kubeconfig_skips_pod_and_log_checks_with_warnings() {
        let server = MockServer::start().await;
        let mut diag = diagnostics_for(&server);

        diag.check_kubernetes_pods().await;
        diag.check_logs_for_errors().await;

        assert!(diag.report().issues().is_empty());
        assert_eq!(
            diag.report().warnings(),
            [
                "Cannot check pod status (kubeconfig missing)",
                "Cannot check logs (kubeconfig missing)"
            ]
        );
    }
}
