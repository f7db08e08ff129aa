//! S3 output verification for a sync connection.
//!
//! Lists the destination prefix and checks whether anything was written
//! inside the recency window. Connection metadata and recent jobs are
//! fetched first for operator context; they do not gate the S3 check.

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Duration, Utc};

use crate::api::AirbyteClient;
use crate::ui;

/// How many recent objects to print.
const DISPLAY_LIMIT: usize = 10;
/// How many jobs to fetch for context.
const JOB_FETCH_LIMIT: u32 = 5;
/// How many of those to print.
const JOB_DISPLAY_LIMIT: usize = 3;

/// Arguments for the verify-s3 subcommand.
pub struct VerifyArgs {
    pub connection_id: String,
    pub bucket: Option<String>,
    pub prefix: String,
    pub hours: i64,
}

/// A single object listed under the destination prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    pub key: String,
    pub size: i64,
    pub last_modified: DateTime<Utc>,
}

/// Result of the recency check over the listed objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// At least one object inside the window, newest first.
    Fresh {
        recent: Vec<ObjectRecord>,
        total: usize,
    },
    /// Objects exist but all predate the window.
    Stale {
        latest: ObjectRecord,
        total: usize,
    },
    /// Nothing under the prefix at all.
    NoFiles,
}

/// Split listed objects by the recency cutoff.
///
/// Objects newer than `cutoff` are returned newest-first; when none
/// qualify, the single most recently modified object is surfaced so the
/// operator can see how stale the destination is.
#[must_use]
pub fn evaluate_objects(mut objects: Vec<ObjectRecord>, cutoff: DateTime<Utc>) -> CheckOutcome {
    objects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    let total = objects.len();

    let recent: Vec<ObjectRecord> = objects
        .iter()
        .filter(|o| o.last_modified > cutoff)
        .cloned()
        .collect();
    if !recent.is_empty() {
        return CheckOutcome::Fresh { recent, total };
    }

    match objects.into_iter().next() {
        Some(latest) => CheckOutcome::Stale { latest, total },
        None => CheckOutcome::NoFiles,
    }
}

/// Run the verification flow. Returns true when recent output was found.
pub async fn run(api: &AirbyteClient, args: &VerifyArgs) -> bool {
    println!("Fetching connection info for: {}", args.connection_id);
    let connection = match api.get_connection(&args.connection_id).await {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("ERROR: Failed to get connection info: {e}");
            return false;
        }
    };
    println!("Connection: {}", connection.name);
    println!("Status: {}", connection.status);

    let Some(bucket) = args.bucket.as_deref() else {
        println!("\nWARNING: --bucket not provided, cannot check S3 without bucket name");
        return false;
    };

    ui::section("RECENT SYNC JOBS");
    match api.list_jobs(&args.connection_id, JOB_FETCH_LIMIT).await {
        Ok(jobs) if jobs.is_empty() => println!("No recent jobs found"),
        Ok(jobs) => {
            for job in jobs.iter().take(JOB_DISPLAY_LIMIT) {
                println!("\nJob ID: {}", job.job_id);
                println!("Status: {}", job.status);
                if let Some(created) = &job.created_at {
                    println!("Created: {created}");
                }
                if let Some(started) = job.start_time_display() {
                    println!("Started: {started}");
                }
                if let Some(updated) = &job.last_updated_at {
                    println!("Updated: {updated}");
                }
            }
        }
        Err(e) => eprintln!("ERROR: Failed to get jobs: {e}"),
    }

    ui::section("S3 DATA VERIFICATION");
    let passed = match check_s3_files(bucket, &args.prefix, args.hours).await {
        Ok(outcome) => report_outcome(&outcome, args.hours),
        Err(e) => {
            ui::error(&format!("Error accessing S3: {e:#}"));
            false
        }
    };

    println!();
    if passed {
        ui::success("Verification successful: Data is being written to S3");
    } else {
        ui::error("Verification failed: No recent data in S3");
        println!(
            "\nPossible issues:\
             \n  1. Sync is still in progress (check job status)\
             \n  2. Destination configuration is incorrect\
             \n  3. AWS credentials are invalid\
             \n  4. Network connectivity issues"
        );
    }
    passed
}

/// List the prefix and evaluate object recency against the window.
async fn check_s3_files(bucket: &str, prefix: &str, hours: i64) -> Result<CheckOutcome> {
    let cutoff = Utc::now() - Duration::hours(hours);

    println!("\nChecking S3: s3://{bucket}/{prefix}");
    println!("Looking for files modified in last {hours} hours");
    println!("{}", "=".repeat(80));

    let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let client = S3Client::new(&sdk_config);

    let objects = list_objects(&client, bucket, prefix).await?;
    Ok(evaluate_objects(objects, cutoff))
}

/// List all objects under the prefix, following continuation tokens.
async fn list_objects(client: &S3Client, bucket: &str, prefix: &str) -> Result<Vec<ObjectRecord>> {
    let mut objects = Vec::new();
    let mut continuation: Option<String> = None;

    loop {
        let mut request = client.list_objects_v2().bucket(bucket).prefix(prefix);
        if let Some(token) = continuation.take() {
            request = request.continuation_token(token);
        }

        let page = request
            .send()
            .await
            .with_context(|| format!("Failed to list s3://{bucket}/{prefix}"))?;

        for object in page.contents() {
            let Some(key) = object.key() else { continue };
            let Some(last_modified) = object
                .last_modified()
                .and_then(|ts| DateTime::from_timestamp(ts.secs(), ts.subsec_nanos()))
            else {
                continue;
            };
            objects.push(ObjectRecord {
                key: key.to_string(),
                size: object.size().unwrap_or(0),
                last_modified,
            });
        }

        if page.is_truncated().unwrap_or(false) {
            continuation = page.next_continuation_token().map(ToString::to_string);
            if continuation.is_none() {
                break;
            }
        } else {
            break;
        }
    }

    Ok(objects)
}

fn report_outcome(outcome: &CheckOutcome, hours: i64) -> bool {
    match outcome {
        CheckOutcome::NoFiles => {
            ui::error("No files found in S3 bucket");
            false
        }
        CheckOutcome::Fresh { recent, total } => {
            println!("Total files: {total}");
            println!("Recent files (last {hours}h): {}", recent.len());
            println!();
            ui::success("Recent files found:");
            for object in recent.iter().take(DISPLAY_LIMIT) {
                print_object(object);
            }
            true
        }
        CheckOutcome::Stale { latest, total } => {
            println!("Total files: {total}");
            println!("Recent files (last {hours}h): 0");
            println!();
            ui::warning("No recent files found");
            println!("Most recent file:");
            print_object(latest);
            false
        }
    }
}

fn print_object(object: &ObjectRecord) {
    let size_mb = object.size as f64 / (1024.0 * 1024.0);
    println!(
        "  - {}\n    Size: {size_mb:.2} MB, Modified: {}",
        object.key, object.last_modified
    );
}
