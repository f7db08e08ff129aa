//! Operator diagnostics for a local Airbyte deployment.
//!
//! Two subcommands cover the usual "is my sync actually working" loop:
//! `verify-s3` lists the destination bucket and checks that output landed
//! recently, `diagnose` runs a battery of health checks against the API,
//! job history, and the abctl-managed cluster, then prints a pass/fail
//! summary with recommended actions.

mod api;
mod cmd;
mod diagnose;
mod kube;
mod ui;
mod verify;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use api::{AirbyteClient, DEFAULT_API_URL};
use kube::{default_kubeconfig, KubeCli, AIRBYTE_NAMESPACE};

/// Operator diagnostics for a local Airbyte deployment.
#[derive(Parser)]
#[command(
    name = "airbyte-doctor",
    version,
    about = "Operator diagnostics for a local Airbyte deployment"
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Base URL of the Airbyte public API.
    #[arg(long, default_value = DEFAULT_API_URL, global = true)]
    api_url: String,

    /// Airbyte API bearer token.
    #[arg(
        long,
        env = "AIRBYTE_SECRET_ACCESS_TOKEN",
        hide_env_values = true,
        global = true
    )]
    api_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify that sync output is landing in S3.
    VerifyS3 {
        /// Airbyte connection ID
        connection_id: String,

        /// S3 bucket name
        #[arg(long)]
        bucket: Option<String>,

        /// S3 prefix to check under
        #[arg(long, default_value = "raw")]
        prefix: String,

        /// Look for files modified in the last N hours
        #[arg(long, default_value = "48")]
        hours: i64,
    },
    /// Run the full diagnostic battery for a connection.
    Diagnose {
        /// Airbyte connection ID to diagnose
        connection_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("airbyte_doctor=debug"))
            .with_target(false)
            .init();
    }

    let Some(token) = cli.api_token else {
        eprintln!("ERROR: AIRBYTE_SECRET_ACCESS_TOKEN environment variable not set");
        std::process::exit(1);
    };

    let api = match AirbyteClient::new(&cli.api_url, token) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            std::process::exit(1);
        }
    };

    let passed = match cli.command {
        Commands::VerifyS3 {
            connection_id,
            bucket,
            prefix,
            hours,
        } => {
            verify::run(
                &api,
                &verify::VerifyArgs {
                    connection_id,
                    bucket,
                    prefix,
                    hours,
                },
            )
            .await
        }
        Commands::Diagnose { connection_id } => {
            let kube = KubeCli::new(default_kubeconfig(), AIRBYTE_NAMESPACE);
            diagnose::run(api, kube, &connection_id).await
        }
    };

    if !passed {
        std::process::exit(1);
    }
}
