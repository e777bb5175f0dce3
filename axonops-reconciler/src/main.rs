//! axonops-reconciler: converges AxonOps alerting, health check, backup and
//! integration settings from a JSON document of descriptors.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use axonops_reconciler::{ClusterType, Connection, Engine, Resource};

/// AxonOps configuration reconciler
#[derive(Parser, Debug)]
#[command(name = "axonops-reconciler", version, about)]
struct Args {
    /// JSON file holding an array of resource descriptors
    file: PathBuf,

    /// Organization (falls back to AXONOPS_ORG)
    #[arg(long)]
    org: Option<String>,

    /// Cluster name (falls back to AXONOPS_CLUSTER)
    #[arg(long)]
    cluster: Option<String>,

    /// Cluster type: cassandra or kafka (falls back to AXONOPS_CLUSTER_TYPE)
    #[arg(long)]
    cluster_type: Option<ClusterType>,

    /// Control-plane base URL (falls back to AXONOPS_URL, then AxonOps Cloud)
    #[arg(long)]
    base_url: Option<String>,

    /// Append the organization to the base URL
    #[arg(long)]
    override_saas: bool,

    /// Bearer token (falls back to AXONOPS_TOKEN)
    #[arg(long)]
    auth_token: Option<String>,

    /// API token (falls back to AXONOPS_API_TOKEN)
    #[arg(long)]
    api_token: Option<String>,

    /// Login username (falls back to AXONOPS_USERNAME)
    #[arg(long)]
    username: Option<String>,

    /// Login password (falls back to AXONOPS_PASSWORD)
    #[arg(long)]
    password: Option<String>,
}

impl Args {
    fn connection(&self) -> Connection {
        Connection {
            org: self.org.clone(),
            cluster: self.cluster.clone(),
            cluster_type: self.cluster_type,
            base_url: self.base_url.clone(),
            auth_token: self.auth_token.clone(),
            api_token: self.api_token.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            override_saas: self.override_saas.then_some(true),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "axonops_reconciler=info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let document = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let resources: Vec<Resource> = serde_json::from_str(&document)
        .with_context(|| format!("Failed to parse descriptors in {}", args.file.display()))?;

    info!(
        "Loaded {} resource(s) from {}",
        resources.len(),
        args.file.display()
    );

    let engine = Engine::new(args.connection());
    let report = engine.run(&resources).await;

    for applied in &report.applied {
        info!(
            "{} {} ({}): {}",
            applied.kind, applied.key, applied.cluster, applied.outcome
        );
    }

    if let Some(failure) = report.failure {
        error!("{}", failure);
        let skipped = resources.len() - report.applied.len() - 1;
        bail!(
            "reconciliation failed after {} resource(s), {} not attempted: {}",
            report.applied.len(),
            skipped,
            failure
        );
    }

    info!(
        "All {} resource(s) converged, {} changed",
        report.applied.len(),
        report.changed()
    );
    Ok(())
}
