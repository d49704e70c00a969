//! Binder - resolves service binding data from custom resources

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kube::ResourceExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use binder_common::kube_utils::create_client;
use binder_common::telemetry::{init_logging, LogFormat};
use binder_retriever::{
    ItemSelection, KubeResourceClient, Plan, PublishOutcome, Retrieved, Retriever,
    RetrieverConfig, DEFAULT_FETCH_CONCURRENCY,
};

/// Binder - collects binding data for a custom resource into one secret
#[derive(Parser, Debug)]
#[command(name = "binder", version, about, long_about = None)]
struct Cli {
    /// Log output format (text or json)
    #[arg(long, global = true, env = "BINDER_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one retrieval for a plan and publish the aggregate secret
    ///
    /// The plan names the target namespace and secret, carries a snapshot of
    /// the custom resource, and lists the spec and status descriptors of its
    /// CRD.
    Retrieve(RetrieveArgs),
}

/// Retrieve mode arguments
#[derive(Parser, Debug)]
struct RetrieveArgs {
    /// Path to the plan file (YAML or JSON)
    #[arg(short = 'f', long = "plan")]
    plan: PathBuf,

    /// Path to kubeconfig (defaults to in-cluster or ~/.kube/config)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Prefix prepended to every aggregate key
    #[arg(long, env = "BINDER_PREFIX")]
    binding_prefix: Option<String>,

    /// Which keys of referenced resources are bound (requested or all)
    #[arg(long, env = "BINDER_ITEM_SELECTION", default_value = "requested")]
    item_selection: ItemSelection,

    /// Maximum number of secrets and config maps fetched at once
    #[arg(long, env = "BINDER_FETCH_CONCURRENCY", default_value_t = DEFAULT_FETCH_CONCURRENCY)]
    fetch_concurrency: usize,
}

impl RetrieveArgs {
    fn retriever_config(&self) -> RetrieverConfig {
        let config = RetrieverConfig::default()
            .with_item_selection(self.item_selection)
            .with_fetch_concurrency(self.fetch_concurrency);
        match &self.binding_prefix {
            Some(prefix) => config.with_binding_prefix(prefix.clone()),
            None => config,
        }
    }
}

/// Printed after a successful run
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    secret: String,
    outcome: &'static str,
    objects: Vec<ObjectSummary>,
    volume_keys: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ObjectSummary {
    kind: String,
    namespace: String,
    name: String,
}

impl Summary {
    fn new(plan: &Plan, retrieved: &Retrieved) -> Self {
        Self {
            secret: format!("{}/{}", plan.namespace, plan.name),
            outcome: match retrieved.outcome {
                PublishOutcome::Created => "created",
                PublishOutcome::Updated => "updated",
            },
            objects: retrieved
                .objects
                .iter()
                .map(|obj| ObjectSummary {
                    kind: obj
                        .types
                        .as_ref()
                        .map(|t| t.kind.clone())
                        .unwrap_or_default(),
                    namespace: obj.namespace().unwrap_or_default(),
                    name: obj.name_any(),
                })
                .collect(),
            volume_keys: retrieved.volume_keys.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_format).context("failed to initialize logging")?;

    match cli.command {
        Commands::Retrieve(args) => run_retrieve(args).await,
    }
}

async fn run_retrieve(args: RetrieveArgs) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(&args.plan)
        .await
        .with_context(|| format!("failed to read plan {}", args.plan.display()))?;
    let plan = Plan::from_yaml(&raw)?;

    let client = create_client(args.kubeconfig.as_deref()).await?;

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling retrieval");
            shutdown.cancel();
        }
    });

    info!(
        namespace = %plan.namespace,
        name = %plan.name,
        cr = %plan.cr_name(),
        "Starting retrieval"
    );
    let mut retriever = Retriever::new(
        Arc::new(KubeResourceClient::new(client)),
        args.retriever_config(),
    )
    .with_cancellation(token);
    let retrieved = retriever.retrieve(&plan).await?;

    let summary = serde_yaml::to_string(&Summary::new(&plan, &retrieved))
        .context("failed to serialize summary")?;
    print!("{summary}");
    Ok(())
}
