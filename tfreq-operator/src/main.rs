//! # tfreq-operator
//!
//! Watches `TerraformRequest` resources and runs each one as a single-shot
//! Terraform Job, recording the outcome in the request's `status.applied`.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Args as ClapArgs, Parser, Subcommand};
use k8s_openapi::api::batch::v1::Job;
use kube::{
    Api, Client, CustomResourceExt,
    runtime::{WatchStreamExt, reflector, watcher},
};
use tfreq_config::{ConfigLoad, ConfigLoader};
use tfreq_core::{OwnershipIndex, Reconciler};
use tfreq_model::TerraformRequest;
use tfreq_operator::infra::{self, Context, IndexFeed, KubeClusterStore};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "tfreq-operator")]
#[command(about = "Runs TerraformRequest resources as Kubernetes Jobs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct RunArgs {
    /// Path to the TOML configuration file
    #[arg(long, env = "TFREQ_CONFIG")]
    config: Option<PathBuf>,

    /// Path to a .env file (defaults to ./.env when present)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Namespace to watch (overrides config; all namespaces when unset)
    #[arg(long, env = "TFREQ_WATCH_NAMESPACE")]
    namespace: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the controller (default)
    Run,
    /// Print the TerraformRequest CustomResourceDefinition as JSON and exit
    Crd,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Crd => print_crd(),
        Command::Run => run_operator(cli.run).await,
    }
}

fn print_crd() -> anyhow::Result<()> {
    let crd = serde_json::to_string_pretty(&TerraformRequest::crd())
        .context("failed to serialize CustomResourceDefinition")?;
    println!("{crd}");
    Ok(())
}

fn load_runtime_config(
    args: &RunArgs,
) -> anyhow::Result<tfreq_config::Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &args.env_file {
        loader = loader.with_env_file(path);
    }

    let ConfigLoad {
        mut config,
        warnings,
    } = loader.load().context("failed to load configuration")?;

    if let Some(namespace) = args.namespace.clone() {
        config.controller.watch_namespace = Some(namespace);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }

    info!(
        controller.watch_namespace =
            config.controller.watch_namespace.as_deref().unwrap_or("<all>"),
        controller.max_concurrent_reconciles =
            config.controller.max_concurrent_reconciles,
        controller.requeue_delay = ?config.controller.requeue_delay,
        controller.running_poll_interval =
            ?config.controller.running_poll_interval,
        job.image = %config.reconciler_settings().job_template.image(),
        "controller configuration in effect"
    );

    Ok(config)
}

async fn run_operator(args: RunArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(&args)?;

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    let (requests, jobs): (Api<TerraformRequest>, Api<Job>) =
        match config.controller.watch_namespace.as_deref() {
            Some(namespace) => (
                Api::namespaced(client.clone(), namespace),
                Api::namespaced(client.clone(), namespace),
            ),
            None => (Api::all(client.clone()), Api::all(client.clone())),
        };

    let index = OwnershipIndex::new();
    let (job_cache, job_writer) = reflector::store::<Job>();
    let job_events =
        reflector(job_writer, watcher(jobs.clone(), watcher::Config::default()))
            .default_backoff();
    let feed = tokio::spawn(IndexFeed::new(index.clone()).run(job_events));

    job_cache
        .wait_until_ready()
        .await
        .context("job cache closed before initial sync")?;
    info!(jobs = index.len(), "job cache synced");

    let store = Arc::new(KubeClusterStore::new(
        client,
        job_cache,
        config.controller.field_manager.clone(),
    ));
    let ctx = Arc::new(Context {
        reconciler: Reconciler::new(
            store,
            index,
            config.reconciler_settings(),
        ),
        running_poll_interval: config.controller.running_poll_interval,
        error_backoff: config.controller.error_backoff,
    });

    infra::controller::run(
        requests,
        jobs,
        ctx,
        config.controller.max_concurrent_reconciles,
    )
    .await;

    feed.abort();
    Ok(())
}
