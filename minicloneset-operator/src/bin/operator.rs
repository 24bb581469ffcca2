//! MiniCloneSet Kubernetes Operator binary.
//!
//! `run` watches MiniCloneSets and the pods they own; `crds` prints the
//! multi-version CRD.

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use minicloneset_operator::config::{ReconcilerArgs, ReconcilerConfig};
use minicloneset_operator::controller::{error_policy, reconcile, ControllerContext};
use minicloneset_operator::crd::{MiniCloneSet, SchemeRegistry, WebhookService};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "minicloneset-operator")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the MiniCloneSet CRD as YAML
    Crds {
        /// Service fronting the conversion webhook; enables webhook conversion
        #[arg(long)]
        webhook_service: Option<String>,

        /// Namespace of the webhook service
        #[arg(long, default_value = "default")]
        webhook_namespace: String,

        /// Port of the webhook service
        #[arg(long, default_value_t = 443)]
        webhook_port: i32,

        /// PEM file with the CA that signed the webhook certificate
        #[arg(long)]
        webhook_ca_bundle: Option<std::path::PathBuf>,
    },

    /// Run the controller
    Run {
        #[command(flatten)]
        reconciler: ReconcilerArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("minicloneset_operator=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let registry = SchemeRegistry::new();

    match cli.command {
        Command::Crds {
            webhook_service,
            webhook_namespace,
            webhook_port,
            webhook_ca_bundle,
        } => {
            let crd = match webhook_service {
                Some(name) => {
                    let ca_bundle = match webhook_ca_bundle {
                        Some(path) => Some(std::fs::read(path)?),
                        None => None,
                    };
                    registry.crd_with_webhook(&WebhookService {
                        name,
                        namespace: webhook_namespace,
                        port: webhook_port,
                        ca_bundle,
                    })?
                }
                None => registry.crd()?,
            };
            println!("---");
            println!("{}", serde_yaml::to_string(&crd)?);
            Ok(())
        }
        Command::Run { reconciler } => run(ReconcilerConfig::try_from(reconciler)?).await,
    }
}

/// Run the MiniCloneSet controller until a shutdown signal arrives.
async fn run(config: ReconcilerConfig) -> anyhow::Result<()> {
    tracing::info!(?config, "Starting MiniCloneSet operator");

    let client = Client::try_default().await?;
    tracing::info!("Connected to Kubernetes cluster");

    let ctx = Arc::new(ControllerContext::from_client(client.clone(), config));
    let clone_sets: Api<MiniCloneSet> = Api::all(client.clone());
    let pods: Api<Pod> = Api::all(client);

    Controller::new(clone_sets, WatcherConfig::default())
        .owns(pods, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(
                        name = %obj.name,
                        namespace = ?obj.namespace,
                        ?action,
                        "Reconciled MiniCloneSet"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "MiniCloneSet controller stream error");
                }
            }
        })
        .await;

    tracing::info!("MiniCloneSet operator stopped");
    Ok(())
}
