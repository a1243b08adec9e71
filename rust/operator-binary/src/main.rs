use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use kube::{Api, CustomResourceExt};
use onecloud_crd::{config::OnecloudClusterConfig, OnecloudCluster, OPERATOR_NAME};
use strum::IntoEnumIterator;
use tracing_subscriber::EnvFilter;

use crate::{
    client::KubeWorkloadStore,
    controller::{build::build_daemon_set, types::NodeAgent, ComponentManager},
    discovery::ClusterServiceResolver,
};

mod client;
mod controller;
mod discovery;
mod labels;
#[cfg(test)]
mod testability_helpers;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

const LOG_ENV: &str = "ONECLOUD_OPERATOR_LOG";

#[derive(Parser)]
#[clap(about, author, version = built_info::PKG_VERSION)]
struct Opts {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the OnecloudCluster CustomResourceDefinition as YAML
    Crd,
    /// Print the DaemonSets of all enabled node agents of a cluster without touching the API server
    Render {
        /// OnecloudCluster manifest to render
        #[clap(long)]
        cluster: PathBuf,
        #[clap(flatten)]
        config: ConfigArgs,
    },
    /// Run a single reconciliation pass for every node agent of a cluster
    Sync {
        /// Name of the OnecloudCluster
        #[clap(long)]
        name: String,
        /// Namespace of the OnecloudCluster, defaults to the namespace of the kubeconfig context
        #[clap(long, env = "WATCH_NAMESPACE")]
        namespace: Option<String>,
        #[clap(flatten)]
        config: ConfigArgs,
    },
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// Operator configuration (image pull secrets, priority class)
    #[clap(long = "config", env = "ONECLOUD_OPERATOR_CONFIG")]
    path: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(&self) -> anyhow::Result<OnecloudClusterConfig> {
        match &self.path {
            Some(path) => read_yaml(path),
            None => Ok(OnecloudClusterConfig::default()),
        }
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    serde_yaml::from_reader(file).with_context(|| format!("failed to parse {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    match opts.cmd {
        Command::Crd => print!("{}", serde_yaml::to_string(&OnecloudCluster::crd())?),
        Command::Render { cluster, config } => {
            let cluster: OnecloudCluster = read_yaml(&cluster)?;
            let config = config.load()?;

            let mut documents = Vec::new();
            for agent in NodeAgent::iter().filter(|agent| !agent.is_disabled(&cluster)) {
                let daemon_set =
                    build_daemon_set(agent, &cluster, &config, &ClusterServiceResolver)
                        .with_context(|| format!("failed to render {agent}"))?;
                documents.push(serde_yaml::to_string(&daemon_set)?);
            }
            print!("{}", documents.join("---\n"));
        }
        Command::Sync {
            name,
            namespace,
            config,
        } => {
            tracing::info!(
                built_info.pkg_version = built_info::PKG_VERSION,
                built_info.target = built_info::TARGET,
                built_info.rustc_version = built_info::RUSTC_VERSION,
                "Starting {OPERATOR_NAME}"
            );

            let config = config.load()?;
            let client = kube::Client::try_default()
                .await
                .context("failed to create Kubernetes client")?;
            let namespace =
                namespace.unwrap_or_else(|| client.default_namespace().to_string());
            let cluster = Api::<OnecloudCluster>::namespaced(client.clone(), &namespace)
                .get(&name)
                .await
                .with_context(|| format!("failed to get OnecloudCluster {namespace}/{name}"))?;

            let manager = ComponentManager::new(
                KubeWorkloadStore::new(client),
                ClusterServiceResolver,
                config,
            );

            let mut failed = 0;
            for (agent, result) in manager.sync_all(&cluster).await {
                match result {
                    Ok(outcome) => tracing::info!(%agent, %outcome, "synced node agent"),
                    Err(error) => {
                        failed += 1;
                        tracing::error!(
                            %agent,
                            category = error.category(),
                            error = &error as &(dyn std::error::Error + 'static),
                            "failed to sync node agent"
                        );
                    }
                }
            }
            anyhow::ensure!(failed == 0, "{failed} node agent(s) failed to sync");
        }
    }

    Ok(())
}
