//! Reconciles the node agents of a [`OnecloudCluster`].
//!
//! Each pass starts from scratch: the enablement of an agent is read from the cluster snapshot,
//! then its DaemonSet is either assembled and applied or removed. Nothing is remembered between
//! passes, so running a pass twice against the same snapshot changes nothing the second time.

mod apply;
pub mod build;
pub mod types;

use onecloud_crd::{config::OnecloudClusterConfig, ComponentType, OnecloudCluster};
use snafu::{OptionExt, ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoEnumIterator, IntoStaticStr};

use self::types::{NodeAgent, SyncOutcome};
use crate::{client::WorkloadStore, discovery::AddressResolver};

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("object has no name associated"))]
    NoName,
    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,
    #[snafu(display("object has no uid"))]
    NoUid,
    #[snafu(display("failed to build DaemonSet for {component}"))]
    Build {
        source: build::Error,
        component: ComponentType,
    },
    #[snafu(display("failed to apply DaemonSet for {component}"))]
    Apply {
        source: apply::Error,
        component: ComponentType,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Coarse classification used when reporting failed passes.
    pub fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }
}

/// Owns the collaborators every component sync needs.
pub struct ComponentManager<S, R> {
    store: S,
    resolver: R,
    config: OnecloudClusterConfig,
}

impl<S, R> ComponentManager<S, R>
where
    S: WorkloadStore,
    R: AddressResolver,
{
    pub fn new(store: S, resolver: R, config: OnecloudClusterConfig) -> Self {
        Self {
            store,
            resolver,
            config,
        }
    }

    /// Runs one reconciliation pass for a node agent.
    ///
    /// A disabled agent has its DaemonSet removed without looking at its own configuration.
    pub async fn sync(&self, agent: NodeAgent, cluster: &OnecloudCluster) -> Result<SyncOutcome> {
        let component = agent.component_type();
        tracing::info!(%component, cluster = cluster.metadata.name.as_deref(), "syncing component");

        if agent.is_disabled(cluster) {
            tracing::info!(
                %component,
                gated_by = %agent.gating_component(),
                "component is disabled, removing its DaemonSet"
            );
            let name = cluster.component_name(component).context(NoNameSnafu)?;
            let namespace = cluster
                .component_namespace()
                .context(ObjectHasNoNamespaceSnafu)?;
            let uid = cluster.metadata.uid.as_deref().context(NoUidSnafu)?;
            return apply::remove_daemon_set(&self.store, &namespace, &name, uid)
                .await
                .context(ApplySnafu { component });
        }

        let daemon_set = build::build_daemon_set(agent, cluster, &self.config, &self.resolver)
            .context(BuildSnafu { component })?;
        apply::apply_daemon_set(&self.store, daemon_set)
            .await
            .context(ApplySnafu { component })
    }

    /// Syncs every node agent. A failing agent does not keep the others from being synced.
    pub async fn sync_all(&self, cluster: &OnecloudCluster) -> Vec<(NodeAgent, Result<SyncOutcome>)> {
        let mut results = Vec::new();
        for agent in NodeAgent::iter() {
            results.push((agent, self.sync(agent, cluster).await));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::{
        api::apps::v1::DaemonSet, apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };
    use kube::Resource;

    use super::*;
    use crate::{
        client::{self, MockWorkloadStore},
        discovery::ClusterServiceResolver,
        testability_helpers::{cluster_from_yaml, InMemoryStore, StaticResolver, TELEGRAF_CLUSTER},
    };

    fn manager<S: WorkloadStore>(store: S) -> ComponentManager<S, StaticResolver> {
        ComponentManager::new(
            store,
            StaticResolver::new("http://db.svc:8086"),
            OnecloudClusterConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let cluster = cluster_from_yaml(TELEGRAF_CLUSTER);
        let manager = manager(InMemoryStore::default());

        assert_eq!(
            manager.sync(NodeAgent::Telegraf, &cluster).await.unwrap(),
            SyncOutcome::Created
        );
        assert_eq!(
            manager.sync(NodeAgent::Telegraf, &cluster).await.unwrap(),
            SyncOutcome::Unchanged
        );
        assert_eq!(manager.store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_spec_is_rolled_out() {
        let mut cluster = cluster_from_yaml(TELEGRAF_CLUSTER);
        let manager = manager(InMemoryStore::default());
        manager.sync(NodeAgent::Telegraf, &cluster).await.unwrap();

        cluster.spec.telegraf.daemon_set.component.image = "telegraf:next".to_string();
        assert_eq!(
            manager.sync(NodeAgent::Telegraf, &cluster).await.unwrap(),
            SyncOutcome::Updated
        );
        let live = manager.store.live("onecloud", "default-telegraf").unwrap();
        let pod = live.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some("telegraf:next"));
    }

    #[tokio::test]
    async fn test_disabling_dependency_removes_agent() {
        let mut cluster = cluster_from_yaml(TELEGRAF_CLUSTER);
        let manager = manager(InMemoryStore::default());
        manager.sync(NodeAgent::Telegraf, &cluster).await.unwrap();

        cluster.spec.influxdb.component.disable = true;
        assert_eq!(
            manager.sync(NodeAgent::Telegraf, &cluster).await.unwrap(),
            SyncOutcome::Deleted
        );
        assert_eq!(
            manager.sync(NodeAgent::Telegraf, &cluster).await.unwrap(),
            SyncOutcome::Absent
        );
        assert!(manager.store.live("onecloud", "default-telegraf").is_none());
    }

    #[tokio::test]
    async fn test_disabling_dependency_keeps_foreign_daemon_set() {
        let mut cluster = cluster_from_yaml(TELEGRAF_CLUSTER);
        cluster.spec.influxdb.component.disable = true;

        let store = InMemoryStore::default();
        store.seed(DaemonSet {
            metadata: ObjectMeta {
                name: Some("default-telegraf".to_string()),
                namespace: Some("onecloud".to_string()),
                ..ObjectMeta::default()
            },
            ..DaemonSet::default()
        });
        let manager = manager(store);

        assert_eq!(
            manager.sync(NodeAgent::Telegraf, &cluster).await.unwrap(),
            SyncOutcome::Absent
        );
        assert!(manager.store.live("onecloud", "default-telegraf").is_some());
        assert!(manager.store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_daemon_set_is_not_taken_over() {
        let cluster = cluster_from_yaml(TELEGRAF_CLUSTER);

        let store = InMemoryStore::default();
        store.seed(DaemonSet {
            metadata: ObjectMeta {
                name: Some("default-telegraf".to_string()),
                namespace: Some("onecloud".to_string()),
                ..ObjectMeta::default()
            },
            ..DaemonSet::default()
        });
        let manager = manager(store);

        let err = manager
            .sync(NodeAgent::Telegraf, &cluster)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "Apply");
        assert!(manager.store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_agent_is_never_created() {
        let mut cluster = cluster_from_yaml(TELEGRAF_CLUSTER);
        cluster.spec.influxdb.component.disable = true;
        cluster.spec.telegraf.daemon_set.component.image = String::new();
        cluster.spec.telegraf.init_container_image = String::new();

        let live = DaemonSet {
            metadata: ObjectMeta {
                owner_references: cluster.controller_owner_ref(&()).map(|owner| vec![owner]),
                ..ObjectMeta::default()
            },
            ..DaemonSet::default()
        };

        let mut store = MockWorkloadStore::new();
        store
            .expect_get()
            .withf(|namespace, name| namespace == "onecloud" && name == "default-telegraf")
            .times(1)
            .returning(move |_, _| Ok(Some(live.clone())));
        store
            .expect_delete()
            .withf(|namespace, name| namespace == "onecloud" && name == "default-telegraf")
            .times(1)
            .returning(|_, _| Ok(()));
        store.expect_create().never();
        store.expect_replace().never();

        // the default resolver would fail for a disabled InfluxDB
        let manager = ComponentManager::new(
            store,
            ClusterServiceResolver,
            OnecloudClusterConfig::default(),
        );
        assert_eq!(
            manager.sync(NodeAgent::Telegraf, &cluster).await.unwrap(),
            SyncOutcome::Deleted
        );
    }

    #[tokio::test]
    async fn test_store_failures_are_surfaced() {
        let cluster = cluster_from_yaml(TELEGRAF_CLUSTER);

        let mut store = MockWorkloadStore::new();
        store.expect_get().times(1).returning(|_, _| Ok(None));
        store
            .expect_create()
            .times(1)
            .returning(|_| Err(client::Error::ObjectHasNoNamespace));

        let err = manager(store)
            .sync(NodeAgent::Telegraf, &cluster)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "Apply");
        assert!(matches!(
            err,
            Error::Apply {
                component: ComponentType::Telegraf,
                source: apply::Error::CreateDaemonSet { .. },
            }
        ));
    }

    #[tokio::test]
    async fn test_construction_failure_is_fatal_before_submission() {
        let mut cluster = cluster_from_yaml(TELEGRAF_CLUSTER);
        cluster.spec.telegraf.daemon_set.max_unavailable = Some("most".to_string());

        let mut store = MockWorkloadStore::new();
        store.expect_get().never();
        store.expect_create().never();
        store.expect_replace().never();

        let err = manager(store)
            .sync(NodeAgent::Telegraf, &cluster)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "Build");
        assert!(err.to_string().contains("telegraf"));
    }

    #[tokio::test]
    async fn test_sync_all_covers_every_agent() {
        let cluster = cluster_from_yaml(TELEGRAF_CLUSTER);
        let manager = manager(InMemoryStore::default());

        let results = manager.sync_all(&cluster).await;
        assert_eq!(results.len(), NodeAgent::iter().count());
        assert!(results
            .iter()
            .all(|(_, result)| matches!(result, Ok(SyncOutcome::Created))));
    }
}
