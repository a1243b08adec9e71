//! Assembles the per-node workloads of a cluster.
//!
//! Every node agent contributes its volumes and containers, [`new_daemon_set`] wraps them into a
//! DaemonSet and applies the policy all agents share: naming, labels, ownership, the operator
//! service account, placement and rollout.

mod telegraf;
pub mod volume;

use std::collections::BTreeSet;

use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, DaemonSetSpec},
        core::v1::{Container, LocalObjectReference, PodSpec, PodTemplateSpec, VolumeMount},
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};
use kube::Resource;
use onecloud_crd::{
    config::OnecloudClusterConfig, workload::DaemonSetSpec as DaemonSetShape, ComponentType,
    OnecloudCluster, SERVICE_ACCOUNT_ONECLOUD_OPERATOR,
};
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};

use self::volume::VolumeHelper;
use super::types::NodeAgent;
use crate::{
    discovery::{self, AddressResolver},
    labels::{component_labels, component_selector_labels},
};

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("object has no name associated"))]
    NoName,
    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,
    #[snafu(display("object is missing metadata to build owner reference"))]
    ObjectMissingMetadataForOwnerRef,
    #[snafu(display("invalid update strategy"))]
    InvalidUpdateStrategy {
        source: onecloud_crd::workload::Error,
    },
    #[snafu(display("container {container} mounts undeclared volume {volume}"))]
    UndeclaredVolume { container: String, volume: String },
    #[snafu(display("failed to resolve the internal address of {dependency}"))]
    ResolveDependency {
        source: discovery::Error,
        dependency: ComponentType,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Builds the DaemonSet of a node agent. Each agent contributes its own volumes and containers.
pub fn build_daemon_set(
    agent: NodeAgent,
    cluster: &OnecloudCluster,
    config: &OnecloudClusterConfig,
    resolver: &impl AddressResolver,
) -> Result<DaemonSet> {
    match agent {
        NodeAgent::Telegraf => telegraf::build_telegraf_daemon_set(cluster, config, resolver),
    }
}

/// Wraps the containers of a component into a DaemonSet named `<cluster>-<component>`.
///
/// `containers_factory` receives the mounts of all `volumes`, so components can decide which
/// containers get which mounts without knowing how the volumes are declared.
#[allow(clippy::too_many_arguments)]
pub fn new_daemon_set(
    component: ComponentType,
    cluster: &OnecloudCluster,
    config: &OnecloudClusterConfig,
    volumes: &VolumeHelper,
    shape: &DaemonSetShape,
    host_network: bool,
    init_containers: Vec<Container>,
    containers_factory: impl FnOnce(&[VolumeMount]) -> Vec<Container>,
) -> Result<DaemonSet> {
    let cluster_name = cluster.metadata.name.as_deref().context(NoNameSnafu)?;
    let name = cluster.component_name(component).context(NoNameSnafu)?;
    let namespace = cluster
        .component_namespace()
        .context(ObjectHasNoNamespaceSnafu)?;
    let owner_reference = cluster
        .controller_owner_ref(&())
        .context(ObjectMissingMetadataForOwnerRefSnafu)?;
    let update_strategy = shape
        .update_strategy()
        .context(InvalidUpdateStrategySnafu)?;

    let containers = containers_factory(volumes.volume_mounts());
    check_volume_mounts(volumes, init_containers.iter().chain(&containers))?;

    let labels = component_labels(cluster_name, component);

    Ok(DaemonSet {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference]),
            ..ObjectMeta::default()
        },
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(component_selector_labels(cluster_name, component)),
                ..LabelSelector::default()
            },
            update_strategy: Some(update_strategy),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: (!shape.annotations.is_empty())
                        .then(|| shape.annotations.clone()),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    init_containers: non_empty(init_containers),
                    containers,
                    volumes: non_empty(volumes.volumes().to_vec()),
                    // not configurable per component
                    service_account_name: Some(SERVICE_ACCOUNT_ONECLOUD_OPERATOR.to_string()),
                    image_pull_secrets: non_empty(
                        config
                            .image_pull_secrets
                            .iter()
                            .map(|name| LocalObjectReference { name: name.clone() })
                            .collect(),
                    ),
                    priority_class_name: config.priority_class_name.clone(),
                    node_selector: (!shape.node_selector.is_empty())
                        .then(|| shape.node_selector.clone()),
                    affinity: shape.affinity.clone(),
                    tolerations: non_empty(shape.tolerations.clone()),
                    host_network: host_network.then_some(true),
                    dns_policy: host_network.then(|| "ClusterFirstWithHostNet".to_string()),
                    restart_policy: Some("Always".to_string()),
                    ..PodSpec::default()
                }),
            },
            ..DaemonSetSpec::default()
        }),
        status: None,
    })
}

fn check_volume_mounts<'a>(
    volumes: &VolumeHelper,
    containers: impl IntoIterator<Item = &'a Container>,
) -> Result<()> {
    let declared: BTreeSet<&str> = volumes.volumes().iter().map(|v| v.name.as_str()).collect();

    for container in containers {
        for mount in container.volume_mounts.iter().flatten() {
            ensure!(
                declared.contains(mount.name.as_str()),
                UndeclaredVolumeSnafu {
                    container: &container.name,
                    volume: &mount.name,
                }
            );
        }
    }
    Ok(())
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}
