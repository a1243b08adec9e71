//! Telegraf collects host metrics on every node and ships them to InfluxDB.

use k8s_openapi::api::{
    apps::v1::DaemonSet,
    core::v1::{Container, EnvVar, EnvVarSource, ObjectFieldSelector, VolumeMount},
};
use onecloud_crd::{config::OnecloudClusterConfig, ComponentType, OnecloudCluster, TelegrafSpec};
use snafu::ResultExt;

use super::{
    new_daemon_set,
    volume::{HostPathType, HostPathVolume, VolumeHelper},
    Error, ResolveDependencySnafu,
};
use crate::discovery::AddressResolver;

const TELEGRAF_BINARY: &str = "/usr/bin/telegraf";
const TELEGRAF_INIT_BINARY: &str = "/bin/telegraf-init";
const TELEGRAF_CONFIG_FILE: &str = "/etc/telegraf/telegraf.conf";
const TELEGRAF_CONFIG_DIRECTORY: &str = "/etc/telegraf/telegraf.d";

pub const ETC_TELEGRAF_VOLUME: &str = "etc-telegraf";

pub const ENV_NODENAME: &str = "NODENAME";
pub const ENV_INFLUXDB_URL: &str = "INFLUXDB_URL";

/// Builds the telegraf DaemonSet. Telegraf has to see the host network to report node metrics.
pub fn build_telegraf_daemon_set(
    cluster: &OnecloudCluster,
    config: &OnecloudClusterConfig,
    resolver: &impl AddressResolver,
) -> Result<DaemonSet, Error> {
    let component = ComponentType::Telegraf;
    let spec = &cluster.spec.telegraf;

    let influxdb_url = resolver
        .internal_url(ComponentType::Influxdb, cluster)
        .context(ResolveDependencySnafu {
            dependency: ComponentType::Influxdb,
        })?;

    let volumes = telegraf_volumes();
    let init_containers = vec![build_init_container(spec, &volumes, influxdb_url)];

    new_daemon_set(
        component,
        cluster,
        config,
        &volumes,
        &spec.daemon_set,
        true,
        init_containers,
        |volume_mounts| vec![build_main_container(spec, volume_mounts)],
    )
}

/// The host directories telegraf reads from or writes to, in mount order.
pub fn telegraf_volumes() -> VolumeHelper {
    let mut helper = VolumeHelper::new();
    helper
        .add_host_path(HostPathVolume::same_path(
            ETC_TELEGRAF_VOLUME,
            "/etc/telegraf",
            HostPathType::DirectoryOrCreate,
        ))
        .add_host_path(HostPathVolume::same_path(
            "proc",
            "/proc",
            HostPathType::Directory,
        ))
        .add_host_path(HostPathVolume::same_path(
            "sys",
            "/sys",
            HostPathType::Directory,
        ))
        .add_host_path(HostPathVolume::same_path(
            "log",
            "/var/log/telegraf",
            HostPathType::DirectoryOrCreate,
        ))
        .add_host_path(HostPathVolume::same_path(
            "run",
            "/var/run",
            HostPathType::Directory,
        ));
    helper
}

fn build_main_container(spec: &TelegrafSpec, volume_mounts: &[VolumeMount]) -> Container {
    Container {
        name: ComponentType::Telegraf.to_string(),
        // no default image, an empty image is rejected by the API server
        image: Some(spec.daemon_set.component.image.clone()),
        image_pull_policy: spec.daemon_set.component.image_pull_policy.clone(),
        command: Some(vec![
            TELEGRAF_BINARY.to_string(),
            "-config".to_string(),
            TELEGRAF_CONFIG_FILE.to_string(),
            "-config-directory".to_string(),
            TELEGRAF_CONFIG_DIRECTORY.to_string(),
        ]),
        volume_mounts: Some(volume_mounts.to_vec()),
        ..Container::default()
    }
}

/// The init container renders the telegraf configuration for the node it runs on.
fn build_init_container(
    spec: &TelegrafSpec,
    volumes: &VolumeHelper,
    influxdb_url: String,
) -> Container {
    Container {
        name: format!("{}-init", ComponentType::Telegraf),
        image: Some(spec.init_container_image.clone()),
        image_pull_policy: spec.daemon_set.component.image_pull_policy.clone(),
        command: Some(vec![TELEGRAF_INIT_BINARY.to_string()]),
        volume_mounts: Some(volumes.volume_mount(ETC_TELEGRAF_VOLUME).into_iter().collect()),
        env: Some(vec![
            EnvVar {
                name: ENV_NODENAME.to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "spec.nodeName".to_string(),
                        ..ObjectFieldSelector::default()
                    }),
                    ..EnvVarSource::default()
                }),
                ..EnvVar::default()
            },
            EnvVar {
                name: ENV_INFLUXDB_URL.to_string(),
                value: Some(influxdb_url),
                ..EnvVar::default()
            },
        ]),
        ..Container::default()
    }
}
