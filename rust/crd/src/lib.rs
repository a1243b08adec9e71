pub mod config;
pub mod workload;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::workload::{ComponentSpec, DaemonSetSpec};

pub const APP_NAME: &str = "onecloud-cluster";
pub const OPERATOR_NAME: &str = "onecloud-operator";
pub const FIELD_MANAGER: &str = "onecloud-operator";

/// Every workload assembled by the operator runs under this service account.
pub const SERVICE_ACCOUNT_ONECLOUD_OPERATOR: &str = "onecloud-operator";

pub const INFLUXDB_PORT: u16 = 8086;

#[derive(Clone, CustomResource, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "onecloud.yunion.io",
    version = "v1alpha1",
    kind = "OnecloudCluster",
    plural = "onecloudclusters",
    shortname = "oc",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct OnecloudClusterSpec {
    /// The InfluxDB time series database. Disabling it also removes telegraf from every node.
    #[serde(default)]
    pub influxdb: InfluxdbSpec,
    /// The telegraf agent collecting host metrics on every node and shipping them to InfluxDB.
    #[serde(default)]
    pub telegraf: TelegrafSpec,
}

/// The identity of a component managed by the operator.
///
/// The string form is used for object names (`<cluster>-<component>`) and as the value of the
/// `app.kubernetes.io/component` label, so it must never change for an existing variant.
#[derive(
    Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, IntoStaticStr, Ord, PartialEq, PartialOrd,
)]
pub enum ComponentType {
    #[strum(serialize = "influxdb")]
    Influxdb,
    #[strum(serialize = "telegraf")]
    Telegraf,
}

#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfluxdbSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default = "default_influxdb_port")]
    pub port: u16,
}

impl Default for InfluxdbSpec {
    fn default() -> Self {
        Self {
            component: ComponentSpec::default(),
            port: INFLUXDB_PORT,
        }
    }
}

fn default_influxdb_port() -> u16 {
    INFLUXDB_PORT
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegrafSpec {
    #[serde(flatten)]
    pub daemon_set: DaemonSetSpec,
    #[serde(default)]
    pub init_container_image: String,
}

impl OnecloudClusterSpec {
    /// Returns the configuration block shared by every component type.
    pub fn component(&self, component: ComponentType) -> &ComponentSpec {
        match component {
            ComponentType::Influxdb => &self.influxdb.component,
            ComponentType::Telegraf => &self.telegraf.daemon_set.component,
        }
    }
}

impl OnecloudCluster {
    /// Returns the object name `<cluster>-<component>`, or `None` if the cluster has no name.
    pub fn component_name(&self, component: ComponentType) -> Option<String> {
        self.metadata
            .name
            .as_deref()
            .map(|cluster| format!("{cluster}-{component}"))
    }

    /// Returns the namespace all component objects of this cluster live in.
    pub fn component_namespace(&self) -> Option<String> {
        self.namespace()
    }
}
