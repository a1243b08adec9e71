//! Operator-wide settings applied uniformly to every assembled workload.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnecloudClusterConfig {
    /// Names of Secrets in the cluster namespace used to pull component images.
    #[serde(default)]
    pub image_pull_secrets: Vec<String>,
    #[serde(default)]
    pub priority_class_name: Option<String>,
}
