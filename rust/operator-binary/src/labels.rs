//! Recommended labels shared by every object the operator assembles.

use std::collections::BTreeMap;

use onecloud_crd::{ComponentType, APP_NAME, OPERATOR_NAME};

pub const K8S_NAME: &str = "app.kubernetes.io/name";
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Labels identifying the pods of one component of one cluster.
///
/// Also used as the workload selector, so the set must stay stable across operator versions.
pub fn component_selector_labels(
    cluster_name: &str,
    component: ComponentType,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_NAME.to_string(), APP_NAME.to_string()),
        (K8S_INSTANCE.to_string(), cluster_name.to_string()),
        (K8S_COMPONENT.to_string(), component.to_string()),
    ])
}

pub fn component_labels(cluster_name: &str, component: ComponentType) -> BTreeMap<String, String> {
    let mut labels = component_selector_labels(cluster_name, component);
    labels.insert(K8S_MANAGED_BY.to_string(), OPERATOR_NAME.to_string());
    labels
}
