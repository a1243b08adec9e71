//! Fixtures shared by the unit tests of the operator binary.

use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use indoc::indoc;
use k8s_openapi::api::apps::v1::DaemonSet;
use onecloud_crd::{ComponentType, OnecloudCluster};

use crate::{
    client::{self, WorkloadStore},
    discovery::{self, AddressResolver},
};

pub const TELEGRAF_CLUSTER: &str = indoc! {"
    apiVersion: onecloud.yunion.io/v1alpha1
    kind: OnecloudCluster
    metadata:
      name: default
      namespace: onecloud
      uid: 7c9d4a52-5f0e-4c8b-9f8e-1d2c3b4a5e6f
    spec:
      influxdb:
        image: registry.cn-beijing.aliyuncs.com/yunionio/influxdb:release-1.5
      telegraf:
        image: registry.cn-beijing.aliyuncs.com/yunionio/telegraf:release-1.5
        imagePullPolicy: IfNotPresent
        initContainerImage: registry.cn-beijing.aliyuncs.com/yunionio/telegraf-init:release-1.5
        nodeSelector:
          onecloud.yunion.io/host: enable
"};

pub fn cluster_from_yaml(cluster: &str) -> OnecloudCluster {
    serde_yaml::from_str(cluster).expect("invalid test input")
}

/// Hands out the same URL for every component.
pub struct StaticResolver {
    url: String,
}

impl StaticResolver {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

impl AddressResolver for StaticResolver {
    fn internal_url(
        &self,
        _component: ComponentType,
        _cluster: &OnecloudCluster,
    ) -> Result<String, discovery::Error> {
        Ok(self.url.clone())
    }
}

/// Mutating calls seen by an [`InMemoryStore`], by object name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCall {
    Create(String),
    Replace(String),
    Delete(String),
}

/// A [`WorkloadStore`] that keeps objects in memory and assigns resource versions like an API
/// server would.
#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<BTreeMap<(String, String), DaemonSet>>,
    calls: Mutex<Vec<StoreCall>>,
    revision: Mutex<u64>,
}

impl InMemoryStore {
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Puts an object into the store without recording a call, like one created by someone else.
    pub fn seed(&self, daemon_set: DaemonSet) {
        self.persist(&daemon_set);
    }

    pub fn live(&self, namespace: &str, name: &str) -> Option<DaemonSet> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn key(daemon_set: &DaemonSet) -> (String, String) {
        (
            daemon_set.metadata.namespace.clone().unwrap(),
            daemon_set.metadata.name.clone().unwrap(),
        )
    }

    fn next_revision(&self) -> String {
        let mut revision = self.revision.lock().unwrap();
        *revision += 1;
        revision.to_string()
    }

    /// Stores the object the way the API server would hand it back.
    fn persist(&self, daemon_set: &DaemonSet) -> DaemonSet {
        let mut stored = daemon_set.clone();
        stored.metadata.resource_version = Some(self.next_revision());
        // fields the server fills in on its own must not count as drift
        stored.metadata.generation = Some(stored.metadata.generation.unwrap_or(0) + 1);
        if let Some(pod) = stored
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
        {
            pod.scheduler_name.get_or_insert_with(|| "default-scheduler".to_string());
            pod.termination_grace_period_seconds.get_or_insert(30);
        }
        self.objects
            .lock()
            .unwrap()
            .insert(Self::key(daemon_set), stored.clone());
        stored
    }
}

#[async_trait]
impl WorkloadStore for InMemoryStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>, client::Error> {
        Ok(self.live(namespace, name))
    }

    async fn create(&self, daemon_set: &DaemonSet) -> Result<DaemonSet, client::Error> {
        let (namespace, name) = Self::key(daemon_set);
        assert!(
            self.live(&namespace, &name).is_none(),
            "{namespace}/{name} already exists"
        );
        self.calls.lock().unwrap().push(StoreCall::Create(name));
        Ok(self.persist(daemon_set))
    }

    async fn replace(&self, daemon_set: &DaemonSet) -> Result<DaemonSet, client::Error> {
        let (namespace, name) = Self::key(daemon_set);
        let live = self
            .live(&namespace, &name)
            .unwrap_or_else(|| panic!("{namespace}/{name} does not exist"));
        assert_eq!(
            live.metadata.resource_version, daemon_set.metadata.resource_version,
            "stale resourceVersion for {namespace}/{name}"
        );
        self.calls.lock().unwrap().push(StoreCall::Replace(name));
        Ok(self.persist(daemon_set))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), client::Error> {
        self.objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Delete(name.to_string()));
        Ok(())
    }
}
