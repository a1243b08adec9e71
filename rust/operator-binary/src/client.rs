//! Access to the live DaemonSets of the cluster.
//!
//! The reconciliation logic only talks to [`WorkloadStore`], so it can be exercised without an
//! API server.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::{
    api::{DeleteParams, PostParams},
    Api, Client, ResourceExt,
};
use onecloud_crd::FIELD_MANAGER;
use snafu::{OptionExt, ResultExt, Snafu};

#[cfg(test)]
use mockall::automock;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(display("object has no name associated"))]
    NoName,
    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,
    #[snafu(display("request to the Kubernetes API failed"))]
    KubeRequest { source: kube::Error },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Reads and writes DaemonSets, keyed by namespace and name.
///
/// Implementations surface failures as they are, retrying is up to the caller.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>>;

    async fn create(&self, daemon_set: &DaemonSet) -> Result<DaemonSet>;

    /// Replaces the whole object, `metadata.resourceVersion` must match the live object.
    async fn replace(&self, daemon_set: &DaemonSet) -> Result<DaemonSet>;

    /// Deletes the object, deleting an object that is already gone is not an error.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

pub struct KubeWorkloadStore {
    client: Client,
}

impl KubeWorkloadStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<DaemonSet> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PostParams::default()
    }
}

#[async_trait]
impl WorkloadStore for KubeWorkloadStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<DaemonSet>> {
        self.api(namespace)
            .get_opt(name)
            .await
            .context(KubeRequestSnafu)
    }

    async fn create(&self, daemon_set: &DaemonSet) -> Result<DaemonSet> {
        let namespace = daemon_set
            .namespace()
            .context(ObjectHasNoNamespaceSnafu)?;
        self.api(&namespace)
            .create(&post_params(), daemon_set)
            .await
            .context(KubeRequestSnafu)
    }

    async fn replace(&self, daemon_set: &DaemonSet) -> Result<DaemonSet> {
        let namespace = daemon_set
            .namespace()
            .context(ObjectHasNoNamespaceSnafu)?;
        let name = daemon_set.metadata.name.as_deref().context(NoNameSnafu)?;
        self.api(&namespace)
            .replace(name, &post_params(), daemon_set)
            .await
            .context(KubeRequestSnafu)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .api(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
            Err(source) => Err(Error::KubeRequest { source }),
        }
    }
}
