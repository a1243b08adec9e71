//! Drives the live DaemonSet of a component towards the assembled one.
//!
//! The API server defaults and rewrites a lot of fields, so live and desired objects are not
//! compared field by field. Instead the desired object carries a hash of everything the operator
//! sets, and the live object is only replaced when that hash changes.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::DaemonSet;
use sha2::{Digest, Sha256};
use snafu::{OptionExt, ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};

use super::types::SyncOutcome;
use crate::client::{self, WorkloadStore};

pub const SPEC_HASH_ANNOTATION: &str = "onecloud.yunion.io/spec-hash";

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    #[snafu(display("object has no name associated"))]
    NoName,
    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,
    #[snafu(display("DaemonSet {name} has no controller owner reference"))]
    NoControllerOwner { name: String },
    #[snafu(display(
        "DaemonSet {namespace}/{name} already exists and is not controlled by this cluster"
    ))]
    ForeignDaemonSet { namespace: String, name: String },
    #[snafu(display("failed to serialize DaemonSet {name}"))]
    SerializeDaemonSet {
        source: serde_json::Error,
        name: String,
    },
    #[snafu(display("failed to retrieve DaemonSet {namespace}/{name}"))]
    GetDaemonSet {
        source: client::Error,
        namespace: String,
        name: String,
    },
    #[snafu(display("failed to create DaemonSet {namespace}/{name}"))]
    CreateDaemonSet {
        source: client::Error,
        namespace: String,
        name: String,
    },
    #[snafu(display("failed to replace DaemonSet {namespace}/{name}"))]
    ReplaceDaemonSet {
        source: client::Error,
        namespace: String,
        name: String,
    },
    #[snafu(display("failed to delete DaemonSet {namespace}/{name}"))]
    DeleteDaemonSet {
        source: client::Error,
        namespace: String,
        name: String,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Creates the DaemonSet if it is missing and replaces it if the desired state changed.
///
/// A live DaemonSet of the same name is only touched if it is controlled by the same owner as the
/// desired one.
pub async fn apply_daemon_set(
    store: &impl WorkloadStore,
    mut daemon_set: DaemonSet,
) -> Result<SyncOutcome> {
    let name = daemon_set.metadata.name.clone().context(NoNameSnafu)?;
    let namespace = daemon_set
        .metadata
        .namespace
        .clone()
        .context(ObjectHasNoNamespaceSnafu)?;
    let owner_uid = controller_uid(&daemon_set)
        .context(NoControllerOwnerSnafu { name: &name })?
        .to_string();

    let hash = spec_hash(&daemon_set).context(SerializeDaemonSetSnafu { name: &name })?;
    daemon_set
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(SPEC_HASH_ANNOTATION.to_string(), hash.clone());

    let live = store
        .get(&namespace, &name)
        .await
        .with_context(|_| GetDaemonSetSnafu {
            namespace: &namespace,
            name: &name,
        })?;

    match live {
        None => {
            store
                .create(&daemon_set)
                .await
                .with_context(|_| CreateDaemonSetSnafu {
                    namespace: &namespace,
                    name: &name,
                })?;
            tracing::info!(daemonset = %name, %namespace, "created DaemonSet");
            Ok(SyncOutcome::Created)
        }
        Some(live) if controller_uid(&live) != Some(owner_uid.as_str()) => {
            ForeignDaemonSetSnafu { namespace, name }.fail()
        }
        Some(live) if live_spec_hash(&live) == Some(hash.as_str()) => {
            tracing::debug!(daemonset = %name, %namespace, "DaemonSet is up to date");
            Ok(SyncOutcome::Unchanged)
        }
        Some(live) => {
            daemon_set.metadata.resource_version = live.metadata.resource_version;
            store
                .replace(&daemon_set)
                .await
                .with_context(|_| ReplaceDaemonSetSnafu {
                    namespace: &namespace,
                    name: &name,
                })?;
            tracing::info!(daemonset = %name, %namespace, spec_hash = %hash, "updated DaemonSet");
            Ok(SyncOutcome::Updated)
        }
    }
}

/// Deletes the DaemonSet if it still exists and is controlled by `owner_uid`.
///
/// A DaemonSet of the same name controlled by anything else is left alone, for this owner it
/// counts as absent.
pub async fn remove_daemon_set(
    store: &impl WorkloadStore,
    namespace: &str,
    name: &str,
    owner_uid: &str,
) -> Result<SyncOutcome> {
    let live = store
        .get(namespace, name)
        .await
        .context(GetDaemonSetSnafu { namespace, name })?;

    match live {
        None => {
            tracing::debug!(daemonset = %name, %namespace, "DaemonSet is absent");
            return Ok(SyncOutcome::Absent);
        }
        Some(live) if controller_uid(&live) != Some(owner_uid) => {
            tracing::warn!(
                daemonset = %name,
                %namespace,
                "DaemonSet is not controlled by this cluster, leaving it in place"
            );
            return Ok(SyncOutcome::Absent);
        }
        Some(_) => {}
    }

    store
        .delete(namespace, name)
        .await
        .context(DeleteDaemonSetSnafu { namespace, name })?;
    tracing::info!(daemonset = %name, %namespace, "deleted DaemonSet");
    Ok(SyncOutcome::Deleted)
}

/// Hashes everything the operator sets on a DaemonSet, except the hash annotation itself.
pub fn spec_hash(daemon_set: &DaemonSet) -> serde_json::Result<String> {
    let managed = (
        &daemon_set.metadata.labels,
        &daemon_set.metadata.owner_references,
        &daemon_set.spec,
    );
    let digest = Sha256::digest(serde_json::to_vec(&managed)?);
    Ok(format!("{digest:x}"))
}

/// The uid of the controller owner reference, if the object has one.
fn controller_uid(daemon_set: &DaemonSet) -> Option<&str> {
    daemon_set
        .metadata
        .owner_references
        .iter()
        .flatten()
        .find(|owner| owner.controller == Some(true))
        .map(|owner| owner.uid.as_str())
}

fn live_spec_hash(daemon_set: &DaemonSet) -> Option<&str> {
    daemon_set
        .metadata
        .annotations
        .as_ref()?
        .get(SPEC_HASH_ANNOTATION)
        .map(String::as_str)
}
