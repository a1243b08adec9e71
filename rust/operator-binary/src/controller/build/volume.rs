//! Host directories mounted into node agents.

use k8s_openapi::api::core::v1::{HostPathVolumeSource, Volume, VolumeMount};
use strum::{Display, IntoStaticStr};

/// Whether the kubelet may create a host directory that does not exist yet.
#[derive(Clone, Copy, Debug, Display, Eq, IntoStaticStr, PartialEq)]
pub enum HostPathType {
    /// The directory must already exist on the node, used for system paths like `/proc`.
    #[strum(serialize = "Directory")]
    Directory,
    /// Created on demand, used for directories the component owns.
    #[strum(serialize = "DirectoryOrCreate")]
    DirectoryOrCreate,
}

/// A host directory together with the location it is mounted at inside the containers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostPathVolume {
    pub name: String,
    pub host_path: String,
    pub host_path_type: HostPathType,
    pub mount_path: String,
    pub read_only: bool,
}

impl HostPathVolume {
    /// Mounts `path` of the node at the same path inside the container.
    pub fn same_path(
        name: impl Into<String>,
        path: impl Into<String>,
        host_path_type: HostPathType,
    ) -> Self {
        let path = path.into();
        Self {
            name: name.into(),
            host_path: path.clone(),
            host_path_type,
            mount_path: path,
            read_only: false,
        }
    }

    fn volume(&self) -> Volume {
        Volume {
            name: self.name.clone(),
            host_path: Some(HostPathVolumeSource {
                path: self.host_path.clone(),
                type_: Some(self.host_path_type.to_string()),
            }),
            ..Volume::default()
        }
    }

    fn volume_mount(&self) -> VolumeMount {
        VolumeMount {
            name: self.name.clone(),
            mount_path: self.mount_path.clone(),
            read_only: self.read_only.then_some(true),
            ..VolumeMount::default()
        }
    }
}

/// Ordered set of volumes and the matching mounts of one workload.
///
/// Volumes and mounts are kept in insertion order, so the produced pod template is stable between
/// reconciliations. Every mount refers to exactly one volume of the same helper.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VolumeHelper {
    volumes: Vec<Volume>,
    volume_mounts: Vec<VolumeMount>,
}

impl VolumeHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a host path volume. A volume with the same name is replaced in place.
    pub fn add_host_path(&mut self, host_path: HostPathVolume) -> &mut Self {
        let volume = host_path.volume();
        let volume_mount = host_path.volume_mount();

        match self.volumes.iter().position(|v| v.name == volume.name) {
            Some(index) => {
                self.volumes[index] = volume;
                self.volume_mounts[index] = volume_mount;
            }
            None => {
                self.volumes.push(volume);
                self.volume_mounts.push(volume_mount);
            }
        }
        self
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn volume_mounts(&self) -> &[VolumeMount] {
        &self.volume_mounts
    }

    /// Returns the mount of a single volume, for containers which only need a subset.
    pub fn volume_mount(&self, name: &str) -> Option<VolumeMount> {
        self.volume_mounts.iter().find(|m| m.name == name).cloned()
    }
}
