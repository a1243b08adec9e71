use onecloud_crd::{ComponentType, OnecloudCluster};
use strum::{Display, EnumIter};

/// The components running one pod on every node of a cluster.
///
/// Every variant has to supply its workload builder and its enablement predicate, so adding an
/// agent without either is a compile error.
#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, Hash, PartialEq)]
pub enum NodeAgent {
    #[strum(serialize = "telegraf")]
    Telegraf,
}

impl NodeAgent {
    pub fn component_type(self) -> ComponentType {
        match self {
            NodeAgent::Telegraf => ComponentType::Telegraf,
        }
    }

    /// The component whose disable switch decides whether this agent runs.
    ///
    /// Telegraf only ships metrics to InfluxDB, so it follows the InfluxDB switch and ignores its
    /// own.
    pub fn gating_component(self) -> ComponentType {
        match self {
            NodeAgent::Telegraf => ComponentType::Influxdb,
        }
    }

    pub fn is_disabled(self, cluster: &OnecloudCluster) -> bool {
        cluster.spec.component(self.gating_component()).disable
    }
}

/// What a single reconciliation pass did to the workload of a component.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
    Deleted,
    Absent,
}
