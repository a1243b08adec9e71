//! Workload shapes shared by the component blocks of an [`OnecloudCluster`](crate::OnecloudCluster).

use std::{collections::BTreeMap, str::FromStr};

use k8s_openapi::{
    api::{
        apps::v1::{DaemonSetUpdateStrategy, RollingUpdateDaemonSet},
        core::v1::{Affinity, Toleration},
    },
    apimachinery::pkg::util::intstr::IntOrString,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use strum::{Display, EnumDiscriminants, EnumString, IntoStaticStr};

#[derive(Snafu, Debug, EnumDiscriminants, PartialEq, Eq)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("unknown update strategy {strategy:?}, expected RollingUpdate or OnDelete"))]
    UnknownUpdateStrategy {
        source: strum::ParseError,
        strategy: String,
    },
    #[snafu(display(
        "maxUnavailable {value:?} is neither a positive integer nor a percentage between 1% and 100%"
    ))]
    InvalidMaxUnavailable { value: String },
    #[snafu(display("maxUnavailable can only be set for the RollingUpdate strategy"))]
    MaxUnavailableWithoutRollingUpdate,
}

/// Image settings and the disable switch every component block carries.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default)]
    pub disable: bool,
}

/// Placement and rollout policy for components running on every node.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonSetSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    /// Added to the pod template of the DaemonSet.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// `RollingUpdate` (default) or `OnDelete`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_strategy: Option<String>,
    /// Either an absolute number (`"1"`) or a percentage (`"10%"`) of nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Display, EnumString, Eq, PartialEq)]
pub enum UpdateStrategyType {
    #[default]
    #[strum(serialize = "RollingUpdate")]
    RollingUpdate,
    #[strum(serialize = "OnDelete")]
    OnDelete,
}

impl DaemonSetSpec {
    /// Resolves the configured rollout policy into the DaemonSet update strategy.
    pub fn update_strategy(&self) -> Result<DaemonSetUpdateStrategy, Error> {
        let strategy_type = match self.update_strategy.as_deref() {
            None | Some("") => UpdateStrategyType::default(),
            Some(strategy) => UpdateStrategyType::from_str(strategy)
                .context(UnknownUpdateStrategySnafu { strategy })?,
        };

        let max_unavailable = self
            .max_unavailable
            .as_deref()
            .map(parse_max_unavailable)
            .transpose()?;

        let rolling_update = match strategy_type {
            UpdateStrategyType::RollingUpdate => max_unavailable.map(|max_unavailable| {
                RollingUpdateDaemonSet {
                    max_unavailable: Some(max_unavailable),
                    ..RollingUpdateDaemonSet::default()
                }
            }),
            UpdateStrategyType::OnDelete => {
                ensure!(
                    max_unavailable.is_none(),
                    MaxUnavailableWithoutRollingUpdateSnafu
                );
                None
            }
        };

        Ok(DaemonSetUpdateStrategy {
            type_: Some(strategy_type.to_string()),
            rolling_update,
        })
    }
}

/// Accepts a positive count (`"2"`) or a percentage between 1% and 100% (`"25%"`).
///
/// Zero is rejected since the operator never sets `maxSurge`, and the value is only accepted in
/// its canonical form so it reaches the DaemonSet exactly as written.
fn parse_max_unavailable(value: &str) -> Result<IntOrString, Error> {
    let (digits, is_percentage) = match value.strip_suffix('%') {
        Some(digits) => (digits, true),
        None => (value, false),
    };
    ensure!(
        !digits.is_empty()
            && !digits.starts_with('0')
            && digits.bytes().all(|b| b.is_ascii_digit()),
        InvalidMaxUnavailableSnafu { value }
    );

    if is_percentage {
        let percentage = digits
            .parse::<u8>()
            .ok()
            .filter(|percentage| *percentage <= 100);
        ensure!(percentage.is_some(), InvalidMaxUnavailableSnafu { value });
        Ok(IntOrString::String(value.to_string()))
    } else {
        let count = digits
            .parse::<u16>()
            .ok()
            .context(InvalidMaxUnavailableSnafu { value })?;
        Ok(IntOrString::Int(count.into()))
    }
}
