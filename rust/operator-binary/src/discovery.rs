//! Discovery of the internal addresses other components publish inside the cluster.
//!
//! Components only ever receive an opaque URL from here, they never derive service names themselves.

use onecloud_crd::{ComponentType, OnecloudCluster};
use snafu::{ensure, OptionExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("{component} is disabled and has no internal address"))]
    ComponentDisabled { component: ComponentType },
    #[snafu(display("object has no name associated"))]
    NoName,
    #[snafu(display("{component} does not expose an internal service"))]
    NoInternalService { component: ComponentType },
}

/// Resolves the address a component is reachable at from inside the cluster.
pub trait AddressResolver: Send + Sync {
    fn internal_url(
        &self,
        component: ComponentType,
        cluster: &OnecloudCluster,
    ) -> Result<String, Error>;
}

/// Resolves addresses through the per-component Services the operator maintains for a cluster.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClusterServiceResolver;

impl AddressResolver for ClusterServiceResolver {
    fn internal_url(
        &self,
        component: ComponentType,
        cluster: &OnecloudCluster,
    ) -> Result<String, Error> {
        ensure!(
            !cluster.spec.component(component).disable,
            ComponentDisabledSnafu { component }
        );
        let service = cluster.component_name(component).context(NoNameSnafu)?;

        match component {
            ComponentType::Influxdb => Ok(format!(
                "https://{service}:{port}",
                port = cluster.spec.influxdb.port
            )),
            ComponentType::Telegraf => NoInternalServiceSnafu { component }.fail(),
        }
    }
}
