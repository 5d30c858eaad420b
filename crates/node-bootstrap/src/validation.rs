//! Completeness and consistency checks on a merged [`Configuration`].
//!
//! [`validate`] reports the first violation it finds and never repairs
//! anything.

use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::{
    config::{ClusterNetworkConfig, Configuration},
    labels::{LabelError, validate_label},
};

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("configuration is missing the {record} record"))]
    MissingRecord { record: &'static str },

    #[snafu(display("vm size cannot be empty"))]
    EmptyVmSize,

    #[snafu(display("kubernetes version cannot be empty"))]
    EmptyKubernetesVersion,

    #[snafu(display("a tls bootstrap token is required when secure tls bootstrapping is enabled"))]
    MissingTlsBootstrapToken,

    #[snafu(display(
        "virtual network field {field} is empty, subnet, virtual network, resource group and subscription have to be set together"
    ))]
    IncompleteVirtualNetwork { field: &'static str },

    #[snafu(display(
        "subnet subscription {derived:?} does not match the cluster subscription {declared:?}"
    ))]
    SubscriptionMismatch { declared: String, derived: String },

    #[snafu(display("invalid node label {key:?}"))]
    InvalidNodeLabel { key: String, source: LabelError },
}

/// Checks that `config` is complete and consistent enough to be rendered.
pub fn validate(config: &Configuration) -> Result<(), Error> {
    let identity = config
        .identity_config
        .as_ref()
        .context(MissingRecordSnafu { record: "identity" })?;
    config
        .api_server_config
        .as_ref()
        .context(MissingRecordSnafu { record: "api server" })?;
    let cluster = config
        .cluster_config
        .as_ref()
        .context(MissingRecordSnafu { record: "cluster" })?;
    config
        .network_config
        .as_ref()
        .context(MissingRecordSnafu { record: "network" })?;
    config
        .kube_binary_config
        .as_ref()
        .context(MissingRecordSnafu {
            record: "kube binary",
        })?;
    config
        .gpu_config
        .as_ref()
        .context(MissingRecordSnafu { record: "gpu" })?;
    let tls = config
        .tls_bootstrapping_config
        .as_ref()
        .context(MissingRecordSnafu {
            record: "tls bootstrapping",
        })?;
    let kubelet = config
        .kubelet_config
        .as_ref()
        .context(MissingRecordSnafu { record: "kubelet" })?;
    config
        .custom_cloud_config
        .as_ref()
        .context(MissingRecordSnafu {
            record: "custom cloud",
        })?;
    config
        .containerd_config
        .as_ref()
        .context(MissingRecordSnafu {
            record: "containerd",
        })?;
    config
        .runc_config
        .as_ref()
        .context(MissingRecordSnafu { record: "runc" })?;
    config
        .teleport_config
        .as_ref()
        .context(MissingRecordSnafu { record: "teleport" })?;
    config
        .http_proxy_config
        .as_ref()
        .context(MissingRecordSnafu {
            record: "http proxy",
        })?;
    config
        .custom_linux_os_config
        .as_ref()
        .context(MissingRecordSnafu {
            record: "custom linux os",
        })?;

    ensure!(!config.vm_size.trim().is_empty(), EmptyVmSizeSnafu);
    ensure!(
        !config.kubernetes_version.trim().is_empty(),
        EmptyKubernetesVersionSnafu
    );
    ensure!(
        !tls.enable_secure_tls_bootstrapping || !tls.tls_bootstrap_token.is_empty(),
        MissingTlsBootstrapTokenSnafu
    );

    validate_virtual_network(&cluster.virtual_network_config, &identity.subscription_id)?;

    for (key, value) in &kubelet.kubelet_node_labels {
        validate_label(key, value).context(InvalidNodeLabelSnafu { key })?;
    }

    Ok(())
}

/// The network names either all follow the cluster naming convention, or
/// subnet, virtual network, resource group and subscription were all taken
/// from a subnet resource ID. A derived subscription must be the one the
/// cluster runs in.
fn validate_virtual_network(
    vnet: &ClusterNetworkConfig,
    declared_subscription_id: &str,
) -> Result<(), Error> {
    let derived = !vnet.vnet_resource_group.is_empty() || !vnet.vnet_subscription_id.is_empty();

    let mut required = vec![("subnet", &vnet.subnet), ("vnet name", &vnet.vnet_name)];
    if derived {
        required.extend([
            ("vnet resource group", &vnet.vnet_resource_group),
            ("vnet subscription id", &vnet.vnet_subscription_id),
        ]);
    }

    for (field, value) in required {
        ensure!(!value.is_empty(), IncompleteVirtualNetworkSnafu { field });
    }

    ensure!(
        !derived
            || vnet
                .vnet_subscription_id
                .eq_ignore_ascii_case(declared_subscription_id),
        SubscriptionMismatchSnafu {
            declared: declared_subscription_id,
            derived: &vnet.vnet_subscription_id,
        }
    );

    Ok(())
}
