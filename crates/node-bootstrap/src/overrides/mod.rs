//! Layers computed, environment and user supplied values over a baseline
//! [`Configuration`].
//!
//! The layers run in a fixed order, see [`MERGE_STEPS`]. A later layer
//! overwrites whatever an earlier one set for the same field, flag or label.
//!
//! | Step                    | Source                                                        |
//! | ----------------------- | ------------------------------------------------------------- |
//! | `computed`              | Download URLs, GPU driver, network resource names, labels     |
//! | `environment`           | Virtual network labels read from the process environment     |
//! | `options`               | Identity, cluster, network and node settings, node labels     |
//! | `taints`                | `--register-with-taints`                                      |
//! | `kubelet-configuration` | Flags flattened from the structured kubelet configuration     |

use std::str::FromStr;

use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, warn};

use crate::{
    catalog,
    config::Configuration,
    env::{self, Environment},
    kv::normalize_label_value,
    labels,
    options::Options,
    resource_id::{SubnetResourceId, SubnetResourceIdError},
    sku::is_nvidia_enabled_sku,
};

mod kubelet;

pub use kubelet::*;

/// A single override layer.
pub type MergeStep = fn(Configuration, &Layer<'_>) -> Configuration;

/// The override layers in the order they are applied.
pub const MERGE_STEPS: [(&str, MergeStep); 5] = [
    ("computed", apply_computed),
    ("environment", apply_environment),
    ("options", apply_options),
    ("taints", apply_taints),
    ("kubelet-configuration", apply_kubelet_configuration),
];

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("required option {option:?} is missing"))]
    MissingRequiredOption { option: &'static str },

    #[snafu(display("the base configuration is missing the {record} record"))]
    MissingRecord { record: &'static str },

    #[snafu(display("failed to parse the virtual network subnet ID"))]
    ParseSubnetId { source: SubnetResourceIdError },
}

/// The inputs shared by every override layer.
pub struct Layer<'a> {
    pub options: &'a Options,
    pub environment: &'a dyn Environment,

    /// The parsed [`Options::vnet_subnet_id`], if one was given.
    pub subnet_id: Option<SubnetResourceId>,
}

/// Applies all [`MERGE_STEPS`] to `base`.
///
/// Fails before any layer runs if `base` lacks a sub-record, a required option
/// is empty or the subnet resource ID doesn't parse. Applying the same options and environment to
/// the same base always produces the same configuration.
pub fn apply(
    base: Configuration,
    options: &Options,
    environment: &dyn Environment,
) -> Result<Configuration, Error> {
    if let Some(record) = base.missing_record() {
        return MissingRecordSnafu { record }.fail();
    }

    for (option, value) in [
        ("tenantId", &options.tenant_id),
        ("subscriptionId", &options.subscription_id),
        ("clusterId", &options.cluster_id),
        ("resourceGroup", &options.resource_group),
        ("location", &options.location),
    ] {
        ensure!(
            !value.trim().is_empty(),
            MissingRequiredOptionSnafu { option }
        );
    }

    let subnet_id = options
        .vnet_subnet_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .map(SubnetResourceId::from_str)
        .transpose()
        .context(ParseSubnetIdSnafu)?;

    let layer = Layer {
        options,
        environment,
        subnet_id,
    };

    Ok(MERGE_STEPS
        .iter()
        .fold(base, |config, (name, step)| {
            debug!(step = name, "applying override layer");
            step(config, &layer)
        }))
}

/// Values derived from the options rather than taken over verbatim.
fn apply_computed(mut config: Configuration, layer: &Layer<'_>) -> Configuration {
    let options = layer.options;

    config.kube_binary_config_mut().kube_binary_url =
        catalog::kube_binary_url(&options.kubernetes_version, options.arch);

    let network = config.network_config_mut();
    network.vnet_cni_plugins_url = catalog::vnet_cni_plugins_url(options.arch);
    network.cni_plugins_url = catalog::cni_plugins_url(options.arch);

    config.gpu_config_mut().config_gpu_driver = is_nvidia_enabled_sku(&options.vm_size);

    let cluster_id = &options.cluster_id;
    let vnet = &mut config.cluster_config_mut().virtual_network_config;
    vnet.security_group_name = format!("aks-agentpool-{cluster_id}-nsg");
    vnet.route_table = format!("aks-agentpool-{cluster_id}-routetable");
    vnet.vnet_name = format!("aks-vnet-{cluster_id}");

    if let Some(subnet_id) = &layer.subnet_id {
        vnet.subnet.clone_from(&subnet_id.subnet_name);
        vnet.vnet_name.clone_from(&subnet_id.vnet_name);
        vnet.vnet_resource_group.clone_from(&subnet_id.resource_group);
        vnet.vnet_subscription_id.clone_from(&subnet_id.subscription_id);
    }

    let node_labels = &mut config.kubelet_config_mut().kubelet_node_labels;
    node_labels.insert(labels::ROLE_KEY.to_owned(), "agent".to_owned());
    node_labels.insert(
        labels::CLUSTER_KEY.to_owned(),
        normalize_label_value(&options.resource_group),
    );

    config
}

fn apply_environment(mut config: Configuration, layer: &Layer<'_>) -> Configuration {
    let node_labels = &mut config.kubelet_config_mut().kubelet_node_labels;

    node_labels.insert(
        labels::VNET_DATA_PLANE_KEY.to_owned(),
        labels::CILIUM_DATA_PLANE.to_owned(),
    );
    node_labels.insert(
        labels::VNET_POD_NETWORK_TYPE_KEY.to_owned(),
        labels::OVERLAY_NETWORK_TYPE.to_owned(),
    );
    node_labels.insert(
        labels::VNET_SUBSCRIPTION_ID_KEY.to_owned(),
        layer.options.subscription_id.clone(),
    );

    for (variable, label) in [
        (env::AZURE_VNET_NAME, labels::VNET_NETWORK_NAME_KEY),
        (env::AZURE_SUBNET_NAME, labels::VNET_SUBNET_NAME_KEY),
        (env::AZURE_VNET_GUID, labels::VNET_GUID_KEY),
    ] {
        match layer.environment.var(variable) {
            Some(value) if value.is_empty() => {
                warn!(variable, "environment variable is set but empty, skipping label {label}");
            }
            Some(value) => {
                node_labels.insert(label.to_owned(), value);
            }
            None => {}
        }
    }

    config
}

/// Options taken over verbatim.
fn apply_options(mut config: Configuration, layer: &Layer<'_>) -> Configuration {
    let options = layer.options;

    let identity = config.identity_config_mut();
    identity.tenant_id.clone_from(&options.tenant_id);
    identity.subscription_id.clone_from(&options.subscription_id);
    identity
        .assigned_identity_id
        .clone_from(&options.user_assigned_identity_id);
    identity.service_principal_id = catalog::MANAGED_IDENTITY_CLIENT_ID.to_owned();
    identity.service_principal_secret = catalog::MANAGED_IDENTITY_CLIENT_SECRET.to_owned();

    let cluster = config.cluster_config_mut();
    cluster.location.clone_from(&options.location);
    cluster.resource_group.clone_from(&options.resource_group);

    config
        .api_server_config_mut()
        .api_server_name
        .clone_from(&options.api_server_name);

    let tls = config.tls_bootstrapping_config_mut();
    tls.tls_bootstrap_token
        .clone_from(&options.kubelet_client_tls_bootstrap_token);
    if let Some(enabled) = options.enable_secure_tls_bootstrapping {
        tls.enable_secure_tls_bootstrapping = enabled;
    }

    let network = config.network_config_mut();
    if let Some(plugin) = options.network_plugin {
        network.network_plugin = plugin;
    }
    if let Some(policy) = options.network_policy {
        network.network_policy = policy;
    }

    config.kubernetes_version.clone_from(&options.kubernetes_version);
    config.vm_size.clone_from(&options.vm_size);
    config.needs_cgroupv2 = true;

    if let Some(ca_bundle) = &options.ca_bundle {
        config.cluster_certificate_authority.clone_from(ca_bundle);
    }

    if let Some(enabled) = options.enable_artifact_streaming {
        config.enable_artifact_streaming = enabled;
        config.teleport_config_mut().status = enabled;
    }

    if let Some(linux_os) = &options.custom_linux_os_config {
        config.custom_linux_os_config = Some(linux_os.clone());
    }

    config.kubelet_config_mut().kubelet_node_labels.extend(
        options
            .labels
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );

    config
}

fn apply_taints(mut config: Configuration, layer: &Layer<'_>) -> Configuration {
    if let Some(taints) = register_with_taints(&layer.options.taints) {
        config
            .kubelet_config_mut()
            .kubelet_flags
            .insert(REGISTER_WITH_TAINTS_FLAG.to_owned(), taints);
    }

    config
}

fn apply_kubelet_configuration(mut config: Configuration, layer: &Layer<'_>) -> Configuration {
    if let Some(kubelet_configuration) = &layer.options.kubelet_config {
        config
            .kubelet_config_mut()
            .kubelet_flags
            .extend(kubelet_configuration_flags(kubelet_configuration));
    }

    config
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::Taint;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        catalog::default_configuration,
        config::{NetworkPlugin, VmType},
        options::{Arch, KubeletConfiguration},
    };

    #[fixture]
    fn options() -> Options {
        Options {
            tenant_id: "tenant".to_owned(),
            subscription_id: "sub".to_owned(),
            user_assigned_identity_id: "identity".to_owned(),
            location: "westeurope".to_owned(),
            resource_group: "MC_rg_cluster_westeurope".to_owned(),
            cluster_id: "12345678".to_owned(),
            api_server_name: "cluster-dns.hcp.westeurope.azmk8s.io".to_owned(),
            kubelet_client_tls_bootstrap_token: "abcdef.0123456789abcdef".to_owned(),
            kubernetes_version: "1.29.4".to_owned(),
            vm_size: "Standard_D4s_v3".to_owned(),
            ..Default::default()
        }
    }

    fn no_environment() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn node_labels(config: &Configuration) -> &BTreeMap<String, String> {
        &config.kubelet_config.as_ref().unwrap().kubelet_node_labels
    }

    fn kubelet_flags(config: &Configuration) -> &BTreeMap<String, String> {
        &config.kubelet_config.as_ref().unwrap().kubelet_flags
    }

    #[rstest]
    #[case::tenant("tenantId")]
    #[case::subscription("subscriptionId")]
    #[case::cluster("clusterId")]
    #[case::resource_group("resourceGroup")]
    #[case::location("location")]
    fn missing_required_option(mut options: Options, #[case] missing: &'static str) {
        let field = match missing {
            "tenantId" => &mut options.tenant_id,
            "subscriptionId" => &mut options.subscription_id,
            "clusterId" => &mut options.cluster_id,
            "resourceGroup" => &mut options.resource_group,
            _ => &mut options.location,
        };
        field.clear();

        let error = apply(default_configuration(), &options, &no_environment()).unwrap_err();
        assert!(
            matches!(error, Error::MissingRequiredOption { option } if option == missing),
            "unexpected error: {error:?}"
        );
    }

    #[rstest]
    #[case::kubelet("kubelet")]
    #[case::teleport("teleport")]
    #[case::identity("identity")]
    fn base_missing_record(options: Options, #[case] record: &'static str) {
        let mut base = default_configuration();
        match record {
            "kubelet" => base.kubelet_config = None,
            "teleport" => base.teleport_config = None,
            _ => base.identity_config = None,
        }

        let error = apply(base, &options, &no_environment()).unwrap_err();
        assert!(
            matches!(error, Error::MissingRecord { record: missing } if missing == record),
            "unexpected error: {error:?}"
        );
    }

    #[rstest]
    fn invalid_subnet_id(mut options: Options) {
        options.vnet_subnet_id = Some("/subscriptions/sub/resourceGroups/rg".to_owned());

        let error = apply(default_configuration(), &options, &no_environment()).unwrap_err();
        assert!(matches!(error, Error::ParseSubnetId { .. }));
    }

    #[rstest]
    fn computed_values(options: Options) {
        let config = apply(default_configuration(), &options, &no_environment()).unwrap();

        assert_eq!(
            config.kube_binary_config.unwrap().kube_binary_url,
            "https://acs-mirror.azureedge.net/kubernetes/v1.29.4/binaries/kubernetes-node-linux-amd64.tar.gz"
        );
        assert!(!config.gpu_config.unwrap().config_gpu_driver);

        let cluster = config.cluster_config.unwrap();
        assert_eq!(cluster.vm_type, VmType::Vmss);
        assert_eq!(cluster.location, "westeurope");

        let vnet = cluster.virtual_network_config;
        assert_eq!(vnet.subnet, "aks-subnet");
        assert_eq!(vnet.vnet_name, "aks-vnet-12345678");
        assert_eq!(vnet.security_group_name, "aks-agentpool-12345678-nsg");
        assert_eq!(vnet.route_table, "aks-agentpool-12345678-routetable");
        assert!(vnet.vnet_resource_group.is_empty());
    }

    #[rstest]
    fn gpu_sku_enables_driver(mut options: Options) {
        options.vm_size = "Standard_NC24ads_A100_v4".to_owned();
        options.arch = Arch::Arm64;

        let config = apply(default_configuration(), &options, &no_environment()).unwrap();

        assert!(config.gpu_config.unwrap().config_gpu_driver);
        assert!(
            config
                .network_config
                .unwrap()
                .cni_plugins_url
                .ends_with("cni-plugins-linux-arm64-v1.1.1.tgz")
        );
    }

    #[rstest]
    fn subnet_id_overrides_naming_convention(mut options: Options) {
        options.vnet_subnet_id = Some(
            "/subscriptions/sub/resourceGroups/net-rg/providers/Microsoft.Network/virtualNetworks/custom-vnet/subnets/nodes".to_owned(),
        );

        let config = apply(default_configuration(), &options, &no_environment()).unwrap();
        let cluster = config.cluster_config.unwrap();
        let vnet = cluster.virtual_network_config;

        assert_eq!(vnet.subnet, "nodes");
        assert_eq!(vnet.vnet_name, "custom-vnet");
        assert_eq!(vnet.vnet_resource_group, "net-rg");
        assert_eq!(vnet.vnet_subscription_id, "sub");
        assert_eq!(vnet.security_group_name, "aks-agentpool-12345678-nsg");
        // The declared resource group is never replaced by the derived one
        assert_eq!(cluster.resource_group, "MC_rg_cluster_westeurope");
    }

    #[rstest]
    fn generated_labels(options: Options) {
        let config = apply(default_configuration(), &options, &no_environment()).unwrap();

        assert_eq!(
            node_labels(&config),
            &BTreeMap::from(
                [
                    ("kubernetes.azure.com/cluster", "MC_rg_cluster_westeurope"),
                    ("kubernetes.azure.com/ebpf-dataplane", "cilium"),
                    ("kubernetes.azure.com/mode", "user"),
                    ("kubernetes.azure.com/network-subscription", "sub"),
                    ("kubernetes.azure.com/podnetwork-type", "overlay"),
                    ("kubernetes.azure.com/role", "agent"),
                ]
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
            )
        );
    }

    #[rstest]
    fn environment_labels(options: Options) {
        let environment = BTreeMap::from(
            [
                ("AZURE_VNET_GUID", "a1b2c3d4-0000-0000-0000-000000000000"),
                ("AZURE_VNET_NAME", "custom-vnet"),
                ("AZURE_SUBNET_NAME", ""),
            ]
            .map(|(k, v)| (k.to_owned(), v.to_owned())),
        );

        let config = apply(default_configuration(), &options, &environment).unwrap();
        let labels = node_labels(&config);

        assert_eq!(
            labels["kubernetes.azure.com/nodenetwork-vnetguid"],
            "a1b2c3d4-0000-0000-0000-000000000000"
        );
        assert_eq!(labels["kubernetes.azure.com/network-name"], "custom-vnet");
        assert!(!labels.contains_key("kubernetes.azure.com/network-subnet"));
    }

    #[rstest]
    fn user_labels_take_precedence(mut options: Options) {
        options.labels = BTreeMap::from([
            ("kubernetes.azure.com/mode".to_owned(), "system".to_owned()),
            ("kubernetes.azure.com/ebpf-dataplane".to_owned(), "azure".to_owned()),
            ("team".to_owned(), "storage".to_owned()),
        ]);

        let config = apply(default_configuration(), &options, &no_environment()).unwrap();
        let labels = node_labels(&config);

        assert_eq!(labels["kubernetes.azure.com/mode"], "system");
        assert_eq!(labels["kubernetes.azure.com/ebpf-dataplane"], "azure");
        assert_eq!(labels["team"], "storage");
    }

    #[rstest]
    fn user_options(mut options: Options) {
        options.network_plugin = Some(NetworkPlugin::Azure);
        options.ca_bundle = Some("Y2EtYnVuZGxl".to_owned());
        options.enable_artifact_streaming = Some(true);

        let config = apply(default_configuration(), &options, &no_environment()).unwrap();

        let identity = config.identity_config.as_ref().unwrap();
        assert_eq!(identity.tenant_id, "tenant");
        assert_eq!(identity.assigned_identity_id, "identity");
        assert_eq!(identity.service_principal_id, "msi");
        assert_eq!(identity.service_principal_secret, "bXNp");
        assert_eq!(
            config.network_config.as_ref().unwrap().network_plugin,
            NetworkPlugin::Azure
        );
        assert_eq!(config.cluster_certificate_authority, "Y2EtYnVuZGxl");
        assert!(config.enable_artifact_streaming);
        assert!(config.teleport_config.as_ref().unwrap().status);
        assert!(config.needs_cgroupv2);
        assert_eq!(config.kubernetes_version, "1.29.4");
        assert_eq!(
            config.tls_bootstrapping_config.unwrap().tls_bootstrap_token,
            "abcdef.0123456789abcdef"
        );
    }

    #[rstest]
    fn taints_flag(mut options: Options) {
        let config = apply(default_configuration(), &options, &no_environment()).unwrap();
        assert!(!kubelet_flags(&config).contains_key(REGISTER_WITH_TAINTS_FLAG));

        options.taints = vec![Taint {
            key: "a".to_owned(),
            value: Some("b".to_owned()),
            effect: "NoSchedule".to_owned(),
            ..Default::default()
        }];

        let config = apply(default_configuration(), &options, &no_environment()).unwrap();
        assert_eq!(kubelet_flags(&config)[REGISTER_WITH_TAINTS_FLAG], "a=b:NoSchedule");
    }

    #[rstest]
    fn kubelet_configuration_overrides_baseline(mut options: Options) {
        options.kubelet_config = Some(KubeletConfiguration {
            max_pods: Some(30),
            eviction_hard: BTreeMap::from([(
                "memory.available".to_owned(),
                "750Mi".to_owned(),
            )]),
            ..Default::default()
        });

        let config = apply(default_configuration(), &options, &no_environment()).unwrap();
        let flags = kubelet_flags(&config);

        assert_eq!(flags["--max-pods"], "30");
        assert_eq!(flags["--eviction-hard"], "memory.available<750Mi");
        // Untouched baseline flags survive
        assert_eq!(flags["--image-gc-high-threshold"], "85");
    }

    #[rstest]
    fn apply_is_idempotent(mut options: Options) {
        options.taints = vec![Taint {
            key: "dedicated".to_owned(),
            value: Some("gpu".to_owned()),
            effect: "NoExecute".to_owned(),
            ..Default::default()
        }];
        let environment =
            BTreeMap::from([("AZURE_VNET_NAME".to_owned(), "custom-vnet".to_owned())]);

        let first = apply(default_configuration(), &options, &environment).unwrap();
        let second = apply(default_configuration(), &options, &environment).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn merge_steps_are_ordered() {
        let names = MERGE_STEPS.map(|(name, _)| name);
        assert_eq!(names, [
            "computed",
            "environment",
            "options",
            "taints",
            "kubelet-configuration"
        ]);
    }
}
