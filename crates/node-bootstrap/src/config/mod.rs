//! The configuration record handed to the bootstrap script renderer.
//!
//! A [`Configuration`] is built per bootstrap request: it starts as a copy of
//! the [default catalog](crate::catalog), is run through the
//! [override layers](crate::overrides), [validated](crate::validation) once,
//! rendered and then dropped.
//!
//! Sub-records are [`Option`]al. The catalog populates all of them. The
//! override layers refuse a base where one is missing, and so does validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod linux_os;

pub use linux_os::*;

/// The aggregate record holding every value needed to render the bootstrap
/// script.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Configuration {
    pub identity_config: Option<IdentityConfig>,
    pub api_server_config: Option<ApiServerConfig>,
    pub cluster_config: Option<ClusterConfig>,
    pub network_config: Option<NetworkConfig>,
    pub kube_binary_config: Option<KubeBinaryConfig>,
    pub gpu_config: Option<GpuConfig>,
    pub tls_bootstrapping_config: Option<TlsBootstrappingConfig>,
    pub kubelet_config: Option<KubeletConfig>,
    pub custom_cloud_config: Option<CustomCloudConfig>,
    pub containerd_config: Option<ContainerdConfig>,
    pub runc_config: Option<RuncConfig>,
    pub teleport_config: Option<TeleportConfig>,
    pub http_proxy_config: Option<HttpProxyConfig>,
    pub custom_linux_os_config: Option<CustomLinuxOsConfig>,

    pub kubernetes_version: String,
    pub vm_size: String,
    pub needs_cgroupv2: bool,
    pub enable_artifact_streaming: bool,
    pub linux_admin_username: String,
    pub enable_ssh: bool,
    pub is_vhd: bool,
    pub outbound_command: String,

    /// Base64 encoded certificate authority bundle of the cluster.
    pub cluster_certificate_authority: String,
}

impl Configuration {
    /// The name of the first sub-record that is [`None`], if any.
    pub fn missing_record(&self) -> Option<&'static str> {
        [
            ("identity", self.identity_config.is_none()),
            ("api server", self.api_server_config.is_none()),
            ("cluster", self.cluster_config.is_none()),
            ("network", self.network_config.is_none()),
            ("kube binary", self.kube_binary_config.is_none()),
            ("gpu", self.gpu_config.is_none()),
            ("tls bootstrapping", self.tls_bootstrapping_config.is_none()),
            ("kubelet", self.kubelet_config.is_none()),
            ("custom cloud", self.custom_cloud_config.is_none()),
            ("containerd", self.containerd_config.is_none()),
            ("runc", self.runc_config.is_none()),
            ("teleport", self.teleport_config.is_none()),
            ("http proxy", self.http_proxy_config.is_none()),
            ("custom linux os", self.custom_linux_os_config.is_none()),
        ]
        .into_iter()
        .find_map(|(record, missing)| missing.then_some(record))
    }

    // The override layers only run on a configuration without missing
    // records, so these never have to insert anything there.

    pub fn identity_config_mut(&mut self) -> &mut IdentityConfig {
        self.identity_config.get_or_insert_with(Default::default)
    }

    pub fn api_server_config_mut(&mut self) -> &mut ApiServerConfig {
        self.api_server_config.get_or_insert_with(Default::default)
    }

    pub fn cluster_config_mut(&mut self) -> &mut ClusterConfig {
        self.cluster_config.get_or_insert_with(Default::default)
    }

    pub fn network_config_mut(&mut self) -> &mut NetworkConfig {
        self.network_config.get_or_insert_with(Default::default)
    }

    pub fn kube_binary_config_mut(&mut self) -> &mut KubeBinaryConfig {
        self.kube_binary_config.get_or_insert_with(Default::default)
    }

    pub fn gpu_config_mut(&mut self) -> &mut GpuConfig {
        self.gpu_config.get_or_insert_with(Default::default)
    }

    pub fn tls_bootstrapping_config_mut(&mut self) -> &mut TlsBootstrappingConfig {
        self.tls_bootstrapping_config
            .get_or_insert_with(Default::default)
    }

    pub fn kubelet_config_mut(&mut self) -> &mut KubeletConfig {
        self.kubelet_config.get_or_insert_with(Default::default)
    }

    pub fn teleport_config_mut(&mut self) -> &mut TeleportConfig {
        self.teleport_config.get_or_insert_with(Default::default)
    }
}

/// Identity of the node towards Azure. The service principal fields are
/// constants, the node always authenticates through its managed identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IdentityConfig {
    pub tenant_id: String,
    pub subscription_id: String,
    pub assigned_identity_id: String,
    pub service_principal_id: String,
    pub service_principal_secret: String,
    pub target_cloud: String,
    pub use_managed_identity_extension: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ApiServerConfig {
    pub api_server_name: String,
    pub api_server_public_key: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClusterConfig {
    pub location: String,
    pub resource_group: String,
    pub vm_type: VmType,
    pub primary_availability_set: String,
    pub primary_scale_set: String,
    pub use_instance_metadata: bool,
    pub load_balancer_config: LoadBalancerConfig,
    pub virtual_network_config: ClusterNetworkConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LoadBalancerConfig {
    pub load_balancer_sku: LoadBalancerSku,
    pub exclude_master_from_standard_load_balancer: bool,
    pub max_load_balancer_rule_count: i32,
    pub disable_outbound_snat: bool,
}

/// Names of the network resources the node attaches to.
///
/// Either all of these follow the cluster naming convention, or subnet,
/// virtual network, resource group and subscription are all taken from a
/// parsed subnet resource ID.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClusterNetworkConfig {
    pub subnet: String,
    pub vnet_name: String,
    pub vnet_resource_group: String,
    /// Only set when the names were taken from a subnet resource ID.
    pub vnet_subscription_id: String,
    pub security_group_name: String,
    pub route_table: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NetworkConfig {
    pub network_plugin: NetworkPlugin,
    pub network_policy: NetworkPolicy,
    pub vnet_cni_plugins_url: String,
    pub cni_plugins_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct KubeBinaryConfig {
    pub kube_binary_url: String,
    pub custom_kube_binary_url: String,
    pub private_kube_binary_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GpuConfig {
    pub config_gpu_driver: bool,
    pub gpu_device_plugin: bool,
    pub gpu_instance_profile: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TlsBootstrappingConfig {
    pub enable_secure_tls_bootstrapping: bool,
    pub tls_bootstrap_token: String,
    pub custom_secure_tls_bootstrap_appserver_appid: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct KubeletConfig {
    /// Kubelet command line flags, keyed by flag name including the leading
    /// dashes.
    pub kubelet_flags: BTreeMap<String, String>,
    pub kubelet_node_labels: BTreeMap<String, String>,
    pub kubelet_config_file_content: String,
    pub kubelet_client_key: String,
    pub kubelet_client_cert_content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CustomCloudConfig {
    pub enabled: bool,
    pub init_file_path: String,
    pub repo_depot_endpoint: String,
    pub target_environment: String,
    pub custom_env_json_content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ContainerdConfig {
    pub containerd_download_url_base: String,
    pub containerd_version: String,
    pub containerd_package_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RuncConfig {
    pub runc_version: String,
    pub runc_package_url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TeleportConfig {
    pub teleportd_plugin_download_url: String,
    pub status: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HttpProxyConfig {
    pub http_proxy: String,
    pub https_proxy: String,
    pub no_proxy_entries: Vec<String>,
    pub proxy_trusted_ca: String,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VmType {
    #[default]
    Vmss,
    Standard,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LoadBalancerSku {
    Basic,
    #[default]
    Standard,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NetworkPlugin {
    #[default]
    None,
    Azure,
    Kubenet,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NetworkPolicy {
    #[default]
    None,
    Azure,
    Calico,
}
