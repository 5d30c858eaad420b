//! User and runtime supplied input of a bootstrap request.

use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::Taint, apimachinery::pkg::api::resource::Quantity};
use serde::{Deserialize, Serialize};

use crate::{
    config::{CustomLinuxOsConfig, NetworkPlugin, NetworkPolicy},
    duration::Duration,
};

/// Everything the caller knows about the node to bootstrap.
///
/// All fields are optional during deserialization. The required ones are
/// checked by [`apply`](crate::overrides::apply).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub tenant_id: String,
    pub subscription_id: String,
    pub user_assigned_identity_id: String,
    pub location: String,
    pub resource_group: String,
    pub cluster_id: String,
    pub api_server_name: String,
    pub kubelet_client_tls_bootstrap_token: String,
    pub enable_secure_tls_bootstrapping: Option<bool>,
    pub network_plugin: Option<NetworkPlugin>,
    pub network_policy: Option<NetworkPolicy>,
    pub kubernetes_version: String,
    pub arch: Arch,
    pub vm_size: String,

    /// Node labels, merged over the computed and environment labels.
    pub labels: BTreeMap<String, String>,

    /// Node taints, registered by the kubelet in the given order.
    pub taints: Vec<Taint>,
    pub kubelet_config: Option<KubeletConfiguration>,

    /// Resource ID of the subnet the node joins, for clusters running in a
    /// custom virtual network.
    #[serde(rename = "vnetSubnetID")]
    pub vnet_subnet_id: Option<String>,

    /// Base64 encoded certificate authority bundle of the cluster.
    pub ca_bundle: Option<String>,
    pub enable_artifact_streaming: Option<bool>,
    pub custom_linux_os_config: Option<CustomLinuxOsConfig>,
}

/// CPU architecture of the node, as used in binary download URLs.
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
pub enum Arch {
    #[default]
    Amd64,
    Arm64,
}

/// Structured kubelet settings of a node pool. Every field left unset keeps the
/// baseline flag, if there is one.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubeletConfiguration {
    pub max_pods: Option<i32>,
    pub pods_per_core: Option<i32>,
    pub system_reserved: BTreeMap<String, Quantity>,
    pub kube_reserved: BTreeMap<String, Quantity>,
    pub eviction_hard: BTreeMap<String, String>,
    pub eviction_soft: BTreeMap<String, String>,
    pub eviction_soft_grace_period: BTreeMap<String, Duration>,
    pub eviction_max_pod_grace_period: Option<i32>,

    #[serde(rename = "imageGCHighThresholdPercent")]
    pub image_gc_high_threshold_percent: Option<i32>,

    #[serde(rename = "imageGCLowThresholdPercent")]
    pub image_gc_low_threshold_percent: Option<i32>,

    #[serde(rename = "cpuCFSQuota")]
    pub cpu_cfs_quota: Option<bool>,
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn deserialize_options() {
        let options: Options = serde_yaml::from_str(indoc! {"
            tenantId: tenant
            subscriptionId: sub
            location: westeurope
            resourceGroup: MC_rg_cluster_westeurope
            clusterId: '12345678'
            kubernetesVersion: 1.29.4
            arch: arm64
            vmSize: Standard_D4s_v3
            networkPlugin: azure
            labels:
              team: storage
            taints:
              - key: dedicated
                value: storage
                effect: NoSchedule
            kubeletConfig:
              maxPods: 50
              systemReserved:
                cpu: 100m
              evictionSoftGracePeriod:
                memory.available: 1m30s
              imageGCHighThresholdPercent: 90
              cpuCFSQuota: false
            vnetSubnetID: /subscriptions/sub/resourceGroups/net/providers/Microsoft.Network/virtualNetworks/vnet/subnets/nodes
        "})
        .unwrap();

        assert_eq!(options.arch, Arch::Arm64);
        assert_eq!(options.network_plugin, Some(NetworkPlugin::Azure));
        assert_eq!(options.network_policy, None);
        assert_eq!(options.labels.get("team").map(String::as_str), Some("storage"));
        assert_eq!(options.taints[0].effect, "NoSchedule");
        assert!(options.vnet_subnet_id.is_some());

        let kubelet = options.kubelet_config.unwrap();
        assert_eq!(kubelet.max_pods, Some(50));
        assert_eq!(kubelet.pods_per_core, None);
        assert_eq!(kubelet.system_reserved["cpu"], Quantity("100m".to_owned()));
        assert_eq!(
            kubelet.eviction_soft_grace_period["memory.available"].to_string(),
            "1m30s"
        );
        assert_eq!(kubelet.image_gc_high_threshold_percent, Some(90));
        assert_eq!(kubelet.cpu_cfs_quota, Some(false));
    }

    #[test]
    fn deserialize_empty_options() {
        let options: Options = serde_yaml::from_str("{}").unwrap();

        assert_eq!(options.arch, Arch::Amd64);
        assert!(options.taints.is_empty());
        assert!(options.kubelet_config.is_none());
    }
}
