//! The baseline every bootstrap [`Configuration`] starts from.
//!
//! The catalog covers values that are static, not supported yet, or unused by
//! the node image scripts. Fields that have to be supplied per request are
//! left empty and filled by the [override layers](crate::overrides).

use std::{collections::BTreeMap, sync::LazyLock};

use const_format::concatcp;

use crate::{
    config::{
        ApiServerConfig, ClusterConfig, ClusterNetworkConfig, Configuration, ContainerdConfig,
        CustomCloudConfig, CustomLinuxOsConfig, GpuConfig, HttpProxyConfig, IdentityConfig,
        KubeBinaryConfig, KubeletConfig, LoadBalancerConfig, LoadBalancerSku, NetworkConfig,
        RuncConfig, TeleportConfig, TlsBootstrappingConfig, VmType,
    },
    labels,
    options::Arch,
};

/// Mirror serving Kubernetes and CNI release artifacts.
pub const AKS_MIRROR: &str = "https://acs-mirror.azureedge.net";

pub const AZURE_CNI_VERSION: &str = "v1.4.32";
pub const CNI_PLUGINS_VERSION: &str = "v1.1.1";

pub const TARGET_CLOUD: &str = "AzurePublicCloud";
pub const LINUX_ADMIN_USERNAME: &str = "azureuser";
pub const DEFAULT_SUBNET: &str = "aks-subnet";

/// Service principal placeholder telling the node to use its managed identity.
pub const MANAGED_IDENTITY_CLIENT_ID: &str = "msi";

/// `base64("msi")`
pub const MANAGED_IDENTITY_CLIENT_SECRET: &str = "bXNp";

/// Checks that the node can reach the container registry.
pub const DEFAULT_OUTBOUND_COMMAND: &str =
    "curl -v --insecure --proxy-insecure https://mcr.microsoft.com/v2/";

const KUBE_CONFIG_DIR: &str = "/etc/kubernetes";
const AZURE_JSON: &str = concatcp!(KUBE_CONFIG_DIR, "/azure.json");
const KUBELET_CERTS_DIR: &str = concatcp!(KUBE_CONFIG_DIR, "/certs");

const TLS_CIPHER_SUITES: &str = "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,\
    TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,\
    TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305,\
    TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,\
    TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305,\
    TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,\
    TLS_RSA_WITH_AES_256_GCM_SHA384,\
    TLS_RSA_WITH_AES_128_GCM_SHA256";

const KUBELET_FLAGS_BASE: [(&str, &str); 31] = [
    ("--address", "0.0.0.0"),
    ("--anonymous-auth", "false"),
    ("--authentication-token-webhook", "true"),
    ("--authorization-mode", "Webhook"),
    ("--azure-container-registry-config", AZURE_JSON),
    ("--cgroups-per-qos", "true"),
    ("--client-ca-file", concatcp!(KUBELET_CERTS_DIR, "/ca.crt")),
    ("--cloud-config", AZURE_JSON),
    ("--cloud-provider", "external"),
    ("--cluster-dns", "10.0.0.10"),
    ("--cluster-domain", "cluster.local"),
    ("--enforce-node-allocatable", "pods"),
    ("--event-qps", "0"),
    (
        "--eviction-hard",
        "memory.available<750Mi,nodefs.available<10%,nodefs.inodesFree<5%",
    ),
    ("--image-gc-high-threshold", "85"),
    ("--image-gc-low-threshold", "80"),
    ("--keep-terminated-pod-volumes", "false"),
    ("--kubeconfig", "/var/lib/kubelet/kubeconfig"),
    ("--max-pods", "110"),
    ("--node-status-update-frequency", "10s"),
    (
        "--pod-infra-container-image",
        "mcr.microsoft.com/oss/kubernetes/pause:3.6",
    ),
    ("--pod-manifest-path", concatcp!(KUBE_CONFIG_DIR, "/manifests")),
    ("--pod-max-pids", "-1"),
    ("--protect-kernel-defaults", "true"),
    ("--read-only-port", "0"),
    ("--resolv-conf", "/run/systemd/resolve/resolv.conf"),
    ("--rotate-certificates", "true"),
    ("--streaming-connection-idle-timeout", "4h"),
    ("--tls-cert-file", concatcp!(KUBELET_CERTS_DIR, "/kubeletserver.crt")),
    ("--tls-cipher-suites", TLS_CIPHER_SUITES),
    ("--tls-private-key-file", concatcp!(KUBELET_CERTS_DIR, "/kubeletserver.key")),
];

const KUBELET_NODE_LABELS_BASE: [(&str, &str); 1] = [(labels::MODE_KEY, "user")];

static DEFAULT_CONFIGURATION: LazyLock<Configuration> = LazyLock::new(|| Configuration {
    identity_config: Some(IdentityConfig {
        target_cloud: TARGET_CLOUD.to_owned(),
        ..Default::default()
    }),
    api_server_config: Some(ApiServerConfig::default()),
    cluster_config: Some(ClusterConfig {
        vm_type: VmType::Vmss,
        use_instance_metadata: true,
        load_balancer_config: LoadBalancerConfig {
            load_balancer_sku: LoadBalancerSku::Standard,
            exclude_master_from_standard_load_balancer: true,
            max_load_balancer_rule_count: 250,
            disable_outbound_snat: false,
        },
        virtual_network_config: ClusterNetworkConfig {
            subnet: DEFAULT_SUBNET.to_owned(),
            ..Default::default()
        },
        ..Default::default()
    }),
    network_config: Some(NetworkConfig {
        vnet_cni_plugins_url: vnet_cni_plugins_url(Arch::Amd64),
        cni_plugins_url: cni_plugins_url(Arch::Amd64),
        ..Default::default()
    }),
    kube_binary_config: Some(KubeBinaryConfig::default()),
    gpu_config: Some(GpuConfig::default()),
    tls_bootstrapping_config: Some(TlsBootstrappingConfig::default()),
    kubelet_config: Some(KubeletConfig {
        kubelet_flags: to_string_map(&KUBELET_FLAGS_BASE),
        kubelet_node_labels: to_string_map(&KUBELET_NODE_LABELS_BASE),
        ..Default::default()
    }),
    custom_cloud_config: Some(CustomCloudConfig {
        target_environment: TARGET_CLOUD.to_owned(),
        ..Default::default()
    }),
    containerd_config: Some(ContainerdConfig::default()),
    runc_config: Some(RuncConfig::default()),
    teleport_config: Some(TeleportConfig::default()),
    http_proxy_config: Some(HttpProxyConfig::default()),
    custom_linux_os_config: Some(CustomLinuxOsConfig::default()),
    linux_admin_username: LINUX_ADMIN_USERNAME.to_owned(),
    enable_ssh: true,
    is_vhd: true,
    outbound_command: DEFAULT_OUTBOUND_COMMAND.to_owned(),
    ..Default::default()
});

/// Returns a fresh working copy of the baseline configuration.
///
/// The shared baseline itself is never handed out mutably, so concurrent
/// builds cannot observe each other's changes.
pub fn default_configuration() -> Configuration {
    DEFAULT_CONFIGURATION.clone()
}

/// Download URL of the kubelet/kubectl release bundle.
pub fn kube_binary_url(kubernetes_version: &str, arch: Arch) -> String {
    let version = kubernetes_version.trim_start_matches('v');
    format!("{AKS_MIRROR}/kubernetes/v{version}/binaries/kubernetes-node-linux-{arch}.tar.gz")
}

pub fn vnet_cni_plugins_url(arch: Arch) -> String {
    format!(
        "{AKS_MIRROR}/azure-cni/{AZURE_CNI_VERSION}/binaries/azure-vnet-cni-linux-{arch}-{AZURE_CNI_VERSION}.tgz"
    )
}

pub fn cni_plugins_url(arch: Arch) -> String {
    format!(
        "{AKS_MIRROR}/cni-plugins/{CNI_PLUGINS_VERSION}/binaries/cni-plugins-linux-{arch}-{CNI_PLUGINS_VERSION}.tgz"
    )
}

fn to_string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}
