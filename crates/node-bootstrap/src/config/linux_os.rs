use std::collections::BTreeMap;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::kv::create_sorted_key_value_pairs;

/// Sysctl values every node gets unless overridden.
const SYSCTL_DEFAULTS: [(&str, &str); 8] = [
    ("net.core.message_burst", "80"),
    ("net.core.message_cost", "40"),
    ("net.core.somaxconn", "16384"),
    ("net.ipv4.neigh.default.gc_thresh1", "4096"),
    ("net.ipv4.neigh.default.gc_thresh2", "8192"),
    ("net.ipv4.neigh.default.gc_thresh3", "16384"),
    ("net.ipv4.tcp_max_syn_backlog", "16384"),
    ("net.ipv4.tcp_retries2", "8"),
];

/// OS level tuning applied on the node before the kubelet starts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct CustomLinuxOsConfig {
    pub enable_swap_config: bool,
    pub swap_file_size_mb: i32,
    pub transparent_hugepage_support: String,
    pub transparent_defrag: String,
    pub sysctl_config: SysctlConfig,
    pub ulimit_config: UlimitConfig,
}

/// Sysctl overrides. Unset fields keep the node image (or baseline) value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct SysctlConfig {
    pub net_core_somaxconn: Option<i32>,
    pub net_core_netdev_max_backlog: Option<i32>,
    pub net_core_rmem_default: Option<i32>,
    pub net_core_rmem_max: Option<i32>,
    pub net_core_wmem_default: Option<i32>,
    pub net_core_wmem_max: Option<i32>,
    pub net_core_optmem_max: Option<i32>,
    pub net_ipv4_tcp_max_syn_backlog: Option<i32>,
    pub net_ipv4_tcp_max_tw_buckets: Option<i32>,
    pub net_ipv4_tcp_fin_timeout: Option<i32>,
    pub net_ipv4_tcp_keepalive_time: Option<i32>,
    pub net_ipv4_tcp_keepalive_probes: Option<i32>,
    pub net_ipv4_tcpkeepalive_intvl: Option<i32>,
    pub net_ipv4_tcp_tw_reuse: Option<bool>,
    pub net_ipv4_ip_local_port_range: Option<String>,
    pub net_ipv4_neigh_default_gc_thresh1: Option<i32>,
    pub net_ipv4_neigh_default_gc_thresh2: Option<i32>,
    pub net_ipv4_neigh_default_gc_thresh3: Option<i32>,
    pub net_netfilter_nf_conntrack_max: Option<i32>,
    pub net_netfilter_nf_conntrack_buckets: Option<i32>,
    pub fs_inotify_max_user_watches: Option<i32>,
    pub fs_file_max: Option<i32>,
    pub fs_aio_max_nr: Option<i32>,
    pub fs_nr_open: Option<i32>,
    pub kernel_threads_max: Option<i32>,
    pub vm_max_map_count: Option<i32>,
    pub vm_swappiness: Option<i32>,
    pub vm_vfs_cache_pressure: Option<i32>,
}

impl SysctlConfig {
    /// Returns the explicitly set fields keyed by their sysctl name.
    fn to_sysctls(&self) -> BTreeMap<&'static str, String> {
        let numeric = [
            ("net.core.somaxconn", self.net_core_somaxconn),
            ("net.core.netdev_max_backlog", self.net_core_netdev_max_backlog),
            ("net.core.rmem_default", self.net_core_rmem_default),
            ("net.core.rmem_max", self.net_core_rmem_max),
            ("net.core.wmem_default", self.net_core_wmem_default),
            ("net.core.wmem_max", self.net_core_wmem_max),
            ("net.core.optmem_max", self.net_core_optmem_max),
            ("net.ipv4.tcp_max_syn_backlog", self.net_ipv4_tcp_max_syn_backlog),
            ("net.ipv4.tcp_max_tw_buckets", self.net_ipv4_tcp_max_tw_buckets),
            ("net.ipv4.tcp_fin_timeout", self.net_ipv4_tcp_fin_timeout),
            ("net.ipv4.tcp_keepalive_time", self.net_ipv4_tcp_keepalive_time),
            ("net.ipv4.tcp_keepalive_probes", self.net_ipv4_tcp_keepalive_probes),
            ("net.ipv4.tcp_keepalive_intvl", self.net_ipv4_tcpkeepalive_intvl),
            ("net.ipv4.neigh.default.gc_thresh1", self.net_ipv4_neigh_default_gc_thresh1),
            ("net.ipv4.neigh.default.gc_thresh2", self.net_ipv4_neigh_default_gc_thresh2),
            ("net.ipv4.neigh.default.gc_thresh3", self.net_ipv4_neigh_default_gc_thresh3),
            ("net.netfilter.nf_conntrack_max", self.net_netfilter_nf_conntrack_max),
            ("net.netfilter.nf_conntrack_buckets", self.net_netfilter_nf_conntrack_buckets),
            ("fs.inotify.max_user_watches", self.fs_inotify_max_user_watches),
            ("fs.file-max", self.fs_file_max),
            ("fs.aio-max-nr", self.fs_aio_max_nr),
            ("fs.nr_open", self.fs_nr_open),
            ("kernel.threads-max", self.kernel_threads_max),
            ("vm.max_map_count", self.vm_max_map_count),
            ("vm.swappiness", self.vm_swappiness),
            ("vm.vfs_cache_pressure", self.vm_vfs_cache_pressure),
        ];

        let mut sysctls = numeric
            .into_iter()
            .filter_map(|(name, value)| value.map(|value| (name, value.to_string())))
            .collect::<BTreeMap<_, _>>();

        if let Some(tw_reuse) = self.net_ipv4_tcp_tw_reuse {
            sysctls.insert("net.ipv4.tcp_tw_reuse", u8::from(tw_reuse).to_string());
        }
        if let Some(port_range) = &self.net_ipv4_ip_local_port_range {
            sysctls.insert("net.ipv4.ip_local_port_range", port_range.clone());
        }

        sysctls
    }
}

/// Limits written into the systemd drop-in of the container runtime.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct UlimitConfig {
    pub no_file: Option<String>,
    pub max_locked_memory: Option<String>,
}

/// Returns the base64 encoded sysctl settings for the node: the baseline
/// values overlaid with everything set in `sysctl`, as sorted space separated
/// `name=value` pairs.
pub fn sysctl_content(sysctl: &SysctlConfig) -> String {
    let mut sysctls = SYSCTL_DEFAULTS
        .into_iter()
        .map(|(name, value)| (name, value.to_owned()))
        .collect::<BTreeMap<_, _>>();
    sysctls.extend(sysctl.to_sysctls());

    STANDARD.encode(create_sorted_key_value_pairs(sysctls, " "))
}

/// Returns the base64 encoded `[Service]` section carrying the limits set in
/// `ulimit`.
pub fn ulimit_content(ulimit: &UlimitConfig) -> String {
    let limits = [
        ("LimitNOFILE", &ulimit.no_file),
        ("LimitMEMLOCK", &ulimit.max_locked_memory),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.as_ref().map(|value| (name, value)));

    let content = format!("[Service]\n{}", create_sorted_key_value_pairs(limits, " "));
    STANDARD.encode(content)
}
