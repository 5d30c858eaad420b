//! Flattening of structured kubelet settings into command line flags.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Taint;
use semver::Version;

use crate::{kv::insert_joined, options::KubeletConfiguration};

pub const REGISTER_WITH_TAINTS_FLAG: &str = "--register-with-taints";

/// The first kubelet release reading its settings from a config file.
const KUBELET_CONFIG_FILE_MIN_VERSION: Version = Version::new(1, 14, 0);

/// Renders a taint in the `key=value:effect` form the kubelet accepts in
/// `--register-with-taints`. Empty parts are left out together with their
/// separator, an empty value with an effect yields `key:effect`.
pub fn taint_to_string(taint: &Taint) -> String {
    let value = taint.value.as_deref().unwrap_or_default();

    match (value.is_empty(), taint.effect.is_empty()) {
        (true, true) => taint.key.clone(),
        (false, true) => format!("{key}={value}:", key = taint.key),
        (true, false) => format!("{key}:{effect}", key = taint.key, effect = taint.effect),
        (false, false) => format!(
            "{key}={value}:{effect}",
            key = taint.key,
            effect = taint.effect
        ),
    }
}

/// Joins `taints` in order into the value of `--register-with-taints`.
/// Returns [`None`] if there are no taints.
pub fn register_with_taints(taints: &[Taint]) -> Option<String> {
    if taints.is_empty() {
        return None;
    }

    Some(
        taints
            .iter()
            .map(taint_to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Returns the kubelet flags for every field set in `config`. Unset fields
/// produce no flag at all, so a baseline flag for them stays in effect.
pub fn kubelet_configuration_flags(config: &KubeletConfiguration) -> BTreeMap<String, String> {
    let mut flags = BTreeMap::new();

    let mut insert = |name: &str, value: Option<String>| {
        if let Some(value) = value {
            flags.insert(name.to_owned(), value);
        }
    };

    insert("--max-pods", config.max_pods.map(|v| v.to_string()));
    insert("--pods-per-core", config.pods_per_core.map(|v| v.to_string()));
    insert(
        "--eviction-max-pod-grace-period",
        config.eviction_max_pod_grace_period.map(|v| v.to_string()),
    );
    insert(
        "--image-gc-high-threshold",
        config.image_gc_high_threshold_percent.map(|v| v.to_string()),
    );
    insert(
        "--image-gc-low-threshold",
        config.image_gc_low_threshold_percent.map(|v| v.to_string()),
    );
    insert("--cpu-cfs-quota", config.cpu_cfs_quota.map(|v| v.to_string()));

    insert_joined(
        &mut flags,
        "--system-reserved",
        config.system_reserved.iter().map(|(k, q)| (k, &q.0)),
        "=",
    );
    insert_joined(
        &mut flags,
        "--kube-reserved",
        config.kube_reserved.iter().map(|(k, q)| (k, &q.0)),
        "=",
    );
    insert_joined(&mut flags, "--eviction-hard", &config.eviction_hard, "<");
    insert_joined(&mut flags, "--eviction-soft", &config.eviction_soft, "<");
    insert_joined(
        &mut flags,
        "--eviction-soft-grace-period",
        &config.eviction_soft_grace_period,
        "=",
    );

    flags
}

/// Returns whether the kubelet should be started with a config file: there is
/// content for it and the kubelet is recent enough to read one.
///
/// A version that doesn't parse as semver (a leading `v` is accepted) counts as
/// too old.
pub fn kubelet_config_file_enabled(content: &str, kubernetes_version: &str) -> bool {
    if content.is_empty() {
        return false;
    }

    Version::parse(kubernetes_version.trim().trim_start_matches('v'))
        .is_ok_and(|version| version >= KUBELET_CONFIG_FILE_MIN_VERSION)
}
