//! Well-known node label keys and validation of label key/value pairs.
//!
//! Node labels are handed to the kubelet verbatim via `--node-labels`. An
//! invalid label makes the kubelet refuse to register the node, so labels are
//! checked before the bootstrap script is rendered.
//!
//! See <https://kubernetes.io/docs/concepts/overview/working-with-objects/labels/>
//! for the format.

use std::sync::LazyLock;

use const_format::concatcp;
use regex::Regex;
use snafu::{Snafu, ensure};

use crate::kv::LABEL_VALUE_MAX_LEN;

const KEY_PREFIX_MAX_LEN: usize = 253;
const KEY_NAME_MAX_LEN: usize = 63;

/// The AKS-specific node label key prefix.
const AKS_KEY_PREFIX: &str = "kubernetes.azure.com/";

pub const MODE_KEY: &str = concatcp!(AKS_KEY_PREFIX, "mode");
pub const ROLE_KEY: &str = concatcp!(AKS_KEY_PREFIX, "role");
pub const CLUSTER_KEY: &str = concatcp!(AKS_KEY_PREFIX, "cluster");

pub const VNET_DATA_PLANE_KEY: &str = concatcp!(AKS_KEY_PREFIX, "ebpf-dataplane");
pub const VNET_NETWORK_NAME_KEY: &str = concatcp!(AKS_KEY_PREFIX, "network-name");
pub const VNET_SUBNET_NAME_KEY: &str = concatcp!(AKS_KEY_PREFIX, "network-subnet");
pub const VNET_SUBSCRIPTION_ID_KEY: &str = concatcp!(AKS_KEY_PREFIX, "network-subscription");
pub const VNET_GUID_KEY: &str = concatcp!(AKS_KEY_PREFIX, "nodenetwork-vnetguid");
pub const VNET_POD_NETWORK_TYPE_KEY: &str = concatcp!(AKS_KEY_PREFIX, "podnetwork-type");

pub const CILIUM_DATA_PLANE: &str = "cilium";
pub const OVERLAY_NETWORK_TYPE: &str = "overlay";

// Lazily initialized regular expressions
static KEY_PREFIX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z](\.?[a-zA-Z0-9-])*\.[a-zA-Z]{2,}\.?$")
        .expect("failed to compile key prefix regex")
});

static KEY_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9A-Z]([a-z0-9A-Z-_.]*[a-z0-9A-Z]+)?$")
        .expect("failed to compile key name regex")
});

static LABEL_VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9A-Z]([a-z0-9A-Z-_.]*[a-z0-9A-Z]+)?$")
        .expect("failed to compile value regex")
});

/// The error type for label validation.
#[derive(Debug, PartialEq, Snafu)]
pub enum LabelError {
    #[snafu(display("label key cannot be empty"))]
    EmptyKey,

    #[snafu(display("label key prefixes cannot be nested, only use a single slash"))]
    NestedPrefix,

    #[snafu(display(
        "key prefix exceeds the maximum length - expected 253 characters or less, got {length}"
    ))]
    PrefixTooLong { length: usize },

    #[snafu(display("key prefix {prefix:?} violates kubernetes format"))]
    PrefixInvalid { prefix: String },

    #[snafu(display(
        "key name exceeds the maximum length - expected 63 characters or less, got {length}"
    ))]
    NameTooLong { length: usize },

    #[snafu(display("key name {name:?} violates kubernetes format"))]
    NameInvalid { name: String },

    #[snafu(display(
        "value exceeds the maximum length - expected 63 characters or less, got {length}"
    ))]
    ValueTooLong { length: usize },

    #[snafu(display("value contains non-ascii characters"))]
    ValueNotAscii,

    #[snafu(display("value {value:?} violates kubernetes format"))]
    ValueInvalid { value: String },
}

/// Checks that `key` and `value` form a valid Kubernetes label.
pub fn validate_label(key: &str, value: &str) -> Result<(), LabelError> {
    validate_key(key)?;
    validate_value(value)
}

fn validate_key(key: &str) -> Result<(), LabelError> {
    ensure!(!key.is_empty(), EmptyKeySnafu);

    let (prefix, name) = match key.split('/').collect::<Vec<_>>()[..] {
        [name] => (None, name),
        [prefix, name] => (Some(prefix), name),
        _ => return NestedPrefixSnafu.fail(),
    };

    if let Some(prefix) = prefix {
        ensure!(
            prefix.len() <= KEY_PREFIX_MAX_LEN,
            PrefixTooLongSnafu {
                length: prefix.len()
            }
        );
        ensure!(KEY_PREFIX_REGEX.is_match(prefix), PrefixInvalidSnafu { prefix });
    }

    ensure!(
        name.len() <= KEY_NAME_MAX_LEN,
        NameTooLongSnafu { length: name.len() }
    );
    ensure!(KEY_NAME_REGEX.is_match(name), NameInvalidSnafu { name });

    Ok(())
}

fn validate_value(value: &str) -> Result<(), LabelError> {
    // Label values can be empty
    if value.is_empty() {
        return Ok(());
    }

    ensure!(
        value.len() <= LABEL_VALUE_MAX_LEN,
        ValueTooLongSnafu {
            length: value.len()
        }
    );
    ensure!(value.is_ascii(), ValueNotAsciiSnafu);
    ensure!(LABEL_VALUE_REGEX.is_match(value), ValueInvalidSnafu { value });

    Ok(())
}
