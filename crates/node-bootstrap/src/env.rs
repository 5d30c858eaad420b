//! Read-only access to the process environment.
//!
//! The override layers never call [`std::env`] directly. They go through
//! [`Environment`], which keeps a build reproducible for a given set of
//! variables and lets tests supply them without touching the process.

use std::collections::{BTreeMap, HashMap};

/// The GUID of the virtual network the node joins.
pub const AZURE_VNET_GUID: &str = "AZURE_VNET_GUID";

/// The name of the virtual network the node joins.
pub const AZURE_VNET_NAME: &str = "AZURE_VNET_NAME";

/// The name of the subnet the node joins.
pub const AZURE_SUBNET_NAME: &str = "AZURE_SUBNET_NAME";

/// A source of environment variables.
pub trait Environment {
    /// Returns the value of `name`, or [`None`] if it is not set.
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads variables from the environment of the current process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for BTreeMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}
