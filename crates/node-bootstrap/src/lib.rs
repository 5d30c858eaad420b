//! Assembles the bootstrap payload handed to a newly provisioned AKS worker
//! node.
//!
//! A bootstrap request runs through a fixed pipeline:
//!
//! 1. the [default catalog](catalog) is copied,
//! 2. computed, environment and user supplied values are [layered](overrides)
//!    on top of it,
//! 3. the merged [`Configuration`] is [validated](validation),
//! 4. a [renderer](render) turns it into script text, which is
//! 5. base64 encoded.
//!
//! [`build`] runs all of it with the bundled script template:
//!
//! ```no_run
//! use node_bootstrap::{Options, build};
//!
//! let options = Options {
//!     tenant_id: "tenant".to_owned(),
//!     subscription_id: "subscription".to_owned(),
//!     location: "westeurope".to_owned(),
//!     resource_group: "MC_rg_cluster_westeurope".to_owned(),
//!     cluster_id: "12345678".to_owned(),
//!     kubernetes_version: "1.29.4".to_owned(),
//!     vm_size: "Standard_D4s_v3".to_owned(),
//!     ..Default::default()
//! };
//!
//! let payload = build(&options)?;
//! # Ok::<(), node_bootstrap::Error>(())
//! ```
//!
//! Every build works on its own copy of the catalog, so concurrent builds
//! don't need any synchronization.

pub mod assembler;
pub mod catalog;
pub mod config;
pub mod duration;
pub mod env;
pub mod kv;
pub mod labels;
pub mod options;
pub mod overrides;
pub mod render;
pub mod resource_id;
pub mod sku;
pub mod validation;

pub use assembler::{Error, Stage, assemble, build, build_with};
pub use config::Configuration;
pub use env::{Environment, ProcessEnvironment};
pub use options::{Arch, KubeletConfiguration, Options};
pub use render::{Render, ScriptTemplate};
