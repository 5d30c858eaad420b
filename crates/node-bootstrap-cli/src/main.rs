//! Renders the bootstrap payload for a node from a YAML options document.
//!
//! The payload is written to stdout, logs go to stderr. Virtual network
//! details are read from `AZURE_VNET_NAME`, `AZURE_SUBNET_NAME` and
//! `AZURE_VNET_GUID`.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use base64::{Engine, engine::general_purpose::STANDARD};
use clap::Parser;
use node_bootstrap::{Options, ProcessEnvironment, ScriptTemplate, build_with};
use snafu::{ResultExt, Snafu};
use tracing::debug;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

const LOG_ENV_VAR: &str = "NODE_BOOTSTRAP_LOG";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to read file {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to deserialize bootstrap options from {path:?}"))]
    DeserializeOptions {
        source: serde_yaml::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse the script template {path:?}"))]
    ParseTemplate {
        source: node_bootstrap::render::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to build the bootstrap payload"))]
    Build { source: node_bootstrap::Error },

    #[snafu(display("failed to decode the bootstrap payload"))]
    DecodePayload { source: base64::DecodeError },

    #[snafu(display("failed to write to stdout"))]
    WriteOutput { source: std::io::Error },
}

/// Renders the base64 encoded bootstrap payload of an AKS worker node.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// YAML file containing the bootstrap options.
    #[arg(long, env = "NODE_BOOTSTRAP_OPTIONS")]
    options: PathBuf,

    /// Handlebars template to render instead of the bundled bootstrap script.
    #[arg(long, env = "NODE_BOOTSTRAP_TEMPLATE")]
    template: Option<PathBuf>,

    /// Print the rendered script instead of the base64 encoded payload.
    #[arg(long)]
    decode: bool,
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    initialize_logging();

    let options = load_options(&cli.options)?;
    let custom_template = cli.template.as_deref().map(load_template).transpose()?;
    let template = custom_template
        .as_ref()
        .unwrap_or_else(|| ScriptTemplate::bundled());

    let payload = build_with(&options, &ProcessEnvironment, template).context(BuildSnafu)?;

    let output = if cli.decode {
        STANDARD.decode(&payload).context(DecodePayloadSnafu)?
    } else {
        payload.into_bytes()
    };

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(&output)
        .and_then(|()| stdout.flush())
        .context(WriteOutputSnafu)
}

/// Logs to stderr, filtered by [`LOG_ENV_VAR`]. Without it only INFO and above
/// is shown.
fn initialize_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(LOG_ENV_VAR)
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_options(path: &Path) -> Result<Options, Error> {
    debug!(?path, "loading bootstrap options");

    let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    serde_yaml::from_str(&contents).context(DeserializeOptionsSnafu { path })
}

fn load_template(path: &Path) -> Result<ScriptTemplate, Error> {
    debug!(?path, "loading script template");

    let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
    ScriptTemplate::new(&contents).context(ParseTemplateSnafu { path })
}
