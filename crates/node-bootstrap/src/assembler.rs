//! The end to end pipeline producing the base64 encoded bootstrap payload.

use base64::{Engine, engine::general_purpose::STANDARD};
use snafu::{ResultExt, Snafu};
use tracing::info;

use crate::{
    catalog,
    config::Configuration,
    env::{Environment, ProcessEnvironment},
    options::Options,
    overrides,
    render::{self, Render, ScriptTemplate},
    validation,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to apply the bootstrap options"))]
    ApplyOptions { source: overrides::Error },

    #[snafu(display("failed to validate the node configuration"))]
    ValidateConfiguration { source: validation::Error },

    #[snafu(display("failed to render the bootstrap script"))]
    RenderScript { source: render::Error },
}

impl Error {
    /// The pipeline stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::ApplyOptions { .. } => Stage::ApplyOptions,
            Self::ValidateConfiguration { .. } => Stage::Validate,
            Self::RenderScript { .. } => Stage::Render,
        }
    }
}

/// A stage of the bootstrap pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Stage {
    /// Bad input: a required option is missing or malformed.
    ApplyOptions,

    /// The merged configuration is inconsistent.
    Validate,

    /// The template could not be rendered.
    Render,
}

/// Builds the bootstrap payload for `options` with the bundled script
/// template, reading virtual network details from the process environment.
pub fn build(options: &Options) -> Result<String, Error> {
    build_with(options, &ProcessEnvironment, ScriptTemplate::bundled())
}

/// Builds the base64 encoded bootstrap payload for `options`.
///
/// Either the complete payload is returned, or the error of the first stage
/// that failed.
pub fn build_with(
    options: &Options,
    environment: &dyn Environment,
    renderer: &dyn Render,
) -> Result<String, Error> {
    let config = assemble(options, environment)?;
    let script = renderer.render(&config).context(RenderScriptSnafu)?;

    info!(
        vm_size = %config.vm_size,
        kubernetes_version = %config.kubernetes_version,
        "rendered bootstrap script"
    );

    Ok(STANDARD.encode(script))
}

/// Returns the validated configuration for `options`, without rendering it.
pub fn assemble(
    options: &Options,
    environment: &dyn Environment,
) -> Result<Configuration, Error> {
    let config = overrides::apply(catalog::default_configuration(), options, environment)
        .context(ApplyOptionsSnafu)?;
    validation::validate(&config).context(ValidateConfigurationSnafu)?;

    Ok(config)
}
