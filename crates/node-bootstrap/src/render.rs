//! Rendering of a validated [`Configuration`] into bootstrap script text.

use std::sync::LazyLock;

use handlebars::Handlebars;
use serde::Serialize;
use snafu::{ResultExt, Snafu};

use crate::{
    config::{
        Configuration, CustomLinuxOsConfig, KubeletConfig, sysctl_content, ulimit_content,
    },
    kv::{create_sorted_key_value_pairs, join_sorted},
    overrides::kubelet_config_file_enabled,
};

const TEMPLATE_NAME: &str = "customdata";

static BUNDLED_TEMPLATE: LazyLock<ScriptTemplate> = LazyLock::new(|| {
    ScriptTemplate::new(include_str!("../templates/customdata.sh.hbs"))
        .expect("failed to parse the bundled bootstrap script template")
});

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse the bootstrap script template"))]
    ParseTemplate {
        source: Box<handlebars::TemplateError>,
    },

    #[snafu(display("failed to render the bootstrap script template"))]
    RenderTemplate { source: handlebars::RenderError },
}

/// Turns a configuration into script text.
///
/// Implementations must be deterministic: the same configuration always
/// renders to the same text.
pub trait Render {
    fn render(&self, config: &Configuration) -> Result<String, Error>;
}

/// A handlebars template rendering the bootstrap script.
///
/// The template runs in strict mode, a reference to a field that doesn't exist
/// fails the render instead of producing an empty string. Values inserted with
/// `{{...}}` are escaped for use inside a double quoted shell string, see
/// [`escape_double_quoted`]. `{{{...}}}` inserts them verbatim.
///
/// Besides every field of the [`Configuration`], the template can use
/// - `kubelet_flags`: all kubelet flags as space separated `--flag=value`
/// - `kubelet_node_labels`: all node labels as `key=value,...`
/// - `sysctl_content` and `ulimit_content`: the base64 encoded OS tuning files
/// - `kubelet_config_file_enabled`
pub struct ScriptTemplate {
    registry: Handlebars<'static>,
}

impl std::fmt::Debug for ScriptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptTemplate").finish_non_exhaustive()
    }
}

impl ScriptTemplate {
    /// Parses `template` into a new [`ScriptTemplate`].
    pub fn new(template: &str) -> Result<Self, Error> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(escape_double_quoted);
        registry
            .register_template_string(TEMPLATE_NAME, template)
            .map_err(Box::new)
            .context(ParseTemplateSnafu)?;

        Ok(Self { registry })
    }

    /// The template producing the node bootstrap shell script.
    pub fn bundled() -> &'static Self {
        &BUNDLED_TEMPLATE
    }
}

impl Render for ScriptTemplate {
    fn render(&self, config: &Configuration) -> Result<String, Error> {
        self.registry
            .render(TEMPLATE_NAME, &ScriptContext::new(config))
            .context(RenderTemplateSnafu)
    }
}

/// Escapes `value` so that it stays a literal inside a double quoted shell
/// string: `\`, `"`, `$` and `` ` `` are prefixed with a backslash.
pub fn escape_double_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for chr in value.chars() {
        if matches!(chr, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(chr);
    }
    escaped
}

/// The data handed to the template.
#[derive(Serialize)]
struct ScriptContext<'a> {
    #[serde(flatten)]
    config: &'a Configuration,
    kubelet_flags: String,
    kubelet_node_labels: String,
    kubelet_config_file_enabled: bool,
    sysctl_content: String,
    ulimit_content: String,
}

impl<'a> ScriptContext<'a> {
    fn new(config: &'a Configuration) -> Self {
        let default_kubelet = KubeletConfig::default();
        let kubelet = config.kubelet_config.as_ref().unwrap_or(&default_kubelet);
        let default_linux_os = CustomLinuxOsConfig::default();
        let linux_os = config
            .custom_linux_os_config
            .as_ref()
            .unwrap_or(&default_linux_os);

        Self {
            config,
            kubelet_flags: create_sorted_key_value_pairs(&kubelet.kubelet_flags, " "),
            kubelet_node_labels: join_sorted(&kubelet.kubelet_node_labels, "="),
            kubelet_config_file_enabled: kubelet_config_file_enabled(
                &kubelet.kubelet_config_file_content,
                &config.kubernetes_version,
            ),
            sysctl_content: sysctl_content(&linux_os.sysctl_config),
            ulimit_content: ulimit_content(&linux_os.ulimit_config),
        }
    }
}
