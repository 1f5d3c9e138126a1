//! Runtime configuration.

use crate::error::{Error, Result};
use crate::loader::ResourceKind;
use serde::Deserialize;

/// Host-wide settings.
///
/// Per-view settings live in [`ViewOptions`](crate::ViewOptions); nothing here is mutated after
/// the host is built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// If true, template sources are compiled as soon as they are loaded.
    pub compilable: bool,

    /// View name used for declarations that don’t name a view.
    pub default_view_name: String,

    /// Layout type used when a layout object has no `type`.
    pub default_layout_type: String,

    pub loader: LoaderConfig,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            compilable: false,
            default_view_name: "View".into(),
            default_layout_type: "default".into(),
            loader: LoaderConfig::default(),
        }
    }
}

impl Config {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Config> {
        serde_json::from_str(source).map_err(|err| Error::format("config", err))
    }
}

/// Settings for the default resource loader.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderConfig {
    pub paths: PathConfig,

    /// Appended to every request as `?r=<value>` to defeat intermediate caches.
    pub cache_timestamp: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> LoaderConfig {
        LoaderConfig {
            paths: PathConfig::default(),
            cache_timestamp: None,
        }
    }
}

/// Path patterns per resource kind; `{name}` is replaced with the resource name, dots turned
/// into slashes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathConfig {
    pub layout: String,
    pub template: String,
    pub layout_template: String,
}

impl Default for PathConfig {
    fn default() -> PathConfig {
        PathConfig {
            layout: "res/layouts/{name}.json".into(),
            template: "res/templates/{name}.tpl".into(),
            layout_template: "res/layout-types/{name}.tpl".into(),
        }
    }
}

impl PathConfig {
    pub fn pattern(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Layout => &self.layout,
            ResourceKind::Template => &self.template,
            ResourceKind::LayoutTemplate => &self.layout_template,
        }
    }

    pub fn resolve(&self, kind: ResourceKind, name: &str) -> String {
        self.pattern(kind).replace("{name}", &name.replace('.', "/"))
    }
}
