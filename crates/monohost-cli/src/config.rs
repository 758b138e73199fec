//! Host configuration (monohost.toml)
//!
//! Every field has a default, so an empty or absent file is valid.
//! Command-line flags are applied on top with [`HostConfig::apply`].

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

/// File looked up in the application directory when `--config` is not given
pub const CONFIG_FILE_NAME: &str = "monohost.toml";

/// Settings for one hosted run
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Runtime library, relative to the application directory or absolute
    pub runtime_library: String,

    /// Root domain name passed to the runtime
    pub domain_name: String,

    /// Runtime version passed to the runtime
    pub runtime_version: String,

    /// Assembly to execute, relative to the application directory or absolute
    pub entry_assembly: String,

    /// Arguments passed to the assembly's entry point
    pub args: Vec<String>,

    /// Initialization properties passed after the TPA list, in order
    pub properties: Vec<Property>,
}

/// A single initialization property
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Property {
    pub key: String,
    pub value: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            runtime_library: default_runtime_library().to_string(),
            domain_name: "mono_in_core".to_string(),
            runtime_version: monohost::NORMAL_VERSION.to_string(),
            entry_assembly: "InnerApp.dll".to_string(),
            args: vec!["hi".to_string()],
            properties: Vec::new(),
        }
    }
}

/// Runtime library file name expected in an application directory.
pub fn default_runtime_library() -> &'static str {
    if cfg!(target_os = "macos") {
        "libcoreclr.dylib"
    } else if cfg!(target_os = "windows") {
        "coreclr.dll"
    } else {
        "libmonosgen-2.0.so"
    }
}

/// Values given on the command line; `None`/empty leaves the file value alone.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub runtime_library: Option<String>,
    pub domain_name: Option<String>,
    pub runtime_version: Option<String>,
    pub entry_assembly: Option<String>,
    pub properties: Vec<(String, String)>,
    pub args: Vec<String>,
}

impl HostConfig {
    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse host configuration")
    }

    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Load `explicit` if given, else `monohost.toml` in `app_dir` if present,
    /// else the defaults.
    pub fn discover(app_dir: &Path, explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        let candidate = app_dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "using host configuration");
            return Self::from_file(&candidate);
        }
        Ok(Self::default())
    }

    /// Apply command-line overrides. Properties given on the command line
    /// come after the file's; arguments replace the file's.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(lib) = overrides.runtime_library {
            self.runtime_library = lib;
        }
        if let Some(name) = overrides.domain_name {
            self.domain_name = name;
        }
        if let Some(version) = overrides.runtime_version {
            self.runtime_version = version;
        }
        if let Some(assembly) = overrides.entry_assembly {
            self.entry_assembly = assembly;
        }
        self.properties.extend(
            overrides
                .properties
                .into_iter()
                .map(|(key, value)| Property { key, value }),
        );
        if !overrides.args.is_empty() {
            self.args = overrides.args;
        }
    }
}

/// Parse `KEY=VALUE` from the command line.
pub fn parse_property(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}
