//! Configuration management.
//!
//! Values are layered: defaults, then a TOML config file, then environment
//! variables.
//!
//! ```toml
//! [directory]
//! server = "od.example.com"
//! base_dn = "dc=example,dc=com"
//! use_tls = true
//! connect_timeout_secs = 5
//!
//! [logging]
//! format = "json"
//! filter = "opendir=debug"
//! ```

use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the server address.
pub const ENV_SERVER: &str = "OPEN_DIRECTORY_SERVER";
/// Environment variable overriding the base location.
pub const ENV_BASE_DN: &str = "OPEN_DIRECTORY_BASE_DN";
/// Environment variable overriding the bind DN.
pub const ENV_BIND_DN: &str = "OPEN_DIRECTORY_BIND_DN";
/// Environment variable overriding the bind password.
pub const ENV_BIND_PASSWORD: &str = "OPEN_DIRECTORY_BIND_PASSWORD";
/// Environment variable toggling TLS.
pub const ENV_USE_TLS: &str = "OPEN_DIRECTORY_USE_TLS";

/// Default server address.
pub const DEFAULT_SERVER: &str = "localhost";

/// Main configuration for opendir.
#[derive(Debug, Clone, Default)]
pub struct OpendirConfig {
    /// Directory endpoint.
    pub directory: DirectoryConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Connection parameters for one directory endpoint.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Server host name, or a full `ldap://`/`ldaps://` URL.
    pub server: String,
    /// Explicit base location; derived from `server` when unset.
    pub base_dn: Option<String>,
    /// Connect with `ldaps://` when `server` carries no scheme.
    pub use_tls: bool,
    /// DN for a simple bind; anonymous when unset.
    pub bind_dn: Option<String>,
    /// Password for the simple bind.
    pub bind_password: Option<SecretString>,
    /// Connection timeout enforced by the transport.
    pub connect_timeout: Option<Duration>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            base_dn: None,
            use_tls: true,
            bind_dn: None,
            bind_password: None,
            connect_timeout: None,
        }
    }
}

impl DirectoryConfig {
    /// Sets the server address.
    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Sets an explicit base location.
    #[must_use]
    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.base_dn = Some(base_dn.into());
        self
    }

    /// Enables or disables TLS.
    #[must_use]
    pub const fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Sets bind credentials.
    #[must_use]
    pub fn with_bind(mut self, dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.bind_dn = Some(dn.into());
        self.bind_password = Some(SecretString::from(password.into()));
        self
    }

    /// The URL handed to the transport.
    ///
    /// A server that already carries a scheme is used verbatim.
    #[must_use]
    pub fn url(&self) -> String {
        if self.server.contains("://") {
            self.server.clone()
        } else if self.use_tls {
            format!("ldaps://{}", self.server)
        } else {
            format!("ldap://{}", self.server)
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parses a format name; unknown names fall back to pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default)]
pub struct LoggingSettings {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: Option<String>,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Directory section.
    pub directory: Option<ConfigFileDirectory>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Directory section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDirectory {
    /// Server address.
    pub server: Option<String>,
    /// Base location.
    pub base_dn: Option<String>,
    /// TLS toggle.
    pub use_tls: Option<bool>,
    /// Bind DN.
    pub bind_dn: Option<String>,
    /// Bind password.
    pub bind_password: Option<String>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive.
    pub filter: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl OpendirConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;
        Self::parse(&contents)
    }

    /// Parses configuration from TOML text.
    pub fn parse(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir, then `~/.config/opendir/`. Returns
    /// default configuration if no readable config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("opendir").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("opendir")
                .join("config.toml"),
        ];
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> crate::Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> crate::Result<()> {
        let directory = &mut self.directory;
        if let Some(server) = lookup(ENV_SERVER) {
            directory.server = server;
        }
        if let Some(base_dn) = lookup(ENV_BASE_DN) {
            directory.base_dn = Some(base_dn);
        }
        if let Some(bind_dn) = lookup(ENV_BIND_DN) {
            directory.bind_dn = Some(bind_dn);
        }
        if let Some(password) = lookup(ENV_BIND_PASSWORD) {
            directory.bind_password = Some(SecretString::from(password));
        }
        if let Some(value) = lookup(ENV_USE_TLS) {
            directory.use_tls = parse_bool(ENV_USE_TLS, &value)?;
        }
        Ok(())
    }

    /// Converts a `ConfigFile` to `OpendirConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(directory) = file.directory {
            if let Some(server) = directory.server {
                config.directory.server = server;
            }
            config.directory.base_dn = directory.base_dn;
            if let Some(use_tls) = directory.use_tls {
                config.directory.use_tls = use_tls;
            }
            config.directory.bind_dn = directory.bind_dn;
            config.directory.bind_password = directory.bind_password.map(SecretString::from);
            config.directory.connect_timeout =
                directory.connect_timeout_secs.map(Duration::from_secs);
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.logging.format = LogFormat::parse(&format);
            }
            config.logging.filter = logging.filter;
            config.logging.file = logging.file.map(PathBuf::from);
        }

        config
    }
}

fn parse_bool(key: &str, value: &str) -> crate::Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(crate::Error::Configuration(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}
