//! Configuration file loading for the Toolshed launcher.
//!
//! The config file is TOML; every section is optional and a missing file
//! yields pure defaults, so `toolshed serve` works out of the box. The
//! session credential is deliberately not part of the file: it comes from
//! the `TOOLSHED_API_KEY` environment variable, read once at startup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use toolshed_mcp::cache::CacheConfig;
use toolshed_mcp::logsink::LogLevel;
use toolshed_mcp::ratelimit::BucketConfig;
use toolshed_mcp::server::{AuditSettings, AuthSettings, McpServerConfig};
use toolshed_mcp::Identity;

/// Environment variable carrying the session credential.
pub const CREDENTIAL_ENV_VAR: &str = "TOOLSHED_API_KEY";

/// Default config file location: ~/.toolshed/config.toml
pub fn default_config_path() -> PathBuf {
    toolshed_logging::toolshed_home().join("config.toml")
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub logging: LoggingSection,
    pub cache: CacheSection,
    pub rate_limit: RateLimitSection,
    pub audit: AuditSection,
    pub auth: AuthSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerSection {
    /// Server name reported in the initialize handshake.
    pub name: String,

    /// Roots served by the filesystem resource provider.
    pub allowed_roots: Vec<PathBuf>,

    /// Environment variables the environment tool may read.
    pub env_allowlist: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: "toolshed-mcp".to_string(),
            allowed_roots: Vec::new(),
            env_allowlist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingSection {
    /// Initial client-forwarding threshold (MCP level name).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warning".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheSection {
    pub enabled: bool,
    pub max_entries: usize,
    pub default_ttl_secs: u64,
    /// Per-tool TTL overrides in seconds; 0 disables caching for a tool.
    pub ttl_overrides: HashMap<String, u64>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            default_ttl_secs: 300,
            ttl_overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RateLimitSection {
    pub enabled: bool,
    pub buckets: HashMap<String, BucketSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketSection {
    pub capacity: u32,
    pub refill_per_second: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AuditSection {
    pub enabled: bool,
    /// Defaults to ~/.toolshed/audit when unset.
    pub directory: Option<PathBuf>,
    pub retention_days: u64,
    /// Extra argument keys to redact, on top of the built-in set.
    pub sensitive_keys: Vec<String>,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            retention_days: 30,
            sensitive_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AuthSection {
    pub enabled: bool,
    pub require_authentication: bool,
    pub keys: Vec<KeySection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeySection {
    pub key: String,
    pub name: String,
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub allowed_actions: HashMap<String, Vec<String>>,
}

fn default_allowed_tools() -> Vec<String> {
    vec!["*".to_string()]
}

impl FileConfig {
    /// Load from an explicit path, or from the default location if it
    /// exists, or fall back to pure defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = default_config_path();
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Resolve into the server configuration. `allow_paths` from the CLI
    /// override the file's resource roots; the credential comes from the
    /// environment.
    pub fn into_server_config(
        self,
        allow_paths: Vec<PathBuf>,
        credential: Option<String>,
    ) -> Result<McpServerConfig> {
        let allowed_roots = if !allow_paths.is_empty() {
            allow_paths
        } else if !self.server.allowed_roots.is_empty() {
            self.server.allowed_roots
        } else {
            vec![std::env::current_dir().context("Failed to read working directory")?]
        };

        let initial_log_level: LogLevel = self
            .logging
            .level
            .parse()
            .map_err(|()| anyhow::anyhow!("Invalid logging.level: {}", self.logging.level))?;

        let cache = self.cache.enabled.then(|| CacheConfig {
            max_entries: self.cache.max_entries,
            default_ttl_secs: self.cache.default_ttl_secs,
            ttl_overrides: self.cache.ttl_overrides,
        });

        let rate_limits = self.rate_limit.enabled.then(|| {
            self.rate_limit
                .buckets
                .into_iter()
                .map(|(tool, b)| {
                    (
                        tool,
                        BucketConfig {
                            capacity: b.capacity,
                            refill_per_second: b.refill_per_second,
                        },
                    )
                })
                .collect()
        });

        let audit = self.audit.enabled.then(|| AuditSettings {
            directory: self
                .audit
                .directory
                .unwrap_or_else(|| toolshed_logging::toolshed_home().join("audit")),
            retention_days: self.audit.retention_days,
            extra_sensitive_keys: self.audit.sensitive_keys,
        });

        let auth = self.auth.enabled.then(|| AuthSettings {
            require_authentication: self.auth.require_authentication,
            identities: self
                .auth
                .keys
                .into_iter()
                .map(|k| Identity::new(k.key, k.name, k.allowed_tools, k.allowed_actions))
                .collect(),
        });

        Ok(McpServerConfig {
            server_name: self.server.name,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            allowed_roots,
            env_allowlist: self.server.env_allowlist,
            initial_log_level,
            cache,
            rate_limits,
            audit,
            auth,
            credential,
        })
    }
}

/// The commented example config written by `toolshed init`.
pub const EXAMPLE_CONFIG: &str = r#"# Toolshed MCP server configuration.
# Every section is optional; the defaults shown here apply when a key is
# omitted. The session credential is NOT configured here: set the
# TOOLSHED_API_KEY environment variable instead.

[server]
name = "toolshed-mcp"
# Directories served as file:// resources. Empty = current directory.
allowed_roots = []
# Environment variables the `environment` tool may read.
env_allowlist = []

[logging]
# Initial client log-forwarding threshold: debug, info, notice, warning,
# error, critical, alert, emergency.
level = "warning"

[cache]
enabled = true
max_entries = 1000
default_ttl_secs = 300
# Per-tool TTLs in seconds; 0 disables caching for that tool.
[cache.ttl_overrides]
# datetime = 0

[rate_limit]
enabled = false
# [rate_limit.buckets.text]
# capacity = 20
# refill_per_second = 5.0

[audit]
enabled = true
# directory = "/var/log/toolshed/audit"
retention_days = 30
# Extra argument keys to redact on top of the built-in sensitive set.
sensitive_keys = []

[auth]
enabled = false
require_authentication = false
# [[auth.keys]]
# key = "example-key"
# name = "alice"
# allowed_tools = ["datetime", "text"]
# [auth.keys.allowed_actions]
# datetime = ["now", "format"]
"#;
