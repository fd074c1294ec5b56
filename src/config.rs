//! Configuration loading and constants.
//!
//! Builds the server configuration from built-in defaults, an optional TOML
//! file and a small set of environment variables (`HOST`, `PORT`,
//! `SEC_PRESET`, `NODE_ENV`, `PYTHON_CMD`). `ServerConfig` is the root struct;
//! it is constructed once at startup and passed explicitly to everything that
//! needs it.

use const_format::formatcp;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

// =============================================================================
// Security Preset Limits
// =============================================================================

/// Minimum rate-limit window enforced by the `secure` preset (10 minutes)
pub const SECURE_MIN_WINDOW_MS: u64 = 10 * 60 * 1000;

/// Maximum requests per window allowed by the `secure` preset
pub const SECURE_MAX_REQUESTS: u32 = 200;

// =============================================================================
// Server Defaults
// =============================================================================

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

/// Environment name that enables the CORS wildcard (with `allow_all_in_dev`)
pub const DEVELOPMENT_ENV: &str = "development";

/// Default rate-limit window (15 minutes)
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 15 * 60 * 1000;
pub const DEFAULT_RATE_LIMIT_MAX: u32 = 300;

/// Port of the plain listener that redirects to HTTPS
pub const DEFAULT_REDIRECT_PORT: u16 = 80;

/// Seconds to wait for in-flight connections on shutdown
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

/// Upper bound on captured stdout from helper scripts (1 MiB)
pub const MAX_SCRIPT_OUTPUT_BYTES: usize = 1024 * 1024;

/// Runtime version reported by `/api/info`
pub const RUNTIME_VERSION: &str = formatcp!("v{}", env!("CARGO_PKG_VERSION"));

// =============================================================================
// HTTP Cache-Control Headers
// =============================================================================

/// API responses reflect live process state and are never cached
pub const CACHE_CONTROL_API: &str = "no-store";

/// Static files - short cache, pages are edited in place
pub const CACHE_CONTROL_STATIC: &str = "public, max-age=300";

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Directory served as static files
pub const DEFAULT_STATIC_DIR: &str = "public";

pub const DEFAULT_KEY_PATH: &str = "./certs/key.pem";
pub const DEFAULT_CERT_PATH: &str = "./certs/cert.pem";

pub const DEFAULT_PYTHON_CMD: &str = "python";
pub const DEFAULT_SNIPPET_SCRIPT: &str = "scripts/snippet.py";

/// Default log level when neither `--log-level` nor RUST_LOG is given
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Builds the tracing filter for a bare level such as "info".
pub fn log_filter_for_level(level: &str) -> String {
    format!("syslib_server={level},tower_http={level}")
}

/// Named bundle of security overrides.
///
/// Deserialization is lenient: an unrecognized name falls back to `Dev`
/// with a warning rather than failing the whole configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum Preset {
    #[default]
    Dev,
    Secure,
    Off,
}

impl Preset {
    /// Parses a preset name. Names are matched exactly.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "dev" => Some(Self::Dev),
            "secure" => Some(Self::Secure),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    /// Parses a preset name, falling back to `Dev` for unknown values.
    pub fn parse_or_dev(name: &str) -> Self {
        Self::parse(name).unwrap_or_else(|| {
            tracing::warn!(preset = %name, "Unrecognized security preset, using \"dev\"");
            Self::Dev
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Secure => "secure",
            Self::Off => "off",
        }
    }
}

impl From<String> for Preset {
    fn from(name: String) -> Self {
        Self::parse_or_dev(&name)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root configuration, read-only after startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Deployment environment name (from NODE_ENV)
    pub env: String,
    /// Listener address
    pub server: ListenConfig,
    pub security: SecurityConfig,
    /// Static file directory; `None` disables static serving
    pub static_dir: Option<String>,
    pub logging: LoggingConfig,
    /// Helper scripts run by peripheral endpoints
    pub scripts: ScriptsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            env: DEVELOPMENT_ENV.to_string(),
            server: ListenConfig::default(),
            security: SecurityConfig::default(),
            static_dir: Some(DEFAULT_STATIC_DIR.to_string()),
            logging: LoggingConfig::default(),
            scripts: ScriptsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Security options before and after preset resolution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub preset: Preset,
    /// Honor X-Forwarded-* headers from an upstream proxy
    pub trust_proxy: bool,
    pub cors: CorsConfig,
    pub helmet: HelmetConfig,
    pub rate_limit: RateLimitConfig,
    pub ip_allowlist: IpAllowlistConfig,
    pub https: HttpsConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            preset: Preset::Dev,
            trust_proxy: true,
            cors: CorsConfig::default(),
            helmet: HelmetConfig::default(),
            rate_limit: RateLimitConfig::default(),
            ip_allowlist: IpAllowlistConfig::default(),
            https: HttpsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    /// Allow every origin when running in the development environment
    pub allow_all_in_dev: bool,
    /// Origins accepted by the allowlist stage, compared exactly
    pub allowlist: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_all_in_dev: true,
            allowlist: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HelmetConfig {
    pub enabled: bool,
}

impl Default for HelmetConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Requests allowed per client per window
    pub max: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
            max: DEFAULT_RATE_LIMIT_MAX,
        }
    }
}

/// Exact-match IP allowlist. CIDR ranges are not supported.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IpAllowlistConfig {
    pub enabled: bool,
    pub ranges: Vec<String>,
}

impl Default for IpAllowlistConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ranges: vec![
                "127.0.0.1".to_string(),
                "::1".to_string(),
                "::ffff:127.0.0.1".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpsConfig {
    pub enabled: bool,
    pub key_path: String,
    pub cert_path: String,
    /// Redirect plain requests to HTTPS (also opens the redirect listener)
    pub redirect_http_to_https: bool,
    pub redirect_port: u16,
}

impl Default for HttpsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key_path: DEFAULT_KEY_PATH.to_string(),
            cert_path: DEFAULT_CERT_PATH.to_string(),
            redirect_http_to_https: false,
            redirect_port: DEFAULT_REDIRECT_PORT,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit a span and completion line per request
    pub req: bool,
    pub level: String,
    /// Log format: "text" (human-readable, default) or "json" (structured)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            req: true,
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Interpreter used to run helper scripts
    pub python_cmd: String,
    /// Script printing a `{"code": "..."}` JSON object
    pub snippet_script: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            python_cmd: DEFAULT_PYTHON_CMD.to_string(),
            snippet_script: DEFAULT_SNIPPET_SCRIPT.to_string(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration: defaults, then the TOML file, then the process
    /// environment.
    ///
    /// An explicitly given path must exist. Without one, the default path is
    /// used when present and built-in defaults otherwise.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Applies environment overrides using the given lookup.
    ///
    /// Empty or blank values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(env) = lookup("NODE_ENV") {
            self.env = env;
        }
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("PORT must be a port number, got {:?}", port))
            })?;
        }
        if let Some(preset) = lookup("SEC_PRESET") {
            self.security.preset = Preset::parse_or_dev(&preset);
        }
        if let Some(cmd) = lookup("PYTHON_CMD") {
            self.scripts.python_cmd = cmd;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate_limit = &self.security.rate_limit;
        if rate_limit.window_ms == 0 {
            return Err(ConfigError::Validation(
                "security.rate_limit.window_ms must be positive".to_string(),
            ));
        }
        if rate_limit.max == 0 {
            return Err(ConfigError::Validation(
                "security.rate_limit.max must be positive".to_string(),
            ));
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "logging.format must be \"text\" or \"json\", got {:?}",
                other
            ))),
        }
    }

    pub fn is_development(&self) -> bool {
        self.env == DEVELOPMENT_ENV
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
