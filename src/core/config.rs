use crate::core::kernel::signer::SignAlgorithm;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;

/// Default connect and request deadline
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 15;

/// Largest body the scanner and the traffic logger will look at
pub const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

pub const DEFAULT_CODE_FIELD: &str = "errorCode";

/// Endpoint settings for one logical API group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Zero keeps the pipeline default
    #[serde(default)]
    pub timeout_seconds: u64,
}

impl ServiceConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_seconds: 0,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Read `{PREFIX}_{GROUP}_BASE_URL` and the optional `{PREFIX}_{GROUP}_TIMEOUT`
    pub fn from_env(prefix: &str, group: &str) -> Result<Self, ConfigError> {
        let stem = format!("{}_{}", prefix.to_uppercase(), group.to_uppercase());
        let url_var = format!("{}_BASE_URL", stem);
        let timeout_var = format!("{}_TIMEOUT", stem);

        let base_url =
            env::var(&url_var).map_err(|_| ConfigError::MissingEnvironmentVariable(url_var))?;
        let timeout_seconds = parse_optional(&timeout_var)?.unwrap_or(0);

        Ok(Self {
            base_url,
            timeout_seconds,
        })
    }
}

/// Settings shared by every client the pipeline builds
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sign_secret: Secret<String>,
    pub sign_algorithm: SignAlgorithm,
    /// Top-level response field the response-code interceptor scans for
    pub code_field: String,
    pub max_body_bytes: u64,
    pub default_timeout_seconds: u64,
    /// Severity floor for the log sink (`trace` .. `error`, or `off`)
    pub log_level: String,
    pub services: BTreeMap<String, ServiceConfig>,
}

// Never expose the signing secret in serialized form
impl Serialize for PipelineConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("PipelineConfig", 7)?;
        state.serialize_field("sign_secret", "[REDACTED]")?;
        state.serialize_field("sign_algorithm", &self.sign_algorithm)?;
        state.serialize_field("code_field", &self.code_field)?;
        state.serialize_field("max_body_bytes", &self.max_body_bytes)?;
        state.serialize_field("default_timeout_seconds", &self.default_timeout_seconds)?;
        state.serialize_field("log_level", &self.log_level)?;
        state.serialize_field("services", &self.services)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for PipelineConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct PipelineConfigHelper {
            sign_secret: String,
            #[serde(default)]
            sign_algorithm: SignAlgorithm,
            #[serde(default = "default_code_field")]
            code_field: String,
            #[serde(default = "default_max_body_bytes")]
            max_body_bytes: u64,
            #[serde(default = "default_timeout_seconds")]
            default_timeout_seconds: u64,
            #[serde(default = "default_log_level")]
            log_level: String,
            #[serde(default)]
            services: BTreeMap<String, ServiceConfig>,
        }

        let helper = PipelineConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            sign_secret: Secret::new(helper.sign_secret),
            sign_algorithm: helper.sign_algorithm,
            code_field: helper.code_field,
            max_body_bytes: helper.max_body_bytes,
            default_timeout_seconds: helper.default_timeout_seconds,
            log_level: helper.log_level,
            services: helper.services,
        })
    }
}

fn default_code_field() -> String {
    DEFAULT_CODE_FIELD.to_string()
}

const fn default_max_body_bytes() -> u64 {
    DEFAULT_MAX_BODY_BYTES
}

const fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_log_level() -> String {
    "info".to_string()
}

fn parse_optional<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ConfigError::InvalidConfiguration(format!("{} has an invalid value: {}", var, raw))
        }),
        Err(_) => Ok(None),
    }
}

impl PipelineConfig {
    /// Create a configuration with the given signing secret and defaults elsewhere
    #[must_use]
    pub fn new(sign_secret: String) -> Self {
        Self {
            sign_secret: Secret::new(sign_secret),
            sign_algorithm: SignAlgorithm::default(),
            code_field: default_code_field(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            default_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            log_level: default_log_level(),
            services: BTreeMap::new(),
        }
    }

    /// Configuration for groups that do not sign requests
    #[must_use]
    pub fn unsigned() -> Self {
        Self::new(String::new())
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_SIGN_SECRET` (required, may be empty)
    /// - `{PREFIX}_SIGN_ALGORITHM` (optional, `md5` or `sha256`)
    /// - `{PREFIX}_CODE_FIELD` (optional, defaults to `errorCode`)
    /// - `{PREFIX}_MAX_BODY_BYTES` (optional, defaults to 1 MiB)
    /// - `{PREFIX}_TIMEOUT_SECONDS` (optional, defaults to 15)
    /// - `{PREFIX}_LOG_LEVEL` (optional, defaults to `info`)
    ///
    /// Service groups are read separately with [`PipelineConfig::with_service_from_env`].
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let secret_var = format!("{}_SIGN_SECRET", prefix);

        let sign_secret = env::var(&secret_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(secret_var))?;

        let mut config = Self::new(sign_secret);

        if let Some(algorithm) = parse_optional::<SignAlgorithm>(&format!("{}_SIGN_ALGORITHM", prefix))? {
            config.sign_algorithm = algorithm;
        }
        if let Ok(code_field) = env::var(format!("{}_CODE_FIELD", prefix)) {
            config.code_field = code_field;
        }
        if let Some(max) = parse_optional(&format!("{}_MAX_BODY_BYTES", prefix))? {
            config.max_body_bytes = max;
        }
        if let Some(timeout) = parse_optional(&format!("{}_TIMEOUT_SECONDS", prefix))? {
            config.default_timeout_seconds = timeout;
        }
        if let Ok(level) = env::var(format!("{}_LOG_LEVEL", prefix)) {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(_) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // No file, fall back to the process environment
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    /// Add the service group `group` from `{PREFIX}_{GROUP}_BASE_URL` / `_TIMEOUT`
    pub fn with_service_from_env(mut self, prefix: &str, group: &str) -> Result<Self, ConfigError> {
        let service = ServiceConfig::from_env(prefix, group)?;
        self.services.insert(group.to_lowercase(), service);
        Ok(self)
    }

    #[must_use]
    pub fn with_service(mut self, group: impl Into<String>, service: ServiceConfig) -> Self {
        self.services.insert(group.into(), service);
        self
    }

    #[must_use]
    pub fn with_code_field(mut self, code_field: impl Into<String>) -> Self {
        self.code_field = code_field.into();
        self
    }

    #[must_use]
    pub const fn with_sign_algorithm(mut self, algorithm: SignAlgorithm) -> Self {
        self.sign_algorithm = algorithm;
        self
    }

    #[must_use]
    pub const fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    #[must_use]
    pub const fn with_default_timeout(mut self, timeout_seconds: u64) -> Self {
        self.default_timeout_seconds = timeout_seconds;
        self
    }

    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn service(&self, group: &str) -> Option<&ServiceConfig> {
        self.services.get(group)
    }

    /// Whether requests should carry a signature
    #[must_use]
    pub fn has_sign_secret(&self) -> bool {
        !self.sign_secret.expose_secret().is_empty()
    }

    /// Get the signing secret (use carefully - exposes secret)
    pub fn sign_secret(&self) -> &str {
        self.sign_secret.expose_secret()
    }

    /// The configured severity floor
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(self.log_level.trim()).map_err(|_| {
            ConfigError::InvalidConfiguration(format!("Unknown log level: {}", self.log_level))
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.code_field.is_empty() {
            return Err(ConfigError::InvalidConfiguration(
                "code_field cannot be empty".to_string(),
            ));
        }
        if self.default_timeout_seconds == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "default_timeout_seconds must be positive".to_string(),
            ));
        }
        self.level_filter()?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
