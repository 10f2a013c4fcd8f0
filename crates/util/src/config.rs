use std::{env, fmt, net::SocketAddr};

use super::{database_url, server_bind_address};

/// Secret used to verify session tokens when running locally without one configured.
pub const DEVELOPMENT_SESSION_SECRET: &str = "opsdesk-development-secret";

const MIN_SECRET_LEN: usize = 16;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub session_secret: Vec<u8>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("environment", &self.environment)
            .field("database_url", &self.database_url)
            .field("session_secret", &"<redacted>")
            .finish()
    }
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let session_secret = session_secret(environment)?;

        Ok(Self {
            bind_addr,
            environment,
            database_url: database_url(),
            session_secret,
        })
    }
}

fn session_secret(environment: Environment) -> Result<Vec<u8>, ConfigError> {
    match env::var("APP_SESSION_SECRET") {
        Ok(value) if value.len() >= MIN_SECRET_LEN => Ok(value.into_bytes()),
        Ok(value) if !value.is_empty() => Err(ConfigError::WeakSessionSecret(value.len())),
        _ if environment.is_development() => Ok(DEVELOPMENT_SESSION_SECRET.as_bytes().to_vec()),
        _ => Err(ConfigError::MissingSessionSecret),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    MissingSessionSecret,
    WeakSessionSecret(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::MissingSessionSecret => {
                write!(f, "APP_SESSION_SECRET must be set outside development")
            }
            Self::WeakSessionSecret(len) => write!(
                f,
                "APP_SESSION_SECRET must be at least {MIN_SECRET_LEN} bytes (got {len})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
