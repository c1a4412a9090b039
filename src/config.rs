//! Configuration types.
//!
//! Everything is resolved once at startup from the process environment
//! (seeded from `.env` when present) and passed down by value.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_PORT: u16 = 8080;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store location: a file path, `:memory:`, or a remote libSQL URL.
    pub database_url: String,
    /// Auth token for remote libSQL databases.
    pub database_auth_token: Option<SecretString>,
    /// Secret compared against the `Authorization` header on admin routes.
    pub admin_token: SecretString,
    pub host: IpAddr,
    pub port: u16,
    /// Directory for rolling log files. Stdout only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Build config from the process environment.
    ///
    /// Call [`load_dotenv`] first to seed the environment from `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = non_empty("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".into()))?;

        let admin_token = non_empty("AUTH")
            .or_else(|| non_empty("ADMIN_TOKEN"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH".into()))?;

        let host = match non_empty("HOST") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "HOST".into(),
                message: format!("{e}"),
            })?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let port = match non_empty("PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "PORT".into(),
                message: format!("{e}"),
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            database_url,
            database_auth_token: non_empty("DATABASE_AUTH_TOKEN").map(SecretString::from),
            admin_token,
            host,
            port,
            log_dir: non_empty("LOG_DIR").map(PathBuf::from),
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Load `.env` from the working directory or its parents, if one exists.
///
/// Returns the path that was loaded. Variables already set in the process
/// environment win over the file.
pub fn load_dotenv() -> Result<Option<PathBuf>, ConfigError> {
    dotenv_outcome(dotenvy::dotenv())
}

/// Load a specific env file, if it exists.
pub fn load_dotenv_from(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
    dotenv_outcome(dotenvy::from_path(path).map(|()| path.to_path_buf()))
}

fn dotenv_outcome(
    result: Result<PathBuf, dotenvy::Error>,
) -> Result<Option<PathBuf>, ConfigError> {
    match result {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(ConfigError::InvalidValue {
            key: ".env".into(),
            message: e.to_string(),
        }),
    }
}
