//! Configuration management for the server.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Upper bound on pooled database connections
    pub db_max_connections: u32,
    /// Most records accepted in a single upload
    pub sync_max_items: usize,
    /// Requests per user per minute, for each sync endpoint
    pub sync_rate_limit_per_minute: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", 10)?;
        let sync_max_items = parse_or("SYNC_MAX_ITEMS", 1000)?;
        let sync_rate_limit_per_minute = parse_or("SYNC_RATE_LIMIT_PER_MINUTE", 30)?;

        Ok(Self {
            host,
            port,
            database_url,
            db_max_connections,
            sync_max_items,
            sync_rate_limit_per_minute,
        })
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {0} value, expected a positive number")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_to_default() {
        let value: usize = parse_or("DAYBOOK_TEST_UNSET_VARIABLE", 1000).unwrap();
        assert_eq!(value, 1000);
    }

    #[test]
    fn config_error_display() {
        assert_eq!(
            ConfigError::InvalidNumber("SYNC_MAX_ITEMS").to_string(),
            "Invalid SYNC_MAX_ITEMS value, expected a positive number"
        );
    }
}
