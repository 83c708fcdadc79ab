//! Server configuration, read from the environment.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use helpdesk_relay::RelayConfig;
use uuid::Uuid;

use crate::error::AppError;

/// Actor recorded on system-initiated events when `SYSTEM_ACTOR_ID` is unset.
pub const DEFAULT_SYSTEM_ACTOR_ID: Uuid = Uuid::from_u128(0x5359_5354_454d_4000_8000_0000_0000_0001);

/// Server, database, and relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Pool size.
    pub database_max_connections: u32,
    /// Outbox relay tuning.
    pub relay: RelayConfig,
    /// Identity used for automatic decisions.
    pub system_actor_id: Uuid,
}

impl Config {
    /// Reads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or any variable
    /// fails to parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or any variable
    /// fails to parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".to_owned())
        })?;
        let defaults = RelayConfig::default();

        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or(&lookup, "PORT", 3000)?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            relay: RelayConfig {
                max_in_flight: parse_or(&lookup, "RELAY_MAX_IN_FLIGHT", defaults.max_in_flight)?,
                poll_interval: Duration::from_millis(parse_or(
                    &lookup,
                    "RELAY_POLL_INTERVAL_MS",
                    250,
                )?),
                dispatch_timeout: Duration::from_millis(parse_or(
                    &lookup,
                    "RELAY_DISPATCH_TIMEOUT_MS",
                    5000,
                )?),
                lease: Duration::from_secs(parse_or(&lookup, "RELAY_LEASE_SECS", 30)?),
            },
            system_actor_id: parse_or(&lookup, "SYSTEM_ACTOR_ID", DEFAULT_SYSTEM_ACTOR_ID)?,
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{name} is invalid: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_apply_when_only_database_url_is_set() {
        // Arrange
        let env = lookup(&[("DATABASE_URL", "postgres://localhost/helpdesk")]);

        // Act
        let config = Config::from_lookup(env).unwrap();

        // Assert
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.relay, RelayConfig::default());
        assert_eq!(config.system_actor_id, DEFAULT_SYSTEM_ACTOR_ID);
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_relay_settings_are_read_from_environment() {
        let env = lookup(&[
            ("DATABASE_URL", "postgres://localhost/helpdesk"),
            ("RELAY_MAX_IN_FLIGHT", "2"),
            ("RELAY_POLL_INTERVAL_MS", "10"),
            ("RELAY_DISPATCH_TIMEOUT_MS", "750"),
            ("RELAY_LEASE_SECS", "5"),
        ]);

        let relay = Config::from_lookup(env).unwrap().relay;

        assert_eq!(relay.max_in_flight, 2);
        assert_eq!(relay.poll_interval, Duration::from_millis(10));
        assert_eq!(relay.dispatch_timeout, Duration::from_millis(750));
        assert_eq!(relay.lease, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_database_url_is_a_config_error() {
        let result = Config::from_lookup(lookup(&[]));

        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("DATABASE_URL")));
    }

    #[test]
    fn test_unparseable_port_is_a_config_error() {
        let env = lookup(&[("DATABASE_URL", "postgres://x"), ("PORT", "eighty")]);

        let result = Config::from_lookup(env);

        assert!(matches!(result, Err(AppError::Config(msg)) if msg.starts_with("PORT is invalid")));
    }
}
