//! Service configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Secrets may use the `env:VAR`
//! indirection, resolved at load time. Startup validation is strict:
//! weak consistency, disabled type parity, or a dangling secret
//! indirection fail the process before anything is wired up.

use std::net::SocketAddr;

use thiserror::Error;

/// Fatal configuration errors; the process does not start.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `LISTEN_ADDR` could not be parsed as a socket address.
    #[error("invalid listen address: {0}")]
    InvalidListenAddr(String),

    /// The store must run with strong consistency; anything else breaks
    /// the optimistic-concurrency and change-feed ordering contracts.
    #[error("consistency level must be \"Strong\", got \"{0}\"")]
    WeakConsistency(String),

    /// Events, snapshots, and outbox rows must share one container.
    #[error("COSMOS_USE_SAME_TYPE must be true: the append batch spans document types")]
    TypeParityDisabled,

    /// An `env:VAR` indirection pointed at an unset variable.
    #[error("secret indirection `env:{0}` is not set")]
    MissingSecret(String),

    /// `CHANGE_FEED_MODE` was not a recognised mode.
    #[error("invalid change feed mode \"{0}\" (expected \"live\" or \"rebuild\")")]
    InvalidChangeFeedMode(String),
}

/// Where the projector starts on boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFeedMode {
    /// Begin at the current tail.
    Live,
    /// Purge all leases, then replay from the beginning.
    Rebuild,
}

impl ChangeFeedMode {
    /// Parses a mode string. `startfrombeginning` is a legacy alias for
    /// `rebuild`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidChangeFeedMode`] on anything else.
    pub fn parse(mode: &str) -> Result<Self, ConfigError> {
        match mode.to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "rebuild" | "startfrombeginning" => Ok(Self::Rebuild),
            other => Err(ConfigError::InvalidChangeFeedMode(other.to_string())),
        }
    }
}

/// Document-store container names.
#[derive(Debug, Clone)]
pub struct ContainerNames {
    /// Events + snapshots + outbox, PK `/streamId`.
    pub es: String,
    /// Current-match-state read model.
    pub rm_match_state: String,
    /// Momentum-history read model.
    pub rm_tes_history: String,
    /// Leaderboard read model.
    pub rm_leaderboard: String,
    /// Change-feed leases, PK `/id`.
    pub leases: String,
}

/// Document-store connection settings for the active profile.
#[derive(Debug, Clone)]
pub struct CosmosConfig {
    /// Account endpoint for the active profile.
    pub account_endpoint: String,
    /// Account key for the active profile.
    pub key: String,
    /// Database name.
    pub database: String,
    /// Container names.
    pub containers: ContainerNames,
}

/// External scoreboard feed settings.
#[derive(Debug, Clone)]
pub struct AflFeedConfig {
    /// Master switch for the ingestion worker.
    pub enabled: bool,
    /// Stream the worker appends to.
    pub stream_id: String,
    /// Feed URL (HTTP GET).
    pub endpoint: String,
    /// Seconds between iterations.
    pub poll_interval_secs: u64,
    /// Header name for the static API key, if any.
    pub api_key_header: String,
    /// Static API key; empty disables the header.
    pub api_key: String,
}

/// Top-level service configuration.
///
/// Loaded once at startup via [`FanRideConfig::from_env`].
#[derive(Debug, Clone)]
pub struct FanRideConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,
    /// Document-store settings.
    pub cosmos: CosmosConfig,
    /// Projector start mode.
    pub change_feed_mode: ChangeFeedMode,
    /// External feed ingestion settings.
    pub afl_feed: AflFeedConfig,
    /// Capacity of the hub broadcast channel.
    pub hub_bus_capacity: usize,
}

impl FanRideConfig {
    /// Loads configuration from environment variables.
    ///
    /// `FANRIDE_ENV` ∈ {dev, test, prod} (default `dev`) selects which
    /// `COSMOS_ACCOUNT_ENDPOINT_*` / `COSMOS_KEY_*` pair applies. Calls
    /// `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] on an unparsable listen address, a
    /// consistency level other than `Strong`, disabled type parity, a
    /// dangling secret indirection, or an unknown change-feed mode.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::InvalidListenAddr(
                    std::env::var("LISTEN_ADDR").unwrap_or_default(),
                )
            })?;

        let profile = std::env::var("FANRIDE_ENV")
            .unwrap_or_else(|_| "dev".to_string())
            .to_ascii_uppercase();

        let account_endpoint = resolve_secret(&env_or(
            &format!("COSMOS_ACCOUNT_ENDPOINT_{profile}"),
            "https://localhost:8081",
        ))?;
        let key = resolve_secret(&env_or(&format!("COSMOS_KEY_{profile}"), "local-dev-key"))?;

        let consistency = env_or("COSMOS_CONSISTENCY_LEVEL", "Strong");
        if consistency != "Strong" {
            return Err(ConfigError::WeakConsistency(consistency));
        }
        if !parse_env_bool("COSMOS_USE_SAME_TYPE", true) {
            return Err(ConfigError::TypeParityDisabled);
        }

        let cosmos = CosmosConfig {
            account_endpoint,
            key,
            database: env_or("COSMOS_DATABASE", "fanride"),
            containers: ContainerNames {
                es: env_or("COSMOS_CONTAINER_ES", "es"),
                rm_match_state: env_or("COSMOS_CONTAINER_RM_MATCH_STATE", "rm_match_state"),
                rm_tes_history: env_or("COSMOS_CONTAINER_RM_TES_HISTORY", "rm_tes_history"),
                rm_leaderboard: env_or("COSMOS_CONTAINER_RM_LEADERBOARD", "rm_leaderboard"),
                leases: env_or("COSMOS_CONTAINER_LEASES", "leases"),
            },
        };

        let change_feed_mode = ChangeFeedMode::parse(&env_or("CHANGE_FEED_MODE", "live"))?;

        let afl_feed = AflFeedConfig {
            enabled: parse_env_bool("AFL_FEED_ENABLED", false),
            stream_id: env_or("AFL_FEED_STREAM_ID", "afl-live"),
            endpoint: resolve_secret(&env_or("AFL_FEED_ENDPOINT", ""))?,
            poll_interval_secs: parse_env("AFL_FEED_POLL_INTERVAL_SECS", 5),
            api_key_header: env_or("AFL_FEED_API_KEY_HEADER", "x-api-key"),
            api_key: resolve_secret(&env_or("AFL_FEED_API_KEY", ""))?,
        };

        let hub_bus_capacity = parse_env("HUB_BUS_CAPACITY", 10_000);

        Ok(Self {
            listen_addr,
            cosmos,
            change_feed_mode,
            afl_feed,
            hub_bus_capacity,
        })
    }
}

/// Resolves an `env:VAR` indirection; literal values pass through.
fn resolve_secret(raw: &str) -> Result<String, ConfigError> {
    match raw.strip_prefix("env:") {
        Some(var) => {
            std::env::var(var).map_err(|_| ConfigError::MissingSecret(var.to_string()))
        }
        None => Ok(raw.to_string()),
    }
}

/// Returns an environment variable or the default.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn change_feed_mode_parses_aliases() {
        assert_eq!(ChangeFeedMode::parse("live").ok(), Some(ChangeFeedMode::Live));
        assert_eq!(
            ChangeFeedMode::parse("Rebuild").ok(),
            Some(ChangeFeedMode::Rebuild)
        );
        assert_eq!(
            ChangeFeedMode::parse("StartFromBeginning").ok(),
            Some(ChangeFeedMode::Rebuild)
        );
        assert!(ChangeFeedMode::parse("tail").is_err());
    }

    #[test]
    fn literal_secrets_pass_through() {
        let Ok(value) = resolve_secret("plain-value") else {
            panic!("literal must resolve");
        };
        assert_eq!(value, "plain-value");
    }

    #[test]
    fn dangling_indirection_is_fatal() {
        let result = resolve_secret("env:FANRIDE_TEST_SECRET_THAT_DOES_NOT_EXIST");
        assert!(matches!(result, Err(ConfigError::MissingSecret(_))));
    }

    #[test]
    fn set_indirection_resolves() {
        // SAFETY: test-local variable name, no concurrent reader cares.
        unsafe { std::env::set_var("FANRIDE_TEST_SECRET_SET", "s3cret") };
        let Ok(value) = resolve_secret("env:FANRIDE_TEST_SECRET_SET") else {
            panic!("indirection must resolve");
        };
        assert_eq!(value, "s3cret");
    }
}
