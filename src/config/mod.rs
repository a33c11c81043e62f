//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::util::rate_limit::INPUT_RATE_LIMIT;

/// Who takes the opening shot once both boards are in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FirstTurn {
    /// First identity of the players pair (the inviter)
    #[default]
    Inviter,
    /// Coin flip per match
    Random,
}

impl FromStr for FirstTurn {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inviter" => Ok(Self::Inviter),
            "random" => Ok(Self::Random),
            _ => Err(ConfigError::Invalid("FIRST_TURN")),
        }
    }
}

/// What happens to a match when a player's last connection drops
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisconnectPolicy {
    /// Leave the match untouched; it stalls until the process restarts
    #[default]
    Stall,
    /// Cancel a match still waiting for boards, award a running one to the opponent
    Forfeit,
}

impl FromStr for DisconnectPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stall" => Ok(Self::Stall),
            "forfeit" => Ok(Self::Forfeit),
            _ => Err(ConfigError::Invalid("DISCONNECT_POLICY")),
        }
    }
}

/// Log line rendering
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::Invalid("LOG_FORMAT")),
        }
    }
}

/// Rules applied by the lobby when pairing and running matches
#[derive(Clone, Copy, Debug, Default)]
pub struct LobbyRules {
    pub first_turn: FirstTurn,
    pub disconnect_policy: DisconnectPolicy,
    /// Only accept a game that was actually offered to the accepting identity
    pub require_invite: bool,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Allowed client origin for CORS
    pub client_origin: String,

    /// HS256 secret of the auth service's access tokens. Without it the
    /// handshake `userId` is trusted as-is.
    pub jwt_access_secret: Option<String>,

    /// User record store base URL (in-memory store when unset)
    pub user_store_url: Option<String>,
    /// Service key for the user record store
    pub user_store_key: Option<String>,

    pub rules: LobbyRules,

    /// Max inbound messages per second per connection
    pub input_rate_limit: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let user_store_url = optional("USER_STORE_URL");
        let user_store_key = optional("USER_STORE_KEY");
        if user_store_url.is_some() && user_store_key.is_none() {
            return Err(ConfigError::Missing("USER_STORE_KEY"));
        }

        let rules = LobbyRules {
            first_turn: parse_or_default("FIRST_TURN")?,
            disconnect_policy: parse_or_default("DISCONNECT_POLICY")?,
            require_invite: match optional("REQUIRE_INVITE") {
                Some(v) => v.parse().map_err(|_| ConfigError::Invalid("REQUIRE_INVITE"))?,
                None => false,
            },
        };

        let input_rate_limit = match optional("INPUT_RATE_LIMIT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid("INPUT_RATE_LIMIT"))?,
            None => INPUT_RATE_LIMIT,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_or_default("LOG_FORMAT")?,
            client_origin: env::var("CLIENT_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),

            jwt_access_secret: optional("JWT_ACCESS_SECRET"),

            user_store_url,
            user_store_key,

            rules,
            input_rate_limit,
        })
    }
}

/// Read a variable, treating empty values as unset
fn optional(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or_default<T>(key: &'static str) -> Result<T, ConfigError>
where
    T: FromStr<Err = ConfigError> + Default,
{
    optional(key).map_or_else(|| Ok(T::default()), |v| v.parse())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
