//! Application-level configuration, loaded once from `FIBBING_IT_*` environment variables.

use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
    time::Duration,
};

use thiserror::Error;
use tracing::info;

use crate::dao::{models::GamePhase, storage::RetryPolicy};

/// Prefix shared by every configuration key.
pub const ENV_PREFIX: &str = "FIBBING_IT_";
/// URI scheme selecting the in-process backends.
pub const MEMORY_URI: &str = "memory://";

/// Failure while reading or validating configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required key has no value.
    #[error("missing required configuration `{ENV_PREFIX}{key}`")]
    Missing { key: &'static str },
    /// A key holds a value that cannot be used.
    #[error("invalid value `{value}` for `{ENV_PREFIX}{key}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: IpAddr,
    /// TCP port, 1..=65535.
    pub port: u16,
}

impl ServerConfig {
    /// Socket address to bind.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Storage connection and retry settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `postgres://` URI or [`MEMORY_URI`].
    pub uri: String,
    /// Retries after a transient storage failure.
    pub retries: u32,
    /// First backoff delay; doubled on every retry.
    pub retry_delay: Duration,
}

impl DatabaseConfig {
    /// Retry policy wrapping every service transaction.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.retry_delay)
    }
}

/// Points awarded by the scoring formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringConfig {
    /// Awarded to every normal player who voted for the fibber.
    pub guess_fibber_points: i32,
    /// Awarded to the fibber when the room failed to find them.
    pub fibber_evade_points: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            guess_fibber_points: 100,
            fibber_evade_points: 150,
        }
    }
}

/// Game rules shared by every room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRules {
    /// Rounds played per round type.
    pub max_rounds: i32,
    /// Locale used when a player has none or the catalogue lacks theirs.
    pub default_locale: String,
    /// Ruleset used for new rooms.
    pub default_game: String,
    /// Points table.
    pub scoring: ScoringConfig,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            default_locale: "en-GB".into(),
            default_game: "fibbing_it".into(),
            scoring: ScoringConfig::default(),
        }
    }
}

/// How long each phase screen stays up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimings {
    /// Answering window.
    pub question: Duration,
    /// Voting window.
    pub voting: Duration,
    /// Role reveal screen.
    pub reveal: Duration,
    /// Scoreboard between round types.
    pub scoring: Duration,
    /// Final scoreboard.
    pub winner: Duration,
}

impl PhaseTimings {
    /// Duration of `phase`.
    pub fn for_phase(&self, phase: GamePhase) -> Duration {
        match phase {
            GamePhase::Question => self.question,
            GamePhase::Voting => self.voting,
            GamePhase::Reveal => self.reveal,
            GamePhase::Scoring => self.scoring,
            GamePhase::Winner => self.winner,
        }
    }

    /// Same duration for every phase; handy for fast test games.
    pub fn uniform(duration: Duration) -> Self {
        Self {
            question: duration,
            voting: duration,
            reveal: duration,
            scoring: duration,
            winner: duration,
        }
    }
}

impl Default for PhaseTimings {
    fn default() -> Self {
        Self {
            question: Duration::from_secs(15),
            voting: Duration::from_secs(60),
            reveal: Duration::from_secs(15),
            scoring: Duration::from_secs(15),
            winner: Duration::from_secs(15),
        }
    }
}

/// Abandoned room sweeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbandonConfig {
    /// How long every member must have been gone.
    pub grace_period: Duration,
    /// Sweep period.
    pub check_interval: Duration,
}

impl Default for AbandonConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5 * 60),
            check_interval: Duration::from_secs(30),
        }
    }
}

/// Token based identity. Off unless a JWKS URL is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    /// Key set used to verify player tokens.
    pub jwks_url: Option<String>,
    /// Group claim granting admin access.
    pub admin_group: Option<String>,
}

impl AuthConfig {
    /// Whether token identity was requested.
    pub fn is_enabled(&self) -> bool {
        self.jwks_url.is_some()
    }
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Listen address.
    pub server: ServerConfig,
    /// Storage settings.
    pub database: DatabaseConfig,
    /// `redis://` address or [`MEMORY_URI`].
    pub pubsub_address: String,
    /// Game rules.
    pub rules: GameRules,
    /// Phase durations.
    pub timings: PhaseTimings,
    /// Send the current view as the first frame of a new connection.
    pub auto_reconnect: bool,
    /// Abandonment sweeper.
    pub abandon: AbandonConfig,
    /// Token identity settings.
    pub auth: AuthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                port: 8080,
            },
            database: DatabaseConfig {
                uri: MEMORY_URI.into(),
                retries: 3,
                retry_delay: Duration::from_millis(100),
            },
            pubsub_address: MEMORY_URI.into(),
            rules: GameRules::default(),
            timings: PhaseTimings::default(),
            auto_reconnect: true,
            abandon: AbandonConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        info!(
            addr = %config.server.addr(),
            max_rounds = config.rules.max_rounds,
            auto_reconnect = config.auto_reconnect,
            token_identity = config.auth.is_enabled(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Load through `lookup`, which receives full variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source { lookup };
        let defaults = Self::default();

        let port = match source.raw("PORT").or_else(|| (source.lookup)("PORT")) {
            Some(value) => parse_port(&value)?,
            None => defaults.server.port,
        };
        let host = source.parsed("HOST", defaults.server.host)?;

        let max_rounds: i32 = source.parsed("MAX_ROUNDS", defaults.rules.max_rounds)?;
        if max_rounds < 1 {
            return Err(ConfigError::Invalid {
                key: "MAX_ROUNDS",
                value: max_rounds.to_string(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                uri: source.required("DB_URI")?,
                retries: source.parsed("DB_RETRIES", defaults.database.retries)?,
                retry_delay: source.duration("DB_RETRY_DELAY", defaults.database.retry_delay)?,
            },
            pubsub_address: source.required("PUBSUB_ADDRESS")?,
            rules: GameRules {
                max_rounds,
                default_locale: source.raw("DEFAULT_LOCALE").unwrap_or(defaults.rules.default_locale),
                default_game: source.raw("DEFAULT_GAME").unwrap_or(defaults.rules.default_game),
                scoring: ScoringConfig {
                    guess_fibber_points: source.parsed(
                        "GUESS_FIBBER_POINTS",
                        defaults.rules.scoring.guess_fibber_points,
                    )?,
                    fibber_evade_points: source.parsed(
                        "FIBBER_EVADE_POINTS",
                        defaults.rules.scoring.fibber_evade_points,
                    )?,
                },
            },
            timings: PhaseTimings {
                question: source.duration("SHOW_QUESTION_SCREEN_FOR", defaults.timings.question)?,
                voting: source.duration("SHOW_VOTING_SCREEN_FOR", defaults.timings.voting)?,
                reveal: source.duration("SHOW_REVEAL_SCREEN_FOR", defaults.timings.reveal)?,
                scoring: source.duration("SHOW_SCORE_SCREEN_FOR", defaults.timings.scoring)?,
                winner: source.duration("SHOW_WINNER_SCREEN_FOR", defaults.timings.winner)?,
            },
            auto_reconnect: source.parsed("AUTO_RECONNECT", defaults.auto_reconnect)?,
            abandon: AbandonConfig {
                grace_period: source
                    .duration("ABANDON_GRACE_PERIOD", defaults.abandon.grace_period)?,
                check_interval: source
                    .duration("ABANDON_CHECK_INTERVAL", defaults.abandon.check_interval)?,
            },
            auth: AuthConfig {
                jwks_url: source.raw("JWT_JWKS_URL"),
                admin_group: source.raw("ADMIN_GROUP"),
            },
        })
    }
}

struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{key}"))
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.raw(key).ok_or(ConfigError::Missing { key })
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            Some(value) => value.parse().map_err(|err: T::Err| ConfigError::Invalid {
                key,
                reason: err.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }

    fn duration(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        match self.raw(key) {
            Some(value) => parse_duration(&value).ok_or_else(|| ConfigError::Invalid {
                key,
                value,
                reason: "expected a number with an optional ms, s or m suffix".into(),
            }),
            None => Ok(default),
        }
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        key: "PORT",
        value: value.to_owned(),
        reason: reason.to_owned(),
    };
    let port: u32 = value.trim().parse().map_err(|_| invalid("not a number"))?;
    match u16::try_from(port) {
        Ok(port) if port >= 1 => Ok(port),
        _ => Err(invalid("must be in 1..=65535")),
    }
}

/// Parse `250ms`, `15s`, `5m` or a bare number of seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (digits, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(split) => value.split_at(split),
        None => (value, "s"),
    };
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_secs(amount.checked_mul(60)?)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("FIBBING_IT_DB_URI", "memory://"),
        ("FIBBING_IT_PUBSUB_ADDRESS", "memory://"),
    ];

    #[test]
    fn defaults_apply_when_only_required_keys_are_set() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn missing_database_uri_is_reported() {
        let err = load(&[("FIBBING_IT_PUBSUB_ADDRESS", "memory://")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing { key: "DB_URI" });
    }

    #[test]
    fn durations_accept_suffixes() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("15s"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("7h"), None);
        assert_eq!(parse_duration("ms"), None);
    }

    #[test]
    fn overrides_are_read() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("FIBBING_IT_SHOW_VOTING_SCREEN_FOR", "2s"),
            ("FIBBING_IT_MAX_ROUNDS", "1"),
            ("FIBBING_IT_AUTO_RECONNECT", "false"),
            ("PORT", "9000"),
        ]);
        let config = load(&pairs).unwrap();
        assert_eq!(config.timings.voting, Duration::from_secs(2));
        assert_eq!(config.rules.max_rounds, 1);
        assert!(!config.auto_reconnect);
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn token_identity_is_off_unless_configured() {
        let config = load(&REQUIRED).unwrap();
        assert!(!config.auth.is_enabled());

        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("FIBBING_IT_JWT_JWKS_URL", " https://auth.example/jwks.json "),
            ("FIBBING_IT_ADMIN_GROUP", "admin"),
        ]);
        let config = load(&pairs).unwrap();
        assert!(config.auth.is_enabled());
        assert_eq!(config.auth.jwks_url.as_deref(), Some("https://auth.example/jwks.json"));
        assert_eq!(config.auth.admin_group.as_deref(), Some("admin"));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("FIBBING_IT_JWT_JWKS_URL", "   "));
        assert!(!load(&pairs).unwrap().auth.is_enabled());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("FIBBING_IT_PORT", "0"));
        assert!(matches!(load(&pairs), Err(ConfigError::Invalid { key: "PORT", .. })));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("FIBBING_IT_HOST", "localhost"));
        assert!(matches!(load(&pairs), Err(ConfigError::Invalid { key: "HOST", .. })));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("FIBBING_IT_MAX_ROUNDS", "0"));
        assert!(matches!(
            load(&pairs),
            Err(ConfigError::Invalid { key: "MAX_ROUNDS", .. })
        ));
    }
}
