use std::time::Duration;

/// Connection settings for the PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgConfig {
    /// `postgres://` connection string.
    pub uri: String,
    /// Upper bound of pooled connections.
    pub max_connections: u32,
    /// How long a transaction waits for a free connection.
    pub acquire_timeout: Duration,
    /// Ruleset whose built-in catalogue is seeded on connect.
    pub game_name: String,
}

impl PgConfig {
    /// Settings for `uri` with the default pool size.
    pub fn from_uri(uri: &str, game_name: &str) -> Self {
        Self {
            uri: uri.to_owned(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            game_name: game_name.to_owned(),
        }
    }
}
