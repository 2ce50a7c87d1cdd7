use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    /// Days before today used as the hot cutoff when a request gives none.
    #[serde(default = "default_hot_window_days")]
    pub hot_window_days: i64,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            hot_window_days: default_hot_window_days(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl RankingConfig {
    /// Requested page size, defaulted and capped.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_limit).min(self.max_limit)
    }
}

fn default_pool_size() -> usize {
    4
}
fn default_hot_window_days() -> i64 {
    crate::ranking::DEFAULT_HOT_WINDOW_DAYS
}
fn default_limit() -> usize {
    50
}
fn default_max_limit() -> usize {
    500
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.database.pool_size == 0 {
            return Err("database.pool_size must be at least 1".to_string());
        }
        if self.ranking.hot_window_days <= 0 {
            return Err("ranking.hot_window_days must be positive".to_string());
        }
        if self.ranking.default_limit == 0 || self.ranking.max_limit == 0 {
            return Err("ranking.default_limit and ranking.max_limit must be positive".to_string());
        }
        if self.ranking.default_limit > self.ranking.max_limit {
            return Err(format!(
                "ranking.default_limit ({}) exceeds ranking.max_limit ({})",
                self.ranking.default_limit, self.ranking.max_limit
            ));
        }
        Ok(())
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // CRASHRANK__SERVER__PORT=3001, CRASHRANK__RANKING__MAX_LIMIT=100, ...
        builder = builder.add_source(
            Environment::with_prefix("CRASHRANK")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
