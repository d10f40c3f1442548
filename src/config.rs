use std::{env, str::FromStr};

use crate::error::Error;

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: log::LevelFilter,
    /// Directory for date based log files, stdout only if absent.
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: if cfg!(debug_assertions) {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            },
            log_dir: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub default_post_limit: u32,
    pub min_post_limit: u32,
    pub max_post_limit: u32,
    pub wildcard_character: char,
    /// Maximum number of tokens in a single tag search string.
    pub tag_query_limit: usize,
    /// Maximum number of tags a post may carry after a tag edit.
    pub max_post_tags: usize,
    /// When set, a user name or md5 filter that cannot be resolved matches no rows instead of being dropped.
    pub strict_lookup_filters: bool,
    pub database_url: Option<String>,
    pub max_db_connections: usize,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_post_limit: 75,
            min_post_limit: 1,
            max_post_limit: 320,
            wildcard_character: '*',
            tag_query_limit: 40,
            max_post_tags: 250,
            strict_lookup_filters: false,
            database_url: None,
            max_db_connections: 25,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load the configuration from the environment, reading a `.env` file first if present.
    pub fn from_env() -> Result<Config, Error> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let config = Config {
            default_post_limit: env_or("DEFAULT_POST_LIMIT", defaults.default_post_limit)?,
            min_post_limit: env_or("MIN_POST_LIMIT", defaults.min_post_limit)?,
            max_post_limit: env_or("MAX_POST_LIMIT", defaults.max_post_limit)?,
            wildcard_character: env_or("WILDCARD_CHARACTER", defaults.wildcard_character)?,
            tag_query_limit: env_or("TAG_QUERY_LIMIT", defaults.tag_query_limit)?,
            max_post_tags: env_or("MAX_POST_TAGS", defaults.max_post_tags)?,
            strict_lookup_filters: env_or("STRICT_LOOKUP_FILTERS", defaults.strict_lookup_filters)?,
            database_url: env::var("DATABASE_URL").ok(),
            max_db_connections: env_or("MAX_DB_CONNECTIONS", defaults.max_db_connections)?,
            logging: LoggingConfig {
                level: env_or("LOG_LEVEL", defaults.logging.level)?,
                log_dir: env::var("LOG_DIR").ok(),
            },
        };

        if config.min_post_limit > config.max_post_limit {
            return Err(Error::ConfigurationError(format!(
                "MIN_POST_LIMIT {} exceeds MAX_POST_LIMIT {}",
                config.min_post_limit, config.max_post_limit
            )));
        }

        Ok(config)
    }

    /// The default limit clamped to the configured bounds.
    pub fn clamp_limit(&self, limit: u32) -> u32 {
        limit.clamp(self.min_post_limit, self.max_post_limit)
    }
}

fn env_or<T: FromStr>(var: &str, default: T) -> Result<T, Error> {
    match env::var(var) {
        Ok(val) => val.trim().parse::<T>().map_err(|_| {
            Error::ConfigurationError(format!("Could not parse value '{val}' of {var}"))
        }),
        Err(_) => Ok(default),
    }
}
