use std::fmt::Display;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Ten years.
const MAX_TOKEN_TTL_SECS: i64 = 10 * 365 * 86_400;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub database_path: String,
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub api_key: String,
    pub tmdb_base_url: String,
    pub bcrypt_cost: u32,
    pub upstream_timeout_secs: u64,
}

impl Config {
    /// Reads the process environment. A `.env` file is loaded first if present.
    pub fn from_env() -> Result<Config, ConfigError> {
        dotenv::dotenv().ok();
        Config::from_source(|key| std::env::var(key).ok())
    }

    pub fn from_source<F>(get: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        Ok(Config {
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| "127.0.0.1:8080".to_owned()),
            database_path: get("DATABASE_PATH").unwrap_or_else(|| "movielist.db".to_owned()),
            jwt_secret: required("JWT_SECRET")?,
            token_ttl_secs: parse_within(&get, "TOKEN_TTL_SECS", 86_400, 1..=MAX_TOKEN_TTL_SECS)?,
            api_key: required("API_KEY")?,
            tmdb_base_url: get("TMDB_BASE_URL")
                .unwrap_or_else(|| "https://api.themoviedb.org/3".to_owned()),
            bcrypt_cost: parse_within(&get, "BCRYPT_COST", bcrypt::DEFAULT_COST, 4..=31)?,
            upstream_timeout_secs: parse_or(&get, "UPSTREAM_TIMEOUT_SECS", 10)?,
        })
    }
}

fn parse_or<F, T>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn parse_within<F, T>(
    get: &F,
    key: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Display,
{
    let value = parse_or(get, key, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        })
    }
}
