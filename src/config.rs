use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::models::draw::QualifierPairing;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub draws: DrawsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DrawsConfig {
    /// Pairing used when a group stage is created without an explicit one.
    pub qualifier_pairing: QualifierPairing,
    pub default_advance_from_group: u32,
}

impl Default for DrawsConfig {
    fn default() -> Self {
        Self {
            qualifier_pairing: QualifierPairing::Concatenate,
            default_advance_from_group: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")?;
        let max_connections: u32 = parse_or("DATABASE_MAX_CONNECTIONS", 5)?;
        let qualifier_pairing: QualifierPairing =
            parse_or("DRAW_QUALIFIER_PAIRING", QualifierPairing::Concatenate)?;
        let default_advance_from_group: u32 = parse_or("DRAW_DEFAULT_ADVANCE_FROM_GROUP", 2)?;
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "badminton_draws=info".to_string());

        if max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }
        if default_advance_from_group == 0 {
            anyhow::bail!("DRAW_DEFAULT_ADVANCE_FROM_GROUP must be at least 1");
        }

        Ok(Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            draws: DrawsConfig {
                qualifier_pairing,
                default_advance_from_group,
            },
            log: LogConfig { rust_log },
        })
    }
}

fn parse_or<T>(name: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(anyhow::anyhow!("{}: {}", name, e)),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, anyhow::Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", name, raw, e))
}
