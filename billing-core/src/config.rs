use std::str::FromStr;

use thiserror::Error;

use crate::models::{Currency, Money};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Settings the billing rules read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingSettings {
    /// Rate given to a new client when the form leaves it empty
    pub default_rate: Money,
    pub currency: Currency,
    /// Years a paid invoice keeps its client from being deleted
    pub retention_years: u32,
    pub sender_name: String,
    pub sender_email: String,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            default_rate: Money::gbp(6000),
            currency: Currency::Gbp,
            retention_years: 5,
            sender_name: "Practice Billing".to_string(),
            sender_email: "billing@example.com".to_string(),
        }
    }
}

/// Server configuration read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub billing: BillingSettings,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any name -> value lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let currency: Currency = parse_or(&lookup, "BILLING_CURRENCY", Currency::Gbp)?;
        let rate_pence: i64 = parse_or(&lookup, "BILLING_DEFAULT_RATE_PENCE", 6000)?;
        if rate_pence < 0 {
            return Err(ConfigError::Invalid {
                name: "BILLING_DEFAULT_RATE_PENCE",
                value: rate_pence.to_string(),
            });
        }

        let defaults = BillingSettings::default();
        let billing = BillingSettings {
            default_rate: Money::new(rate_pence, currency),
            currency,
            retention_years: parse_or(&lookup, "BILLING_RETENTION_YEARS", defaults.retention_years)?,
            sender_name: lookup("BILLING_SENDER_NAME").unwrap_or(defaults.sender_name),
            sender_email: lookup("BILLING_SENDER_EMAIL").unwrap_or(defaults.sender_email),
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parse_or(&lookup, "SERVER_PORT", 3000)?,
            jwt_secret: required("JWT_SECRET")?,
            billing,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/billing"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert_eq!(config.billing, BillingSettings::default());
    }

    #[test]
    fn test_billing_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/billing"),
            ("JWT_SECRET", "s3cret"),
            ("BILLING_CURRENCY", "eur"),
            ("BILLING_DEFAULT_RATE_PENCE", "7500"),
            ("BILLING_RETENTION_YEARS", "7"),
        ]))
        .unwrap();

        assert_eq!(config.billing.default_rate, Money::new(7500, Currency::Eur));
        assert_eq!(config.billing.retention_years, 7);
    }

    #[test]
    fn test_missing_and_invalid_values() {
        let missing = Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap_err();
        assert_eq!(missing, ConfigError::Missing("DATABASE_URL"));

        let invalid = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/billing"),
            ("JWT_SECRET", "s3cret"),
            ("SERVER_PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(invalid, ConfigError::Invalid { name: "SERVER_PORT", .. }));
    }
}
