//! Process configuration.
//!
//! Everything is read from the environment once at startup and carried in
//! an explicit struct; core logic never reaches for `std::env` itself.

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::pricing::PricingConfig;

const DEFAULT_PAYOS_API_BASE: &str = "https://api-merchant.payos.vn";

#[derive(Clone, Debug)]
pub struct PayosConfig {
    pub client_id: String,
    pub api_key: String,
    pub checksum_key: String,
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub frontend_url: String,
    pub pricing: PricingConfig,
    pub usd_to_vnd_rate: Decimal,
    pub payos: Option<PayosConfig>,
    pub nats_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let port = env_parse("PORT", 8083u16)?;
        let frontend_url = std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        let pricing = PricingConfig {
            free_shipping_threshold: env_decimal("FREE_SHIPPING_THRESHOLD", Decimal::new(50, 0))?,
            flat_shipping_fee: env_decimal("FLAT_SHIPPING_FEE", Decimal::new(5, 0))?,
            tax_rate: env_decimal("TAX_RATE", Decimal::new(8, 2))?,
        };
        let usd_to_vnd_rate = env_decimal("USD_TO_VND_RATE", Decimal::new(25000, 0))?;

        let payos = payos_from_parts(
            std::env::var("PAYOS_CLIENT_ID").ok(),
            std::env::var("PAYOS_API_KEY").ok(),
            std::env::var("PAYOS_CHECKSUM_KEY").ok(),
            std::env::var("PAYOS_API_BASE").ok(),
        );

        Ok(Self {
            database_url,
            port,
            frontend_url,
            pricing,
            usd_to_vnd_rate,
            payos,
            nats_url: std::env::var("NATS_URL").ok(),
        })
    }
}

/// Gateway credentials are all-or-nothing: a partial set disables the
/// gateway the same way a missing one does.
fn payos_from_parts(
    client_id: Option<String>,
    api_key: Option<String>,
    checksum_key: Option<String>,
    api_base: Option<String>,
) -> Option<PayosConfig> {
    match (client_id, api_key, checksum_key) {
        (Some(client_id), Some(api_key), Some(checksum_key)) => Some(PayosConfig {
            client_id,
            api_key,
            checksum_key,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_PAYOS_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        }),
        (None, None, None) => None,
        _ => {
            tracing::warn!("incomplete PayOS credentials, gateway disabled");
            None
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

fn env_decimal(key: &str, default: Decimal) -> Result<Decimal> {
    env_parse(key, default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payos_requires_all_credentials() {
        assert!(payos_from_parts(Some("id".into()), Some("key".into()), None, None).is_none());
        assert!(payos_from_parts(None, None, None, None).is_none());
        let config =
            payos_from_parts(Some("id".into()), Some("key".into()), Some("sum".into()), None)
                .unwrap();
        assert_eq!(config.api_base, DEFAULT_PAYOS_API_BASE);
    }

    #[test]
    fn test_payos_api_base_trailing_slash_trimmed() {
        let config = payos_from_parts(
            Some("id".into()),
            Some("key".into()),
            Some("sum".into()),
            Some("https://sandbox.payos.vn/".into()),
        )
        .unwrap();
        assert_eq!(config.api_base, "https://sandbox.payos.vn");
    }
}
