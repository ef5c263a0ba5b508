use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// Тарифы общежития, которые используются при расчёте счетов
#[derive(Clone, Debug, PartialEq)]
pub struct RateConfig {
    pub service_fee: Decimal,
    pub water_rate: Decimal,
    pub electric_rate: Decimal,
    pub overdue_fine_per_day: Decimal,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            service_fee: Decimal::new(200, 0),
            water_rate: Decimal::new(19, 0),
            electric_rate: Decimal::new(7, 0),
            overdue_fine_per_day: Decimal::new(50, 0),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_access_expiry: i64,
    pub notify_enabled: bool,
    pub notify_webhook_url: Option<String>,
    pub rates: RateConfig,
    pub bill_due_day: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = RateConfig::default();

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_access_expiry: env::var("JWT_ACCESS_EXPIRY")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .unwrap_or(900),
            notify_enabled: env::var("NOTIFY_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok(),
            rates: RateConfig {
                service_fee: decimal_var("SERVICE_FEE", defaults.service_fee),
                water_rate: decimal_var("WATER_RATE", defaults.water_rate),
                electric_rate: decimal_var("ELECTRIC_RATE", defaults.electric_rate),
                overdue_fine_per_day: decimal_var(
                    "OVERDUE_FINE_PER_DAY",
                    defaults.overdue_fine_per_day,
                ),
            },
            bill_due_day: env::var("BILL_DUE_DAY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|d| (1..=28).contains(d))
                .unwrap_or(5),
        })
    }
}

fn decimal_var(key: &str, default: Decimal) -> Decimal {
    env::var(key)
        .ok()
        .and_then(|v| Decimal::from_str(v.trim()).ok())
        .filter(|d| !d.is_sign_negative())
        .unwrap_or(default)
}
