use std::env;

use rust_decimal::Decimal;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub pricing: PricingConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub rate_per_km: Decimal,
    pub default_base_fare: Decimal,
    pub platform_fee: Decimal,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub average_speed_kmh: f64,
    pub pickup_proximity_m: f64,
    pub require_pickup_proximity: bool,
    pub reassign_delay_secs: u64,
    pub rider_retry_max_attempts: u32,
    pub rider_retry_backoff_factor: u32,
    pub rider_reject_retry_attempts: u32,
    pub retry_max_delay_secs: u64,
    pub retry_poll_interval_ms: u64,
    pub rider_default_capacity: u8,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            rate_per_km: Decimal::from(5),
            default_base_fare: Decimal::from(30),
            platform_fee: Decimal::from(10),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            average_speed_kmh: 30.0,
            pickup_proximity_m: 400.0,
            require_pickup_proximity: true,
            reassign_delay_secs: 30,
            rider_retry_max_attempts: 3,
            rider_retry_backoff_factor: 2,
            rider_reject_retry_attempts: 1,
            retry_max_delay_secs: 600,
            retry_poll_interval_ms: 1_000,
            rider_default_capacity: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            pricing: PricingConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let pricing_defaults = PricingConfig::default();
        let dispatch_defaults = DispatchConfig::default();

        let dispatch = DispatchConfig {
            average_speed_kmh: parse_or_default(
                "AVERAGE_SPEED_KMH",
                dispatch_defaults.average_speed_kmh,
            )?,
            pickup_proximity_m: parse_or_default(
                "PICKUP_PROXIMITY_M",
                dispatch_defaults.pickup_proximity_m,
            )?,
            require_pickup_proximity: parse_or_default(
                "REQUIRE_PICKUP_PROXIMITY",
                dispatch_defaults.require_pickup_proximity,
            )?,
            reassign_delay_secs: parse_or_default(
                "REASSIGN_DELAY_SECS",
                dispatch_defaults.reassign_delay_secs,
            )?,
            rider_retry_max_attempts: parse_or_default(
                "RIDER_RETRY_MAX_ATTEMPTS",
                dispatch_defaults.rider_retry_max_attempts,
            )?,
            rider_retry_backoff_factor: parse_or_default(
                "RIDER_RETRY_BACKOFF_FACTOR",
                dispatch_defaults.rider_retry_backoff_factor,
            )?,
            rider_reject_retry_attempts: parse_or_default(
                "RIDER_REJECT_RETRY_ATTEMPTS",
                dispatch_defaults.rider_reject_retry_attempts,
            )?,
            retry_max_delay_secs: parse_or_default(
                "RETRY_MAX_DELAY_SECS",
                dispatch_defaults.retry_max_delay_secs,
            )?,
            retry_poll_interval_ms: parse_or_default(
                "RETRY_POLL_INTERVAL_MS",
                dispatch_defaults.retry_poll_interval_ms,
            )?,
            rider_default_capacity: parse_or_default(
                "RIDER_DEFAULT_CAPACITY",
                dispatch_defaults.rider_default_capacity,
            )?,
        };

        if dispatch.average_speed_kmh <= 0.0 {
            return Err(AppError::Internal("AVERAGE_SPEED_KMH must be > 0".to_string()));
        }
        if dispatch.rider_default_capacity == 0 {
            return Err(AppError::Internal("RIDER_DEFAULT_CAPACITY must be > 0".to_string()));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            pricing: PricingConfig {
                rate_per_km: parse_or_default("RATE_PER_KM", pricing_defaults.rate_per_km)?,
                default_base_fare: parse_or_default(
                    "DEFAULT_BASE_FARE",
                    pricing_defaults.default_base_fare,
                )?,
                platform_fee: parse_or_default("PLATFORM_FEE", pricing_defaults.platform_fee)?,
            },
            dispatch,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
