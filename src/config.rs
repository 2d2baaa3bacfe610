use std::env;

use crate::error::AppError;
use crate::models::location::GeoPoint;

const DEFAULT_PAYSTACK_BASE_URL: &str = "https://api.paystack.co";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub dispatch_queue_size: usize,
    pub event_buffer_size: usize,
    pub geo_cache_ttl_secs: u64,
    pub commission_rate: f64,
    pub google_maps_api_key: Option<String>,
    pub geo_gazetteer: Vec<(String, GeoPoint)>,
    pub push_relay_url: Option<String>,
    pub paystack_secret_key: Option<String>,
    pub paystack_base_url: String,
    pub payment_callback_url: Option<String>,
    pub api_tokens: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            dispatch_queue_size: 1024,
            event_buffer_size: 1024,
            geo_cache_ttl_secs: 3600,
            commission_rate: 0.10,
            google_maps_api_key: None,
            geo_gazetteer: Vec::new(),
            push_relay_url: None,
            paystack_secret_key: None,
            paystack_base_url: DEFAULT_PAYSTACK_BASE_URL.to_string(),
            payment_callback_url: None,
            api_tokens: String::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let commission_rate = parse_or_default("COMMISSION_RATE", defaults.commission_rate)?;
        if !(0.0..=1.0).contains(&commission_rate) {
            return Err(AppError::Internal(format!(
                "invalid COMMISSION_RATE: {commission_rate} is outside [0, 1]"
            )));
        }

        let geo_gazetteer = match optional("GEO_GAZETTEER") {
            Some(raw) => parse_gazetteer(&raw)
                .map_err(|err| AppError::Internal(format!("invalid GEO_GAZETTEER: {err}")))?,
            None => defaults.geo_gazetteer,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: optional("LOG_FORMAT")
                .is_some_and(|format| format.eq_ignore_ascii_case("json")),
            dispatch_queue_size: parse_or_default(
                "DISPATCH_QUEUE_SIZE",
                defaults.dispatch_queue_size,
            )?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            geo_cache_ttl_secs: parse_or_default(
                "GEO_CACHE_TTL_SECS",
                defaults.geo_cache_ttl_secs,
            )?,
            commission_rate,
            google_maps_api_key: optional("GOOGLE_MAPS_API_KEY"),
            geo_gazetteer,
            push_relay_url: optional("PUSH_RELAY_URL"),
            paystack_secret_key: optional("PAYSTACK_SECRET_KEY"),
            paystack_base_url: optional("PAYSTACK_BASE_URL")
                .unwrap_or(defaults.paystack_base_url),
            payment_callback_url: optional("PAYMENT_CALLBACK_URL"),
            api_tokens: env::var("API_TOKENS").unwrap_or(defaults.api_tokens),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
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

/// Parses `address=lat,lng` entries separated by semicolons.
pub fn parse_gazetteer(raw: &str) -> Result<Vec<(String, GeoPoint)>, String> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (address, coords) = entry
                .rsplit_once('=')
                .ok_or_else(|| format!("missing '=' in {entry}"))?;
            let (lat, lng) = coords
                .split_once(',')
                .ok_or_else(|| format!("missing ',' in {entry}"))?;

            let lat = lat
                .trim()
                .parse::<f64>()
                .map_err(|err| format!("bad latitude in {entry}: {err}"))?;
            let lng = lng
                .trim()
                .parse::<f64>()
                .map_err(|err| format!("bad longitude in {entry}: {err}"))?;

            Ok((address.trim().to_string(), GeoPoint { lat, lng }))
        })
        .collect()
}
