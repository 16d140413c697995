use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub redis_url: Option<String>,
    pub message_gateway_url: String,
    pub message_gateway_token: String,
    pub outbound_timeout_seconds: u64,
    pub handoff_pause_minutes: i64,
    pub slot_search_horizon_days: i64,
    pub max_day_options: usize,
    pub max_time_options: usize,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            redis_url: None,
            message_gateway_url: String::new(),
            message_gateway_token: String::new(),
            outbound_timeout_seconds: 10,
            handoff_pause_minutes: 60,
            slot_search_horizon_days: 90,
            max_day_options: 5,
            max_time_options: 10,
            server_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok(),
            message_gateway_url: env::var("MESSAGE_GATEWAY_URL")
                .unwrap_or_else(|_| {
                    warn!("MESSAGE_GATEWAY_URL not set, outbound messages will fail");
                    String::new()
                }),
            message_gateway_token: env::var("MESSAGE_GATEWAY_TOKEN").unwrap_or_default(),
            outbound_timeout_seconds: parse_or("OUTBOUND_TIMEOUT_SECONDS", defaults.outbound_timeout_seconds),
            handoff_pause_minutes: parse_or("HANDOFF_PAUSE_MINUTES", defaults.handoff_pause_minutes),
            slot_search_horizon_days: parse_or("SLOT_SEARCH_HORIZON_DAYS", defaults.slot_search_horizon_days),
            max_day_options: parse_or("MAX_DAY_OPTIONS", defaults.max_day_options),
            max_time_options: parse_or("MAX_TIME_OPTIONS", defaults.max_time_options),
            server_port: parse_or("SERVER_PORT", defaults.server_port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_gateway_configured(&self) -> bool {
        !self.message_gateway_url.is_empty()
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
