use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::weather::Location;

/// Конфигурация процесса: читается один раз на старте и передаётся
/// компонентам при создании. Никакого глобального изменяемого состояния.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot_token: String,
    pub owm_api_key: String,
    pub database_url: String,
    pub api_base: String,
    pub notify_time: NaiveTime,
    pub timezone: Tz,
    pub default_location: Location,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    pub retry_max_attempts: u32,
    pub http_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bot_token =
            env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let owm_api_key = env::var("OWM_API_KEY").context("OWM_API_KEY must be set")?;
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let api_base = env::var("OWM_API_BASE")
            .unwrap_or_else(|_| "https://api.openweathermap.org/data/2.5".to_string());

        let notify_time =
            parse_notify_time(&env::var("NOTIFY_TIME").unwrap_or_else(|_| "08:00".to_string()))?;
        let timezone = parse_timezone(
            &env::var("NOTIFY_TIMEZONE").unwrap_or_else(|_| "Europe/Moscow".to_string()),
        )?;

        let default_location =
            Location::parse(&env::var("DEFAULT_CITY").unwrap_or_else(|_| "Москва".to_string()));

        let retry_base = Duration::from_secs(parse_env_u64("RETRY_BASE_SECS", 30)?);
        let retry_cap = Duration::from_secs(parse_env_u64("RETRY_MAX_DELAY_SECS", 900)?);
        let retry_max_attempts = parse_env_u64("RETRY_MAX_ATTEMPTS", 5)? as u32;
        let http_timeout = Duration::from_secs(parse_env_u64("HTTP_TIMEOUT_SECS", 10)?);

        Ok(Self {
            bot_token,
            owm_api_key,
            database_url,
            api_base,
            notify_time,
            timezone,
            default_location,
            retry_base,
            retry_cap,
            retry_max_attempts,
            http_timeout,
        })
    }
}

fn parse_notify_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M").with_context(|| format!("invalid NOTIFY_TIME: {raw}"))
}

fn parse_timezone(raw: &str) -> Result<Tz> {
    raw.parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("invalid NOTIFY_TIMEZONE {raw}: {e}"))
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {name}: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_notify_time() {
        assert_eq!(
            parse_notify_time("08:00").unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap()
        );
        assert_eq!(
            parse_notify_time("21:30").unwrap(),
            NaiveTime::from_hms_opt(21, 30, 0).unwrap()
        );
    }

    #[test]
    fn rejects_bad_notify_time() {
        assert!(parse_notify_time("8 утра").is_err());
        assert!(parse_notify_time("25:00").is_err());
    }

    #[test]
    fn parses_timezone() {
        assert_eq!(parse_timezone("Europe/Moscow").unwrap(), chrono_tz::Europe::Moscow);
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
