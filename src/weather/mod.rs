pub mod format;
pub mod types;

pub use types::{CurrentConditions, DailyEntry, ForecastError, ForecastSlot, Location};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::config::AppConfig;
use types::{parse_current, parse_daily, parse_short_range};

/// Сторона прогноза, которую потребляет доставка напоминаний.
#[async_trait]
pub trait Forecasts: Send + Sync {
    async fn current(&self, location: &Location) -> Result<CurrentConditions, ForecastError>;
}

/// Шлюз к OpenWeatherMap: один исходящий запрос на вызов, без повторов
/// внутри; политика повторов принадлежит вызывающему.
#[derive(Clone)]
pub struct ForecastGateway {
    client: Client,
    api_base: String,
    api_key: String,
}

impl ForecastGateway {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.http_timeout).build()?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            api_key: config.owm_api_key.clone(),
        })
    }

    async fn fetch(
        &self,
        path: &str,
        location: &Location,
        extra: &[(&'static str, String)],
    ) -> Result<String, ForecastError> {
        let url = format!("{}/{}", self.api_base, path);
        let mut params = location.query_params();
        params.push(("appid", self.api_key.clone()));
        params.push(("units", "metric".to_string()));
        params.extend(extra.iter().cloned());

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ForecastError::Provider(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ForecastError::LocationNotFound),
            status if !status.is_success() => {
                Err(ForecastError::Provider(format!("provider returned {status}")))
            }
            _ => response
                .text()
                .await
                .map_err(|e| ForecastError::Provider(e.to_string())),
        }
    }

    /// Краткосрочный прогноз с шагом 3 часа.
    pub async fn short_range(
        &self,
        location: &Location,
        steps: usize,
    ) -> Result<Vec<ForecastSlot>, ForecastError> {
        let body = self.fetch("forecast", location, &[]).await?;
        parse_short_range(&body, steps)
    }

    /// Прогноз по дням.
    pub async fn daily(
        &self,
        location: &Location,
        days: usize,
    ) -> Result<Vec<DailyEntry>, ForecastError> {
        let body = self
            .fetch("forecast/daily", location, &[("cnt", days.to_string())])
            .await?;
        parse_daily(&body, days)
    }
}

#[async_trait]
impl Forecasts for ForecastGateway {
    async fn current(&self, location: &Location) -> Result<CurrentConditions, ForecastError> {
        let body = self.fetch("weather", location, &[]).await?;
        parse_current(&body)
    }
}
