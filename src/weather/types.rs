use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Место, для которого запрашивается прогноз: название города или координаты.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Location {
    City(String),
    Coords { lat: f64, lon: f64 },
}

impl Location {
    /// "55.75,37.61" разбирается как координаты, всё остальное как город.
    pub fn parse(raw: &str) -> Location {
        let trimmed = raw.trim();
        if let Some((lat, lon)) = trimmed.split_once(',') {
            if let (Ok(lat), Ok(lon)) = (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) {
                return Location::Coords { lat, lon };
            }
        }
        Location::City(trimmed.to_string())
    }

    /// Параметры запроса к провайдеру для этого места.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        match self {
            Location::City(name) => vec![("q", name.clone())],
            Location::Coords { lat, lon } => {
                vec![("lat", lat.to_string()), ("lon", lon.to_string())]
            }
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::City(name) => write!(f, "{name}"),
            Location::Coords { lat, lon } => write!(f, "{lat},{lon}"),
        }
    }
}

/// Закрытый перечень исходов обращения к провайдеру погоды.
/// Сетевые сбои не пробрасываются наружу, всё сворачивается сюда.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForecastError {
    /// Сетевая ошибка, не-2xx ответ или нечитаемое тело.
    #[error("weather provider request failed: {0}")]
    Provider(String),
    /// Ответ разобран, но обязательных полей в нём нет.
    #[error("weather provider returned malformed data: {0}")]
    MalformedData(String),
    /// Провайдер не знает такого места; повторять бессмысленно.
    #[error("location not found")]
    LocationNotFound,
}

/// Текущие условия, приведённые к нашему виду.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub city_label: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: u8,
    pub wind_speed: f64,
    pub icon: String,
}

/// Один шаг краткосрочного прогноза (3 часа).
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSlot {
    pub time: NaiveDateTime,
    pub temperature: f64,
}

/// Один день недельного прогноза.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyEntry {
    pub date: NaiveDate,
    pub temperature: f64,
}

// Сырые структуры ответов OpenWeatherMap. Все поля опциональны: схема
// провайдера документирована, но не гарантирована.

#[derive(Debug, Deserialize)]
pub(crate) struct RawCurrent {
    pub name: Option<String>,
    pub main: Option<RawMain>,
    #[serde(default)]
    pub weather: Vec<RawWeather>,
    pub wind: Option<RawWind>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawMain {
    pub temp: Option<f64>,
    pub feels_like: Option<f64>,
    pub humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawWeather {
    pub icon: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawWind {
    pub speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawShortRange {
    pub list: Option<Vec<RawSlot>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSlot {
    pub dt: Option<i64>,
    pub dt_txt: Option<String>,
    pub main: Option<RawMain>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDaily {
    pub list: Option<Vec<RawDay>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDay {
    pub dt: Option<i64>,
    pub temp: Option<RawDayTemp>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDayTemp {
    pub day: Option<f64>,
}

fn decode<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T, ForecastError> {
    serde_json::from_str(body).map_err(|e| ForecastError::Provider(format!("unparsable response: {e}")))
}

pub(crate) fn parse_current(body: &str) -> Result<CurrentConditions, ForecastError> {
    let raw: RawCurrent = decode(body)?;

    let main = raw
        .main
        .ok_or_else(|| ForecastError::MalformedData("missing `main` block".to_string()))?;
    let temperature = main
        .temp
        .ok_or_else(|| ForecastError::MalformedData("missing `main.temp`".to_string()))?;

    Ok(CurrentConditions {
        city_label: raw.name.unwrap_or_default(),
        temperature,
        feels_like: main.feels_like.unwrap_or(temperature),
        humidity: main
            .humidity
            .map(|h| h.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0),
        wind_speed: raw.wind.and_then(|w| w.speed).unwrap_or(0.0),
        icon: raw
            .weather
            .first()
            .and_then(|w| w.icon.clone())
            .unwrap_or_else(|| "01d".to_string()),
    })
}

pub(crate) fn parse_short_range(body: &str, steps: usize) -> Result<Vec<ForecastSlot>, ForecastError> {
    let raw: RawShortRange = decode(body)?;
    let list = raw
        .list
        .ok_or_else(|| ForecastError::MalformedData("missing `list` block".to_string()))?;

    let mut slots = Vec::new();
    for slot in list.into_iter().take(steps) {
        let temperature = slot
            .main
            .as_ref()
            .and_then(|m| m.temp)
            .ok_or_else(|| ForecastError::MalformedData("forecast slot missing `main.temp`".to_string()))?;
        let time = slot_time(&slot)
            .ok_or_else(|| ForecastError::MalformedData("forecast slot missing timestamp".to_string()))?;
        slots.push(ForecastSlot { time, temperature });
    }
    Ok(slots)
}

fn slot_time(slot: &RawSlot) -> Option<NaiveDateTime> {
    if let Some(txt) = &slot.dt_txt {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(txt, "%Y-%m-%d %H:%M:%S") {
            return Some(parsed);
        }
    }
    slot.dt
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt, 0))
        .map(|dt| dt.naive_utc())
}

pub(crate) fn parse_daily(body: &str, days: usize) -> Result<Vec<DailyEntry>, ForecastError> {
    let raw: RawDaily = decode(body)?;
    let list = raw
        .list
        .ok_or_else(|| ForecastError::MalformedData("missing `list` block".to_string()))?;

    let mut entries = Vec::new();
    for day in list.into_iter().take(days) {
        let dt = day
            .dt
            .ok_or_else(|| ForecastError::MalformedData("daily entry missing `dt`".to_string()))?;
        let date = DateTime::<Utc>::from_timestamp(dt, 0)
            .ok_or_else(|| ForecastError::MalformedData(format!("daily entry has invalid timestamp {dt}")))?
            .date_naive();
        let temperature = day
            .temp
            .as_ref()
            .and_then(|t| t.day)
            .ok_or_else(|| ForecastError::MalformedData("daily entry missing `temp.day`".to_string()))?;
        entries.push(DailyEntry { date, temperature });
    }
    Ok(entries)
}
