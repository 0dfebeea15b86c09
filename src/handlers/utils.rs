use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup};

use crate::bot_state::BotState;
use crate::store::{StoreError, SubscriberStore};
use crate::weather::{ForecastError, Location};

/// Ответ на сбой хранилища в интерактивном сценарии.
pub const STORE_ERROR_REPLY: &str = "Не получилось открыть настройки. Попробуйте позже.";

/// Главное меню
pub fn main_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("Погода сейчас", "current_weather")],
        vec![InlineKeyboardButton::callback("Почасовой прогноз", "hourly_forecast")],
        vec![InlineKeyboardButton::callback("Недельный прогноз", "weekly_forecast")],
        vec![InlineKeyboardButton::callback("Подписаться на уведомления", "subscribe")],
    ])
}

/// Город пользователя или системный по умолчанию.
pub async fn resolve_location(state: &BotState, chat_id: ChatId) -> Result<Location, StoreError> {
    let subscription = state.store.get(chat_id).await?;
    Ok(subscription
        .and_then(|sub| sub.location)
        .unwrap_or_else(|| state.config.default_location.clone()))
}

/// Ответ пользователю на ошибку прогноза в интерактивном сценарии.
/// Временные сбои не детализируются.
pub fn forecast_error_reply(err: &ForecastError) -> &'static str {
    match err {
        ForecastError::LocationNotFound => "Город не найден. Попробуйте другое название.",
        ForecastError::Provider(_) | ForecastError::MalformedData(_) => {
            "Сервис погоды сейчас недоступен. Попробуйте позже."
        }
    }
}
