use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, MessageId};
use std::error::Error;

use crate::bot_state::BotState;
use crate::handlers::utils::{
    forecast_error_reply, main_menu_keyboard, resolve_location, STORE_ERROR_REPLY,
};
use crate::models::SubscriptionPatch;
use crate::store::SubscriberStore;
use crate::weather::format::{city_label, current_caption, hourly_text, icon_url, weekly_text};
use crate::weather::Forecasts;

const SHORT_RANGE_STEPS: usize = 8; // 8 шагов по 3 часа, сутки
const WEEKLY_DAYS: usize = 7;

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    state: BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    if let Some(data) = q.data.as_deref() {
        if let Some(ref message) = q.message {
            let chat_id = message.chat().id;
            let message_id = message.id();

            match data {
                "current_weather" => show_current(&bot, chat_id, &state).await?,
                "hourly_forecast" => show_hourly(&bot, chat_id, message_id, &state).await?,
                "weekly_forecast" => show_weekly(&bot, chat_id, message_id, &state).await?,
                "subscribe" => toggle_subscription(&bot, chat_id, message_id, &state).await?,
                _ => {}
            }
        }
    }

    Ok(())
}

async fn show_current(
    bot: &Bot,
    chat_id: ChatId,
    state: &BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let location = match resolve_location(state, chat_id).await {
        Ok(location) => location,
        Err(e) => {
            log::error!("Error loading subscription for {}: {}", chat_id, e);
            bot.send_message(chat_id, STORE_ERROR_REPLY).await?;
            return Ok(());
        }
    };

    match state.gateway.current(&location).await {
        Ok(current) => {
            let caption = current_caption(&city_label(&location, &current), &current);
            match reqwest::Url::parse(&icon_url(&current.icon)) {
                Ok(url) => {
                    bot.send_photo(chat_id, InputFile::url(url))
                        .caption(caption)
                        .await?;
                }
                Err(_) => {
                    bot.send_message(chat_id, caption).await?;
                }
            }
        }
        Err(e) => {
            log::warn!("current weather for {} failed: {}", chat_id, e);
            bot.send_message(chat_id, forecast_error_reply(&e)).await?;
        }
    }

    Ok(())
}

async fn show_hourly(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    state: &BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let location = match resolve_location(state, chat_id).await {
        Ok(location) => location,
        Err(e) => {
            log::error!("Error loading subscription for {}: {}", chat_id, e);
            bot.send_message(chat_id, STORE_ERROR_REPLY).await?;
            return Ok(());
        }
    };

    match state.gateway.short_range(&location, SHORT_RANGE_STEPS).await {
        Ok(slots) => {
            bot.edit_message_text(chat_id, message_id, hourly_text(&slots))
                .reply_markup(main_menu_keyboard())
                .await?;
        }
        Err(e) => {
            log::warn!("hourly forecast for {} failed: {}", chat_id, e);
            bot.send_message(chat_id, forecast_error_reply(&e)).await?;
        }
    }

    Ok(())
}

async fn show_weekly(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    state: &BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let location = match resolve_location(state, chat_id).await {
        Ok(location) => location,
        Err(e) => {
            log::error!("Error loading subscription for {}: {}", chat_id, e);
            bot.send_message(chat_id, STORE_ERROR_REPLY).await?;
            return Ok(());
        }
    };

    match state.gateway.daily(&location, WEEKLY_DAYS).await {
        Ok(entries) => {
            bot.edit_message_text(chat_id, message_id, weekly_text(&entries))
                .reply_markup(main_menu_keyboard())
                .await?;
        }
        Err(e) => {
            log::warn!("weekly forecast for {} failed: {}", chat_id, e);
            bot.send_message(chat_id, forecast_error_reply(&e)).await?;
        }
    }

    Ok(())
}

async fn toggle_subscription(
    bot: &Bot,
    chat_id: ChatId,
    message_id: MessageId,
    state: &BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let enabled = match state.store.get(chat_id).await {
        Ok(sub) => sub.map(|s| s.enabled).unwrap_or(false),
        Err(e) => {
            log::error!("Error loading subscription for {}: {}", chat_id, e);
            bot.send_message(chat_id, STORE_ERROR_REPLY).await?;
            return Ok(());
        }
    };

    let patch = SubscriptionPatch {
        enabled: Some(!enabled),
        ..Default::default()
    };

    match state.store.upsert(chat_id, patch).await {
        Ok(sub) if sub.enabled => {
            bot.edit_message_text(chat_id, message_id, "Вы подписались на ежедневные уведомления!")
                .reply_markup(main_menu_keyboard())
                .await?;
        }
        Ok(_) => {
            bot.edit_message_text(chat_id, message_id, "Ежедневные уведомления отключены.")
                .reply_markup(main_menu_keyboard())
                .await?;
        }
        Err(e) => {
            log::error!("Error toggling subscription for {}: {}", chat_id, e);
            bot.send_message(chat_id, STORE_ERROR_REPLY).await?;
        }
    }

    Ok(())
}
