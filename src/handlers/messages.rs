use teloxide::prelude::*;
use std::error::Error;

use crate::bot_state::BotState;
use crate::handlers::utils::{main_menu_keyboard, STORE_ERROR_REPLY};
use crate::models::SubscriptionPatch;
use crate::store::SubscriberStore;
use crate::weather::Location;

/// Любой обычный текст трактуется как выбор города для прогнозов.
pub async fn message_handler(
    bot: Bot,
    msg: Message,
    state: BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    if let Some(text) = msg.text() {
        // Команды уже обработаны в command_handler
        if text.starts_with('/') {
            return Ok(());
        }

        let city = text.trim();
        if city.is_empty() {
            return Ok(());
        }

        let patch = SubscriptionPatch {
            location: Some(Location::parse(city)),
            ..Default::default()
        };

        match state.store.upsert(msg.chat.id, patch).await {
            Ok(sub) => {
                let saved = sub
                    .location
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| city.to_string());
                bot.send_message(
                    msg.chat.id,
                    format!("Город сохранён: {}. Прогнозы теперь для него.", saved),
                )
                .reply_markup(main_menu_keyboard())
                .await?;
            }
            Err(e) => {
                log::error!("Error saving location for {}: {}", msg.chat.id, e);
                bot.send_message(msg.chat.id, STORE_ERROR_REPLY).await?;
            }
        }
    }

    Ok(())
}
