use teloxide::prelude::*;
use std::error::Error;

use crate::bot_state::BotState;
use crate::handlers::utils::main_menu_keyboard;
use crate::models::SubscriptionPatch;
use crate::store::SubscriberStore;
use crate::Command;

pub async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    state: BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match cmd {
        Command::Start => handle_start(bot, msg, state).await?,
        Command::Help => handle_help(bot, msg).await?,
    }
    Ok(())
}

async fn handle_start(
    bot: Bot,
    msg: Message,
    state: BotState,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    // Заводим запись при первом обращении; рассылка по умолчанию выключена.
    // Меню показываем в любом случае: запись создаст и первая подписка.
    if let Err(e) = state.store.upsert(msg.chat.id, SubscriptionPatch::default()).await {
        log::error!("Error creating subscription for {}: {}", msg.chat.id, e);
    }

    bot.send_message(msg.chat.id, "Добро пожаловать! Выберите опцию:")
        .reply_markup(main_menu_keyboard())
        .await?;

    Ok(())
}

async fn handle_help(bot: Bot, msg: Message) -> Result<(), Box<dyn Error + Send + Sync>> {
    bot.send_message(
        msg.chat.id,
        "Помощь по боту\n\n\
         /start - главное меню\n\
         /help - эта справка\n\n\
         Кнопки меню:\n\
         • Погода сейчас - карточка с текущей погодой\n\
         • Почасовой прогноз - ближайшие сутки с шагом 3 часа\n\
         • Недельный прогноз - температура на 7 дней\n\
         • Подписаться на уведомления - ежедневное напоминание по утрам\n\n\
         Отправьте название города сообщением, чтобы сменить город.",
    )
    .await?;

    Ok(())
}
