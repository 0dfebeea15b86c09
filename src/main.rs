use teloxide::{prelude::*, utils::command::BotCommands};
use std::sync::Arc;
use tokio::sync::watch;

mod bot_state;
mod config;
mod database;
mod dispatcher;
mod handlers;
mod models;
mod scheduler;
mod store;
mod weather;

use crate::bot_state::BotState;
use crate::config::AppConfig;
use crate::database::Database;
use crate::dispatcher::{ReminderDispatcher, TelegramChannel};
use crate::handlers::{callback_handler, command_handler, message_handler};
use crate::store::PgSubscriberStore;
use crate::weather::ForecastGateway;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Доступные команды:")]
enum Command {
    #[command(description = "начать работу с ботом")]
    Start,
    #[command(description = "показать помощь")]
    Help,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Загружаем .env и инициализируем логирование
    dotenvy::dotenv().ok();
    env_logger::init();
    log::info!("Starting weather bot with PostgreSQL...");

    let config = Arc::new(AppConfig::from_env()?);

    // Инициализация базы данных
    let db = Database::new(&config.database_url).await?;
    db.init().await?;
    log::info!("✅ Database initialized");

    let store = PgSubscriberStore::new(db);
    let gateway = ForecastGateway::new(&config)?;
    let bot = Bot::new(&config.bot_token);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Фоновая задача ежедневных уведомлений
    let reminder_dispatcher = Arc::new(ReminderDispatcher::new(
        gateway.clone(),
        TelegramChannel::new(bot.clone()),
        store.clone(),
        config.clone(),
    ));
    tokio::spawn(scheduler::run_daily_notifications(
        config.clone(),
        store.clone(),
        reminder_dispatcher,
        shutdown_rx,
    ));

    let state = BotState::new(store, gateway, config);

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(command_handler),
        )
        .branch(Update::filter_callback_query().endpoint(callback_handler))
        .branch(Update::filter_message().endpoint(message_handler));

    log::info!("🚀 Starting dispatcher...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    // Останавливаем планировщик и незавершённые повторы
    let _ = shutdown_tx.send(true);

    Ok(())
}
