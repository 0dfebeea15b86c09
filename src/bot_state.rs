use std::sync::Arc;

use crate::config::AppConfig;
use crate::store::PgSubscriberStore;
use crate::weather::ForecastGateway;

/// Общий контекст обработчиков: хранилище подписок, шлюз прогнозов и
/// конфигурация. Состояние подписок между вызовами не кэшируется:
/// каждое чтение идёт в хранилище.
#[derive(Clone)]
pub struct BotState {
    pub store: PgSubscriberStore,
    pub gateway: ForecastGateway,
    pub config: Arc<AppConfig>,
}

impl BotState {
    pub fn new(store: PgSubscriberStore, gateway: ForecastGateway, config: Arc<AppConfig>) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }
}
