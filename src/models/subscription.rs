use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use teloxide::types::ChatId;

use crate::weather::Location;

/// Запись подписки на ежедневные уведомления. Записи не удаляются:
/// отписка лишь сбрасывает `enabled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: ChatId,
    pub enabled: bool,
    pub location: Option<Location>,
    pub last_notified_date: Option<NaiveDate>,
}

/// Частичное обновление подписки: применяются только заданные поля.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionPatch {
    pub enabled: Option<bool>,
    pub location: Option<Location>,
}
