use chrono::NaiveDate;
use teloxide::types::ChatId;

/// Одно запланированное напоминание для одного подписчика.
#[derive(Debug, Clone)]
pub struct NotificationTask {
    pub user_id: ChatId,
    pub scheduled_date: NaiveDate,
    pub attempt_count: u32,
}

impl NotificationTask {
    pub fn new(user_id: ChatId, scheduled_date: NaiveDate) -> Self {
        Self {
            user_id,
            scheduled_date,
            attempt_count: 0,
        }
    }
}
