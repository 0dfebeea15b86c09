use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Row;
use teloxide::types::ChatId;

use crate::database::Database;
use crate::models::{Subscription, SubscriptionPatch};
use crate::weather::Location;

/// Ошибки хранилища подписок. Недоступность базы отличается от
/// отсутствия записи: второе возвращается как `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("subscriber store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Результат отметки о доставке за дату.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Marked,
    AlreadyMarked,
}

/// Контракт хранилища подписок. Все операции атомарны на уровне одного
/// пользователя; никто, кроме хранилища, записи не меняет.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn get(&self, user_id: ChatId) -> Result<Option<Subscription>, StoreError>;

    /// Создаёт запись при отсутствии и применяет только заданные поля патча.
    async fn upsert(
        &self,
        user_id: ChatId,
        patch: SubscriptionPatch,
    ) -> Result<Subscription, StoreError>;

    /// Идемпотентная отметка: повторный вызов с той же датой даёт AlreadyMarked.
    async fn mark_notified(
        &self,
        user_id: ChatId,
        date: NaiveDate,
    ) -> Result<MarkOutcome, StoreError>;

    /// Включённые подписки, ещё не уведомлённые за указанную дату.
    async fn list_due(&self, date: NaiveDate) -> Result<Vec<ChatId>, StoreError>;
}

#[derive(Clone)]
pub struct PgSubscriberStore {
    db: Database,
}

impl PgSubscriberStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Subscription {
        let location: Option<String> = row.get("location");
        Subscription {
            user_id: ChatId(row.get::<i64, _>("chat_id")),
            enabled: row.get("enabled"),
            location: location.map(|raw| Location::parse(&raw)),
            last_notified_date: row.get("last_notified_date"),
        }
    }
}

#[async_trait]
impl SubscriberStore for PgSubscriberStore {
    async fn get(&self, user_id: ChatId) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query(
            "SELECT chat_id, enabled, location, last_notified_date
             FROM subscriptions WHERE chat_id = $1",
        )
        .bind(user_id.0)
        .fetch_optional(&self.db.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_subscription))
    }

    async fn upsert(
        &self,
        user_id: ChatId,
        patch: SubscriptionPatch,
    ) -> Result<Subscription, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO subscriptions (chat_id, enabled, location)
            VALUES ($1, COALESCE($2, false), $3)
            ON CONFLICT (chat_id)
            DO UPDATE SET
                enabled = COALESCE($2, subscriptions.enabled),
                location = COALESCE($3, subscriptions.location),
                updated_at = NOW()
            RETURNING chat_id, enabled, location, last_notified_date
            "#,
        )
        .bind(user_id.0)
        .bind(patch.enabled)
        .bind(patch.location.map(|l| l.to_string()))
        .fetch_one(&self.db.pool)
        .await?;

        Ok(Self::row_to_subscription(&row))
    }

    async fn mark_notified(
        &self,
        user_id: ChatId,
        date: NaiveDate,
    ) -> Result<MarkOutcome, StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE subscriptions
            SET last_notified_date = $2, updated_at = NOW()
            WHERE chat_id = $1
              AND (last_notified_date IS NULL OR last_notified_date <> $2)
            "#,
        )
        .bind(user_id.0)
        .bind(date)
        .execute(&self.db.pool)
        .await?;

        if updated.rows_affected() == 1 {
            Ok(MarkOutcome::Marked)
        } else {
            // Либо уже отмечено за эту дату, либо записи нет вовсе; записи
            // не удаляются, так что второе встречаться не должно.
            Ok(MarkOutcome::AlreadyMarked)
        }
    }

    async fn list_due(&self, date: NaiveDate) -> Result<Vec<ChatId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT chat_id FROM subscriptions
            WHERE enabled = true
              AND (last_notified_date IS NULL OR last_notified_date <> $1)
            ORDER BY created_at
            "#,
        )
        .bind(date)
        .fetch_all(&self.db.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ChatId(row.get::<i64, _>("chat_id")))
            .collect())
    }
}
