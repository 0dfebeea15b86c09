use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile};
use tokio::sync::watch;

use crate::config::AppConfig;
use crate::models::NotificationTask;
use crate::store::{StoreError, SubscriberStore};
use crate::weather::format::{city_label, icon_url, reminder_text};
use crate::weather::{ForecastError, Forecasts, Location};

/// Ошибки канала доставки сообщений пользователю.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    /// Получатель недоступен навсегда: заблокировал бота или не существует.
    #[error("recipient rejected delivery: {0}")]
    Rejected(String),
    #[error("delivery timed out")]
    Timeout,
    #[error("delivery network error: {0}")]
    Network(String),
}

impl DeliveryError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Rejected(_))
    }
}

/// Канал доставки напоминаний.
#[async_trait]
pub trait ReminderChannel: Send + Sync {
    async fn send_reminder(
        &self,
        user_id: ChatId,
        text: &str,
        icon: Option<&str>,
    ) -> Result<(), DeliveryError>;
}

/// Канал на базе Telegram-бота: карточка с иконкой провайдера,
/// при недоступной иконке просто текст.
#[derive(Clone)]
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn classify_send_error(err: &teloxide::RequestError) -> DeliveryError {
    use teloxide::RequestError;

    match err {
        RequestError::Api(api) => DeliveryError::Rejected(api.to_string()),
        RequestError::Network(e) if e.is_timeout() => DeliveryError::Timeout,
        other => DeliveryError::Network(other.to_string()),
    }
}

#[async_trait]
impl ReminderChannel for TelegramChannel {
    async fn send_reminder(
        &self,
        user_id: ChatId,
        text: &str,
        icon: Option<&str>,
    ) -> Result<(), DeliveryError> {
        let icon_link = icon.and_then(|code| reqwest::Url::parse(&icon_url(code)).ok());

        let result = match icon_link {
            Some(url) => self
                .bot
                .send_photo(user_id, InputFile::url(url))
                .caption(text.to_string())
                .await
                .map(|_| ()),
            None => self.bot.send_message(user_id, text).await.map(|_| ()),
        };

        result.map_err(|e| classify_send_error(&e))
    }
}

/// Итог одной попытки доставки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    FailedRetryable,
    FailedPermanent,
}

/// Экспоненциальная выдержка между повторами, с верхним пределом.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base: config.retry_base,
            cap: config.retry_cap,
            max_attempts: config.retry_max_attempts,
        }
    }

    /// Пауза после `attempt`-й неудачной попытки (нумерация с 1).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Доставляет одно напоминание одному подписчику: прогноз, текст,
/// отправка, отметка. Повторы выполняются здесь же, по политике выдержки.
pub struct ReminderDispatcher<F, C, S> {
    forecasts: F,
    channel: C,
    store: S,
    default_location: Location,
    policy: RetryPolicy,
}

impl<F, C, S> ReminderDispatcher<F, C, S>
where
    F: Forecasts,
    C: ReminderChannel,
    S: SubscriberStore,
{
    pub fn new(forecasts: F, channel: C, store: S, config: Arc<AppConfig>) -> Self {
        Self {
            forecasts,
            channel,
            store,
            default_location: config.default_location.clone(),
            policy: RetryPolicy::from_config(&config),
        }
    }

    /// Одна попытка доставки.
    pub async fn deliver(&self, task: &NotificationTask) -> DeliveryOutcome {
        let location = match self.store.get(task.user_id).await {
            Ok(Some(sub)) => sub.location.unwrap_or_else(|| self.default_location.clone()),
            Ok(None) => self.default_location.clone(),
            Err(StoreError::Unavailable(e)) => {
                log::warn!("store unavailable while loading location for {}: {}", task.user_id, e);
                return DeliveryOutcome::FailedRetryable;
            }
        };

        let current = match self.forecasts.current(&location).await {
            Ok(current) => current,
            Err(ForecastError::LocationNotFound) => {
                log::error!(
                    "🚫 reminder for {} dropped: location {} not found",
                    task.user_id,
                    location
                );
                return DeliveryOutcome::FailedPermanent;
            }
            Err(e) => {
                log::warn!("forecast fetch failed for {}: {}", task.user_id, e);
                return DeliveryOutcome::FailedRetryable;
            }
        };

        let label = city_label(&location, &current);
        let text = reminder_text(&label, &current);

        if let Err(e) = self
            .channel
            .send_reminder(task.user_id, &text, Some(&current.icon))
            .await
        {
            if e.is_permanent() {
                log::error!("🚫 reminder for {} rejected permanently: {}", task.user_id, e);
                return DeliveryOutcome::FailedPermanent;
            }
            log::warn!("reminder delivery to {} failed: {}", task.user_id, e);
            return DeliveryOutcome::FailedRetryable;
        }

        match self.store.mark_notified(task.user_id, task.scheduled_date).await {
            Ok(_) => DeliveryOutcome::Delivered,
            Err(StoreError::Unavailable(e)) => {
                // Сообщение уже у пользователя: не переотправляем,
                // фиксируем расхождение для сверки.
                log::error!(
                    "⚠️ delivered-unconfirmed: reminder for {} on {} sent, but mark failed: {}",
                    task.user_id,
                    task.scheduled_date,
                    e
                );
                DeliveryOutcome::Delivered
            }
        }
    }

    /// Доставка с повторами. Возвращает финальный итог задачи.
    pub async fn run(
        self: Arc<Self>,
        mut task: NotificationTask,
        mut shutdown: watch::Receiver<bool>,
    ) -> DeliveryOutcome {
        loop {
            if *shutdown.borrow() {
                return DeliveryOutcome::FailedRetryable;
            }

            task.attempt_count += 1;
            let outcome = self.deliver(&task).await;

            match outcome {
                DeliveryOutcome::Delivered | DeliveryOutcome::FailedPermanent => return outcome,
                DeliveryOutcome::FailedRetryable => {
                    if task.attempt_count >= self.policy.max_attempts {
                        log::error!(
                            "❌ reminder for {} on {} dropped after {} attempts",
                            task.user_id,
                            task.scheduled_date,
                            task.attempt_count
                        );
                        return DeliveryOutcome::FailedRetryable;
                    }

                    let delay = self.policy.delay_after(task.attempt_count);
                    tokio::select! {
                        _ = shutdown.changed() => return DeliveryOutcome::FailedRetryable,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use chrono_tz::Tz;
    use tokio::time::Instant;

    use super::*;
    use crate::models::SubscriptionPatch;
    use crate::store::memory::MemorySubscriberStore;
    use crate::weather::CurrentConditions;

    fn test_config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            bot_token: "test-token".to_string(),
            owm_api_key: "test-key".to_string(),
            database_url: "postgres://localhost/test".to_string(),
            api_base: "http://localhost:0".to_string(),
            notify_time: chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            timezone: "UTC".parse::<Tz>().unwrap(),
            default_location: Location::City("Москва".to_string()),
            retry_base: Duration::from_secs(30),
            retry_cap: Duration::from_secs(900),
            retry_max_attempts: 5,
            http_timeout: Duration::from_secs(10),
        })
    }

    fn today() -> NaiveDate {
        "2026-08-05".parse().unwrap()
    }

    fn sample_current() -> CurrentConditions {
        CurrentConditions {
            city_label: "Москва".to_string(),
            temperature: 21.0,
            feels_like: 20.0,
            humidity: 50,
            wind_speed: 3.0,
            icon: "04d".to_string(),
        }
    }

    struct StaticForecasts {
        result: Result<CurrentConditions, ForecastError>,
        calls: AtomicU32,
    }

    impl StaticForecasts {
        fn ok() -> Self {
            Self { result: Ok(sample_current()), calls: AtomicU32::new(0) }
        }

        fn err(err: ForecastError) -> Self {
            Self { result: Err(err), calls: AtomicU32::new(0) }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Forecasts for StaticForecasts {
        async fn current(&self, _: &Location) -> Result<CurrentConditions, ForecastError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct FakeChannel {
        script: Mutex<VecDeque<Result<(), DeliveryError>>>,
        fallback: Result<(), DeliveryError>,
        sent_at: Mutex<Vec<Instant>>,
    }

    impl FakeChannel {
        fn always(fallback: Result<(), DeliveryError>) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback,
                sent_at: Mutex::new(Vec::new()),
            }
        }

        fn scripted(script: Vec<Result<(), DeliveryError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: Ok(()),
                sent_at: Mutex::new(Vec::new()),
            }
        }

        fn sent_count(&self) -> usize {
            self.sent_at.lock().unwrap().len()
        }

        fn gaps(&self) -> Vec<Duration> {
            let sent = self.sent_at.lock().unwrap();
            sent.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    #[async_trait]
    impl ReminderChannel for FakeChannel {
        async fn send_reminder(
            &self,
            _user_id: ChatId,
            _text: &str,
            _icon: Option<&str>,
        ) -> Result<(), DeliveryError> {
            self.sent_at.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    /// Хранилище, у которого отказывает только отметка о доставке.
    struct FlakyMarkStore {
        inner: MemorySubscriberStore,
    }

    #[async_trait]
    impl SubscriberStore for FlakyMarkStore {
        async fn get(&self, user_id: ChatId) -> Result<Option<crate::models::Subscription>, StoreError> {
            self.inner.get(user_id).await
        }

        async fn upsert(
            &self,
            user_id: ChatId,
            patch: SubscriptionPatch,
        ) -> Result<crate::models::Subscription, StoreError> {
            self.inner.upsert(user_id, patch).await
        }

        async fn mark_notified(
            &self,
            _user_id: ChatId,
            _date: NaiveDate,
        ) -> Result<crate::store::MarkOutcome, StoreError> {
            Err(StoreError::Unavailable("mark outage".to_string()))
        }

        async fn list_due(&self, date: NaiveDate) -> Result<Vec<ChatId>, StoreError> {
            self.inner.list_due(date).await
        }
    }

    async fn subscribed_store(user: ChatId) -> MemorySubscriberStore {
        let store = MemorySubscriberStore::new();
        store
            .upsert(user, SubscriptionPatch { enabled: Some(true), location: None })
            .await
            .unwrap();
        store
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base: Duration::from_secs(30),
            cap: Duration::from_secs(900),
            max_attempts: 5,
        };

        assert_eq!(policy.delay_after(1), Duration::from_secs(30));
        assert_eq!(policy.delay_after(2), Duration::from_secs(60));
        assert_eq!(policy.delay_after(3), Duration::from_secs(120));
        assert_eq!(policy.delay_after(4), Duration::from_secs(240));
        assert_eq!(policy.delay_after(5), Duration::from_secs(480));
        assert_eq!(policy.delay_after(6), Duration::from_secs(900));
        assert_eq!(policy.delay_after(20), Duration::from_secs(900));
    }

    #[test]
    fn api_rejection_is_permanent() {
        let err = teloxide::RequestError::Api(teloxide::ApiError::BotBlocked);
        assert!(classify_send_error(&err).is_permanent());

        let err = teloxide::RequestError::Api(teloxide::ApiError::ChatNotFound);
        assert!(classify_send_error(&err).is_permanent());
    }

    #[tokio::test]
    async fn successful_delivery_marks_the_date() {
        let user = ChatId(1);
        let store = subscribed_store(user).await;
        let channel = FakeChannel::always(Ok(()));
        let dispatcher = Arc::new(ReminderDispatcher::new(
            StaticForecasts::ok(),
            channel,
            store,
            test_config(),
        ));
        let (_tx, rx) = watch::channel(false);

        let outcome = dispatcher
            .clone()
            .run(NotificationTask::new(user, today()), rx)
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(dispatcher.channel.sent_count(), 1);
        let sub = dispatcher.store.get(user).await.unwrap().unwrap();
        assert_eq!(sub.last_notified_date, Some(today()));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_growing_backoff_then_gives_up() {
        let user = ChatId(1);
        let store = subscribed_store(user).await;
        let channel = FakeChannel::always(Err(DeliveryError::Network("conn reset".to_string())));
        let dispatcher = Arc::new(ReminderDispatcher::new(
            StaticForecasts::ok(),
            channel,
            store,
            test_config(),
        ));
        let (_tx, rx) = watch::channel(false);
        let started = Instant::now();

        let outcome = dispatcher
            .clone()
            .run(NotificationTask::new(user, today()), rx)
            .await;

        assert_eq!(outcome, DeliveryOutcome::FailedRetryable);
        assert_eq!(dispatcher.channel.sent_count(), 5);
        // 30 + 60 + 120 + 240 секунд между пятью попытками
        assert_eq!(started.elapsed(), Duration::from_secs(450));
        assert_eq!(
            dispatcher.channel.gaps(),
            vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(120),
                Duration::from_secs(240),
            ]
        );
        // Дата не отмечена: следующий цикл снова включит пользователя
        let sub = dispatcher.store.get(user).await.unwrap().unwrap();
        assert_eq!(sub.last_notified_date, None);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_then_success_delivers_late() {
        let user = ChatId(1);
        let store = subscribed_store(user).await;
        let channel = FakeChannel::scripted(vec![
            Err(DeliveryError::Timeout),
            Ok(()),
        ]);
        let dispatcher = Arc::new(ReminderDispatcher::new(
            StaticForecasts::ok(),
            channel,
            store,
            test_config(),
        ));
        let (_tx, rx) = watch::channel(false);

        let outcome = dispatcher
            .clone()
            .run(NotificationTask::new(user, today()), rx)
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(dispatcher.channel.sent_count(), 2);
        assert_eq!(dispatcher.channel.gaps(), vec![Duration::from_secs(30)]);
        let sub = dispatcher.store.get(user).await.unwrap().unwrap();
        assert_eq!(sub.last_notified_date, Some(today()));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_location_is_never_retried() {
        let user = ChatId(1);
        let store = subscribed_store(user).await;
        let channel = FakeChannel::always(Ok(()));
        let dispatcher = Arc::new(ReminderDispatcher::new(
            StaticForecasts::err(ForecastError::LocationNotFound),
            channel,
            store,
            test_config(),
        ));
        let (_tx, rx) = watch::channel(false);
        let started = Instant::now();

        let outcome = dispatcher
            .clone()
            .run(NotificationTask::new(user, today()), rx)
            .await;

        assert_eq!(outcome, DeliveryOutcome::FailedPermanent);
        assert_eq!(dispatcher.forecasts.calls(), 1);
        assert_eq!(dispatcher.channel.sent_count(), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_recipient_is_never_retried() {
        let user = ChatId(1);
        let store = subscribed_store(user).await;
        let channel = FakeChannel::always(Err(DeliveryError::Rejected("bot blocked".to_string())));
        let dispatcher = Arc::new(ReminderDispatcher::new(
            StaticForecasts::ok(),
            channel,
            store,
            test_config(),
        ));
        let (_tx, rx) = watch::channel(false);

        let outcome = dispatcher
            .clone()
            .run(NotificationTask::new(user, today()), rx)
            .await;

        assert_eq!(outcome, DeliveryOutcome::FailedPermanent);
        assert_eq!(dispatcher.channel.sent_count(), 1);
        let sub = dispatcher.store.get(user).await.unwrap().unwrap();
        assert_eq!(sub.last_notified_date, None);
    }

    #[tokio::test]
    async fn mark_outage_still_counts_as_delivered() {
        let user = ChatId(1);
        let inner = subscribed_store(user).await;
        let store = FlakyMarkStore { inner };
        let channel = FakeChannel::always(Ok(()));
        let dispatcher = Arc::new(ReminderDispatcher::new(
            StaticForecasts::ok(),
            channel,
            store,
            test_config(),
        ));
        let (_tx, rx) = watch::channel(false);

        let outcome = dispatcher
            .clone()
            .run(NotificationTask::new(user, today()), rx)
            .await;

        // Сообщение ушло: не переотправляем, несмотря на несохранённую отметку
        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(dispatcher.channel.sent_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_retries() {
        let user = ChatId(1);
        let store = subscribed_store(user).await;
        let channel = FakeChannel::always(Err(DeliveryError::Network("conn reset".to_string())));
        let dispatcher = Arc::new(ReminderDispatcher::new(
            StaticForecasts::ok(),
            channel,
            store,
            test_config(),
        ));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(
            dispatcher
                .clone()
                .run(NotificationTask::new(user, today()), rx),
        );

        // Первая попытка уходит в выдержку перед повтором
        tokio::task::yield_now().await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::FailedRetryable);
        assert_eq!(dispatcher.channel.sent_count(), 1);
    }
}
