use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;

use crate::config::AppConfig;
use crate::dispatcher::{ReminderChannel, ReminderDispatcher};
use crate::models::NotificationTask;
use crate::store::{StoreError, SubscriberStore};
use crate::weather::Forecasts;

/// Ближайший момент (UTC), когда в заданном часовом поясе наступит
/// `time_of_day`. При неоднозначном локальном времени берётся ранний
/// вариант; несуществующее (весенний перевод часов) переносится на
/// следующий день.
pub fn next_occurrence(now: DateTime<Utc>, tz: Tz, time_of_day: NaiveTime) -> DateTime<Utc> {
    let mut date = now.with_timezone(&tz).date_naive();

    loop {
        if let Some(candidate) = date.and_time(time_of_day).and_local_timezone(tz).earliest() {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return candidate;
            }
        }
        date = date.succ_opt().expect("calendar overflow");
    }
}

/// Задачи к отправке за одно срабатывание: все подписчики, которым за
/// `today` ещё не доставляли.
pub async fn collect_due_tasks<S: SubscriberStore>(
    store: &S,
    today: NaiveDate,
) -> Result<Vec<NotificationTask>, StoreError> {
    let due = store.list_due(today).await?;
    Ok(due
        .into_iter()
        .map(|user_id| NotificationTask::new(user_id, today))
        .collect())
}

/// Фоновый цикл: раз в сутки в настроенное время рассылает напоминания.
/// Сбой хранилища означает пропущенный цикл, а не падение процесса;
/// следующий день срабатывает независимо.
pub async fn run_daily_notifications<F, C, S>(
    config: Arc<AppConfig>,
    store: S,
    dispatcher: Arc<ReminderDispatcher<F, C, S>>,
    mut shutdown: watch::Receiver<bool>,
) where
    F: Forecasts + 'static,
    C: ReminderChannel + 'static,
    S: SubscriberStore + 'static,
{
    loop {
        let next = next_occurrence(Utc::now(), config.timezone, config.notify_time);
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        log::info!("⏰ next notification cycle at {}", next);

        tokio::select! {
            _ = shutdown.changed() => {
                log::info!("scheduler stopped");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        let today = Utc::now().with_timezone(&config.timezone).date_naive();

        match collect_due_tasks(&store, today).await {
            Ok(tasks) => {
                log::info!(
                    "🔔 notification cycle for {}: {} subscribers due",
                    today,
                    tasks.len()
                );
                for task in tasks {
                    let dispatcher = dispatcher.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        dispatcher.run(task, shutdown).await;
                    });
                }
            }
            Err(StoreError::Unavailable(e)) => {
                log::error!("❌ notification cycle for {} missed: {}", today, e);
            }
        }
    }
}
