use std::sync::Arc;

use tracing::info;

use crate::channels::TelegramChannel;
use crate::config::AppConfig;
use crate::cron_utils::system_timezone_display;
use crate::dispatcher::Dispatcher;
use crate::labels::Labels;
use crate::scheduler::ReminderScheduler;
use crate::state::JsonScheduleStore;
use crate::traits::ScheduleStore;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    // 1. Schedule store
    let store: Arc<dyn ScheduleStore> =
        Arc::new(JsonScheduleStore::open(&config.state.db_path).await?);
    info!("Schedule store initialized ({})", config.state.db_path);

    // 2. Telegram channel (outbound side)
    let telegram = Arc::new(TelegramChannel::new(&config.telegram.bot_token));

    // 3. Reminder scheduler: re-arm everything persisted, then tick
    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        telegram.clone(),
        config.scheduler.tick_interval_secs,
        config.scheduler.persist_retries,
    ));
    scheduler.sync_all().await;
    scheduler.clone().spawn();
    info!(
        timezone = %system_timezone_display(),
        lead_times = ?config.scheduler.lead_times,
        "Reminders fire in the system timezone"
    );

    // 4. Dispatcher
    let dispatcher = Arc::new(Dispatcher::new(
        store,
        telegram.clone(),
        scheduler,
        Labels::for_locale(config.locale),
        config.scheduler.lead_times.clone(),
    ));

    // 5. Start Telegram with auto-retry (blocks)
    info!("Starting schedule-bot v{}", env!("CARGO_PKG_VERSION"));
    telegram.start_with_retry(dispatcher).await;

    Ok(())
}
