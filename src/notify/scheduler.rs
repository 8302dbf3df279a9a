//! Periodic verification scheduler.
//!
//! Wakes at a few fixed times of day, buckets every task by due date and
//! sends one notification per bucket whose task set has not been announced
//! yet. Holds at most one pending wake time; re-arming replaces it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, Timelike};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::dispatch::{Dispatcher, bucket_message};
use super::ledger::NotificationLedger;
use super::surface::Permission;
use crate::config::AgendaConfig;
use crate::core::store::TaskQuery;
use crate::core::temporal::{Bucket, DueBuckets};
use crate::storage::{KeyValueStore, LAST_CHECK_KEY};

/// Longest single sleep; the wall clock is re-checked after each one so a
/// suspended machine does not oversleep a slot by hours.
const MAX_SLEEP: Duration = Duration::from_secs(15 * 60);

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Earliest slot strictly after `now`, rolling over to the first slot of
/// the next day.
pub fn next_wake_time(now: NaiveDateTime, slots: &[NaiveTime]) -> NaiveDateTime {
    let mut slots = slots.to_vec();
    slots.sort();
    slots.dedup();

    let today = now.date();
    if let Some(slot) = slots.iter().find(|s| today.and_time(**s) > now) {
        return today.and_time(*slot);
    }
    let tomorrow = today.succ_opt().unwrap_or(today);
    tomorrow.and_time(slots.first().copied().unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed { wake_at: NaiveDateTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// The user came back; run a catch-up check if one is due.
    Visible,
    /// Out-of-band pass requested by the background worker.
    VerifyTasks,
    Shutdown,
}

/// Outcome of one verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub dispatched: Vec<Bucket>,
    pub already_notified: Vec<Bucket>,
    /// Non-empty buckets held back until their notification hour.
    pub deferred: Vec<Bucket>,
    pub failed: Vec<Bucket>,
    pub permission_denied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub slots: Vec<NaiveTime>,
    pub catch_up_threshold: chrono::Duration,
    pub planning_hour: u32,
}

impl From<&AgendaConfig> for SchedulerSettings {
    fn from(config: &AgendaConfig) -> Self {
        Self {
            slots: config.check_slots.clone(),
            catch_up_threshold: config.catch_up_threshold(),
            planning_hour: config.planning_hour,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&AgendaConfig::default())
    }
}

pub struct VerificationScheduler {
    tasks: Arc<dyn TaskQuery>,
    ledger: NotificationLedger,
    dispatcher: Dispatcher,
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    state: SchedulerState,
}

impl VerificationScheduler {
    pub fn new(
        tasks: Arc<dyn TaskQuery>,
        storage: Arc<dyn KeyValueStore>,
        dispatcher: Dispatcher,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            tasks,
            ledger: NotificationLedger::load(storage.clone()),
            dispatcher,
            storage,
            clock: Arc::new(SystemClock),
            settings,
            state: SchedulerState::Idle,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn ledger(&self) -> &NotificationLedger {
        &self.ledger
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Idle -> Armed.
    pub fn start(&mut self) -> NaiveDateTime {
        self.arm()
    }

    pub fn stop(&mut self) {
        self.state = SchedulerState::Idle;
    }

    /// Compute the next wake time from the current clock and replace any pending one.
    fn arm(&mut self) -> NaiveDateTime {
        let now = self.clock.now();
        let wake_at = next_wake_time(now, &self.settings.slots);
        self.state = SchedulerState::Armed { wake_at };
        let hours = (wake_at - now).num_minutes() as f64 / 60.0;
        log::info!("Next verification at {} (in {:.1}h)", wake_at, hours);
        wake_at
    }

    /// Timer fired: run a pass, then re-arm relative to the current time.
    pub fn fire(&mut self) -> PassReport {
        let report = self.run_pass(self.clock.now());
        self.arm();
        report
    }

    pub fn run_pass(&self, now: NaiveDateTime) -> PassReport {
        let mut report = PassReport::default();

        if self.dispatcher.permission() != Permission::Granted {
            log::debug!("No permission to notify, skipping verification");
            report.permission_denied = true;
            return report;
        }

        let tasks = self.tasks.all_tasks();
        let buckets = DueBuckets::build(&tasks, now.date());
        log::info!(
            "Verification pass: {} overdue, {} today, {} tomorrow, {} day after tomorrow",
            buckets.overdue.len(),
            buckets.today.len(),
            buckets.tomorrow.len(),
            buckets.day_after_tomorrow.len(),
        );

        for bucket in Bucket::NOTIFIABLE {
            let set = buckets.get(bucket);
            if set.is_empty() {
                continue;
            }
            if bucket == Bucket::DayAfterTomorrow && now.hour() != self.settings.planning_hour {
                report.deferred.push(bucket);
                continue;
            }
            if self.ledger.already_notified(bucket, set) {
                log::debug!("Already notified for {}", bucket.key());
                report.already_notified.push(bucket);
                continue;
            }

            let (title, body) = bucket_message(bucket, set);
            match self.dispatcher.dispatch(&title, &body, bucket, bucket.is_urgent()) {
                Ok(()) => {
                    self.ledger.record_notified(bucket, set);
                    report.dispatched.push(bucket);
                }
                Err(e) => {
                    log::error!("Error sending {} notification: {}", bucket.key(), e);
                    report.failed.push(bucket);
                }
            }
        }

        report
    }

    /// Catch-up check when the user comes back. Runs a pass only when the
    /// last one is older than the threshold; the armed timer is untouched.
    pub fn on_visible(&self) -> Option<PassReport> {
        let now = self.clock.now();
        if let Some(last) = self.last_catch_up() {
            if now - last <= self.settings.catch_up_threshold {
                log::debug!("Catch-up check skipped, last one at {}", last);
                return None;
            }
        }
        log::info!("Catch-up verification");
        let report = self.run_pass(now);
        self.record_catch_up(now);
        Some(report)
    }

    pub fn last_catch_up(&self) -> Option<NaiveDateTime> {
        let raw = self.storage.get(LAST_CHECK_KEY)?;
        let millis = raw.trim().parse::<i64>().ok()?;
        DateTime::from_timestamp_millis(millis).map(|dt| dt.with_timezone(&Local).naive_local())
    }

    /// Stored as Unix epoch milliseconds.
    fn record_catch_up(&self, now: NaiveDateTime) {
        let millis = now
            .and_local_timezone(Local)
            .earliest()
            .map(|dt| dt.timestamp_millis())
            // Skipped local time (DST gap)
            .unwrap_or_else(|| now.and_utc().timestamp_millis())
            .to_string();
        if let Err(e) = self.storage.set(LAST_CHECK_KEY, &millis) {
            log::warn!("Failed to record catch-up check: {}", e);
        }
    }

    /// Handle one event from the channel. Returns false on shutdown.
    pub fn handle_event(&mut self, event: SchedulerEvent) -> bool {
        match event {
            SchedulerEvent::Visible => {
                self.on_visible();
                true
            }
            SchedulerEvent::VerifyTasks => {
                log::info!("Verification requested by background worker");
                self.run_pass(self.clock.now());
                true
            }
            SchedulerEvent::Shutdown => {
                self.stop();
                false
            }
        }
    }

    /// Run `f` on the blocking pool and hand the scheduler back. Passes query
    /// the notification server and wait for the worker, so they stay off the
    /// async threads.
    async fn off_thread<T: Send + 'static>(
        mut self,
        f: impl FnOnce(&mut Self) -> T + Send + 'static,
    ) -> Option<(Self, T)> {
        match tokio::task::spawn_blocking(move || {
            let out = f(&mut self);
            (self, out)
        })
        .await
        {
            Ok(pair) => Some(pair),
            Err(e) => {
                log::error!("Verification task failed: {}", e);
                None
            }
        }
    }

    /// Run the scheduler loop: one pass at startup, then one per slot.
    pub fn spawn(self, mut events: mpsc::UnboundedReceiver<SchedulerEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let started = self
                .off_thread(|s| {
                    s.run_pass(s.clock.now());
                    s.start();
                })
                .await;
            let Some((mut scheduler, ())) = started else {
                return;
            };

            while let SchedulerState::Armed { wake_at } = scheduler.state {
                let wait = (wake_at - scheduler.clock.now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(MAX_SLEEP);

                let event = tokio::select! {
                    _ = tokio::time::sleep(wait) => None,
                    event = events.recv() => Some(event),
                };

                let outcome = match event {
                    None if scheduler.clock.now() < wake_at => continue,
                    None => {
                        scheduler
                            .off_thread(|s| {
                                s.fire();
                                true
                            })
                            .await
                    }
                    Some(Some(event)) => scheduler.off_thread(move |s| s.handle_event(event)).await,
                    Some(None) => {
                        scheduler.stop();
                        break;
                    }
                };
                let Some((next, keep_running)) = outcome else {
                    break;
                };
                scheduler = next;
                if !keep_running {
                    break;
                }
            }
            log::info!("Scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::TaskStore;
    use crate::notify::surface::testing::RecordingSurface;
    use crate::notify::worker::spawn_worker;
    use crate::storage::{LEDGER_KEY, MemoryStore};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::Mutex;

    struct ManualClock(Mutex<NaiveDateTime>);

    impl ManualClock {
        fn at(now: NaiveDateTime) -> Arc<Self> {
            Arc::new(Self(Mutex::new(now)))
        }

        fn set(&self, now: NaiveDateTime) {
            *self.0.lock().unwrap() = now;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> NaiveDateTime {
            *self.0.lock().unwrap()
        }
    }

    const TODAY: (i32, u32, u32) = (2026, 3, 10);

    fn day(offset: i64) -> NaiveDate {
        let (y, m, d) = TODAY;
        NaiveDate::from_ymd_opt(y, m, d).unwrap() + chrono::Duration::days(offset)
    }

    fn at(offset: i64, h: u32, min: u32) -> NaiveDateTime {
        day(offset).and_hms_opt(h, min, 0).unwrap()
    }

    fn slots() -> Vec<NaiveTime> {
        SchedulerSettings::default().slots
    }

    struct Fixture {
        storage: Arc<MemoryStore>,
        store: Arc<TaskStore>,
        surface: Arc<RecordingSurface>,
        clock: Arc<ManualClock>,
        scheduler: VerificationScheduler,
    }

    fn fixture(now: NaiveDateTime) -> Fixture {
        fixture_with(now, RecordingSurface::granted())
    }

    fn fixture_with(now: NaiveDateTime, surface: RecordingSurface) -> Fixture {
        let storage = Arc::new(MemoryStore::new());
        let store = Arc::new(TaskStore::load(storage.clone()));
        let surface = Arc::new(surface);
        let clock = ManualClock::at(now);
        let scheduler = VerificationScheduler::new(
            store.clone(),
            storage.clone(),
            Dispatcher::new(surface.clone()),
            SchedulerSettings::default(),
        )
        .with_clock(clock.clone());
        Fixture {
            storage,
            store,
            surface,
            clock,
            scheduler,
        }
    }

    fn add(store: &TaskStore, title: &str, due: NaiveDate) -> uuid::Uuid {
        store
            .add(title, "desc", &due.format("%Y-%m-%d").to_string())
            .unwrap()
            .id
    }

    #[test]
    fn wake_time_picks_next_slot() {
        let s = slots();
        assert_eq!(next_wake_time(at(0, 6, 30), &s), at(0, 8, 0));
        assert_eq!(next_wake_time(at(0, 8, 0), &s), at(0, 12, 0));
        assert_eq!(next_wake_time(at(0, 11, 59), &s), at(0, 12, 0));
        assert_eq!(next_wake_time(at(0, 12, 0), &s), at(0, 17, 0));
        assert_eq!(next_wake_time(at(0, 17, 0), &s), at(1, 8, 0));
        assert_eq!(next_wake_time(at(0, 23, 59), &s), at(1, 8, 0));
        assert_eq!(next_wake_time(at(0, 0, 0), &s), at(0, 8, 0));
    }

    #[test]
    fn wake_time_is_strictly_after_now_for_every_minute() {
        let s = slots();
        let mut now = at(0, 0, 0);
        let end = at(1, 0, 0);
        while now < end {
            let wake = next_wake_time(now, &s);
            assert!(wake > now);
            let candidates = [at(0, 8, 0), at(0, 12, 0), at(0, 17, 0), at(1, 8, 0)];
            let expected = candidates.into_iter().filter(|c| *c > now).min().unwrap();
            assert_eq!(wake, expected);
            now += chrono::Duration::minutes(1);
        }
    }

    #[test]
    fn wake_time_handles_unsorted_slots_and_year_end() {
        let s = vec![
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        ];
        let eve = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap().and_hms_opt(18, 0, 0).unwrap();
        assert_eq!(
            next_wake_time(eve, &s),
            NaiveDate::from_ymd_opt(2027, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap()
        );
    }

    #[test]
    fn start_and_fire_keep_exactly_one_wake_time() {
        let mut f = fixture(at(0, 9, 30));
        assert_eq!(f.scheduler.state(), SchedulerState::Idle);

        f.scheduler.start();
        assert_eq!(f.scheduler.state(), SchedulerState::Armed { wake_at: at(0, 12, 0) });

        f.clock.set(at(0, 12, 0));
        f.scheduler.fire();
        assert_eq!(f.scheduler.state(), SchedulerState::Armed { wake_at: at(0, 17, 0) });

        f.clock.set(at(0, 17, 0));
        f.scheduler.fire();
        assert_eq!(f.scheduler.state(), SchedulerState::Armed { wake_at: at(1, 8, 0) });

        f.scheduler.stop();
        assert_eq!(f.scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn late_fire_skips_missed_slots() {
        let mut f = fixture(at(0, 7, 0));
        f.scheduler.start();
        // Machine slept through 08:00 and 12:00.
        f.clock.set(at(0, 13, 5));
        f.scheduler.fire();
        assert_eq!(f.scheduler.state(), SchedulerState::Armed { wake_at: at(0, 17, 0) });
    }

    #[test]
    fn today_task_notifies_once() {
        let mut f = fixture(at(0, 8, 0));
        add(&f.store, "Math", day(0));

        let first = f.scheduler.fire();
        assert_eq!(first.dispatched, vec![Bucket::Today]);
        assert_eq!(f.surface.shown_tags(), vec!["tasks-today"]);
        assert_eq!(f.surface.shown()[0].body, "\"Math\"");

        f.clock.set(at(0, 12, 0));
        let second = f.scheduler.fire();
        assert!(second.dispatched.is_empty());
        assert_eq!(second.already_notified, vec![Bucket::Today]);
        assert_eq!(f.surface.shown().len(), 1);
    }

    #[test]
    fn overdue_is_urgent() {
        let f = fixture(at(0, 12, 0));
        add(&f.store, "Essay", day(-1));

        let report = f.scheduler.run_pass(at(0, 12, 0));
        assert_eq!(report.dispatched, vec![Bucket::Overdue]);
        let shown = f.surface.shown();
        assert!(shown[0].require_interaction);
        assert_eq!(shown[0].title, "Overdue tasks!");
    }

    #[test]
    fn empty_list_dispatches_nothing() {
        let f = fixture(at(0, 8, 0));
        let report = f.scheduler.run_pass(at(0, 8, 0));
        assert_eq!(report, PassReport::default());
        assert!(f.surface.shown().is_empty());
        assert_eq!(f.storage.get(LEDGER_KEY), None);
    }

    #[test]
    fn buckets_dispatch_in_urgency_order() {
        let f = fixture(at(0, 8, 0));
        add(&f.store, "soon", day(2));
        add(&f.store, "next", day(1));
        add(&f.store, "now", day(0));
        add(&f.store, "late", day(-3));
        add(&f.store, "far", day(10));

        let report = f.scheduler.run_pass(at(0, 8, 0));
        assert_eq!(report.dispatched, Bucket::NOTIFIABLE.to_vec());
        assert_eq!(
            f.surface.shown_tags(),
            vec!["tasks-overdue", "tasks-today", "tasks-tomorrow", "tasks-dayAfterTomorrow"]
        );
        let shown = f.surface.shown();
        assert!(!shown[2].require_interaction);
        assert!(!shown[3].require_interaction);
    }

    #[test]
    fn day_after_tomorrow_waits_for_planning_hour() {
        let f = fixture(at(0, 12, 0));
        add(&f.store, "soon", day(2));

        let noon = f.scheduler.run_pass(at(0, 12, 0));
        assert_eq!(noon.deferred, vec![Bucket::DayAfterTomorrow]);
        assert!(f.surface.shown().is_empty());

        // Next morning the same task is tomorrow's.
        let morning = f.scheduler.run_pass(at(1, 8, 0));
        assert_eq!(morning.dispatched, vec![Bucket::Tomorrow]);
    }

    #[test]
    fn day_after_tomorrow_sends_at_eight() {
        let f = fixture(at(0, 8, 0));
        add(&f.store, "soon", day(2));

        let report = f.scheduler.run_pass(at(0, 8, 0));
        assert_eq!(report.dispatched, vec![Bucket::DayAfterTomorrow]);
        assert_eq!(f.surface.shown()[0].body, "Day after tomorrow: \"soon\"");
    }

    #[test]
    fn edited_date_refires_today() {
        let f = fixture(at(0, 8, 0));
        let id = add(&f.store, "Math", day(1));

        let first = f.scheduler.run_pass(at(0, 8, 0));
        assert_eq!(first.dispatched, vec![Bucket::Tomorrow]);

        f.store.update(id, "Math", "desc", "2026-03-10").unwrap();
        let second = f.scheduler.run_pass(at(0, 12, 0));
        assert_eq!(second.dispatched, vec![Bucket::Today]);
        assert_eq!(f.surface.shown_tags(), vec!["tasks-tomorrow", "tasks-today"]);
    }

    #[test]
    fn added_task_changes_bucket_fingerprint() {
        let f = fixture(at(0, 8, 0));
        add(&f.store, "Math", day(0));
        f.scheduler.run_pass(at(0, 8, 0));
        add(&f.store, "Art", day(0));

        let report = f.scheduler.run_pass(at(0, 12, 0));
        assert_eq!(report.dispatched, vec![Bucket::Today]);
        assert_eq!(f.surface.shown()[1].body, "2 tasks for today");
    }

    #[test]
    fn permission_denied_is_a_no_op() {
        let f = fixture_with(at(0, 8, 0), RecordingSurface::with_permission(Permission::Denied));
        add(&f.store, "Math", day(0));

        let report = f.scheduler.run_pass(at(0, 8, 0));
        assert!(report.permission_denied);
        assert!(report.dispatched.is_empty());
        assert_eq!(f.storage.get(LEDGER_KEY), None);
    }

    #[test]
    fn failed_dispatch_does_not_stop_later_buckets() {
        let surface = RecordingSurface::granted();
        surface.fail_tag("tasks-overdue");
        let f = fixture_with(at(0, 8, 0), surface);
        add(&f.store, "late", day(-1));
        add(&f.store, "now", day(0));

        let report = f.scheduler.run_pass(at(0, 8, 0));
        assert_eq!(report.failed, vec![Bucket::Overdue]);
        assert_eq!(report.dispatched, vec![Bucket::Today]);

        // Not recorded, so the next pass retries it.
        f.surface.failing_tags.lock().unwrap().clear();
        let retry = f.scheduler.run_pass(at(0, 12, 0));
        assert_eq!(retry.dispatched, vec![Bucket::Overdue]);
    }

    #[test]
    fn ledger_survives_restart() {
        let f = fixture(at(0, 8, 0));
        add(&f.store, "Math", day(0));
        f.scheduler.run_pass(at(0, 8, 0));

        let restarted = VerificationScheduler::new(
            f.store.clone(),
            f.storage.clone(),
            Dispatcher::new(f.surface.clone()),
            SchedulerSettings::default(),
        );
        let report = restarted.run_pass(at(0, 9, 0));
        assert_eq!(report.already_notified, vec![Bucket::Today]);
        assert_eq!(f.surface.shown().len(), 1);
    }

    #[test]
    fn pass_from_another_process_is_not_repeated() {
        let f = fixture(at(0, 9, 0));
        let cli = VerificationScheduler::new(
            f.store.clone(),
            f.storage.clone(),
            Dispatcher::new(f.surface.clone()),
            SchedulerSettings::default(),
        )
        .with_clock(f.clock.clone());
        add(&f.store, "Math", day(0));

        assert_eq!(cli.on_visible().unwrap().dispatched, vec![Bucket::Today]);

        let report = f.scheduler.run_pass(at(0, 12, 0));
        assert_eq!(report.already_notified, vec![Bucket::Today]);
        assert_eq!(f.surface.shown().len(), 1);
    }

    #[tokio::test]
    async fn failure_in_worker_is_retried_next_pass() {
        let surface = Arc::new(RecordingSurface::granted());
        surface.fail_tag("tasks-today");
        let storage = Arc::new(MemoryStore::new());
        let store = Arc::new(TaskStore::load(storage.clone()));
        add(&store, "Math", day(0));

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (worker, worker_task) = spawn_worker(surface.clone(), events_tx);
        let scheduler = VerificationScheduler::new(
            store,
            storage,
            Dispatcher::new(surface.clone()).with_worker(worker),
            SchedulerSettings::default(),
        );

        let (scheduler, first) = scheduler
            .off_thread(|s| s.run_pass(at(0, 8, 0)))
            .await
            .unwrap();
        assert_eq!(first.failed, vec![Bucket::Today]);
        assert!(first.dispatched.is_empty());

        surface.failing_tags.lock().unwrap().clear();
        let (scheduler, retry) = scheduler
            .off_thread(|s| s.run_pass(at(0, 12, 0)))
            .await
            .unwrap();
        assert_eq!(retry.dispatched, vec![Bucket::Today]);
        assert_eq!(surface.shown_tags(), vec!["tasks-today"]);

        drop(scheduler);
        worker_task.await.unwrap();
    }

    #[test]
    fn catch_up_respects_threshold() {
        let mut f = fixture(at(0, 9, 0));
        add(&f.store, "Math", day(1));
        f.scheduler.start();
        let armed = f.scheduler.state();

        let first = f.scheduler.on_visible().unwrap();
        assert_eq!(first.dispatched, vec![Bucket::Tomorrow]);
        assert_eq!(f.scheduler.last_catch_up(), Some(at(0, 9, 0)));
        let stored: i64 = f.storage.get(LAST_CHECK_KEY).unwrap().parse().unwrap();
        assert_eq!(
            stored,
            at(0, 9, 0).and_local_timezone(Local).single().unwrap().timestamp_millis()
        );

        f.clock.set(at(0, 10, 30));
        assert!(f.scheduler.on_visible().is_none());

        f.clock.set(at(0, 11, 0));
        assert!(f.scheduler.on_visible().is_none());

        f.clock.set(at(0, 11, 1));
        let later = f.scheduler.on_visible().unwrap();
        assert_eq!(later.already_notified, vec![Bucket::Tomorrow]);
        assert_eq!(f.scheduler.last_catch_up(), Some(at(0, 11, 1)));

        assert_eq!(f.scheduler.state(), armed);
    }

    #[test]
    fn verify_event_leaves_timer_alone() {
        let mut f = fixture(at(0, 9, 0));
        add(&f.store, "Math", day(0));
        f.scheduler.start();
        let armed = f.scheduler.state();

        assert!(f.scheduler.handle_event(SchedulerEvent::VerifyTasks));
        assert_eq!(f.surface.shown().len(), 1);
        assert_eq!(f.scheduler.state(), armed);

        assert!(!f.scheduler.handle_event(SchedulerEvent::Shutdown));
        assert_eq!(f.scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn spawned_loop_runs_startup_pass_and_events() {
        let f = fixture(at(0, 9, 0));
        add(&f.store, "Math", day(0));
        let surface = f.surface.clone();

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = f.scheduler.spawn(rx);
        tx.send(SchedulerEvent::VerifyTasks).unwrap();
        tx.send(SchedulerEvent::Shutdown).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        // Startup pass notified; the requested pass found nothing new.
        assert_eq!(surface.shown_tags(), vec!["tasks-today"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_only_once_the_slot_is_reached() {
        let f = fixture(at(0, 9, 0));
        add(&f.store, "Math", day(0));
        let (store, surface, clock) = (f.store.clone(), f.surface.clone(), f.clock.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = f.scheduler.spawn(rx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(surface.shown_tags(), vec!["tasks-today"]);

        // Armed for 12:00. Waking at the sleep cap while it is still 09:00 must not fire.
        add(&store, "Art", day(1));
        tokio::time::sleep(MAX_SLEEP + Duration::from_secs(60)).await;
        assert_eq!(surface.shown().len(), 1);

        clock.set(at(0, 12, 0));
        tokio::time::sleep(MAX_SLEEP).await;
        assert_eq!(surface.shown_tags(), vec!["tasks-today", "tasks-tomorrow"]);

        // Re-armed for 17:00, so 13:00 passes quietly.
        add(&store, "Music", day(0));
        clock.set(at(0, 13, 0));
        tokio::time::sleep(MAX_SLEEP).await;
        assert_eq!(surface.shown().len(), 2);

        clock.set(at(0, 17, 0));
        tokio::time::sleep(MAX_SLEEP).await;
        let shown = surface.shown();
        assert_eq!(shown.len(), 3);
        assert_eq!(shown[2].body, "2 tasks for today");

        tx.send(SchedulerEvent::Shutdown).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
