use std::sync::Arc;

use chrono::Timelike;

use agenda::core::store::TaskQuery;

/// Dry run of a verification pass: shows what the scheduler would send
/// right now without sending anything or touching the ledger.
fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(agenda::config::AgendaConfig::default_path);
    let config = agenda::config::AgendaConfig::load(&config_path);

    println!("=== Agenda Notification Check ===\n");
    println!("Config:  {}", config_path.display());
    println!("Storage: {}", config.storage_path().display());

    if let Err(e) = config.validate() {
        println!("  Config problem: {}", e);
    }

    let storage: Arc<dyn agenda::storage::KeyValueStore> =
        Arc::new(agenda::storage::FileStore::open(config.storage_path()));
    let store = Arc::new(agenda::core::store::TaskStore::load(storage.clone()));
    let scheduler = agenda::notify::VerificationScheduler::new(
        store.clone(),
        storage,
        agenda::notify::Dispatcher::new(Arc::new(agenda::notify::DesktopSurface::new(
            config.notifications_enabled,
        ))),
        agenda::notify::SchedulerSettings::from(&config),
    );
    let ledger = scheduler.ledger();
    let tasks = store.all_tasks();

    let now = chrono::Local::now().naive_local();
    let buckets = agenda::core::temporal::DueBuckets::build(&tasks, now.date());
    println!("Now:     {}", now.format("%Y-%m-%d %H:%M"));
    println!("Tasks:   {} total, {} near-term\n", tasks.len(), buckets.total_count());

    let permission = scheduler.dispatcher().permission();
    println!("--- Permission: {:?} ---", permission);
    match permission {
        agenda::notify::Permission::Granted => {}
        agenda::notify::Permission::Denied => {
            println!("  Disabled in config (`agenda notifications on`)")
        }
        agenda::notify::Permission::Unsupported => println!("  No notification server reachable"),
    }

    println!("\n--- Buckets ---");
    for bucket in agenda::core::temporal::Bucket::NOTIFIABLE {
        let set = buckets.get(bucket);
        println!("\n  {} ({})", bucket.label(), set.len());
        if set.is_empty() {
            continue;
        }
        for task in set {
            println!("    {} - {}", task.due_date_string(), task.title);
        }

        let fingerprint = agenda::notify::ledger::fingerprint(set);
        let status = if ledger.already_notified(bucket, set) {
            "already notified".to_string()
        } else if bucket == agenda::core::temporal::Bucket::DayAfterTomorrow
            && now.hour() != config.planning_hour
        {
            format!("waiting for {}:00", config.planning_hour)
        } else {
            "would notify".to_string()
        };
        println!("    fingerprint: {}", fingerprint);
        println!("    stored:      {}", ledger.stored(bucket).unwrap_or_else(|| "(none)".into()));
        println!("    status:      {}", status);

        let (title, body) = agenda::notify::dispatch::bucket_message(bucket, set);
        println!("    message:     {} / {}", title, body);
    }

    println!("\n--- Schedule ---");
    let slots: Vec<String> = config
        .check_slots
        .iter()
        .map(|s| s.format("%H:%M").to_string())
        .collect();
    println!("  Slots:      {}", slots.join(", "));
    println!(
        "  Next wake:  {}",
        agenda::notify::scheduler::next_wake_time(now, &config.check_slots).format("%Y-%m-%d %H:%M")
    );
    match scheduler.last_catch_up() {
        Some(last) => println!("  Last catch-up: {}", last.format("%Y-%m-%d %H:%M")),
        None => println!("  Last catch-up: never"),
    }

    println!("\n=== Done ===");
}
