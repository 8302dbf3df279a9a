use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;

use agenda::assistant;
use agenda::config::AgendaConfig;
use agenda::core::store::{TaskQuery, TaskStore};
use agenda::core::task::Task;
use agenda::core::temporal::{Bucket, DueBuckets, classify};
use agenda::notify::worker::{WorkerHandle, WorkerMessage, spawn_worker};
use agenda::notify::{
    DesktopSurface, Dispatcher, Notification, NotificationSurface, Permission, SchedulerEvent,
    SchedulerSettings, VerificationScheduler,
};
use agenda::storage::{FileStore, KeyValueStore, MemoryStore};
use agenda::{Error, Result};

#[derive(Parser)]
#[command(name = "agenda", version, about = "Personal task tracker with due-date reminders")]
struct Cli {
    /// Path to the config file.
    #[arg(long, env = "AGENDA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a task.
    Add {
        title: String,
        description: String,
        /// Due date, YYYY-MM-DD.
        due: String,
    },
    /// Edit a task by id (or unique id prefix).
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
    },
    /// Delete a task by id (or unique id prefix).
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
    /// List tasks by due-date proximity and run a catch-up check.
    List,
    /// Ask the assistant about your tasks.
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Run the notification scheduler in the foreground.
    Daemon,
    /// Run one verification pass now.
    Check,
    /// Show a test notification.
    NotifyTest,
    /// Turn notifications on or off.
    Notifications { state: Toggle },
    /// Manage the assistant API key.
    ApiKey {
        #[command(subcommand)]
        action: ApiKeyAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
enum ApiKeyAction {
    /// Validate and store a key in the system keyring.
    Set { key: String },
    /// Check the stored key against the API.
    Test,
    /// Remove the stored key.
    Delete,
}

fn init_logging(config: &AgendaConfig) {
    use log::Log;

    // Logs go to the systemd user journal (`journalctl --user -t agenda -f`).
    // Wrapper filters: agenda targets at info/debug (per config), everything else at warn.
    struct FilteredJournal {
        inner: systemd_journal_logger::JournalLog,
    }

    impl log::Log for FilteredJournal {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            if metadata.target().starts_with("agenda") {
                let max = if agenda::debug_logging() {
                    log::LevelFilter::Debug
                } else {
                    log::LevelFilter::Info
                };
                metadata.level() <= max
            } else {
                metadata.level() <= log::LevelFilter::Warn
            }
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.inner.log(record);
            }
        }
        fn flush(&self) {
            self.inner.flush();
        }
    }

    agenda::set_debug_logging(config.debug_logging);

    let journal = match systemd_journal_logger::JournalLog::new() {
        Ok(j) => j.with_syslog_identifier("agenda".to_string()),
        Err(e) => {
            eprintln!("agenda: journal unavailable, logging disabled ({})", e);
            return;
        }
    };
    if log::set_boxed_logger(Box::new(FilteredJournal { inner: journal })).is_ok() {
        // Global max must be Debug so agenda debug logs can pass through when toggled
        log::set_max_level(log::LevelFilter::Debug);
    }
}

fn open_storage(config: &AgendaConfig) -> Arc<dyn KeyValueStore> {
    match config.ensure_data_dir() {
        Ok(()) => Arc::new(FileStore::open(config.storage_path())),
        Err(e) => {
            log::error!(
                "Failed to create data directory {}: {}",
                config.data_directory.display(),
                e
            );
            eprintln!("Warning: changes will not be saved this session ({})", e);
            Arc::new(MemoryStore::new())
        }
    }
}

fn print_permission_help() {
    eprintln!("Notifications are off. To get task reminders:");
    eprintln!("  1. Run `agenda notifications on`");
    eprintln!("  2. Make sure a desktop notification service is running");
    eprintln!("  3. Restart `agenda daemon`");
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

fn print_task(task: &Task, bucket: Bucket) {
    let id = task.id.to_string();
    println!("[{}] {}  ({})", bucket.label(), task.title, &id[..8]);
    println!("    {}", task.description);
    println!("    due {}", task.due_date_string());
}

/// Near-term summary shown after listing and adding tasks.
fn print_reminders(tasks: &[Task]) {
    let buckets = DueBuckets::build(tasks, today());
    let sections = [
        (Bucket::Overdue, "Oops! Some tasks slipped past their date..."),
        (Bucket::Today, "You have tasks for TODAY, let's get to it!"),
        (Bucket::Tomorrow, "Heads up! You have tasks for tomorrow"),
    ];
    for (bucket, heading) in sections {
        let set = buckets.get(bucket);
        if set.is_empty() {
            continue;
        }
        println!();
        println!("{}", heading);
        for task in set {
            println!("  * {} - {}", task.title, task.description);
        }
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn foreground_scheduler(
    config: &AgendaConfig,
    store: Arc<TaskStore>,
    storage: Arc<dyn KeyValueStore>,
) -> VerificationScheduler {
    let surface = Arc::new(DesktopSurface::new(config.notifications_enabled));
    VerificationScheduler::new(
        store,
        storage,
        Dispatcher::new(surface),
        SchedulerSettings::from(config),
    )
}

async fn run_daemon(config: &AgendaConfig, storage: Arc<dyn KeyValueStore>) -> Result<()> {
    let store = Arc::new(TaskStore::load(storage.clone()));
    let surface: Arc<dyn NotificationSurface> =
        Arc::new(DesktopSurface::new(config.notifications_enabled));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (worker, worker_task) = spawn_worker(surface.clone(), events_tx.clone());
    let permission = {
        let surface = surface.clone();
        tokio::task::spawn_blocking(move || surface.request_permission())
            .await
            .unwrap_or(Permission::Unsupported)
    };
    match permission {
        Permission::Granted => {
            let welcome = WorkerMessage::ShowNotification {
                notification: Notification::welcome(&config.user_name),
                ack: None,
            };
            if worker.post(welcome).is_err() {
                log::warn!("Background worker is not running, no welcome notification");
            }
        }
        Permission::Denied | Permission::Unsupported => print_permission_help(),
    }

    let dispatcher = Dispatcher::new(surface).with_worker(worker.clone());
    let scheduler = VerificationScheduler::new(
        store,
        storage,
        dispatcher,
        SchedulerSettings::from(config),
    );
    let scheduler_task = scheduler.spawn(events_rx);
    log::info!("Daemon started");

    wait_for_signals(&events_tx, &worker).await;

    let _ = events_tx.send(SchedulerEvent::Shutdown);
    if let Err(e) = scheduler_task.await {
        log::error!("Scheduler task failed: {}", e);
    }
    drop(worker);
    if let Err(e) = worker_task.await {
        log::error!("Worker task failed: {}", e);
    }
    log::info!("Daemon stopped");
    Ok(())
}

/// SIGUSR1 asks for a catch-up check, SIGUSR2 for a verification pass
/// through the worker; Ctrl-C and SIGTERM stop the daemon.
#[cfg(unix)]
async fn wait_for_signals(events: &mpsc::UnboundedSender<SchedulerEvent>, worker: &WorkerHandle) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut term, mut usr1, mut usr2) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::user_defined1()),
        signal(SignalKind::user_defined2()),
    ) {
        (Ok(term), Ok(usr1), Ok(usr2)) => (term, usr1, usr2),
        _ => {
            log::warn!("Signal handlers unavailable, stopping on Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = term.recv() => break,
            _ = usr1.recv() => {
                let _ = events.send(SchedulerEvent::Visible);
            }
            _ = usr2.recv() => {
                if worker.post(WorkerMessage::VerifyTasks).is_err() {
                    log::warn!("Background worker is not running");
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_events: &mpsc::UnboundedSender<SchedulerEvent>, _worker: &WorkerHandle) {
    let _ = tokio::signal::ctrl_c().await;
}

async fn run(cli: Cli, config: AgendaConfig, config_path: PathBuf) -> Result<()> {
    let storage = open_storage(&config);

    match cli.command {
        Command::Add {
            title,
            description,
            due,
        } => {
            let store = TaskStore::load(storage);
            let task = store.add(&title, &description, &due)?;
            println!("Added \"{}\" ({})", task.title, task.id);
            print_reminders(&store.all_tasks());
        }
        Command::Edit {
            id,
            title,
            description,
            due,
        } => {
            let store = TaskStore::load(storage);
            let task = store.resolve(&id)?;
            let due = due.unwrap_or_else(|| task.due_date_string());
            let edited = store.update(
                task.id,
                title.as_deref().unwrap_or(&task.title),
                description.as_deref().unwrap_or(&task.description),
                &due,
            )?;
            println!("Edited \"{}\"", edited.title);
        }
        Command::Delete { id, yes } => {
            let store = TaskStore::load(storage);
            let task = store.resolve(&id)?;
            if !yes && !confirm(&format!("Delete \"{}\"?", task.title))? {
                println!("Kept \"{}\"", task.title);
                return Ok(());
            }
            store.remove(task.id)?;
            println!("Deleted \"{}\"", task.title);
        }
        Command::List => {
            let store = Arc::new(TaskStore::load(storage.clone()));
            let tasks = store.all_tasks();
            if tasks.is_empty() {
                println!("No tasks yet. Add one with `agenda add`.");
            }
            let today = today();
            for task in &tasks {
                print_task(task, classify(today, task.due_date));
            }
            print_reminders(&tasks);

            let scheduler = foreground_scheduler(&config, store, storage);
            if let Some(report) = scheduler.on_visible() {
                log::debug!("Catch-up check: {:?}", report);
            }
        }
        Command::Ask { question } => {
            let question = question.join(" ");
            let Some(api_key) = assistant::load_api_key().await? else {
                eprintln!("No API key configured.");
                eprintln!("Create one at https://console.groq.com and run `agenda api-key set <key>`.");
                return Err(Error::InvalidApiKey);
            };
            let store = TaskStore::load(storage);
            println!("Looking at your tasks...");
            let answer = assistant::ask(
                &config.assistant,
                &api_key,
                &store.all_tasks(),
                &question,
                today(),
                &config.user_name,
            )
            .await?;
            println!("{}", answer);
        }
        Command::Daemon => run_daemon(&config, storage).await?,
        Command::Check => {
            let store = Arc::new(TaskStore::load(storage.clone()));
            let scheduler = foreground_scheduler(&config, store, storage);
            let report = scheduler.run_pass(chrono::Local::now().naive_local());
            if report.permission_denied {
                print_permission_help();
            } else if report.dispatched.is_empty() {
                println!("Nothing new to notify.");
            } else {
                let keys: Vec<&str> = report.dispatched.iter().map(|b| b.key()).collect();
                println!("Notified: {}", keys.join(", "));
            }
        }
        Command::NotifyTest => {
            let dispatcher = Dispatcher::new(Arc::new(DesktopSurface::new(config.notifications_enabled)));
            if dispatcher.permission() != Permission::Granted {
                print_permission_help();
                return Err(Error::PermissionDenied);
            }
            dispatcher.dispatch(
                "Test notification",
                "If you can see this, notifications work!",
                Bucket::Today,
                false,
            )?;
        }
        Command::Notifications { state } => {
            let mut config = config;
            config.notifications_enabled = matches!(state, Toggle::On);
            config.save(&config_path)?;
            println!(
                "Notifications {}",
                if config.notifications_enabled { "on" } else { "off" }
            );
        }
        Command::ApiKey { action } => match action {
            ApiKeyAction::Set { key } => {
                if !assistant::is_valid_api_key(&key) {
                    eprintln!("Invalid API key. It must start with \"gsk_\" and be longer than 20 characters.");
                    return Err(Error::InvalidApiKey);
                }
                assistant::keyring::store_api_key(&key).await?;
                println!("API key saved. You can ask questions now.");
            }
            ApiKeyAction::Test => {
                let Some(api_key) = assistant::load_api_key().await? else {
                    return Err(Error::InvalidApiKey);
                };
                if assistant::verify_connection(&config.assistant, &api_key).await? {
                    println!("API key valid");
                } else {
                    println!("Connected, but the model gave an unexpected reply");
                }
            }
            ApiKeyAction::Delete => {
                assistant::keyring::delete_api_key().await?;
                println!("API key removed");
            }
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(AgendaConfig::default_path);
    let config = AgendaConfig::load(&config_path);
    init_logging(&config);

    match run(cli, config, config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
