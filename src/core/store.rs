use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use uuid::Uuid;

use super::task::Task;
use crate::error::{Error, Result};
use crate::storage::{KeyValueStore, TASKS_KEY};

/// Read-only view of the task list handed to the scheduler and the assistant.
pub trait TaskQuery: Send + Sync {
    fn all_tasks(&self) -> Vec<Task>;
}

/// Owns the task list and keeps it in sync with storage.
pub struct TaskStore {
    storage: Arc<dyn KeyValueStore>,
    tasks: Mutex<Vec<Task>>,
    revision: watch::Sender<u64>,
}

impl TaskStore {
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let tasks = read_tasks(storage.as_ref()).unwrap_or_default();
        log::debug!("Loaded {} tasks", tasks.len());
        let (revision, _) = watch::channel(0);
        Self {
            storage,
            tasks: Mutex::new(tasks),
            revision,
        }
    }

    /// Revision counter, bumped whenever the list changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.all_tasks().into_iter().find(|t| t.id == id)
    }

    pub fn add(&self, title: &str, description: &str, due_date: &str) -> Result<Task> {
        let task = Task::from_input(title, description, due_date)?;
        self.mutate(|tasks| {
            tasks.push(task.clone());
            Ok(())
        })?;
        log::info!("Task added: {}", task.title);
        Ok(task)
    }

    pub fn update(&self, id: Uuid, title: &str, description: &str, due_date: &str) -> Result<Task> {
        let (title, description, due_date) =
            super::task::validate_input(title, description, due_date)?;
        let updated = self.mutate(|tasks| {
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or(Error::TaskNotFound(id))?;
            task.title = title;
            task.description = description;
            task.due_date = due_date;
            Ok(task.clone())
        })?;
        log::info!("Task edited: {}", updated.title);
        Ok(updated)
    }

    pub fn remove(&self, id: Uuid) -> Result<Task> {
        let removed = self.mutate(|tasks| {
            let index = tasks
                .iter()
                .position(|t| t.id == id)
                .ok_or(Error::TaskNotFound(id))?;
            Ok(tasks.remove(index))
        })?;
        log::info!("Task deleted: {}", removed.title);
        Ok(removed)
    }

    /// Find a task by full id or unique id prefix, as typed on the command line.
    pub fn resolve(&self, id_or_prefix: &str) -> Result<Task> {
        let needle = id_or_prefix.trim().to_lowercase();
        let tasks = self.all_tasks();
        let matches: Vec<&Task> = tasks
            .iter()
            .filter(|t| !needle.is_empty() && t.id.to_string().starts_with(&needle))
            .collect();
        match matches.as_slice() {
            [task] => Ok((*task).clone()),
            [] => Err(Error::InvalidTask(format!("no task matches '{}'", id_or_prefix))),
            _ => Err(Error::InvalidTask(format!(
                "'{}' matches {} tasks, use a longer id",
                id_or_prefix,
                matches.len()
            ))),
        }
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Vec<Task>) -> Result<T>) -> Result<T> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        self.refresh_locked(&mut tasks);
        let out = f(&mut tasks)?;
        self.persist(&tasks);
        self.revision.send_modify(|r| *r += 1);
        Ok(out)
    }

    fn persist(&self, tasks: &[Task]) {
        match serde_json::to_string(tasks) {
            Ok(json) => {
                if let Err(e) = self.storage.set(TASKS_KEY, &json) {
                    log::error!("Failed to save tasks, keeping them in memory: {}", e);
                } else {
                    log::debug!("Tasks saved: {}", tasks.len());
                }
            }
            Err(e) => log::error!("Failed to serialize tasks: {}", e),
        }
    }

    /// Pick up changes written by another process.
    fn refresh_locked(&self, tasks: &mut Vec<Task>) {
        let Some(stored) = read_tasks(self.storage.as_ref()) else {
            return;
        };
        if *tasks != stored {
            *tasks = stored;
            self.revision.send_modify(|r| *r += 1);
        }
    }
}

impl TaskQuery for TaskStore {
    fn all_tasks(&self) -> Vec<Task> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
        self.refresh_locked(&mut tasks);
        tasks.clone()
    }
}

/// `None` when the stored list is unreadable; a missing key is an empty list.
/// Records without an id get one here, written back at once so every
/// later read sees the same ids.
fn read_tasks(storage: &dyn KeyValueStore) -> Option<Vec<Task>> {
    let Some(json) = storage.get(TASKS_KEY) else {
        return Some(Vec::new());
    };
    let mut tasks = match serde_json::from_str::<Vec<Task>>(&json) {
        Ok(tasks) => tasks,
        Err(e) => {
            log::error!("Error loading tasks: {}", e);
            return None;
        }
    };

    let mut assigned = 0;
    for task in tasks.iter_mut().filter(|t| t.id.is_nil()) {
        task.id = Uuid::new_v4();
        assigned += 1;
    }
    if assigned > 0 {
        log::info!("Assigned ids to {} stored tasks", assigned);
        match serde_json::to_string(&tasks) {
            Ok(json) => {
                if let Err(e) = storage.set(TASKS_KEY, &json) {
                    log::error!("Failed to save assigned task ids: {}", e);
                }
            }
            Err(e) => log::error!("Failed to serialize tasks: {}", e),
        }
    }
    Some(tasks)
}
