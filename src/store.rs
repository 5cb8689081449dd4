use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::{fs, io};

use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Reminder, Settings};

// Where the snapshots live. Passed in at construction instead of living in
// module-level constants so tests and hosts can point the store anywhere.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub data_dir: PathBuf,
}

impl StorePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        StorePaths { data_dir: data_dir.into() }
    }

    fn reminders_file(&self) -> PathBuf {
        self.data_dir.join("reminders.json")
    }

    fn settings_file(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

struct Inner {
    reminders: HashMap<Uuid, Reminder>,
    settings: Settings,
}

// In-memory reminder set with snapshot persistence. Every save serializes
// the whole set and atomically replaces the durable copy, so a partial
// file is never observable. In-memory state is authoritative; a failed
// save leaves the previous snapshot intact.
pub struct ReminderStore {
    paths: StorePaths,
    inner: Mutex<Inner>,
}

impl ReminderStore {
    // Load from disk, tolerating a missing or corrupt snapshot by starting
    // empty. Never fails: on startup the worst case is a fresh store.
    pub fn open(paths: StorePaths) -> Self {
        let reminders = match fs::read_to_string(paths.reminders_file()) {
            Ok(text) => match serde_json::from_str::<Vec<Reminder>>(&text) {
                Ok(list) => list.into_iter().map(|r| (r.id, r)).collect(),
                Err(e) => {
                    warn!("corrupt reminders snapshot, starting empty: {e}");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("failed to read reminders snapshot, starting empty: {e}");
                HashMap::new()
            }
        };
        let settings = match fs::read_to_string(paths.settings_file()) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("corrupt settings, using defaults: {e}");
                Settings::default()
            }),
            Err(_) => Settings::default(),
        };
        info!("loaded {} reminder(s) from {:?}", reminders.len(), paths.data_dir);
        ReminderStore {
            paths,
            inner: Mutex::new(Inner { reminders, settings }),
        }
    }

    // Atomically persist both snapshots. The clone happens under the lock,
    // the file I/O does not, so two concurrent saves can land on disk out
    // of order; in-memory state stays authoritative and the next save
    // re-syncs the file.
    pub fn save(&self) -> Result<(), StoreError> {
        let (list, settings) = {
            let inner = self.inner.lock().unwrap();
            let mut list: Vec<Reminder> = inner.reminders.values().cloned().collect();
            list.sort_by_key(|r| r.created_at); // stable file order across saves
            (list, inner.settings.clone())
        };
        write_atomic(&self.paths.reminders_file(), &serde_json::to_string_pretty(&list)?)?;
        write_atomic(&self.paths.settings_file(), &serde_json::to_string_pretty(&settings)?)?;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<Reminder> {
        self.inner.lock().unwrap().reminders.get(&id).cloned()
    }

    pub fn upsert(&self, reminder: Reminder) {
        self.inner.lock().unwrap().reminders.insert(reminder.id, reminder);
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.inner.lock().unwrap().reminders.remove(&id).is_some()
    }

    pub fn all(&self) -> Vec<Reminder> {
        self.inner.lock().unwrap().reminders.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.inner.lock().unwrap().reminders.keys().copied().collect()
    }

    // Per-reminder read-modify-write under the store lock. Both the route
    // handlers and the scheduler loop funnel their mutations through here,
    // which is the whole locking discipline: one mutex, per-reminder
    // atomicity, no transaction ever spans two reminders.
    pub fn with_reminder_mut<R>(&self, id: Uuid, f: impl FnOnce(&mut Reminder) -> R) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        inner.reminders.get_mut(&id).map(f)
    }

    pub fn settings(&self) -> Settings {
        self.inner.lock().unwrap().settings.clone()
    }

    pub fn set_settings(&self, settings: Settings) {
        self.inner.lock().unwrap().settings = settings;
    }
}

// Write to a temporary file in the same directory, then rename over the
// target. Rename is atomic on the same filesystem.
fn write_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::models::Rule;

    fn temp_store() -> (tempfile::TempDir, ReminderStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ReminderStore::open(StorePaths::new(dir.path()));
        (dir, store)
    }

    #[test]
    fn missing_files_start_empty() {
        let (_dir, store) = temp_store();
        assert!(store.all().is_empty());
        assert!(store.settings().sound_enabled);
    }

    #[test]
    fn save_then_open_round_trips() {
        let (dir, store) = temp_store();
        let mut r = Reminder::new(
            "water the plants".to_string(),
            "kitchen window".to_string(),
            Rule::Cron { cron_expr: "0 9 * * *".to_string() },
            true,
        );
        r.next_run_at = Some(Utc::now() + Duration::hours(1));
        r.last_triggered_at = Some(Utc::now() - Duration::days(1));
        store.upsert(r.clone());
        store.upsert(Reminder::new(
            "stand up".to_string(),
            String::new(),
            Rule::Delay { delay_minutes: 45 },
            false,
        ));
        let mut settings = store.settings();
        settings.sound_file = Some("/tmp/ding.wav".to_string());
        store.set_settings(settings);
        store.save().unwrap();

        let reopened = ReminderStore::open(StorePaths::new(dir.path()));
        assert_eq!(reopened.all().len(), 2);
        let loaded = reopened.get(r.id).unwrap();
        assert_eq!(loaded.title, r.title);
        assert_eq!(loaded.rule, r.rule);
        assert_eq!(loaded.next_run_at, r.next_run_at);
        assert_eq!(loaded.last_triggered_at, r.last_triggered_at);
        assert_eq!(reopened.settings().sound_file.as_deref(), Some("/tmp/ding.wav"));
    }

    #[test]
    fn empty_store_round_trips() {
        let (dir, store) = temp_store();
        store.save().unwrap();
        let reopened = ReminderStore::open(StorePaths::new(dir.path()));
        assert!(reopened.all().is_empty());
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::new(dir.path());
        fs::create_dir_all(&paths.data_dir).unwrap();
        fs::write(paths.reminders_file(), "{ not json").unwrap();
        fs::write(paths.settings_file(), "[]").unwrap();
        let store = ReminderStore::open(paths);
        assert!(store.all().is_empty());
        assert_eq!(store.settings().default_snooze_minutes, 5);
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let (dir, store) = temp_store();
        store.upsert(Reminder::new(
            "x".to_string(),
            String::new(),
            Rule::Delay { delay_minutes: 1 },
            true,
        ));
        store.save().unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[test]
    fn remove_reports_presence() {
        let (_dir, store) = temp_store();
        let r = Reminder::new("x".to_string(), String::new(), Rule::Delay { delay_minutes: 1 }, true);
        let id = r.id;
        store.upsert(r);
        assert!(store.remove(id));
        assert!(!store.remove(id));
        assert!(store.get(id).is_none());
    }
}
