use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Scheduling rule for a reminder. Exactly one variant is active, so the
// "clear the other kind's fields on kind change" bookkeeping never exists.
// Serialized with a `kind` tag so the on-disk records read
// {"kind":"delay","delay_minutes":10,...} and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    // One-shot, fires delay_minutes after creation
    Delay { delay_minutes: i64 },
    // One-shot, fires at an absolute UTC instant
    Datetime { run_at: DateTime<Utc> },
    // Repeating, five-field cron expression evaluated in local time
    Cron { cron_expr: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(flatten)]
    pub rule: Rule,
    pub enabled: bool,
    pub use_sound: bool, // presentation hint, never read by the engine
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>, // display cache; authoritative only for Delay
}

impl Reminder {
    pub fn new(title: String, message: String, rule: Rule, use_sound: bool) -> Self {
        let now = Utc::now();
        Reminder {
            id: Uuid::new_v4(),
            title,
            message,
            rule,
            enabled: true,
            use_sound,
            created_at: now,
            updated_at: now,
            last_triggered_at: None,
            next_run_at: None,
        }
    }
}

// Global app settings persisted next to the reminders. The scheduler never
// looks at these; they ride along for whatever front end hosts the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sound_enabled: bool,
    pub sound_file: Option<String>, // WAV/MP3 path
    pub system_notification_enabled: bool,
    pub close_to_tray: bool,
    pub default_snooze_minutes: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sound_enabled: true,
            sound_file: None,
            system_notification_enabled: true,
            close_to_tray: true,
            default_snooze_minutes: 5,
        }
    }
}
