// --------------------------------------------------
// Handles API endpoints related to reminder CRUD operations
// and global settings management.
//
// Responsibilities:
// - Create / read / update / delete reminders
// - Enable / disable reminders
// - Get / update app settings
//
// Every mutation saves the store snapshot and signals the
// scheduler to rebuild its heap.
// -------------------------------------------------

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::AppState;
use crate::models::{Reminder, Rule, Settings};
use crate::rules;

#[derive(Debug, Deserialize)]
pub struct ReminderInput {
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(flatten)]
    pub rule: Rule,
    #[serde(default = "default_use_sound")]
    pub use_sound: bool,
}

fn default_use_sound() -> bool {
    true
}

// Reject rule shapes the store and scheduler assume never exist
fn validate_rule(rule: &Rule) -> Result<(), &'static str> {
    match rule {
        Rule::Delay { delay_minutes } if *delay_minutes <= 0 => {
            Err("delay_minutes must be positive")
        }
        Rule::Cron { cron_expr } if !rules::cron_is_valid(cron_expr) => {
            Err("invalid cron expression (example: */5 * * * *)")
        }
        _ => Ok(()),
    }
}

fn save_and_rebuild(state: &AppState) -> Result<(), ()> {
    if let Err(e) = state.store.save() {
        error!("failed to save store: {e}");
        return Err(());
    }
    state.scheduler.rebuild();
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct RemindersResponse {
    pub now: String,
    pub reminders: Vec<Reminder>,
}

// -----------------------------
// GET /api/reminders
// Returns all reminders, newest-updated first
// -----------------------------
pub async fn list_reminders(State(state): State<AppState>) -> impl IntoResponse {
    let mut reminders = state.store.all();
    reminders.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Json(RemindersResponse {
        now: Utc::now().to_rfc3339(),
        reminders,
    })
}

// -----------------------------
// POST /api/reminders
// Creates a new reminder with its first occurrence precomputed
// -----------------------------
pub async fn create_reminder(
    State(state): State<AppState>,
    Json(input): Json<ReminderInput>,
) -> impl IntoResponse {
    if input.title.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "title required").into_response();
    }
    if let Err(msg) = validate_rule(&input.rule) {
        return (StatusCode::BAD_REQUEST, msg).into_response();
    }

    let mut reminder = Reminder::new(input.title, input.message, input.rule, input.use_sound);
    reminder.next_run_at = rules::compute_next_run(&reminder, Utc::now());

    state.store.upsert(reminder.clone());
    if save_and_rebuild(&state).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to save store").into_response();
    }

    Json(reminder).into_response()
}

// -----------------------------
// PUT /api/reminders/:id
// Replaces a reminder's user-editable fields. Editing re-arms it:
// enabled is forced on and the last-trigger marker is cleared, so a
// consumed one-shot can be pointed at a new time and fire again.
// -----------------------------
pub async fn update_reminder(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(input): Json<ReminderInput>,
) -> impl IntoResponse {
    let id = match Uuid::parse_str(&id) {
        Ok(u) => u,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid id").into_response(),
    };

    if input.title.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "title required").into_response();
    }
    if let Err(msg) = validate_rule(&input.rule) {
        return (StatusCode::BAD_REQUEST, msg).into_response();
    }

    let now = Utc::now();
    let updated = state.store.with_reminder_mut(id, |r| {
        r.title = input.title;
        r.message = input.message;
        r.rule = input.rule;
        r.use_sound = input.use_sound;
        r.enabled = true;
        r.last_triggered_at = None;
        r.updated_at = now;
        r.next_run_at = rules::compute_next_run(r, now);
        r.clone()
    });

    let Some(updated) = updated else {
        return (StatusCode::NOT_FOUND, "reminder not found").into_response();
    };

    if save_and_rebuild(&state).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to save store").into_response();
    }

    Json(updated).into_response()
}

// -----------------------------
// DELETE /api/reminders/:id
// Removes a reminder permanently
// -----------------------------
pub async fn delete_reminder(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let id = match Uuid::parse_str(&id) {
        Ok(u) => u,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid id").into_response(),
    };

    if !state.store.remove(id) {
        return (StatusCode::NOT_FOUND, "reminder not found").into_response();
    }

    if save_and_rebuild(&state).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to save store").into_response();
    }

    Json(serde_json::json!({ "ok": true })).into_response()
}

// -----------------------------
// POST /api/reminders/:id/enable
// Re-enables a reminder and recomputes its next occurrence
// -----------------------------
pub async fn enable_reminder(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    set_enabled(id, state, true).await
}

// -----------------------------
// POST /api/reminders/:id/disable
// Disables a reminder; the next rebuild drops it from the heap
// -----------------------------
pub async fn disable_reminder(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    set_enabled(id, state, false).await
}

async fn set_enabled(id: String, state: AppState, enabled: bool) -> axum::response::Response {
    let id = match Uuid::parse_str(&id) {
        Ok(u) => u,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid id").into_response(),
    };

    let now = Utc::now();
    let updated = state.store.with_reminder_mut(id, |r| {
        r.enabled = enabled;
        r.next_run_at = if enabled {
            rules::compute_next_run(r, now)
        } else {
            None
        };
        r.updated_at = now;
        r.clone()
    });

    let Some(updated) = updated else {
        return (StatusCode::NOT_FOUND, "reminder not found").into_response();
    };

    if save_and_rebuild(&state).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to save store").into_response();
    }

    Json(updated).into_response()
}

// -----------------------------
// GET /api/settings
// Returns the app settings sidecar
// -----------------------------
pub async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.settings())
}

// -----------------------------
// PUT /api/settings
// Updates app settings. Settings never affect scheduling,
// so no rebuild is signaled.
// -----------------------------
pub async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> impl IntoResponse {
    state.store.set_settings(settings.clone());
    if let Err(e) = state.store.save() {
        error!("failed to save store: {e}");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to save store").into_response();
    }
    Json(settings).into_response()
}
