// --------------------------------------------------
// Cron preview endpoint.
//
// Lets a front end validate an expression and show the user its
// next occurrences before saving, without touching the store or
// the scheduler heap. Times are local wall clock, matching how
// cron rules are evaluated.
// -------------------------------------------------

use axum::{Json, extract::Query, http::StatusCode, response::IntoResponse};
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::rules;

const DEFAULT_COUNT: usize = 10;
const MAX_COUNT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub expr: String,
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub expr: String,
    pub now: String,
    pub next: Vec<String>,
}

// -----------------------------
// GET /api/cron/preview?expr=*/5 * * * *&count=10
// Returns the next N local-time occurrences of a cron expression
// -----------------------------
pub async fn get_cron_preview(Query(q): Query<PreviewQuery>) -> impl IntoResponse {
    let count = q.count.unwrap_or(DEFAULT_COUNT).min(MAX_COUNT);
    let base = Local::now();

    let Some(runs) = rules::cron_preview(&q.expr, base, count) else {
        return (StatusCode::BAD_REQUEST, "invalid cron expression").into_response();
    };

    Json(PreviewResponse {
        expr: q.expr,
        now: base.to_rfc3339(),
        next: runs
            .iter()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .collect(),
    })
    .into_response()
}
