/*
Next-occurrence computation for reminder rules.
Module was independently written from HTTP / Axum and from the
scheduler loop so it can be tested as plain functions.
*/

use std::str::FromStr;

use chrono::{DateTime, Duration, Local, Utc};
use cron::Schedule;
use tracing::warn;

use crate::models::{Reminder, Rule};

// Compute the next occurrence of a reminder strictly from its rule and a
// base instant. Pure and deterministic given `base`; None means "no next
// occurrence" (disabled, consumed, or unusable rule).
//
// Timezone contract: timestamps in and out are UTC, but cron expressions
// are matched against local wall-clock time ("every day at 9am" means
// local 9am), then converted back.
pub fn compute_next_run(r: &Reminder, base: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !r.enabled {
        return None;
    }
    match &r.rule {
        Rule::Delay { delay_minutes } => {
            if *delay_minutes <= 0 {
                return None;
            }
            Some(base + Duration::minutes(*delay_minutes))
        }
        Rule::Datetime { run_at } => {
            // Already consumed: a datetime reminder fires at most once
            if let Some(last) = r.last_triggered_at {
                if *run_at <= last {
                    return None;
                }
            }
            if *run_at <= base {
                // Past due: fire almost immediately instead of dropping silently
                Some(base + Duration::seconds(1))
            } else {
                Some(*run_at)
            }
        }
        Rule::Cron { cron_expr } => next_cron_after(cron_expr, base),
    }
}

// Parse a five-field cron expression. The cron crate expects a leading
// seconds field, so one is supplied here; callers always speak five-field.
fn parse_cron(expr: &str) -> Option<Schedule> {
    let expr = expr.trim();
    if expr.is_empty() {
        return None;
    }
    match Schedule::from_str(&format!("0 {expr}")) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("invalid cron expression {expr:?}: {e}");
            None
        }
    }
}

// Next local-time match strictly after `base`, as UTC.
fn next_cron_after(expr: &str, base: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let schedule = parse_cron(expr)?;
    let base_local = base.with_timezone(&Local);
    schedule
        .after(&base_local)
        .next()
        .map(|dt| dt.with_timezone(&Utc))
}

// Whether an expression parses at all. Used by handlers to reject bad
// input before it reaches the store.
pub fn cron_is_valid(expr: &str) -> bool {
    parse_cron(expr).is_some()
}

// Upcoming local-time occurrences for display ("next 10 runs" preview).
// None if the expression does not parse.
pub fn cron_preview(expr: &str, base: DateTime<Local>, count: usize) -> Option<Vec<DateTime<Local>>> {
    let schedule = parse_cron(expr)?;
    Some(schedule.after(&base).take(count).collect())
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;

    fn reminder(rule: Rule) -> Reminder {
        Reminder::new("t".to_string(), String::new(), rule, true)
    }

    #[test]
    fn delay_is_base_plus_minutes() {
        let r = reminder(Rule::Delay { delay_minutes: 25 });
        let base = Utc::now();
        assert_eq!(compute_next_run(&r, base), Some(base + Duration::minutes(25)));
    }

    #[test]
    fn delay_rejects_nonpositive_minutes() {
        let base = Utc::now();
        assert_eq!(compute_next_run(&reminder(Rule::Delay { delay_minutes: 0 }), base), None);
        assert_eq!(compute_next_run(&reminder(Rule::Delay { delay_minutes: -5 }), base), None);
    }

    #[test]
    fn disabled_reminder_has_no_occurrence() {
        let mut r = reminder(Rule::Delay { delay_minutes: 10 });
        r.enabled = false;
        assert_eq!(compute_next_run(&r, Utc::now()), None);
    }

    #[test]
    fn datetime_in_future_is_returned_unchanged() {
        let base = Utc::now();
        let run_at = base + Duration::hours(2);
        let r = reminder(Rule::Datetime { run_at });
        assert_eq!(compute_next_run(&r, base), Some(run_at));
    }

    #[test]
    fn past_datetime_clamps_strictly_after_base() {
        let base = Utc::now();
        let r = reminder(Rule::Datetime { run_at: base - Duration::hours(1) });
        let next = compute_next_run(&r, base).unwrap();
        assert!(next > base);
        assert_eq!(next, base + Duration::seconds(1));
    }

    #[test]
    fn consumed_datetime_never_fires_again() {
        let base = Utc::now();
        let run_at = base - Duration::minutes(30);
        let mut r = reminder(Rule::Datetime { run_at });
        r.last_triggered_at = Some(run_at);
        assert_eq!(compute_next_run(&r, base), None);
        // regardless of how far base moves
        assert_eq!(compute_next_run(&r, base + Duration::days(7)), None);
    }

    #[test]
    fn cron_every_five_minutes_lands_on_multiple_of_five() {
        let r = reminder(Rule::Cron { cron_expr: "*/5 * * * *".to_string() });
        let base = Utc::now();
        let next = compute_next_run(&r, base).unwrap();
        assert!(next > base);
        let local = next.with_timezone(&Local);
        assert_eq!(local.minute() % 5, 0);
        assert_eq!(local.second(), 0);
    }

    #[test]
    fn malformed_cron_yields_none() {
        let base = Utc::now();
        for expr in ["not a cron", "61 * * * *", "", "   "] {
            let r = reminder(Rule::Cron { cron_expr: expr.to_string() });
            assert_eq!(compute_next_run(&r, base), None, "expr {expr:?}");
        }
    }

    #[test]
    fn cron_validation_matches_evaluation() {
        assert!(cron_is_valid("*/5 * * * *"));
        assert!(cron_is_valid("0 9 * * 1-5"));
        assert!(!cron_is_valid("banana"));
        assert!(!cron_is_valid(""));
    }

    #[test]
    fn preview_is_increasing_and_sized() {
        let base = Local::now();
        let runs = cron_preview("*/5 * * * *", base, 10).unwrap();
        assert_eq!(runs.len(), 10);
        assert!(runs[0] > base);
        for pair in runs.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(cron_preview("nope", base, 10).is_none());
    }
}
