/*
Background scheduler loop.

One spawned task owns a min-heap of (next occurrence, reminder id,
insertion sequence) entries and sleeps until the earliest is due or a
signal arrives. The heap is never shared: mutations from the HTTP side
only touch the store and then set the rebuild flag, and the loop
re-derives the whole heap from the store on every rebuild. Nothing in
here propagates errors outward; the loop is meant to run for the
process lifetime no matter what the data looks like.
*/

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::models::{Reminder, Rule};
use crate::rules;
use crate::store::ReminderStore;

// Transient heap entry; owns nothing, the authoritative record is always
// re-fetched from the store at fire time. `seq` breaks timestamp ties so
// that within one fill the earlier-inserted reminder fires first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    at: DateTime<Utc>,
    seq: u64,
    id: Uuid,
}

type FireCallback = Box<dyn Fn(Reminder) -> anyhow::Result<()> + Send + Sync>;

struct Shared {
    store: Arc<ReminderStore>,
    on_fire: FireCallback,
    wake: Notify,
    rebuild_pending: AtomicBool,
    stopped: AtomicBool,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    // Start the loop on the current runtime. The callback runs on the
    // scheduler's task; hosts marshal onto their own context if needed.
    pub fn spawn(
        store: Arc<ReminderStore>,
        on_fire: impl Fn(Reminder) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        let shared = Arc::new(Shared {
            store,
            on_fire: Box::new(on_fire),
            wake: Notify::new(),
            rebuild_pending: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        });
        let task = tokio::spawn(run(Arc::clone(&shared)));
        Scheduler {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    // Fire-and-forget, callable from any thread. Several calls before the
    // loop wakes collapse into a single heap rebuild.
    pub fn rebuild(&self) {
        self.shared.rebuild_pending.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    // Terminal; unblocks any pending sleep so the loop exits promptly.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    // Wait for the loop task to exit. Call after stop() when the host
    // needs certainty before process termination.
    pub async fn join(&self) {
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

async fn run(shared: Arc<Shared>) {
    let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();
    let mut seq: u64 = 0;
    fill_heap(&shared, &mut heap, &mut seq);
    while !shared.stopped.load(Ordering::SeqCst) {
        if shared.rebuild_pending.swap(false, Ordering::SeqCst) {
            fill_heap(&shared, &mut heap, &mut seq);
        }
        let Some(Reverse(head)) = heap.peek() else {
            // Idle: bounded wait keeps the loop responsive to stop
            let _ = timeout(StdDuration::from_millis(500), shared.wake.notified()).await;
            continue;
        };
        let head_at = head.at;
        let now = Utc::now();
        let wait_ms = (head_at - now).num_milliseconds().clamp(0, 3_600_000) as u64;
        if timeout(StdDuration::from_millis(wait_ms), shared.wake.notified())
            .await
            .is_ok()
        {
            // Woken by a signal; the loop top sorts out stop vs rebuild
            continue;
        }
        // Timeout elapsed. Re-check before firing to guard against a
        // premature wake from a clamped wait.
        let now = Utc::now();
        let due = heap
            .peek()
            .is_some_and(|Reverse(e)| e.at <= now + Duration::milliseconds(100));
        if due {
            fire_next(&shared, &mut heap, &mut seq);
        }
    }
    debug!("scheduler loop stopped");
}

// Filling: discard every entry and re-derive the heap from the store.
// Computed occurrences are written back into next_run_at for display.
fn fill_heap(shared: &Shared, heap: &mut BinaryHeap<Reverse<HeapEntry>>, seq: &mut u64) {
    heap.clear();
    *seq = 0;
    let now = Utc::now();
    for id in shared.store.ids() {
        let next = shared
            .store
            .with_reminder_mut(id, |r| {
                let next = match &r.rule {
                    // A delay deadline is fixed when the reminder is
                    // created, edited, or re-enabled; recomputing from
                    // "now" here would let any unrelated mutation slide
                    // the deadline forward.
                    Rule::Delay { .. } if r.enabled => match r.next_run_at {
                        // Deadline elapsed while the process was down:
                        // fire promptly instead of stranding the one-shot
                        Some(at) if at <= now => Some(now + Duration::seconds(1)),
                        Some(at) => Some(at),
                        None => rules::compute_next_run(r, now),
                    },
                    _ => rules::compute_next_run(r, now),
                };
                r.next_run_at = next;
                next
            })
            .flatten();
        // Small negative tolerance absorbs the gap between taking "now"
        // and pushing the entry
        if let Some(at) = next {
            if at >= now - Duration::seconds(1) {
                heap.push(Reverse(HeapEntry { at, seq: *seq, id }));
                *seq += 1;
            }
        }
    }
    debug!("heap rebuilt, {} entries", heap.len());
}

// Firing: pop the earliest entry, re-validate against the store, do the
// bookkeeping, persist best-effort, then invoke the callback.
fn fire_next(shared: &Shared, heap: &mut BinaryHeap<Reverse<HeapEntry>>, seq: &mut u64) {
    let Some(Reverse(entry)) = heap.pop() else {
        return;
    };
    let now = Utc::now();
    // Mutations may have disabled or deleted this reminder between
    // scheduling and firing; stale entries are discarded without callback.
    let fired = shared
        .store
        .with_reminder_mut(entry.id, |r| {
            if !r.enabled {
                return None;
            }
            r.last_triggered_at = Some(now);
            match &r.rule {
                Rule::Cron { .. } => {
                    // Repeating: re-arm from the firing instant
                    r.next_run_at = rules::compute_next_run(r, now);
                }
                _ => {
                    // One-shot consumed
                    r.enabled = false;
                    r.next_run_at = None;
                }
            }
            Some(r.clone())
        })
        .flatten();
    let Some(fired) = fired else {
        debug!("discarding stale heap entry for {}", entry.id);
        return;
    };
    if let (Rule::Cron { .. }, Some(at)) = (&fired.rule, fired.next_run_at) {
        heap.push(Reverse(HeapEntry {
            at,
            seq: *seq,
            id: fired.id,
        }));
        *seq += 1;
    }
    // Best effort: in-memory state stays authoritative if the write fails
    if let Err(e) = shared.store.save() {
        warn!("failed to persist after firing {}: {e}", fired.id);
    }
    debug!("firing reminder {} ({:?})", fired.id, fired.title);
    if let Err(e) = (shared.on_fire)(fired) {
        error!("fire callback failed: {e:#}");
    }
}
