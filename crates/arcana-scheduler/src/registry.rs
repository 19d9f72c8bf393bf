use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use arcana_core::NotificationPayload;
use arcana_store::UserStore;

use crate::error::{Result, SchedulerError};
use crate::router::DispatchRouter;
use crate::trigger::{next_fire, Trigger};

/// Registry-side record of a scheduled job.
struct JobEntry {
    user_id: String,
    trigger: Trigger,
    /// Flipping this to `true` stops the job's timer task. A firing that is
    /// already underway completes; only future firings are prevented.
    cancel: watch::Sender<bool>,
    created_at: DateTime<Utc>,
}

/// Public snapshot of a registry entry.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: String,
    pub user_id: String,
    pub trigger: Trigger,
    pub created_at: DateTime<Utc>,
}

/// Ad-hoc scheduled notifications, orthogonal to the recurring cycle.
///
/// Each job runs on its own timer task and fires through the same
/// [`DispatchRouter`] as the cycle — but without the daily policy check:
/// a streak milestone or win-back is a distinct event, not a reminder, and
/// is sent even if the user was already reminded today.
///
/// The job table is the engine's only in-process shared mutable state;
/// registration, cancellation and task self-removal all go through one
/// mutex.
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<String, JobEntry>>>,
    store: Arc<dyn UserStore>,
    router: Arc<DispatchRouter>,
}

impl JobRegistry {
    pub fn new(store: Arc<dyn UserStore>, router: Arc<DispatchRouter>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            store,
            router,
        }
    }

    /// Register a job and start its timer. Returns the generated job id.
    ///
    /// Fails with `InvalidTrigger` when the trigger has no future firing
    /// (a `Once` instant already in the past).
    pub fn schedule(
        &self,
        user_id: &str,
        payload: NotificationPayload,
        trigger: Trigger,
    ) -> Result<String> {
        let now = Utc::now();
        if next_fire(&trigger, now).is_none() {
            return Err(SchedulerError::InvalidTrigger(
                "trigger has no future firing".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // Insert before the task can possibly fire: the lock is held across
        // the spawn, and the task's own map access blocks until we release.
        {
            let mut jobs = self.jobs.lock().unwrap();
            tokio::spawn(run_job(
                id.clone(),
                user_id.to_string(),
                payload,
                trigger.clone(),
                now,
                Arc::clone(&self.store),
                Arc::clone(&self.router),
                Arc::clone(&self.jobs),
                cancel_rx,
            ));
            jobs.insert(
                id.clone(),
                JobEntry {
                    user_id: user_id.to_string(),
                    trigger,
                    cancel: cancel_tx,
                    created_at: now,
                },
            );
        }

        info!(job_id = %id, user_id = %user_id, "job scheduled");
        Ok(id)
    }

    /// Cancel a job. Returns `false` (never an error) for unknown ids —
    /// the job may simply have fired and removed itself already.
    pub fn cancel(&self, id: &str) -> bool {
        let entry = self.jobs.lock().unwrap().remove(id);
        match entry {
            Some(entry) => {
                let _ = entry.cancel.send(true);
                info!(job_id = %id, user_id = %entry.user_id, "job cancelled");
                true
            }
            None => {
                debug!(job_id = %id, "cancel requested for unknown job");
                false
            }
        }
    }

    /// Snapshot of all outstanding jobs.
    pub fn jobs(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.lock().unwrap();
        let mut infos: Vec<JobInfo> = jobs
            .iter()
            .map(|(id, entry)| JobInfo {
                id: id.clone(),
                user_id: entry.user_id.clone(),
                trigger: entry.trigger.clone(),
                created_at: entry.created_at,
            })
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    /// Cancel every outstanding job. Called at process shutdown.
    pub fn shutdown(&self) {
        let mut jobs = self.jobs.lock().unwrap();
        for (id, entry) in jobs.drain() {
            let _ = entry.cancel.send(true);
            debug!(job_id = %id, "job cancelled at shutdown");
        }
    }
}

/// Timer task for one job: sleep until the next firing, dispatch, repeat
/// for recurring triggers. Exits on cancellation or trigger exhaustion;
/// one-shot jobs remove their own registry entry on the way out — firing
/// errors included, so a failed job never sticks around.
#[allow(clippy::too_many_arguments)]
async fn run_job(
    id: String,
    user_id: String,
    payload: NotificationPayload,
    trigger: Trigger,
    // The registration instant — keeps a Once trigger validated at
    // registration from expiring before this task gets its first poll.
    mut from: DateTime<Utc>,
    store: Arc<dyn UserStore>,
    router: Arc<DispatchRouter>,
    jobs: Arc<Mutex<HashMap<String, JobEntry>>>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        let Some(at) = next_fire(&trigger, from) else {
            break;
        };
        let delay = (at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        // biased: a cancellation that races an already-due timer wins, so
        // cancel() can never be followed by one last firing.
        tokio::select! {
            biased;
            changed = cancel.changed() => {
                // Entry already removed by cancel()/shutdown(); a dropped
                // sender means the same thing.
                if changed.is_err() || *cancel.borrow() {
                    return;
                }
            }
            _ = tokio::time::sleep(delay) => {
                fire(&id, &user_id, &payload, store.as_ref(), &router).await;
                if trigger.is_one_shot() {
                    break;
                }
                from = Utc::now();
            }
        }
    }
    // One-shot fired or trigger exhausted: drop our own entry so the
    // table never leaks.
    jobs.lock().unwrap().remove(&id);
}

/// One firing: re-read the current user record (settings or subscriptions
/// may have changed since registration) and dispatch.
async fn fire(
    job_id: &str,
    user_id: &str,
    payload: &NotificationPayload,
    store: &dyn UserStore,
    router: &DispatchRouter,
) {
    match store.user(user_id).await {
        Ok(Some(user)) => match router.dispatch(&user, payload, Utc::now()).await {
            Ok(result) => info!(
                job_id = %job_id,
                user_id = %user_id,
                email = ?result.email,
                push = ?result.push,
                "job fired"
            ),
            Err(e) => warn!(job_id = %job_id, error = %e, "job dispatch failed"),
        },
        Ok(None) => warn!(job_id = %job_id, user_id = %user_id, "job target user no longer exists"),
        Err(e) => warn!(job_id = %job_id, error = %e, "job user lookup failed"),
    }
}
