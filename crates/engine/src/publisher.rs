//! Per-job fan-out of progress events.
//!
//! Each subscriber owns an unbounded channel, so publishing never blocks and a
//! slow reader never loses events. There is no replay: a subscriber sees only
//! what is published after it subscribed.

use riskscan_core::{JobId, ProgressEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

pub type SubscriberId = u64;

type Table = HashMap<JobId, Vec<(SubscriberId, UnboundedSender<ProgressEvent>)>>;

#[derive(Default)]
pub struct ProgressPublisher {
    next_id: AtomicU64,
    table: Mutex<Table>,
}

pub struct Subscription {
    id: SubscriberId,
    job_id: JobId,
    rx: UnboundedReceiver<ProgressEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Next event, or `None` once the job's stream has been closed and drained.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }
}

impl ProgressPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, job_id: JobId) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = unbounded_channel();
        self.lock().entry(job_id).or_default().push((id, tx));
        Subscription { id, job_id, rx }
    }

    /// Removing an unknown subscriber is a no-op.
    pub fn unsubscribe(&self, job_id: JobId, id: SubscriberId) {
        let mut table = self.lock();
        if let Some(subs) = table.get_mut(&job_id) {
            subs.retain(|(sid, _)| *sid != id);
            if subs.is_empty() {
                table.remove(&job_id);
            }
        }
    }

    /// Deliver to every current subscriber of the job; dropped receivers are pruned.
    pub fn publish(&self, job_id: JobId, event: ProgressEvent) {
        let mut table = self.lock();
        let Some(subs) = table.get_mut(&job_id) else { return };
        subs.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        if subs.is_empty() {
            table.remove(&job_id);
        }
    }

    /// Drop all subscribers of a finished job so their receivers end after draining.
    pub fn close(&self, job_id: JobId) {
        self.lock().remove(&job_id);
    }

    pub fn subscriber_count(&self, job_id: JobId) -> usize {
        self.lock().get(&job_id).map_or(0, Vec::len)
    }
}
