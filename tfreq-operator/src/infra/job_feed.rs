//! Keeps the ownership index in step with the job watch.

use futures::{Stream, StreamExt};
use k8s_openapi::api::batch::v1::Job;
use kube::runtime::watcher::{self, Event};
use tfreq_core::OwnershipIndex;
use tracing::{debug, warn};

/// Applies job change events to an [`OwnershipIndex`].
///
/// A relist arrives as `Init`, a run of `InitApply`, then `InitDone`. The
/// listed jobs are buffered and swapped in as a whole on `InitDone`, so readers
/// never see a half-built index.
#[derive(Debug)]
pub struct IndexFeed {
    index: OwnershipIndex,
    pending: Vec<Job>,
}

impl IndexFeed {
    pub fn new(index: OwnershipIndex) -> Self {
        Self {
            index,
            pending: Vec::new(),
        }
    }

    pub fn apply(&mut self, event: Event<Job>) {
        match event {
            Event::Init => self.pending.clear(),
            Event::InitApply(job) => self.pending.push(job),
            Event::InitDone => {
                let listed = std::mem::take(&mut self.pending);
                self.index.rebuild(listed.iter());
                debug!(jobs = self.index.len(), "ownership index rebuilt");
            }
            Event::Apply(job) => self.index.observe(&job),
            Event::Delete(job) => self.index.forget(&job),
        }
    }

    /// Drains `events` until the stream ends. Watch errors are logged; the
    /// watcher retries on its own.
    pub async fn run<S>(mut self, events: S)
    where
        S: Stream<Item = Result<Event<Job>, watcher::Error>>,
    {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => self.apply(event),
                Err(err) => warn!(error = %err, "job watch error"),
            }
        }
        debug!("job watch ended");
    }
}
